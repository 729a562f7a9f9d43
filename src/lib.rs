//! # manetsim - Adversarial scenario engine for MANET routing experiments
//!
//! This library decides who attacks whom in a mobile ad-hoc network
//! simulation, hands that setup to an external network simulator, and turns
//! the simulator's counters back into comparable statistics.
//!
//! ## Overview
//!
//! An experiment is a series of runs over the same network: a baseline, an
//! attack run that selects hostile nodes and writes them to a banlist, and a
//! mitigation run that reads the banlist back, quarantines those nodes and
//! measures how much delivery recovers. Every run is reproducible from its
//! seed.
//!
//! ## Key Features
//!
//! - **Blackhole attacks**: randomly selected nodes that drop what they should forward
//! - **Wormhole attacks**: colluding pairs spread across the address space by a fixed placement table
//! - **Banlists**: plain text node lists linking attack and mitigation runs
//! - **Consistency checks**: attack parameters vs. reconstructed mitigation roles
//! - **Benign traffic**: flow matrix that never touches a malicious node
//! - **Statistics**: per-node CSV, append-only PDR log, JSON run summary
//! - **Offline analysis**: heuristic detection and attack/mitigation comparison
//!
//! ## Architecture
//!
//! - `config`: Type-safe configuration structures and YAML parsing
//! - `config_loader`: Configuration file loading and CLI overrides
//! - `scenario`: Role selection, reconstruction, verification and hostile apps
//! - `banlist`: Banlist file format
//! - `traffic`: Benign flow matrix synthesis
//! - `nse`: Interface to the network simulator and the external adapter
//! - `metrics`: Counter aggregation and report files
//! - `orchestrator`: One run from configuration to reports
//! - `analysis`: Detection and cross-run comparison
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use manetsim::{config_loader, orchestrator};
//! use manetsim::nse::{ExternalSimulator, NseCounters};
//!
//! let config = config_loader::load_config(Path::new("scenario.yaml"))?;
//! let prepared = orchestrator::prepare(&config);
//!
//! let counters = NseCounters::load(Path::new("counters.json"))?;
//! let mut simulator = ExternalSimulator::new(&config, Some(counters));
//! let statistics = orchestrator::execute(&prepared, &mut simulator)?;
//! orchestrator::persist(&prepared, &statistics)?;
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! general:
//!   nodes: 50
//!   sim_time: "50s"
//!   routing: AODV
//!   seed: 1
//!   output_dir: "scratch/ai_out"
//!
//! attack:
//!   mode: blackhole       # none/blackhole/wormhole
//!   blackholes: 3
//!   wormholes: 3
//!   # banlist: "scratch/ai_out/banlist.txt"   # makes this a mitigation run
//!
//! traffic:
//!   flow_fraction: 0.6
//!   base_start: "10s"
//! ```
//!
//! ## Error Handling
//!
//! The library uses `color_eyre` for error reporting with context. Domain
//! errors (`ValidationError`, `BanlistError`) are `thiserror` enums.
//! Recoverable conditions such as a clamped request or a count mismatch are
//! recorded as `scenario::Diagnostic` values and never abort a run.

pub mod analysis;
pub mod banlist;
pub mod config;
pub mod config_loader;
pub mod metrics;
pub mod nse;
pub mod orchestrator;
pub mod scenario;
pub mod traffic;
