use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Hostile behavior exercised by a run
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttackMode {
    /// No hostile nodes; produces the baseline
    #[default]
    None,
    /// Nodes that drop everything they should forward
    Blackhole,
    /// Colluding node pairs that disrupt route selection
    Wormhole,
}

impl fmt::Display for AttackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttackMode::None => write!(f, "none"),
            AttackMode::Blackhole => write!(f, "blackhole"),
            AttackMode::Wormhole => write!(f, "wormhole"),
        }
    }
}

impl FromStr for AttackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "baseline" => Ok(AttackMode::None),
            "blackhole" => Ok(AttackMode::Blackhole),
            "wormhole" => Ok(AttackMode::Wormhole),
            other => Err(format!("unknown attack mode '{}' (expected none/blackhole/wormhole)", other)),
        }
    }
}

/// Routing protocol the simulation environment runs on every node
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingProtocol {
    /// Reactive on-demand distance vector routing
    #[default]
    #[serde(rename = "AODV", alias = "aodv")]
    Aodv,
    /// Proactive link-state routing
    #[serde(rename = "OLSR", alias = "olsr")]
    Olsr,
}

impl fmt::Display for RoutingProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingProtocol::Aodv => write!(f, "AODV"),
            RoutingProtocol::Olsr => write!(f, "OLSR"),
        }
    }
}

impl FromStr for RoutingProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AODV" => Ok(RoutingProtocol::Aodv),
            "OLSR" => Ok(RoutingProtocol::Olsr),
            other => Err(format!("unknown routing protocol '{}' (expected AODV/OLSR)", other)),
        }
    }
}

/// Whether roles are generated fresh or rebuilt from a banlist.
///
/// Never stored; always derived from the presence of a banlist path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunKind {
    Attack,
    Mitigation,
}

/// Scenario label used in the PDR results log
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScenarioKind {
    Baseline,
    Attack,
    Mitigation,
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioKind::Baseline => write!(f, "BASELINE"),
            ScenarioKind::Attack => write!(f, "ATTACK"),
            ScenarioKind::Mitigation => write!(f, "MITIGATION"),
        }
    }
}

impl FromStr for ScenarioKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BASELINE" => Ok(ScenarioKind::Baseline),
            "ATTACK" => Ok(ScenarioKind::Attack),
            "MITIGATION" => Ok(ScenarioKind::Mitigation),
            other => Err(format!("unknown scenario '{}'", other)),
        }
    }
}

/// Complete scenario configuration.
///
/// Every section is optional in the YAML file; missing sections take
/// their defaults so a bare `{}` document describes the 50-node baseline.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub attack: AttackConfig,
    pub traffic: TrafficConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let general = &self.general;

        if general.nodes < 2 {
            return Err(ValidationError::InvalidGeneral(format!(
                "nodes must be at least 2, got {}",
                general.nodes
            )));
        }

        // sink ports are 9000 + id
        if general.nodes > MAX_NODES {
            return Err(ValidationError::InvalidGeneral(format!(
                "nodes must be at most {}, got {}",
                MAX_NODES, general.nodes
            )));
        }

        if general.sim_time <= MIN_SIM_TIME {
            return Err(ValidationError::InvalidGeneral(format!(
                "sim_time must exceed {:?} so flows have an active window, got {:?}",
                MIN_SIM_TIME, general.sim_time
            )));
        }

        // Node addresses are base + id + 1; the whole range must fit in IPv4
        if u32::from(general.address_base)
            .checked_add(general.nodes)
            .is_none()
        {
            return Err(ValidationError::InvalidGeneral(format!(
                "address_base {} cannot hold {} nodes",
                general.address_base, general.nodes
            )));
        }

        if self.attack.wormhole_pairs.is_some() && self.attack.banlist.is_none() {
            return Err(ValidationError::InvalidAttack(
                "wormhole_pairs is only used together with a banlist".to_string(),
            ));
        }

        let traffic = &self.traffic;
        if !(traffic.flow_fraction > 0.0 && traffic.flow_fraction <= 1.0) {
            return Err(ValidationError::InvalidTraffic(format!(
                "flow_fraction must be in (0, 1], got {}",
                traffic.flow_fraction
            )));
        }
        if !(0.0..=1.0).contains(&traffic.structured_share) {
            return Err(ValidationError::InvalidTraffic(format!(
                "structured_share must be in [0, 1], got {}",
                traffic.structured_share
            )));
        }
        if traffic.packet_size == 0 || traffic.data_rate_bps == 0 {
            return Err(ValidationError::InvalidTraffic(
                "packet_size and data_rate_bps must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Attack runs generate roles, mitigation runs rebuild them from a banlist
    pub fn run_kind(&self) -> RunKind {
        if self.attack.banlist.is_some() {
            RunKind::Mitigation
        } else {
            RunKind::Attack
        }
    }

    /// Label written to the PDR results log
    pub fn scenario_kind(&self) -> ScenarioKind {
        match (self.attack.mode, self.run_kind()) {
            (AttackMode::None, _) => ScenarioKind::Baseline,
            (_, RunKind::Attack) => ScenarioKind::Attack,
            (_, RunKind::Mitigation) => ScenarioKind::Mitigation,
        }
    }

    /// End of the window in which sinks listen and benign flows transmit
    pub fn traffic_stop(&self) -> Duration {
        self.general.sim_time.saturating_sub(TRAFFIC_TAIL)
    }
}

/// Largest network whose sink ports still fit in a u16
pub const MAX_NODES: u32 = 50_000;

/// Shortest simulation that still leaves room for benign traffic
pub const MIN_SIM_TIME: Duration = Duration::from_secs(10);

/// Traffic stops this long before the simulation ends
pub const TRAFFIC_TAIL: Duration = Duration::from_secs(5);

/// Network-wide settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GeneralConfig {
    pub nodes: u32,
    #[serde(with = "humantime_serde")]
    pub sim_time: Duration,
    /// Side of the square placement area in meters
    pub area: u32,
    pub routing: RoutingProtocol,
    pub seed: u64,
    pub output_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Network address; node `i` gets `address_base + i + 1`
    pub address_base: Ipv4Addr,
}

/// Hostile role parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AttackConfig {
    pub mode: AttackMode,
    pub blackholes: u32,
    /// Number of wormhole pairs (two nodes each)
    pub wormholes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banlist: Option<PathBuf>,
    /// Optional explicit pair file written by a wormhole attack run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wormhole_pairs: Option<PathBuf>,
}

/// Benign traffic matrix parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TrafficConfig {
    /// Target flow count as a fraction of the node count
    pub flow_fraction: f64,
    /// Leading share of flow slots that use mirrored placement
    pub structured_share: f64,
    #[serde(with = "humantime_serde")]
    pub base_start: Duration,
    #[serde(with = "humantime_serde")]
    pub flow_spacing: Duration,
    pub packet_size: u32,
    pub data_rate_bps: u64,
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid attack configuration: {0}")]
    InvalidAttack(String),
    #[error("Invalid traffic configuration: {0}")]
    InvalidTraffic(String),
}

/// Default implementations
impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            nodes: 50,
            sim_time: Duration::from_secs(50),
            area: 500,
            routing: RoutingProtocol::Aodv,
            seed: 1,
            output_dir: PathBuf::from("scratch/ai_out"),
            log_level: None,
            address_base: Ipv4Addr::new(10, 1, 1, 0),
        }
    }
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            mode: AttackMode::None,
            blackholes: 3,
            wormholes: 3,
            banlist: None,
            wormhole_pairs: None,
        }
    }
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            flow_fraction: 0.6,
            structured_share: 0.7,
            base_start: Duration::from_secs(10),
            flow_spacing: Duration::from_millis(300),
            packet_size: 1024,
            data_rate_bps: 100_000,
        }
    }
}
