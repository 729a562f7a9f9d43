//! Banlist file format.
//!
//! A banlist is plain text: one decimal node id per line, no header. Readers
//! accept any whitespace between ids. Attack runs write a mode-specific file
//! plus a combined `banlist.txt`; wormhole attacks also write a pair file so
//! a mitigation run can recover the exact pairing.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::config::AttackMode;
use crate::scenario::{Diagnostic, Diagnostics, MaliciousRoleSet, NodeId, WormholePair};

pub const BLACKHOLE_BANLIST: &str = "banlist_blackhole.txt";
pub const WORMHOLE_BANLIST: &str = "banlist_wormhole.txt";
pub const COMBINED_BANLIST: &str = "banlist.txt";
pub const WORMHOLE_PAIRS: &str = "wormhole_pairs.txt";

/// Banlist I/O failures. Only opening or writing a file is an error;
/// malformed content never is.
#[derive(Debug, thiserror::Error)]
pub enum BanlistError {
    #[error("Cannot open banlist {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot write banlist {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Parse banlist content into a node set.
///
/// Tokens that are not unsigned integers are skipped. Values at or above
/// `node_count` are skipped and recorded. Duplicates collapse.
pub fn parse_banlist(content: &str, node_count: u32, diagnostics: &mut Diagnostics) -> BTreeSet<NodeId> {
    let mut banned = BTreeSet::new();

    for token in content.split_whitespace() {
        let value = match token.parse::<u64>() {
            Ok(value) => value,
            Err(_) => {
                debug!("Skipping malformed banlist token '{}'", token);
                continue;
            }
        };
        if value >= u64::from(node_count) {
            diagnostics.record(Diagnostic::BanlistSkipped { value, node_count });
            continue;
        }
        // in range, so it fits a NodeId
        banned.insert(value as NodeId);
    }

    banned
}

/// Read a banlist file
pub fn read_banlist(
    path: &Path,
    node_count: u32,
    diagnostics: &mut Diagnostics,
) -> Result<BTreeSet<NodeId>, BanlistError> {
    info!("Reading banlist from {}", path.display());
    let content = fs::read_to_string(path).map_err(|source| BanlistError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let banned = parse_banlist(&content, node_count, diagnostics);
    info!("Total banned nodes from file: {}", banned.len());
    Ok(banned)
}

/// Parse a pair file: two ids per line.
///
/// Lines that do not hold exactly two in-range ids are skipped.
pub fn parse_wormhole_pairs(content: &str, node_count: u32) -> Vec<WormholePair> {
    let mut pairs = Vec::new();

    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let ids: Vec<u32> = line
            .split_whitespace()
            .filter_map(|t| t.parse::<u32>().ok())
            .collect();
        match ids.as_slice() {
            [a, b] if *a < node_count && *b < node_count => pairs.push(WormholePair::new(*a, *b)),
            _ => warn!("Skipping malformed wormhole pair line '{}'", line),
        }
    }

    pairs
}

/// Read a pair file written by a wormhole attack run
pub fn read_wormhole_pairs(path: &Path, node_count: u32) -> Result<Vec<WormholePair>, BanlistError> {
    let content = fs::read_to_string(path).map_err(|source| BanlistError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_wormhole_pairs(&content, node_count))
}

/// One id per line, in the given order
pub fn format_node_list<I: IntoIterator<Item = NodeId>>(ids: I) -> String {
    ids.into_iter().map(|id| format!("{}\n", id)).collect()
}

/// One `first second` pair per line
pub fn format_pairs(pairs: &[WormholePair]) -> String {
    pairs
        .iter()
        .map(|p| format!("{} {}\n", p.first, p.second))
        .collect()
}

fn write_file(path: &Path, content: &str) -> Result<(), BanlistError> {
    fs::write(path, content).map_err(|source| BanlistError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `ids` to `path`, one per line, in the given order
pub fn write_banlist<I: IntoIterator<Item = NodeId>>(path: &Path, ids: I) -> Result<(), BanlistError> {
    write_file(path, &format_node_list(ids))
}

/// Write the banlists of an attack run into `dir`.
///
/// Blackhole mode writes its set in ascending order. Wormhole mode writes
/// each pair as two consecutive lines in generation order, plus the pair
/// file. The combined list (blackholes, then wormhole members) is always
/// written. Returns the paths written.
pub fn write_attack_banlists(
    dir: &Path,
    mode: AttackMode,
    roles: &MaliciousRoleSet,
) -> Result<Vec<PathBuf>, BanlistError> {
    let mut written = Vec::new();
    let flattened = roles.wormhole_pairs.iter().flat_map(|p| p.members());

    match mode {
        AttackMode::Blackhole => {
            let path = dir.join(BLACKHOLE_BANLIST);
            write_file(&path, &format_node_list(roles.blackholes.iter().copied()))?;
            info!("Generated blackhole banlist with {} nodes", roles.blackholes.len());
            written.push(path);
        }
        AttackMode::Wormhole => {
            let path = dir.join(WORMHOLE_BANLIST);
            write_file(&path, &format_node_list(flattened.clone()))?;
            info!(
                "Generated wormhole banlist with {} nodes",
                roles.wormhole_pairs.len() * 2
            );
            written.push(path);

            let path = dir.join(WORMHOLE_PAIRS);
            write_file(&path, &format_pairs(&roles.wormhole_pairs))?;
            written.push(path);
        }
        AttackMode::None => {}
    }

    let path = dir.join(COMBINED_BANLIST);
    let combined = roles.blackholes.iter().copied().chain(flattened);
    write_file(&path, &format_node_list(combined))?;
    written.push(path);

    Ok(written)
}
