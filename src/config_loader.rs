use crate::config::{AttackMode, Config, RoutingProtocol};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Load and parse configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration '{}'", config_path.display()))?;

    let config: Config = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse configuration '{}'", config_path.display()))?;

    config.validate()?;

    Ok(config)
}

/// Load the configuration file when one is given, defaults otherwise
pub fn load_or_default(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => load_config(path),
        None => {
            info!("No configuration file given, using defaults");
            Ok(Config::default())
        }
    }
}

/// CLI arguments that override YAML settings
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub nodes: Option<u32>,
    pub sim_time: Option<Duration>,
    pub area: Option<u32>,
    pub routing: Option<RoutingProtocol>,
    pub attack: Option<AttackMode>,
    pub blackholes: Option<u32>,
    pub wormholes: Option<u32>,
    pub banlist: Option<PathBuf>,
    pub wormhole_pairs: Option<PathBuf>,
    pub seed: Option<u64>,
    pub output_dir: Option<PathBuf>,
}

/// Apply CLI overrides to a configuration
pub fn apply_overrides(config: &mut Config, overrides: &CliOverrides) -> Result<()> {
    if let Some(nodes) = overrides.nodes {
        info!("Overriding node count: {}", nodes);
        config.general.nodes = nodes;
    }
    if let Some(sim_time) = overrides.sim_time {
        config.general.sim_time = sim_time;
    }
    if let Some(area) = overrides.area {
        config.general.area = area;
    }
    if let Some(routing) = overrides.routing {
        config.general.routing = routing;
    }
    if let Some(mode) = overrides.attack {
        info!("Overriding attack mode: {}", mode);
        config.attack.mode = mode;
    }
    if let Some(blackholes) = overrides.blackholes {
        config.attack.blackholes = blackholes;
    }
    if let Some(wormholes) = overrides.wormholes {
        config.attack.wormholes = wormholes;
    }
    if let Some(banlist) = &overrides.banlist {
        info!("Using banlist {:?}; this is a mitigation run", banlist);
        config.attack.banlist = Some(banlist.clone());
    }
    if let Some(pairs) = &overrides.wormhole_pairs {
        config.attack.wormhole_pairs = Some(pairs.clone());
    }
    if let Some(seed) = overrides.seed {
        config.general.seed = seed;
    }
    if let Some(output_dir) = &overrides.output_dir {
        config.general.output_dir = output_dir.clone();
    }

    // Re-validate after applying overrides
    config.validate()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let yaml = r#"
general:
  nodes: 30
  sim_time: "40s"
attack:
  mode: blackhole
  blackholes: 2
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.general.nodes, 30);
        assert_eq!(config.attack.mode, AttackMode::Blackhole);
        assert_eq!(config.attack.blackholes, 2);
    }

    #[test]
    fn test_load_invalid_config_fails() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "general:\n  nodes: 1\n").unwrap();

        assert!(load_config(temp_file.path()).is_err());
    }

    #[test]
    fn test_missing_file_fails() {
        assert!(load_config(Path::new("/nonexistent/scenario.yaml")).is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = load_or_default(None).unwrap();

        let overrides = CliOverrides {
            nodes: Some(20),
            attack: Some(AttackMode::Wormhole),
            wormholes: Some(2),
            seed: Some(9),
            banlist: Some(PathBuf::from("banlist.txt")),
            ..Default::default()
        };

        apply_overrides(&mut config, &overrides).unwrap();
        assert_eq!(config.general.nodes, 20);
        assert_eq!(config.attack.mode, AttackMode::Wormhole);
        assert_eq!(config.attack.wormholes, 2);
        assert_eq!(config.general.seed, 9);
        assert_eq!(config.attack.banlist, Some(PathBuf::from("banlist.txt")));
    }

    #[test]
    fn test_overrides_are_revalidated() {
        let mut config = Config::default();
        let overrides = CliOverrides {
            nodes: Some(0),
            ..Default::default()
        };
        assert!(apply_overrides(&mut config, &overrides).is_err());
    }
}
