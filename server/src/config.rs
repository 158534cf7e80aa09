//! Command-line + multi-format config-file loading, layered the way the
//! teacher's `bpa-server` does it: an explicit `--config` flag, else an
//! environment variable naming the file, else a platform config directory,
//! with environment-variable overrides applied on top.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

mod log_level_serde {
    use super::*;

    pub fn serialize<S>(level: &Option<Level>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match level {
            Some(level) => serializer.serialize_some(level.as_str()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Level>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| Level::from_str(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Top-level daemon configuration: a manager-level `data_dir`/`in_memory`
/// pair (§6, §12 of the design spec) plus the file-backend's own tuning
/// knobs, flattened into one document so operators edit a single file.
#[derive(Serialize, Deserialize, Debug)]
pub struct Config {
    #[serde(default, with = "log_level_serde")]
    pub log_level: Option<Level>,

    /// Directory scanned at startup and used for persistence. `None`
    /// disables the startup scan and runs the daemon filter-less until a
    /// `create` arrives (mirrors the core's own `data_dir: Option<PathBuf>`).
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_bits")]
    pub default_bits: u64,

    #[serde(default = "default_hashes")]
    pub default_hashes: u32,

    /// Default for new filters' `in_memory` flag when `create` doesn't
    /// specify its own.
    #[serde(default)]
    pub in_memory: bool,
}

fn default_bits() -> u64 {
    bloomd_filter_fs::Config::default().default_bits
}

fn default_hashes() -> u32 {
    bloomd_filter_fs::Config::default().default_hashes
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            data_dir: None,
            default_bits: default_bits(),
            default_hashes: default_hashes(),
            in_memory: false,
        }
    }
}

fn options() -> getopts::Options {
    let mut opts = getopts::Options::new();
    opts.optflag("h", "help", "print this help menu")
        .optflag("v", "version", "print the version information")
        .optopt("c", "config", "use a custom configuration file", "FILE");
    opts
}

fn config_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", env!("CARGO_PKG_NAME")).map_or_else(
        || std::path::Path::new("/etc").join(env!("CARGO_PKG_NAME")),
        |proj_dirs| proj_dirs.config_local_dir().to_path_buf(),
    )
}

/// Parses argv and loads configuration, returning `None` (after printing
/// usage/version) when the process should exit immediately rather than
/// start the daemon.
pub fn init() -> Option<(Config, String)> {
    let opts = options();
    let args: Vec<String> = std::env::args().collect();
    let flags = opts
        .parse(&args[1..])
        .expect("failed to parse command line args");

    if flags.opt_present("h") {
        let brief = format!(
            "{} {} - {}\n\nUsage: {} [options]",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_DESCRIPTION"),
            args[0]
        );
        print!("{}", opts.usage(&brief));
        return None;
    }
    if flags.opt_present("v") {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return None;
    }

    let mut b = ::config::Config::builder();

    let config_source: String;
    if let Some(source) = flags.opt_str("config") {
        config_source = format!("using configuration file '{source}' specified on command line");
        b = b.add_source(::config::File::with_name(&source));
    } else if let Ok(source) = std::env::var("BLOOMD_CONFIG_FILE") {
        config_source =
            format!("using configuration file '{source}' specified by BLOOMD_CONFIG_FILE environment variable");
        b = b.add_source(::config::File::with_name(&source));
    } else {
        let path = config_dir().join(format!("{}.yaml", env!("CARGO_PKG_NAME")));
        config_source = format!("using configuration file '{}'", path.display());
        b = b.add_source(::config::File::from(path).required(false));
    }

    b = b.add_source(::config::Environment::with_prefix("BLOOMD"));

    let config: Config = b
        .build()
        .expect("failed to read configuration")
        .try_deserialize()
        .expect("failed to parse configuration");

    Some((config, config_source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_file_backend_defaults() {
        let config = Config::default();
        assert_eq!(config.default_bits, bloomd_filter_fs::Config::default().default_bits);
        assert_eq!(config.default_hashes, bloomd_filter_fs::Config::default().default_hashes);
        assert!(config.data_dir.is_none());
        assert!(!config.in_memory);
    }

    #[test]
    fn partial_yaml_file_fills_the_rest_from_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bloomd.yaml");
        std::fs::write(&path, "data_dir: /tmp/bloomd-data\nin_memory: true\n").unwrap();

        let config: Config = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/bloomd-data")));
        assert!(config.in_memory);
        assert_eq!(config.default_bits, default_bits());
        assert_eq!(config.default_hashes, default_hashes());
    }
}
