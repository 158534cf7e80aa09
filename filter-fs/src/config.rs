use std::path::PathBuf;

/// Where persisted filters live, and the defaults applied when a `create`
/// call doesn't specify its own `bits`/`hashes` in
/// [`bloomd_core::FilterConfig::params`].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    pub data_dir: PathBuf,
    pub default_bits: u64,
    pub default_hashes: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: directories::ProjectDirs::from("", "", "bloomd")
                .map(|p| p.data_local_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from("/var/lib/bloomd")),
            default_bits: 1 << 20,
            default_hashes: 4,
        }
    }
}
