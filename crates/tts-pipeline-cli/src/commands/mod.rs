pub mod generate;
pub mod serve;

/// Configuration file used when `--config` is not given
pub const DEFAULT_CONFIG: &str = "config.yaml";
