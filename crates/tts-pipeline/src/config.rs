//! Runtime configuration
//!
//! A single file in YAML, JSON or TOML (picked by extension). Every field has
//! a default, so partial files are fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub mod defaults {
    pub const SAMPLE_RATE: u32 = 24_000;
    pub const TRIM_TOP_DB: f32 = 20.0;
    pub const MAX_TEXT_CHARS: usize = 512;
    pub const SEED: u64 = 421;
    pub const N_MELS: usize = 100;
    pub const HOP_LENGTH: usize = 256;
    pub const FRAMES_PER_TOKEN: usize = 4;
    pub const HOST: &str = "0.0.0.0";
    pub const PORT: u16 = 5002;
    pub const REQUEST_TIMEOUT_SECS: u64 = 120;
    pub const LOG_FILTER: &str = "info";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory generated audio files are written to
    pub output_dir: PathBuf,
    /// Directory uploaded reference clips are staged in
    pub upload_dir: PathBuf,
    /// Prefix substitutions applied to user-supplied paths
    pub path_rewrites: Vec<PathRewrite>,
    pub audio: AudioConfig,
    pub text: TextConfig,
    pub engine: EngineConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            upload_dir: PathBuf::from("uploads"),
            path_rewrites: Vec::new(),
            audio: AudioConfig::default(),
            text: TextConfig::default(),
            engine: EngineConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate used when a request does not ask for one
    pub sample_rate: u32,
    /// Silence threshold (dB below peak) for trimming reference clips
    pub trim_top_db: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            trim_top_db: defaults::TRIM_TOP_DB,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub max_chars: usize,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            max_chars: defaults::MAX_TEXT_CHARS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Seeded candle network with a sine-bank vocoder
    Reference,
    /// Fixed tone generator, for tests and smoke checks
    Tone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Safetensors weights for the reference model: a local path or
    /// `hf://owner/repo/file[@revision]`. Seeded init when unset.
    pub weights: Option<String>,
    pub seed: u64,
    pub n_mels: usize,
    pub hop_length: usize,
    pub frames_per_token: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Reference,
            weights: None,
            seed: defaults::SEED,
            n_mels: defaults::N_MELS,
            hop_length: defaults::HOP_LENGTH,
            frames_per_token: defaults::FRAMES_PER_TOKEN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: defaults::LOG_FILTER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRewrite {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
    Toml,
}

impl Format {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Ok(Format::Yaml),
            "json" => Ok(Format::Json),
            "toml" => Ok(Format::Toml),
            _ => Err(ConfigError::UnsupportedFormat(ext)),
        }
    }
}

impl Config {
    /// Load a configuration file, failing if it does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = Format::from_path(path)?;
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents, format)
    }

    /// Load a configuration file, writing the defaults there first if it is missing.
    pub fn load_or_init<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        let config = Self::default();
        config.save(path)?;
        tracing::info!("Created default config at {:?}", path);
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match Format::from_path(path)? {
            Format::Yaml => serde_yaml::to_string(self)?,
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn parse(contents: &str, format: Format) -> Result<Self, ConfigError> {
        Ok(match format {
            Format::Yaml => serde_yaml::from_str(contents)?,
            Format::Json => serde_json::from_str(contents)?,
            Format::Toml => toml::from_str(contents)?,
        })
    }

    /// Apply the first matching prefix rewrite to a user-supplied path.
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        for rewrite in &self.path_rewrites {
            if let Some(rest) = raw.strip_prefix(rewrite.from.as_str()) {
                return PathBuf::from(format!("{}{}", rewrite.to, rest));
            }
        }
        PathBuf::from(raw)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.server.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.audio.sample_rate, 24_000);
        assert_eq!(config.engine.kind, EngineKind::Reference);
        assert_eq!(config.server.port, 5002);
        assert_eq!(config.output_dir, PathBuf::from("output"));
    }

    #[test]
    fn test_partial_yaml() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "output_dir: /tmp/tts\nengine:\n  kind: tone\nserver:\n  port: 7860\n",
        )?;
        let config = Config::load(&path)?;
        assert_eq!(config.output_dir, PathBuf::from("/tmp/tts"));
        assert_eq!(config.engine.kind, EngineKind::Tone);
        assert_eq!(config.engine.n_mels, defaults::N_MELS);
        assert_eq!(config.server.port, 7860);
        assert_eq!(config.server.host, defaults::HOST);
        Ok(())
    }

    #[test]
    fn test_json_and_toml() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let json = dir.path().join("server_config.json");
        std::fs::write(&json, r#"{"server": {"host": "127.0.0.1", "port": 7860}}"#)?;
        assert_eq!(Config::load(&json)?.server.host, "127.0.0.1");

        let toml_path = dir.path().join("inference_config.toml");
        std::fs::write(&toml_path, "[engine]\nseed = 7\nhop_length = 128\n")?;
        let config = Config::load(&toml_path)?;
        assert_eq!(config.engine.seed, 7);
        assert_eq!(config.engine.hop_length, 128);
        Ok(())
    }

    #[test]
    fn test_strict_load_missing() {
        let err = Config::load("no/such/config.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Config::load("config.ini").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(ext) if ext == "ini"));
    }

    #[test]
    fn test_load_or_init_writes_defaults() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["nested/config.yaml", "config.json", "config.toml"] {
            let path = dir.path().join(name);
            let config = Config::load_or_init(&path)?;
            assert_eq!(config, Config::default());
            assert!(path.exists());
            assert_eq!(Config::load(&path)?, Config::default());
        }
        Ok(())
    }

    #[test]
    fn test_path_rewrites() {
        let config = Config {
            path_rewrites: vec![PathRewrite {
                from: "/mnt/f/".into(),
                to: "f:/".into(),
            }],
            ..Config::default()
        };
        assert_eq!(
            config.resolve_path("/mnt/f/voices/ref.wav"),
            PathBuf::from("f:/voices/ref.wav")
        );
        assert_eq!(
            config.resolve_path("voices/ref.wav"),
            PathBuf::from("voices/ref.wav")
        );
    }
}
