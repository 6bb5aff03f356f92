//! Reference audio resolution for CLI and server
//!
//! A reference may be given as:
//! - A local path (configured path rewrites applied)
//! - A HuggingFace URL (hf://owner/repo/file.wav)
//! - Base64-encoded WAV data ("data:audio/wav;base64,..." or raw base64)

use base64::{Engine as _, engine::general_purpose};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use tts_pipeline::weights::download_if_necessary;
use tts_pipeline::{Config, Error, Result};

/// A reference clip on disk. Decoded uploads live in a temporary file that is
/// removed when this value is dropped.
#[derive(Debug)]
pub enum ResolvedReference {
    Path(PathBuf),
    Temp(NamedTempFile),
}

impl ResolvedReference {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedReference::Path(path) => path,
            ResolvedReference::Temp(file) => file.path(),
        }
    }
}

/// Resolve a reference specification to a file the pipeline can load.
///
/// Local paths are returned even when missing so the pipeline reports
/// `NotFound` for them.
pub fn resolve(config: &Config, spec: &str) -> Result<ResolvedReference> {
    let spec = spec.trim();

    if spec.starts_with("hf://") {
        return download_if_necessary(spec)
            .map(ResolvedReference::Path)
            .map_err(|e| {
                warn!("Failed to download reference {}: {:#}", spec, e);
                Error::NotFound(PathBuf::from(spec))
            });
    }

    let path = config.resolve_path(spec);
    if path.exists() || !is_base64_audio(spec) {
        debug!(path = %path.display(), "Using reference file");
        return Ok(ResolvedReference::Path(path));
    }

    decode_base64_reference(config, spec).map(ResolvedReference::Temp)
}

/// Check if a string looks like base64 audio
pub fn is_base64_audio(spec: &str) -> bool {
    if spec.starts_with("data:audio/") && spec.contains("base64,") {
        return true;
    }

    // A WAV header alone is 44 bytes, so anything shorter cannot be a clip
    spec.len() > 100
        && spec
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
}

fn decode_base64_reference(config: &Config, spec: &str) -> Result<NamedTempFile> {
    let payload = match spec.split_once(',') {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => spec,
    };

    let bytes = general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| Error::InvalidInput(format!("reference audio is not valid base64: {}", e)))?;

    std::fs::create_dir_all(&config.upload_dir)?;
    let mut file = tempfile::Builder::new()
        .prefix("reference-")
        .suffix(".wav")
        .tempfile_in(&config.upload_dir)?;
    file.write_all(&bytes)?;
    file.flush()?;

    debug!(bytes = bytes.len(), path = %file.path().display(), "Decoded base64 reference");
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tts_pipeline::config::PathRewrite;

    fn config_in(dir: &Path) -> Config {
        Config {
            upload_dir: dir.join("uploads"),
            ..Config::default()
        }
    }

    #[test]
    fn test_is_base64_audio() {
        assert!(is_base64_audio(
            "data:audio/wav;base64,UklGRi4AAABXQVZFZm10IBAAAAABAAIAQB8AAEAfAAABAAgAZGF0YQoAAAAA"
        ));
        assert!(!is_base64_audio("voice"));
        assert!(!is_base64_audio("/path/to/file.wav"));
        assert!(!is_base64_audio("short"));
        assert!(is_base64_audio(&"QUJD".repeat(40)));
    }

    #[test]
    fn test_missing_path_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let resolved = resolve(&config, "/nowhere/voice.wav").unwrap();
        assert_eq!(resolved.path(), Path::new("/nowhere/voice.wav"));
    }

    #[test]
    fn test_path_rewrite_applied() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.path_rewrites.push(PathRewrite {
            from: "/mnt/f/".to_string(),
            to: "f:/".to_string(),
        });
        let resolved = resolve(&config, "/mnt/f/voices/a.wav").unwrap();
        assert_eq!(resolved.path(), Path::new("f:/voices/a.wav"));
    }

    #[test]
    fn test_data_url_written_to_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let spec = format!(
            "data:audio/wav;base64,{}",
            general_purpose::STANDARD.encode(b"RIFF....WAVE")
        );

        let resolved = resolve(&config, &spec).unwrap();
        let path = resolved.path().to_path_buf();
        assert!(path.starts_with(dir.path().join("uploads")));
        assert_eq!(std::fs::read(&path).unwrap(), b"RIFF....WAVE");

        drop(resolved);
        assert!(!path.exists());
    }

    #[test]
    fn test_bad_base64_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let err = resolve(&config, "data:audio/wav;base64,@@@not-base64@@@").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
