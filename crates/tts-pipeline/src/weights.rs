use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fetch weights from HuggingFace Hub if necessary.
///
/// Supports the format: `hf://owner/repo/filename@revision`
/// where `@revision` is optional. Anything else is treated as a local path.
pub fn download_if_necessary(file_path: &str) -> Result<PathBuf> {
    let Some(path) = file_path.strip_prefix("hf://") else {
        return Ok(PathBuf::from(file_path));
    };

    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() < 3 || parts.iter().any(|p| p.is_empty()) {
        anyhow::bail!(
            "Invalid hf:// path: {}. Expected hf://repo_owner/repo_name/filename[@revision]",
            file_path
        );
    }
    let repo_id = format!("{}/{}", parts[0], parts[1]);
    let filename_with_revision = parts[2..].join("/");

    let (filename, revision) = match filename_with_revision.rsplit_once('@') {
        Some((f, r)) => (f.to_string(), Some(r.to_string())),
        None => (filename_with_revision, None),
    };

    // HF_TOKEN is honoured for gated repos
    let token = std::env::var("HF_TOKEN").ok();
    let api = ApiBuilder::new().with_token(token).build()?;

    let repo = match revision {
        Some(rev) => Repo::with_revision(repo_id, RepoType::Model, rev),
        None => Repo::model(repo_id),
    };

    tracing::info!("Fetching {} from HuggingFace Hub", filename);
    Ok(api.repo(repo).get(&filename)?)
}

/// Memory-map a safetensors checkpoint into a `VarBuilder`.
pub fn load_var_builder(file_path: &str, device: &Device) -> Result<VarBuilder<'static>> {
    let path = download_if_necessary(file_path)?;
    if !path.exists() {
        anyhow::bail!("Weights file not found: {:?}", path);
    }
    // SAFETY: the file is treated as read-only for the lifetime of the mapping
    let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)? };
    Ok(vb)
}

/// Build a `VarBuilder` whose tensors are drawn uniformly from `[-scale, scale]`
/// with a seeded RNG, so the same seed always yields the same weights.
pub fn seeded_var_builder(
    shapes: &[(&str, &[usize])],
    seed: u64,
    scale: f32,
    device: &Device,
) -> Result<VarBuilder<'static>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tensors = HashMap::with_capacity(shapes.len());
    for (name, shape) in shapes {
        let numel: usize = shape.iter().product();
        let data: Vec<f32> = (0..numel).map(|_| rng.gen_range(-scale..=scale)).collect();
        tensors.insert(name.to_string(), Tensor::from_vec(data, *shape, device)?);
    }
    Ok(VarBuilder::from_tensors(tensors, DType::F32, device))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_if_necessary_local() {
        let path = "weights/model.safetensors";
        let res = download_if_necessary(path).unwrap();
        assert_eq!(res, PathBuf::from(path));
    }

    #[test]
    fn test_invalid_hf_path() {
        assert!(download_if_necessary("hf://invalid").is_err());
        assert!(download_if_necessary("hf://owner//file.safetensors").is_err());
    }

    #[test]
    fn test_missing_local_weights() {
        let err = load_var_builder("no/such/weights.safetensors", &Device::Cpu)
            .err()
            .expect("expected missing-weights error");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_seeded_weights_repeatable() -> Result<()> {
        let shapes: &[(&str, &[usize])] = &[("proj.weight", &[4, 3])];
        let a = seeded_var_builder(shapes, 7, 0.5, &Device::Cpu)?;
        let b = seeded_var_builder(shapes, 7, 0.5, &Device::Cpu)?;
        let c = seeded_var_builder(shapes, 8, 0.5, &Device::Cpu)?;
        let ta = a.get((4, 3), "proj.weight")?.to_vec2::<f32>()?;
        let tb = b.get((4, 3), "proj.weight")?.to_vec2::<f32>()?;
        let tc = c.get((4, 3), "proj.weight")?.to_vec2::<f32>()?;
        assert_eq!(ta, tb);
        assert_ne!(ta, tc);
        assert!(ta.iter().flatten().all(|v| v.abs() <= 0.5));
        Ok(())
    }
}
