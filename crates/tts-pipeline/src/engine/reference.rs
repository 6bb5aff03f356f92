//! Seeded reference model
//!
//! A small candle network: symbol embedding, linear projection, `tanh`, then
//! each token is held for `frames_per_token` frames. A speaker embedding is
//! added as a per-band bias before the non-linearity.

use candle_core::{Device, Module, Tensor};
use candle_nn::{Embedding, Linear, VarBuilder};

use super::{MelSpectrogram, ModelAdapter, SpeakerEmbedding};
use crate::audio::AudioBuffer;
use crate::config::EngineConfig;
use crate::error::{AdapterError, AdapterResult};
use crate::text::{TokenSequence, VOCAB_SIZE};
use crate::weights;

/// Range of the seeded weight init
const INIT_SCALE: f32 = 0.5;

pub struct ReferenceModel {
    embed: Embedding,
    proj: Linear,
    n_mels: usize,
    frames_per_token: usize,
    device: Device,
}

impl ReferenceModel {
    /// Load weights from `config.weights`, or draw them from `config.seed`.
    pub fn load(config: &EngineConfig) -> AdapterResult<Self> {
        let device = Device::Cpu;
        let n_mels = config.n_mels;
        let vb = match config.weights.as_deref() {
            Some(spec) => {
                tracing::info!("Loading reference model weights from {}", spec);
                weights::load_var_builder(spec, &device)
            }
            None => {
                tracing::info!("Initializing reference model from seed {}", config.seed);
                let shapes: [(&str, &[usize]); 3] = [
                    ("embed.weight", &[VOCAB_SIZE, n_mels]),
                    ("proj.weight", &[n_mels, n_mels]),
                    ("proj.bias", &[n_mels]),
                ];
                weights::seeded_var_builder(&shapes, config.seed, INIT_SCALE, &device)
            }
        }
        .map_err(|e| AdapterError::Load(format!("{:#}", e)))?;

        Ok(Self::new(n_mels, config.frames_per_token, vb)?)
    }

    /// Build from a `VarBuilder` holding `embed.weight`, `proj.weight` and `proj.bias`.
    pub fn new(
        n_mels: usize,
        frames_per_token: usize,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        let device = vb.device().clone();
        let embed = candle_nn::embedding(VOCAB_SIZE, n_mels, vb.pp("embed"))?;
        let proj = candle_nn::linear(n_mels, n_mels, vb.pp("proj"))?;
        Ok(Self {
            embed,
            proj,
            n_mels,
            frames_per_token,
            device,
        })
    }

    pub fn n_mels(&self) -> usize {
        self.n_mels
    }
}

impl ModelAdapter for ReferenceModel {
    fn infer(
        &self,
        tokens: &TokenSequence,
        reference: Option<&SpeakerEmbedding>,
    ) -> AdapterResult<MelSpectrogram> {
        if tokens.is_empty() {
            return Err(AdapterError::InvalidInput("empty token sequence".to_string()));
        }
        if let Some(id) = tokens.ids().iter().find(|&&id| id as usize >= VOCAB_SIZE) {
            return Err(AdapterError::InvalidInput(format!(
                "token id {} outside vocabulary of {}",
                id, VOCAB_SIZE
            )));
        }

        let ids = Tensor::from_vec(tokens.ids().to_vec(), tokens.len(), &self.device)?;
        // [T] -> [T, n_mels]
        let x = self.embed.forward(&ids)?;
        let x = self.proj.forward(&x)?;
        let x = match reference {
            Some(speaker) => {
                if speaker.tensor().dims() != [self.n_mels] {
                    return Err(AdapterError::InvalidInput(format!(
                        "speaker embedding shaped {:?}, expected [{}]",
                        speaker.tensor().dims(),
                        self.n_mels
                    )));
                }
                x.broadcast_add(speaker.tensor())?
            }
            None => x,
        };
        let x = x.tanh()?;

        // Hold each token for frames_per_token frames: [T, C] -> [T * F, C]
        let (t, c) = x.dims2()?;
        let x = x
            .unsqueeze(1)?
            .broadcast_as((t, self.frames_per_token, c))?
            .contiguous()?
            .reshape((t * self.frames_per_token, c))?;

        Ok(MelSpectrogram::new(x.t()?.contiguous()?))
    }

    fn embed_reference(&self, audio: &AudioBuffer) -> AdapterResult<SpeakerEmbedding> {
        if audio.is_empty() {
            return Err(AdapterError::InvalidInput("reference audio is empty".to_string()));
        }
        let n = audio.samples.len() as f32;
        let rms = (audio.samples.iter().map(|s| s * s).sum::<f32>() / n).sqrt();
        let crossings = audio
            .samples
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count() as f32;
        let zcr = crossings / n;

        // Level maps to an overall gain, brightness to a spectral tilt
        let level_db = 20.0 * rms.max(1e-5).log10();
        let gain = (level_db / 60.0 + 1.0).clamp(0.0, 1.0) - 0.5;
        let tilt = (zcr * 4.0).min(1.0) - 0.5;

        let denom = (self.n_mels.max(2) - 1) as f32;
        let bias: Vec<f32> = (0..self.n_mels)
            .map(|i| gain + tilt * (2.0 * i as f32 / denom - 1.0))
            .collect();
        Ok(SpeakerEmbedding::new(Tensor::from_vec(
            bias,
            self.n_mels,
            &self.device,
        )?))
    }

    fn supports_concurrent_calls(&self) -> bool {
        // Weights are never written after load
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::encode;

    fn model() -> ReferenceModel {
        ReferenceModel::load(&EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_infer_shape() -> AdapterResult<()> {
        let model = model();
        let tokens = encode("hello");
        let mel = model.infer(&tokens, None)?;
        assert_eq!(mel.shape2()?, (model.n_mels(), 5 * 4));
        Ok(())
    }

    #[test]
    fn test_infer_deterministic_across_loads() -> AdapterResult<()> {
        let tokens = encode("same seed same output");
        let a = model().infer(&tokens, None)?.tensor().to_vec2::<f32>()?;
        let b = model().infer(&tokens, None)?.tensor().to_vec2::<f32>()?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_infer_rejects_empty_and_out_of_vocab() {
        let model = model();
        assert!(matches!(
            model.infer(&TokenSequence::default(), None),
            Err(AdapterError::InvalidInput(_))
        ));
        assert!(matches!(
            model.infer(&TokenSequence::from(vec![1, 99]), None),
            Err(AdapterError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_reference_changes_output() -> AdapterResult<()> {
        let model = model();
        let tokens = encode("voice");
        let loud = AudioBuffer::new(
            (0..2400).map(|i| 0.8 * (i as f32 * 0.3).sin()).collect(),
            24000,
        );
        let speaker = model.embed_reference(&loud)?;
        assert_eq!(speaker.to_vec()?.len(), model.n_mels());

        let plain = model.infer(&tokens, None)?.tensor().to_vec2::<f32>()?;
        let voiced = model.infer(&tokens, Some(&speaker))?.tensor().to_vec2::<f32>()?;
        assert_ne!(plain, voiced);
        Ok(())
    }

    #[test]
    fn test_embed_rejects_empty_audio() {
        let model = model();
        let empty = AudioBuffer::new(Vec::new(), 24000);
        assert!(matches!(
            model.embed_reference(&empty),
            Err(AdapterError::InvalidInput(_))
        ));
    }
}
