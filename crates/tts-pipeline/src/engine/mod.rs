//! Model and vocoder adapters
//!
//! The pipeline only talks to synthesis engines through [`ModelAdapter`] and
//! [`VocoderAdapter`]. [`ModelEngine`] and [`VocoderEngine`] pick a concrete
//! implementation from [`EngineConfig`] without boxing.

use candle_core::Tensor;

use crate::audio::AudioBuffer;
use crate::config::{EngineConfig, EngineKind};
use crate::error::{AdapterError, AdapterResult};
use crate::text::TokenSequence;

pub mod reference;
pub mod tone;
pub mod vocoder;

pub use reference::ReferenceModel;
pub use tone::{ToneModel, ToneVocoder};
pub use vocoder::SineBankVocoder;

/// Time-frequency hand-off between model and vocoder, shaped `[n_mels, frames]`.
#[derive(Debug, Clone)]
pub struct MelSpectrogram(Tensor);

impl MelSpectrogram {
    pub fn new(tensor: Tensor) -> Self {
        Self(tensor)
    }

    pub fn tensor(&self) -> &Tensor {
        &self.0
    }

    /// `(n_mels, frames)`, or `InvalidInput` if the tensor is not rank 2.
    pub fn shape2(&self) -> AdapterResult<(usize, usize)> {
        match self.0.dims() {
            [n_mels, frames] => Ok((*n_mels, *frames)),
            dims => Err(AdapterError::InvalidInput(format!(
                "expected mel spectrogram shaped [n_mels, frames], got {:?}",
                dims
            ))),
        }
    }
}

/// Voice conditioning derived from a reference clip, shaped `[n_mels]`.
#[derive(Debug, Clone)]
pub struct SpeakerEmbedding(Tensor);

impl SpeakerEmbedding {
    pub fn new(tensor: Tensor) -> Self {
        Self(tensor)
    }

    pub fn tensor(&self) -> &Tensor {
        &self.0
    }

    pub fn to_vec(&self) -> AdapterResult<Vec<f32>> {
        Ok(self.0.flatten_all()?.to_vec1::<f32>()?)
    }
}

/// Text-to-intermediate synthesis engine.
///
/// Implementations must be deterministic for a fixed seed and must not keep
/// per-request state between calls.
pub trait ModelAdapter: Send + Sync {
    /// Produce an intermediate representation for `tokens`.
    /// Empty sequences are rejected with [`AdapterError::InvalidInput`].
    fn infer(
        &self,
        tokens: &TokenSequence,
        reference: Option<&SpeakerEmbedding>,
    ) -> AdapterResult<MelSpectrogram>;

    /// Derive voice conditioning from reference audio.
    fn embed_reference(&self, audio: &AudioBuffer) -> AdapterResult<SpeakerEmbedding>;

    fn is_ready(&self) -> bool {
        true
    }

    /// Whether `infer` may run on several threads at once.
    fn supports_concurrent_calls(&self) -> bool {
        false
    }
}

/// Intermediate-to-waveform engine.
pub trait VocoderAdapter: Send + Sync {
    /// Fails with [`AdapterError::InvalidInput`] on a malformed spectrogram.
    fn convert(&self, mel: &MelSpectrogram) -> AdapterResult<AudioBuffer>;

    /// Rate of the buffers returned by `convert`.
    fn sample_rate(&self) -> u32;

    fn is_ready(&self) -> bool {
        true
    }

    fn supports_concurrent_calls(&self) -> bool {
        false
    }
}

pub enum ModelEngine {
    Reference(ReferenceModel),
    Tone(ToneModel),
}

impl ModelAdapter for ModelEngine {
    fn infer(
        &self,
        tokens: &TokenSequence,
        reference: Option<&SpeakerEmbedding>,
    ) -> AdapterResult<MelSpectrogram> {
        match self {
            ModelEngine::Reference(m) => m.infer(tokens, reference),
            ModelEngine::Tone(m) => m.infer(tokens, reference),
        }
    }

    fn embed_reference(&self, audio: &AudioBuffer) -> AdapterResult<SpeakerEmbedding> {
        match self {
            ModelEngine::Reference(m) => m.embed_reference(audio),
            ModelEngine::Tone(m) => m.embed_reference(audio),
        }
    }

    fn is_ready(&self) -> bool {
        match self {
            ModelEngine::Reference(m) => m.is_ready(),
            ModelEngine::Tone(m) => m.is_ready(),
        }
    }

    fn supports_concurrent_calls(&self) -> bool {
        match self {
            ModelEngine::Reference(m) => m.supports_concurrent_calls(),
            ModelEngine::Tone(m) => m.supports_concurrent_calls(),
        }
    }
}

pub enum VocoderEngine {
    SineBank(SineBankVocoder),
    Tone(ToneVocoder),
}

impl VocoderAdapter for VocoderEngine {
    fn convert(&self, mel: &MelSpectrogram) -> AdapterResult<AudioBuffer> {
        match self {
            VocoderEngine::SineBank(v) => v.convert(mel),
            VocoderEngine::Tone(v) => v.convert(mel),
        }
    }

    fn sample_rate(&self) -> u32 {
        match self {
            VocoderEngine::SineBank(v) => v.sample_rate(),
            VocoderEngine::Tone(v) => v.sample_rate(),
        }
    }

    fn is_ready(&self) -> bool {
        match self {
            VocoderEngine::SineBank(v) => v.is_ready(),
            VocoderEngine::Tone(v) => v.is_ready(),
        }
    }

    fn supports_concurrent_calls(&self) -> bool {
        match self {
            VocoderEngine::SineBank(v) => v.supports_concurrent_calls(),
            VocoderEngine::Tone(v) => v.supports_concurrent_calls(),
        }
    }
}

/// Build the model and vocoder described by `config`, producing audio at `sample_rate`.
pub fn load(
    config: &EngineConfig,
    sample_rate: u32,
) -> AdapterResult<(ModelEngine, VocoderEngine)> {
    if config.n_mels == 0 || config.hop_length == 0 || config.frames_per_token == 0 {
        return Err(AdapterError::Load(
            "n_mels, hop_length and frames_per_token must all be positive".to_string(),
        ));
    }
    if sample_rate == 0 {
        return Err(AdapterError::Load("sample rate must be positive".to_string()));
    }

    let engines = match config.kind {
        EngineKind::Reference => (
            ModelEngine::Reference(ReferenceModel::load(config)?),
            VocoderEngine::SineBank(SineBankVocoder::new(
                config.n_mels,
                config.hop_length,
                sample_rate,
            )),
        ),
        EngineKind::Tone => (
            ModelEngine::Tone(ToneModel::new(config.n_mels, config.frames_per_token)),
            VocoderEngine::Tone(ToneVocoder::new(config.n_mels, config.hop_length, sample_rate)),
        ),
    };
    tracing::info!(
        "Loaded {:?} engine ({} mel bands, hop {}, {}Hz)",
        config.kind,
        config.n_mels,
        config.hop_length,
        sample_rate
    );
    Ok(engines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_shape2_rejects_wrong_rank() {
        let t = Tensor::zeros((2, 3, 4), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            MelSpectrogram::new(t).shape2(),
            Err(AdapterError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_load_rejects_zero_sizes() {
        let config = EngineConfig {
            hop_length: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(load(&config, 24000), Err(AdapterError::Load(_))));
    }

    #[test]
    fn test_load_by_kind() {
        let (model, vocoder) = load(&EngineConfig::default(), 24000).unwrap();
        assert!(matches!(model, ModelEngine::Reference(_)));
        assert!(matches!(vocoder, VocoderEngine::SineBank(_)));
        assert_eq!(vocoder.sample_rate(), 24000);

        let config = EngineConfig {
            kind: EngineKind::Tone,
            ..EngineConfig::default()
        };
        let (model, vocoder) = load(&config, 16000).unwrap();
        assert!(matches!(model, ModelEngine::Tone(_)));
        assert_eq!(vocoder.sample_rate(), 16000);
        assert!(model.is_ready() && vocoder.is_ready());
    }
}
