//! Tone engine: stands in for a real model when only the plumbing matters.
//!
//! The model emits an all-zero spectrogram of the right size and the vocoder
//! turns any spectrogram into a 440 Hz tone of `frames * hop_length` samples.

use candle_core::{DType, Device, Tensor};
use std::f32::consts::TAU;

use super::{MelSpectrogram, ModelAdapter, SpeakerEmbedding, VocoderAdapter};
use crate::audio::AudioBuffer;
use crate::error::{AdapterError, AdapterResult};
use crate::text::TokenSequence;

const TONE_HZ: f32 = 440.0;
const TONE_AMPLITUDE: f32 = 0.5;

pub struct ToneModel {
    n_mels: usize,
    frames_per_token: usize,
}

impl ToneModel {
    pub fn new(n_mels: usize, frames_per_token: usize) -> Self {
        Self {
            n_mels,
            frames_per_token,
        }
    }
}

impl ModelAdapter for ToneModel {
    fn infer(
        &self,
        tokens: &TokenSequence,
        _reference: Option<&SpeakerEmbedding>,
    ) -> AdapterResult<MelSpectrogram> {
        if tokens.is_empty() {
            return Err(AdapterError::InvalidInput("empty token sequence".to_string()));
        }
        let frames = tokens.len() * self.frames_per_token;
        Ok(MelSpectrogram::new(Tensor::zeros(
            (self.n_mels, frames),
            DType::F32,
            &Device::Cpu,
        )?))
    }

    fn embed_reference(&self, audio: &AudioBuffer) -> AdapterResult<SpeakerEmbedding> {
        if audio.is_empty() {
            return Err(AdapterError::InvalidInput("reference audio is empty".to_string()));
        }
        Ok(SpeakerEmbedding::new(Tensor::zeros(
            self.n_mels,
            DType::F32,
            &Device::Cpu,
        )?))
    }
}

pub struct ToneVocoder {
    n_mels: usize,
    hop_length: usize,
    sample_rate: u32,
}

impl ToneVocoder {
    pub fn new(n_mels: usize, hop_length: usize, sample_rate: u32) -> Self {
        Self {
            n_mels,
            hop_length,
            sample_rate,
        }
    }
}

impl VocoderAdapter for ToneVocoder {
    fn convert(&self, mel: &MelSpectrogram) -> AdapterResult<AudioBuffer> {
        let (n_mels, frames) = mel.shape2()?;
        if n_mels != self.n_mels || frames == 0 {
            return Err(AdapterError::InvalidInput(format!(
                "expected [{}, frames > 0] spectrogram, got [{}, {}]",
                self.n_mels, n_mels, frames
            )));
        }
        let step = TAU * TONE_HZ / self.sample_rate as f32;
        let samples = (0..frames * self.hop_length)
            .map(|i| TONE_AMPLITUDE * (step * i as f32).sin())
            .collect();
        Ok(AudioBuffer::new(samples, self.sample_rate))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
