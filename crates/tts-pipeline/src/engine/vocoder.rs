use candle_core::DType;
use std::f32::consts::TAU;

use super::{MelSpectrogram, VocoderAdapter};
use crate::audio::AudioBuffer;
use crate::error::{AdapterError, AdapterResult};

const MIN_FREQ_HZ: f32 = 60.0;
const MAX_FREQ_HZ: f32 = 8000.0;
const PEAK_LIMIT: f32 = 0.95;

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Centre frequencies of `n` bands spaced evenly on the mel scale.
fn band_frequencies(n: usize, sample_rate: u32) -> Vec<f32> {
    let top = MAX_FREQ_HZ.min(0.45 * sample_rate as f32).max(MIN_FREQ_HZ);
    let (lo, hi) = (hz_to_mel(MIN_FREQ_HZ), hz_to_mel(top));
    let step = if n > 1 { (hi - lo) / (n - 1) as f32 } else { 0.0 };
    (0..n).map(|i| mel_to_hz(lo + step * i as f32)).collect()
}

/// Additive-synthesis vocoder.
///
/// One phase-continuous oscillator per mel band; band values in `[-1, 1]`
/// map to amplitudes in `[0, 1]`, interpolated linearly across each hop.
pub struct SineBankVocoder {
    n_mels: usize,
    hop_length: usize,
    sample_rate: u32,
    freqs: Vec<f32>,
}

impl SineBankVocoder {
    pub fn new(n_mels: usize, hop_length: usize, sample_rate: u32) -> Self {
        Self {
            n_mels,
            hop_length,
            sample_rate,
            freqs: band_frequencies(n_mels, sample_rate),
        }
    }
}

impl VocoderAdapter for SineBankVocoder {
    fn convert(&self, mel: &MelSpectrogram) -> AdapterResult<AudioBuffer> {
        let (n_mels, frames) = mel.shape2()?;
        if n_mels != self.n_mels {
            return Err(AdapterError::InvalidInput(format!(
                "expected {} mel bands, got {}",
                self.n_mels, n_mels
            )));
        }
        if frames == 0 {
            return Err(AdapterError::InvalidInput("mel spectrogram has no frames".to_string()));
        }

        let bands = mel.tensor().to_dtype(DType::F32)?.to_vec2::<f32>()?;
        let hop = self.hop_length;
        let mut samples = vec![0.0f32; frames * hop];

        for (band, &freq) in bands.iter().zip(&self.freqs) {
            let amps: Vec<f32> = band
                .iter()
                .map(|v| ((v + 1.0) * 0.5).clamp(0.0, 1.0).powi(2))
                .collect();
            let step = TAU * freq / self.sample_rate as f32;
            let mut phase = 0.0f32;
            for t in 0..frames {
                let a0 = amps[t];
                let a1 = amps[(t + 1).min(frames - 1)];
                let out = &mut samples[t * hop..(t + 1) * hop];
                for (k, s) in out.iter_mut().enumerate() {
                    let a = a0 + (a1 - a0) * k as f32 / hop as f32;
                    *s += a * phase.sin();
                    phase = (phase + step) % TAU;
                }
            }
        }

        let scale = 1.0 / (self.n_mels as f32).sqrt();
        samples.iter_mut().for_each(|s| *s *= scale);
        let audio = AudioBuffer::new(samples, self.sample_rate);
        let peak = audio.peak();
        if peak > PEAK_LIMIT {
            let gain = PEAK_LIMIT / peak;
            let samples = audio.samples.into_iter().map(|s| s * gain).collect();
            return Ok(AudioBuffer::new(samples, self.sample_rate));
        }
        Ok(audio)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn supports_concurrent_calls(&self) -> bool {
        true
    }
}
