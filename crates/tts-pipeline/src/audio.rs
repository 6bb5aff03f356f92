//! WAV loading, saving and resampling

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// Mono waveform tagged with its sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    /// Scale so the loudest sample sits at +/-1. Silence is left untouched.
    pub fn normalize_peak(mut self) -> Self {
        let peak = self.peak();
        if peak > 0.0 {
            let gain = 1.0 / peak;
            self.samples.iter_mut().for_each(|s| *s *= gain);
        }
        self
    }

    /// Drop leading and trailing samples quieter than `top_db` below peak.
    pub fn trim_silence(mut self, top_db: f32) -> Self {
        let peak = self.peak();
        if peak == 0.0 {
            return self;
        }
        let threshold = peak * 10f32.powf(-top_db / 20.0);
        let start = self.samples.iter().position(|s| s.abs() >= threshold);
        let end = self.samples.iter().rposition(|s| s.abs() >= threshold);
        if let (Some(start), Some(end)) = (start, end) {
            self.samples.truncate(end + 1);
            self.samples.drain(..start);
        }
        self
    }

    /// Convert to `target_rate`, returning the buffer unchanged if it already matches.
    pub fn resampled(self, target_rate: u32) -> Result<Self> {
        if self.sample_rate == target_rate {
            return Ok(self);
        }
        let samples = resample(&self.samples, self.sample_rate, target_rate)?;
        Ok(Self::new(samples, target_rate))
    }
}

/// Read a WAV file and resample it to `target_sample_rate`.
pub fn load<P: AsRef<Path>>(path: P, target_sample_rate: u32) -> Result<AudioBuffer> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    let reader = WavReader::open(path).map_err(|e| decode_error(path, e))?;
    let buffer = read_wav_internal(reader).map_err(|e| decode_error(path, e))?;
    tracing::debug!(
        "Loaded {:?}: {} samples @ {}Hz",
        path,
        buffer.len(),
        buffer.sample_rate
    );
    buffer.resampled(target_sample_rate)
}

/// Decode an in-memory WAV file and resample it to `target_sample_rate`.
pub fn decode_wav_bytes(bytes: &[u8], target_sample_rate: u32) -> Result<AudioBuffer> {
    let origin = Path::new("<memory>");
    let reader =
        WavReader::new(std::io::Cursor::new(bytes)).map_err(|e| decode_error(origin, e))?;
    read_wav_internal(reader)
        .map_err(|e| decode_error(origin, e))?
        .resampled(target_sample_rate)
}

fn decode_error(path: &Path, source: hound::Error) -> Error {
    match source {
        hound::Error::IoError(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Error::NotFound(path.to_path_buf())
        }
        source => Error::Decode {
            path: path.to_path_buf(),
            source,
        },
    }
}

fn read_wav_internal<R: Read>(mut reader: WavReader<R>) -> hound::Result<AudioBuffer> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => {
            let max_val = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<hound::Result<Vec<_>>>()?
        }
        SampleFormat::Float => reader.samples::<f32>().collect::<hound::Result<Vec<_>>>()?,
    };

    // Downmix interleaved frames to mono
    let samples = if channels > 1 {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        interleaved
    };

    Ok(AudioBuffer::new(samples, spec.sample_rate))
}

/// Write `audio` to `path` as 16-bit PCM, replacing any existing file.
///
/// The data goes to a temporary file next to `path` that is renamed into
/// place once complete, so readers never observe a partial file.
pub fn save<P: AsRef<Path>>(path: P, audio: &AudioBuffer) -> Result<()> {
    let tmp = write_temp(path.as_ref(), audio)?;
    tmp.persist(path.as_ref()).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Like [`save`], but fails with `AlreadyExists` instead of replacing a file.
pub fn save_new<P: AsRef<Path>>(path: P, audio: &AudioBuffer) -> Result<()> {
    let tmp = write_temp(path.as_ref(), audio)?;
    tmp.persist_noclobber(path.as_ref())
        .map_err(|e| Error::Io(e.error))?;
    Ok(())
}

fn write_temp(path: &Path, audio: &AudioBuffer) -> Result<tempfile::NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".tts-")
        .suffix(".wav.part")
        .tempfile_in(dir)?;
    write_wav_to_writer(BufWriter::new(tmp.as_file_mut()), audio)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Encode `audio` as a 16-bit PCM mono WAV stream.
pub fn write_wav_to_writer<W: Write + Seek>(writer: W, audio: &AudioBuffer) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut wav_writer = WavWriter::new(writer, spec).map_err(into_io)?;
    for sample in &audio.samples {
        // Hard clamp to [-1, 1] at quantization time only
        let val = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        wav_writer.write_sample(val).map_err(into_io)?;
    }
    wav_writer.finalize().map_err(into_io)?;
    Ok(())
}

/// Encode `audio` into an in-memory WAV file.
pub fn encode_wav(audio: &AudioBuffer) -> Result<Vec<u8>> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    write_wav_to_writer(&mut buffer, audio)?;
    Ok(buffer.into_inner())
}

fn into_io(e: hound::Error) -> Error {
    match e {
        hound::Error::IoError(io) => Error::Io(io),
        other => Error::Io(std::io::Error::other(other)),
    }
}

/// Resample mono audio with rubato.
///
/// The result always has `round(len * to_rate / from_rate)` samples. Samples
/// are not clamped, so no clipping is introduced.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(Error::InvalidInput(format!(
            "cannot resample between {}Hz and {}Hz",
            from_rate, to_rate
        )));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    use rubato::{FastFixedIn, PolynomialDegree, Resampler};

    let ratio = to_rate as f64 / from_rate as f64;
    let expected = (samples.len() as f64 * ratio).round() as usize;

    let mut resampler = FastFixedIn::<f32>::new(
        ratio,
        1.0,
        PolynomialDegree::Septic,
        samples.len(),
        1,
    )
    .map_err(|e| Error::InvalidInput(format!("resampler setup failed: {}", e)))?;

    let mut out = resampler
        .process(&[samples], None)
        .map_err(|e| Error::InvalidInput(format!("resampling failed: {}", e)))?
        .into_iter()
        .next()
        .unwrap_or_default();

    // rubato's block output can be a few samples off the exact ratio
    out.resize(expected, 0.0);
    Ok(out)
}
