//! Request orchestration
//!
//! normalize -> tokenize -> (reference embed) -> infer -> vocode -> resample
//! -> persist. Any failure aborts the request; nothing is retried and no file
//! is written unless every stage succeeded.

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::audio::{self, AudioBuffer};
use crate::config::{Config, defaults};
use crate::engine::{
    self, ModelAdapter, ModelEngine, SpeakerEmbedding, VocoderAdapter, VocoderEngine,
};
use crate::error::{AdapterError, AdapterResult, Error, Result, Stage};
use crate::text;

/// Accepted output sample rates
const SAMPLE_RATE_RANGE: std::ops::RangeInclusive<u32> = 8_000..=192_000;

static LANGUAGE_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{2,3}(-[A-Za-z0-9]{2,8})*$").unwrap());

/// One synthesis request. Fields are fixed once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    text: String,
    reference_audio: Option<PathBuf>,
    language: Option<String>,
    sample_rate: u32,
}

impl SynthesisRequest {
    /// Fails with `InvalidInput` if `text` is empty or only whitespace.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("text is required".to_string()));
        }
        Ok(Self {
            text,
            reference_audio: None,
            language: None,
            sample_rate: defaults::SAMPLE_RATE,
        })
    }

    pub fn with_reference_audio(self, path: impl Into<PathBuf>) -> Self {
        Self {
            reference_audio: Some(path.into()),
            ..self
        }
    }

    pub fn with_language(self, language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..self
        }
    }

    pub fn with_sample_rate(self, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..self
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn reference_audio(&self) -> Option<&Path> {
        self.reference_audio.as_deref()
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn validate(&self) -> Result<()> {
        if let Some(lang) = &self.language
            && !LANGUAGE_TAG_REGEX.is_match(lang)
        {
            return Err(Error::InvalidInput(format!(
                "'{}' is not a valid language tag",
                lang
            )));
        }
        if !SAMPLE_RATE_RANGE.contains(&self.sample_rate) {
            return Err(Error::InvalidInput(format!(
                "sample rate {}Hz outside {}..={}",
                self.sample_rate,
                SAMPLE_RATE_RANGE.start(),
                SAMPLE_RATE_RANGE.end()
            )));
        }
        Ok(())
    }
}

/// Audio produced for a request and the file it was written to.
/// The file is not removed when the result is dropped.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub audio: AudioBuffer,
    pub output_path: PathBuf,
}

/// Summary of a reference clip as seen by the model.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceAnalysis {
    pub sample_rate: u32,
    pub num_samples: usize,
    pub duration_secs: f32,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub output_dir: PathBuf,
    pub max_text_chars: usize,
    pub trim_top_db: f32,
    /// Per-request deadline, checked between stages
    pub timeout: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        let secs = config.server.request_timeout_secs;
        Self {
            output_dir: config.output_dir.clone(),
            max_text_chars: config.text.max_chars,
            trim_top_db: config.audio.trim_top_db,
            timeout: (secs > 0).then(|| Duration::from_secs(secs)),
        }
    }
}

/// Point in time after which a request is abandoned at the next stage boundary.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    /// Start counting now; `None` never expires.
    pub fn start(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn check(&self) -> Result<()> {
        match self.limit {
            Some(limit) if self.started.elapsed() >= limit => Err(Error::Timeout(limit)),
            _ => Ok(()),
        }
    }
}

/// File name for generated audio: `tts_<unix_ts>_<hash % 10000>_<uuid>.wav`.
pub fn output_file_name(text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    format!(
        "tts_{}_{}_{}.wav",
        Utc::now().timestamp(),
        hasher.finish() % 10_000,
        Uuid::new_v4().simple()
    )
}

pub struct SynthesisPipeline<M, V> {
    model: M,
    vocoder: V,
    options: PipelineOptions,
    // Held around adapter calls unless both adapters allow concurrent use
    slot: Mutex<()>,
}

impl SynthesisPipeline<ModelEngine, VocoderEngine> {
    /// Load the configured engines once and wrap them in a pipeline.
    pub fn from_config(config: &Config) -> AdapterResult<Self> {
        let (model, vocoder) = engine::load(&config.engine, config.audio.sample_rate)?;
        Ok(Self::new(model, vocoder, PipelineOptions::from_config(config)))
    }
}

impl<M: ModelAdapter, V: VocoderAdapter> SynthesisPipeline<M, V> {
    pub fn new(model: M, vocoder: V, options: PipelineOptions) -> Self {
        Self {
            model,
            vocoder,
            options,
            slot: Mutex::new(()),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn vocoder(&self) -> &V {
        &self.vocoder
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_ready() && self.vocoder.is_ready()
    }

    /// Synthesize into a freshly named file under the output directory.
    pub fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisResult> {
        self.synthesize_within(request, &Deadline::start(self.options.timeout))
    }

    /// [`synthesize`](Self::synthesize) against a deadline the caller started.
    pub fn synthesize_within(
        &self,
        request: &SynthesisRequest,
        deadline: &Deadline,
    ) -> Result<SynthesisResult> {
        let audio = self.render(request, deadline)?;

        std::fs::create_dir_all(&self.options.output_dir)?;
        let output_path = self.options.output_dir.join(output_file_name(request.text()));
        deadline.check()?;
        audio::save_new(&output_path, &audio)?;

        self.finish(audio, output_path)
    }

    /// Synthesize into `path`, replacing any existing file.
    pub fn synthesize_to<P: AsRef<Path>>(
        &self,
        request: &SynthesisRequest,
        path: P,
    ) -> Result<SynthesisResult> {
        let deadline = Deadline::start(self.options.timeout);
        let audio = self.render(request, &deadline)?;

        let output_path = path.as_ref().to_path_buf();
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        deadline.check()?;
        audio::save(&output_path, &audio)?;

        self.finish(audio, output_path)
    }

    /// Load a reference clip and report what the model derives from it.
    pub fn analyze_reference<P: AsRef<Path>>(&self, path: P) -> Result<ReferenceAnalysis> {
        self.analyze_reference_within(path, &Deadline::start(self.options.timeout))
    }

    /// [`analyze_reference`](Self::analyze_reference) against a caller's deadline.
    pub fn analyze_reference_within<P: AsRef<Path>>(
        &self,
        path: P,
        deadline: &Deadline,
    ) -> Result<ReferenceAnalysis> {
        deadline.check()?;
        let clip = self.load_reference(path.as_ref())?;
        deadline.check()?;
        let embedding = self.embed(&clip)?;
        deadline.check()?;
        Ok(ReferenceAnalysis {
            sample_rate: clip.sample_rate,
            num_samples: clip.len(),
            duration_secs: clip.duration_secs(),
            embedding: embedding
                .to_vec()
                .map_err(|source| Error::Model {
                    stage: Stage::Embedding,
                    source,
                })?,
        })
    }

    fn finish(&self, audio: AudioBuffer, output_path: PathBuf) -> Result<SynthesisResult> {
        tracing::info!(
            "Synthesized {} samples ({:.2}s @ {}Hz) to {:?}",
            audio.len(),
            audio.duration_secs(),
            audio.sample_rate,
            output_path
        );
        Ok(SynthesisResult { audio, output_path })
    }

    fn render(&self, request: &SynthesisRequest, deadline: &Deadline) -> Result<AudioBuffer> {
        request.validate()?;
        let tokens = text::prepare(request.text(), self.options.max_text_chars)?;
        deadline.check()?;
        tracing::debug!(
            "Tokenized {} chars into {} symbols (language: {})",
            request.text().chars().count(),
            tokens.len(),
            request.language().unwrap_or("unspecified")
        );

        let speaker = match request.reference_audio() {
            Some(path) => {
                let clip = self.load_reference(path)?;
                deadline.check()?;
                Some(self.embed(&clip)?)
            }
            None => None,
        };
        deadline.check()?;

        let mel = {
            let _slot = self.acquire_slot();
            self.model
                .infer(&tokens, speaker.as_ref())
                .map_err(|source| Error::Model {
                    stage: Stage::Inference,
                    source,
                })?
        };
        deadline.check()?;

        let audio = {
            let _slot = self.acquire_slot();
            self.vocoder.convert(&mel).map_err(|source| Error::Model {
                stage: Stage::Vocoding,
                source,
            })?
        };
        if audio.is_empty() {
            return Err(Error::Model {
                stage: Stage::Vocoding,
                source: AdapterError::InvalidInput("vocoder produced no samples".to_string()),
            });
        }
        deadline.check()?;

        audio.resampled(request.sample_rate())
    }

    fn load_reference(&self, path: &Path) -> Result<AudioBuffer> {
        let clip = audio::load(path, self.vocoder.sample_rate())?
            .trim_silence(self.options.trim_top_db)
            .normalize_peak();
        if clip.is_empty() {
            return Err(Error::InvalidInput(format!(
                "reference audio {} contains no samples",
                path.display()
            )));
        }
        tracing::debug!(
            "Reference {:?}: {:.2}s after trimming",
            path,
            clip.duration_secs()
        );
        Ok(clip)
    }

    fn embed(&self, clip: &AudioBuffer) -> Result<SpeakerEmbedding> {
        let _slot = self.acquire_slot();
        self.model
            .embed_reference(clip)
            .map_err(|source| Error::Model {
                stage: Stage::Embedding,
                source,
            })
    }

    fn acquire_slot(&self) -> Option<MutexGuard<'_, ()>> {
        if self.model.supports_concurrent_calls() && self.vocoder.supports_concurrent_calls() {
            return None;
        }
        // A panic inside an adapter call leaves no state behind the lock
        Some(self.slot.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_rejects_blank_text() {
        assert!(matches!(
            SynthesisRequest::new("   "),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_request_builders_keep_original() {
        let base = SynthesisRequest::new("Hello").unwrap();
        let with_lang = base.clone().with_language("en-us").with_sample_rate(16000);
        assert_eq!(base.language(), None);
        assert_eq!(base.sample_rate(), 24000);
        assert_eq!(with_lang.language(), Some("en-us"));
        assert_eq!(with_lang.sample_rate(), 16000);
        assert_eq!(with_lang.text(), "Hello");
    }

    #[test]
    fn test_request_validation() {
        let ok = SynthesisRequest::new("Hi").unwrap().with_language("en-US");
        assert!(ok.validate().is_ok());
        let bad_lang = SynthesisRequest::new("Hi").unwrap().with_language("english!");
        assert!(matches!(bad_lang.validate(), Err(Error::InvalidInput(_))));
        let bad_rate = SynthesisRequest::new("Hi").unwrap().with_sample_rate(10);
        assert!(matches!(bad_rate.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_output_file_names_unique() {
        let a = output_file_name("same text");
        let b = output_file_name("same text");
        assert_ne!(a, b);
        assert!(a.starts_with("tts_") && a.ends_with(".wav"));
        let hash_part = a.split('_').nth(2).unwrap();
        assert!(hash_part.parse::<u64>().unwrap() < 10_000);
    }

    #[test]
    fn test_deadline() {
        assert!(Deadline::start(None).check().is_ok());
        assert!(Deadline::start(Some(Duration::from_secs(60))).check().is_ok());
        assert!(matches!(
            Deadline::start(Some(Duration::ZERO)).check(),
            Err(Error::Timeout(_))
        ));
    }
}
