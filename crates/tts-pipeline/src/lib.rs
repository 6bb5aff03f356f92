pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod text;
pub mod weights;

pub use audio::AudioBuffer;
pub use config::Config;
pub use engine::{MelSpectrogram, ModelAdapter, SpeakerEmbedding, VocoderAdapter};
pub use error::{AdapterError, Error, Result};
pub use pipeline::{Deadline, SynthesisPipeline, SynthesisRequest, SynthesisResult};
pub use text::TokenSequence;

/// Pipeline built from configuration with the stock engines
pub type EnginePipeline = SynthesisPipeline<engine::ModelEngine, engine::VocoderEngine>;
