//! Command-line and HTTP front ends for tts-pipeline

pub mod commands;
pub mod logging;
pub mod reference;
pub mod server;
