//! turtle-core - the coaching side of Sprint & Turtle
//!
//! This crate provides:
//! - Coach operations: profile lifecycle, daily plans, check-ins, biographies
//! - Gemini client for structured plans and speech synthesis
//! - Narration audio: PCM decoding, outputs and the playback controller
//! - Screen routing for the front end

pub mod audio;
pub mod coach;
pub mod prompts;
pub mod providers;
pub mod view;

pub use audio::playback::{PlaybackController, PlaybackState};
pub use audio::tts::{SpeechSynthesizer, Voice};
pub use audio::{AudioBuffer, NarrationError};
pub use coach::{Coach, ModeChange};
pub use providers::{CoachProvider, DailyPlan, GeminiClient, Mode, PlanRequest};
pub use view::{Screen, ViewController};
