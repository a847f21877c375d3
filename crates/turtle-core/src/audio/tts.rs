//! Speech synthesis seam and narration voices

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use turtle_store::Gender;

/// Prebuilt synthesis voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Voice {
    Kore,
    Zephyr,
}

impl Voice {
    /// Female profiles are narrated by Kore, male ones by Zephyr
    pub fn for_gender(gender: Gender) -> Self {
        match gender {
            Gender::Female => Self::Kore,
            Gender::Male => Self::Zephyr,
        }
    }

    /// Name the speech service knows the voice by
    pub fn name(&self) -> &'static str {
        match self {
            Self::Kore => "Kore",
            Self::Zephyr => "Zephyr",
        }
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Text-to-speech returning base64 16-bit PCM at 24 kHz mono.
///
/// `Ok(None)` means the service answered without an audio payload.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Option<String>>;
    fn name(&self) -> &str;
}
