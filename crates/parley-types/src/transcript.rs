//! Transcript records crossing the utterance boundary.

use serde::{Deserialize, Serialize};

/// One transcript event from the speech-to-text stage.
///
/// Interim transcripts are superseded by later events; only final ones
/// carry a complete utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    /// The recognized text.
    pub text: String,
    /// Whether the recognizer has finalized this segment.
    pub is_final: bool,
}

impl Transcript {
    /// A finalized transcript.
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }

    /// A non-final transcript.
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    /// Returns the utterance to act on, if any.
    ///
    /// Interim transcripts and blank final transcripts yield `None`.
    pub fn actionable(&self) -> Option<&str> {
        if !self.is_final {
            return None;
        }
        let trimmed = self.text.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}
