//! Core data models for the RAG assistant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

//
// ================= Facts =================
//

/// One retrievable statement derived from a (row, column) pair of the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub id: usize,
    pub text: String,
}

/// A fact returned from nearest-neighbor search, with its L2 distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFact {
    pub id: usize,
    pub distance: f32,
    pub text: String,
}

//
// ================= Answers =================
//

/// Final answer text with its confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub confidence: f32,
}

impl Answer {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }

    /// A user-visible fallback; these always carry zero confidence.
    pub fn fallback(text: impl Into<String>) -> Self {
        Self::new(text, 0.0)
    }
}

//
// ================= Turns =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Pending,
    Answered,
    Failed,
}

/// One question/answer exchange. Filled in exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub turn_id: Uuid,
    pub question: String,
    pub answer: Option<String>,
    pub confidence: Option<f32>,
    pub status: TurnStatus,
    pub asked_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
}

impl Turn {
    pub(crate) fn pending(question: String) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            question,
            answer: None,
            confidence: None,
            status: TurnStatus::Pending,
            asked_at: Utc::now(),
            answered_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TurnStatus::Pending
    }

    /// Confidence rendered as a percentage, e.g. `90%`.
    pub fn confidence_label(&self) -> Option<String> {
        self.confidence
            .map(|c| format!("{}%", (c * 100.0).round() as i64))
    }
}

impl fmt::Display for TurnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnStatus::Pending => "pending",
            TurnStatus::Answered => "answered",
            TurnStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}
