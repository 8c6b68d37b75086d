//! Conversation state machine
//!
//! IDLE --submit--> AWAITING_ANSWER --resolve/fail--> IDLE
//!
//! Turns are append-only and each is filled in exactly once. At most one
//! turn is pending, so answers are always delivered in submission order.

use crate::error::RagError;
use crate::models::{Turn, TurnStatus};
use crate::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub mod session;
pub use session::{ChatSession, ConversationEvent, FAILURE_MESSAGE};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    AwaitingAnswer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    conversation_id: Uuid,
    turns: Vec<Turn>,
    awaiting_answer: bool,
}

impl Conversation {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(conversation_id: Uuid) -> Self {
        Self {
            conversation_id,
            turns: Vec::new(),
            awaiting_answer: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.conversation_id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn state(&self) -> ConversationState {
        if self.awaiting_answer {
            ConversationState::AwaitingAnswer
        } else {
            ConversationState::Idle
        }
    }

    pub fn is_awaiting_answer(&self) -> bool {
        self.awaiting_answer
    }

    pub fn pending_turn(&self) -> Option<&Turn> {
        self.turns.last().filter(|t| t.is_pending())
    }

    /// Append a pending turn. Only legal while idle.
    pub fn submit(&mut self, question: impl Into<String>) -> Result<Uuid> {
        if self.awaiting_answer {
            return Err(RagError::ConversationBusy);
        }

        let turn = Turn::pending(question.into());
        let turn_id = turn.turn_id;
        self.turns.push(turn);
        self.awaiting_answer = true;

        debug!(
            conversation_id = %self.conversation_id,
            turn_id = %turn_id,
            turn_count = self.turns.len(),
            "Turn submitted"
        );

        Ok(turn_id)
    }

    /// Fill the pending turn with its answer. Only legal while awaiting.
    pub fn resolve(&mut self, answer: impl Into<String>, confidence: f32) -> Result<&Turn> {
        self.complete(TurnStatus::Answered, answer.into(), confidence)
    }

    /// Mark the pending turn failed with a user-visible message.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<&Turn> {
        self.complete(TurnStatus::Failed, message.into(), 0.0)
    }

    fn complete(&mut self, status: TurnStatus, answer: String, confidence: f32) -> Result<&Turn> {
        if !self.awaiting_answer {
            return Err(RagError::NoPendingTurn);
        }

        let turn = self.turns.last_mut().ok_or(RagError::NoPendingTurn)?;
        turn.answer = Some(answer);
        turn.confidence = Some(confidence);
        turn.status = status;
        turn.answered_at = Some(Utc::now());
        self.awaiting_answer = false;

        debug!(
            conversation_id = %self.conversation_id,
            turn_id = %turn.turn_id,
            status = %status,
            "Turn resolved"
        );

        Ok(turn)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_and_resolve() {
        let mut conversation = Conversation::new();
        assert_eq!(conversation.state(), ConversationState::Idle);

        let turn_id = conversation.submit("What was revenue in 2021?").unwrap();
        assert_eq!(conversation.state(), ConversationState::AwaitingAnswer);
        assert_eq!(conversation.pending_turn().map(|t| t.turn_id), Some(turn_id));

        let turn = conversation.resolve("Answer: 120", 0.9).unwrap();
        assert_eq!(turn.turn_id, turn_id);
        assert_eq!(turn.status, TurnStatus::Answered);
        assert_eq!(turn.answer.as_deref(), Some("Answer: 120"));
        assert_eq!(turn.confidence, Some(0.9));
        assert!(turn.answered_at.is_some());

        assert_eq!(conversation.state(), ConversationState::Idle);
        assert!(conversation.pending_turn().is_none());
    }

    #[test]
    fn test_submit_while_awaiting_is_rejected() {
        let mut conversation = Conversation::new();
        conversation.submit("first").unwrap();

        let err = conversation.submit("second").unwrap_err();
        assert!(matches!(err, RagError::ConversationBusy));
        assert_eq!(conversation.turns().len(), 1);
        assert_eq!(
            conversation.turns().iter().filter(|t| t.is_pending()).count(),
            1
        );
    }

    #[test]
    fn test_resolve_while_idle_is_rejected() {
        let mut conversation = Conversation::new();
        assert!(matches!(
            conversation.resolve("orphan", 0.9),
            Err(RagError::NoPendingTurn)
        ));

        conversation.submit("q").unwrap();
        conversation.resolve("a", 0.9).unwrap();

        // A resolved turn is never mutated again.
        assert!(conversation.fail("late").is_err());
        assert_eq!(conversation.turns()[0].answer.as_deref(), Some("a"));
    }

    #[test]
    fn test_fail_marks_turn() {
        let mut conversation = Conversation::new();
        conversation.submit("q").unwrap();
        let turn = conversation.fail("Something went wrong").unwrap();

        assert_eq!(turn.status, TurnStatus::Failed);
        assert_eq!(turn.confidence, Some(0.0));
        assert_eq!(conversation.state(), ConversationState::Idle);
    }

    #[test]
    fn test_turns_keep_submission_order() {
        let mut conversation = Conversation::new();
        for i in 0..3 {
            conversation.submit(format!("question {}", i)).unwrap();
            conversation.resolve(format!("answer {}", i), 0.9).unwrap();
        }

        let questions: Vec<&str> = conversation
            .turns()
            .iter()
            .map(|t| t.question.as_str())
            .collect();
        assert_eq!(questions, vec!["question 0", "question 1", "question 2"]);
    }
}
