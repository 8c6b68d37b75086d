//! Event-driven chat session
//!
//! Drives a [`Conversation`] through one exchange per `ask`:
//! SUBMIT → emit `TurnSubmitted` → GENERATE (once) → RESOLVE → emit `TurnResolved`
//!
//! The presentation layer renders on each event instead of polling, so it
//! re-renders exactly twice per turn and generation is dispatched exactly
//! once per turn.
//!
//! Generation and resolution run in a spawned task. Dropping the `ask`
//! future (client disconnect, caller timeout) detaches that task but never
//! leaves the conversation stuck awaiting an answer.

use super::{Conversation, ConversationState};
use crate::generation::BoundedGenerator;
use crate::error::RagError;
use crate::models::Turn;
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};
use uuid::Uuid;

/// Shown when generation fails for reasons other than a timeout
pub const FAILURE_MESSAGE: &str =
    "Something went wrong while generating the answer. Please try again.";

/// Notifications for the presentation layer. Each carries the full ordered
/// turn list as of the transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConversationEvent {
    TurnSubmitted { turn_id: Uuid, turns: Vec<Turn> },
    TurnResolved { turn_id: Uuid, turns: Vec<Turn> },
}

impl ConversationEvent {
    pub fn turns(&self) -> &[Turn] {
        match self {
            ConversationEvent::TurnSubmitted { turns, .. }
            | ConversationEvent::TurnResolved { turns, .. } => turns,
        }
    }
}

pub struct ChatSession {
    conversation: Arc<Mutex<Conversation>>,
    generator: Arc<BoundedGenerator>,
    events: Option<mpsc::UnboundedSender<ConversationEvent>>,
}

impl ChatSession {
    /// Session plus the receiving end of its event channel
    pub fn new(
        generator: Arc<BoundedGenerator>,
    ) -> (Self, mpsc::UnboundedReceiver<ConversationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            conversation: Arc::new(Mutex::new(Conversation::new())),
            generator,
            events: Some(tx),
        };
        (session, rx)
    }

    /// Session without event delivery (request/response callers)
    pub fn without_events(generator: Arc<BoundedGenerator>, conversation_id: Uuid) -> Self {
        Self {
            conversation: Arc::new(Mutex::new(Conversation::with_id(conversation_id))),
            generator,
            events: None,
        }
    }

    pub async fn id(&self) -> Uuid {
        self.conversation.lock().await.id()
    }

    pub async fn turns(&self) -> Vec<Turn> {
        self.conversation.lock().await.turns().to_vec()
    }

    pub async fn state(&self) -> ConversationState {
        self.conversation.lock().await.state()
    }

    /// Run one full exchange and return the resolved turn.
    ///
    /// Fails with `ConversationBusy` if another question is still pending;
    /// nothing is dispatched in that case. Generation failures do not fail
    /// the call: the turn is resolved as failed instead.
    pub async fn ask(&self, question: &str) -> Result<Turn> {
        let (turn_id, turns) = {
            let mut conversation = self.conversation.lock().await;
            let turn_id = conversation.submit(question)?;
            (turn_id, conversation.turns().to_vec())
        };
        emit(&self.events, ConversationEvent::TurnSubmitted { turn_id, turns });

        // Lock is not held while generating, so a concurrent `ask` sees
        // AwaitingAnswer and is rejected.
        let exchange = tokio::spawn(complete_turn(
            Arc::clone(&self.conversation),
            Arc::clone(&self.generator),
            self.events.clone(),
            turn_id,
            question.to_string(),
        ));

        exchange.await.map_err(|e| {
            RagError::GenerationFailure(format!("turn task failed: {}", e))
        })?
    }
}

/// Generate the answer for the pending turn and resolve it.
async fn complete_turn(
    conversation: Arc<Mutex<Conversation>>,
    generator: Arc<BoundedGenerator>,
    events: Option<mpsc::UnboundedSender<ConversationEvent>>,
    turn_id: Uuid,
    question: String,
) -> Result<Turn> {
    let outcome = generator.answer(&question).await;

    let (turn, turns) = {
        let mut conversation = conversation.lock().await;
        let turn = match outcome {
            Ok(answer) => {
                info!(
                    turn_id = %turn_id,
                    confidence = answer.confidence,
                    "Answer ready"
                );
                conversation.resolve(answer.text, answer.confidence)?
            }
            Err(e) => {
                error!(turn_id = %turn_id, error = %e, "Generation failed for turn");
                conversation.fail(FAILURE_MESSAGE)?
            }
        }
        .clone();
        (turn, conversation.turns().to_vec())
    };
    emit(&events, ConversationEvent::TurnResolved { turn_id, turns });

    Ok(turn)
}

fn emit(events: &Option<mpsc::UnboundedSender<ConversationEvent>>, event: ConversationEvent) {
    if let Some(tx) = events {
        // A closed receiver just means nobody is rendering.
        let _ = tx.send(event);
    }
}
