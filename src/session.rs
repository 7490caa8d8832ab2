//! Assistant session controller
//!
//! One voice turn:
//! IDLE → LISTENING → THINKING → (SPEAKING | APPLYING → SPEAKING) → IDLE
//!
//! Capture errors return straight to IDLE. Oracle failures and ledger
//! failures are spoken as fixed messages; raw error text only goes to logs.

use crate::applicator::TransactionApplicator;
use crate::audit::{compute_reply_digest, TurnAuditLog, TurnRecord};
use crate::context;
use crate::error::AssistantError;
use crate::intent::{parse_reply, Intent};
use crate::ledger::LedgerStore;
use crate::models::{ApplyOutcome, Confirmation};
use crate::oracle::Oracle;
use crate::speech::{Speaker, SpeechCapture, SpeechSynthesizer};
use crate::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const LISTENING_STATUS: &str = "Listening...";
pub const THINKING_STATUS: &str = "Thinking...";
pub const APPLYING_STATUS: &str = "Creating transaction...";
pub const CAPTURE_FAILED_MESSAGE: &str = "I couldn't hear that. Please try again.";
pub const ORACLE_APOLOGY: &str =
    "I'm sorry, I'm having trouble connecting to the server right now. Please try again in a moment.";
pub const APPLY_FAILED_MESSAGE: &str =
    "I tried to add it, but something went wrong with the database.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechKind {
    Conversational,
    Confirmation,
    Failure,
    Apology,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "speech")]
pub enum TurnState {
    Idle,
    Listening,
    Thinking,
    Applying,
    Speaking(SpeechKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    CaptureFailed,
    OracleUnavailable,
    Conversational,
    TransactionApplied,
    TransactionFailed,
}

/// Latest state plus the interim status text shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub state: TurnState,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub turn_id: Uuid,
    pub kind: TurnKind,
    /// Text presented to the user
    pub display_text: String,
    /// Whether the text was also spoken to completion
    pub spoken: bool,
    /// Dependent views should reload
    pub refresh_requested: bool,
    pub confirmation: Option<Confirmation>,
    /// Every state entered during the turn, ending in `Idle`
    pub transitions: Vec<TurnState>,
}

/// Shared, per-process collaborators of every session
#[derive(Clone)]
pub struct AssistantServices {
    pub oracle: Arc<dyn Oracle>,
    pub applicator: Arc<TransactionApplicator>,
    pub store: Arc<dyn LedgerStore>,
    pub audit: Arc<TurnAuditLog>,
    pub oracle_timeout: Duration,
    pub preferred_voices: Vec<String>,
}

/// Voice session of one caller. Turns on one session never overlap.
pub struct AssistantSession {
    services: AssistantServices,
    identity: Option<String>,
    capture: Arc<dyn SpeechCapture>,
    speaker: Speaker,
    status: watch::Sender<SessionStatus>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag however the turn ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Per-turn bookkeeping
struct TurnTrace {
    turn_id: Uuid,
    started: Instant,
    transitions: Vec<TurnState>,
    utterance: Option<String>,
    reply_digest: Option<String>,
}

impl AssistantSession {
    pub fn new(
        services: AssistantServices,
        identity: Option<String>,
        capture: Arc<dyn SpeechCapture>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        let speaker = Speaker::new(synthesizer, services.preferred_voices.clone());
        let (status, _) = watch::channel(SessionStatus {
            state: TurnState::Idle,
            message: None,
        });

        Self {
            services,
            identity,
            capture,
            speaker,
            status,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn state(&self) -> TurnState {
        self.status.borrow().state
    }

    /// Whether a new turn may be triggered right now
    pub fn is_idle(&self) -> bool {
        !self.in_flight.load(Ordering::Acquire)
    }

    /// Run one complete turn. Only fails with [`AssistantError::Busy`];
    /// every other failure is folded into the returned outcome.
    pub async fn run_turn(&self) -> Result<TurnOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AssistantError::Busy);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let mut trace = TurnTrace {
            turn_id: Uuid::new_v4(),
            started: Instant::now(),
            transitions: Vec::new(),
            utterance: None,
            reply_digest: None,
        };

        // === LISTEN ===
        self.enter(&mut trace, TurnState::Listening, Some(LISTENING_STATUS));

        let utterance = match self.capture.capture().await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!("Speech capture returned an empty transcript");
                return Ok(self.capture_failed(trace).await);
            }
            Err(e) => {
                warn!(error = %e, "Speech capture failed");
                return Ok(self.capture_failed(trace).await);
            }
        };
        trace.utterance = Some(utterance.clone());

        // === THINK ===
        self.enter(&mut trace, TurnState::Thinking, Some(THINKING_STATUS));

        let snapshot = match context::build_context(
            self.services.store.as_ref(),
            self.identity.as_deref(),
        )
        .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Context snapshot failed, asking without it");
                context::empty()
            }
        };

        let reply = match self.ask_oracle(&utterance, &snapshot).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Oracle call failed");
                let spoken = self
                    .speak(&mut trace, SpeechKind::Apology, ORACLE_APOLOGY)
                    .await;
                return Ok(self
                    .finish(trace, TurnKind::OracleUnavailable, ORACLE_APOLOGY, spoken, None)
                    .await);
            }
        };
        trace.reply_digest = Some(compute_reply_digest(&reply));

        match parse_reply(&reply) {
            Intent::Conversational(text) => {
                let spoken = self
                    .speak(&mut trace, SpeechKind::Conversational, &text)
                    .await;
                Ok(self
                    .finish(trace, TurnKind::Conversational, &text, spoken, None)
                    .await)
            }
            Intent::Action(candidate) => {
                // === APPLY ===
                self.enter(&mut trace, TurnState::Applying, Some(APPLYING_STATUS));

                let outcome = self
                    .services
                    .applicator
                    .apply_outcome(self.identity.as_deref(), &candidate)
                    .await;

                match outcome {
                    ApplyOutcome {
                        success: true,
                        confirmation: Some(confirmation),
                        ..
                    } => {
                        let message = confirmation_message(&confirmation);
                        let spoken = self
                            .speak(&mut trace, SpeechKind::Confirmation, &message)
                            .await;
                        Ok(self
                            .finish(
                                trace,
                                TurnKind::TransactionApplied,
                                &message,
                                spoken,
                                Some(confirmation),
                            )
                            .await)
                    }
                    _ => {
                        let spoken = self
                            .speak(&mut trace, SpeechKind::Failure, APPLY_FAILED_MESSAGE)
                            .await;
                        Ok(self
                            .finish(
                                trace,
                                TurnKind::TransactionFailed,
                                APPLY_FAILED_MESSAGE,
                                spoken,
                                None,
                            )
                            .await)
                    }
                }
            }
        }
    }

    async fn ask_oracle(
        &self,
        utterance: &str,
        snapshot: &crate::models::FinancialContext,
    ) -> Result<String> {
        let timeout = self.services.oracle_timeout;

        match tokio::time::timeout(timeout, self.services.oracle.ask(utterance, snapshot)).await {
            Ok(result) => result,
            Err(_) => Err(AssistantError::OracleTimeout(timeout)),
        }
    }

    fn enter(&self, trace: &mut TurnTrace, state: TurnState, message: Option<&str>) {
        debug!(turn_id = %trace.turn_id, ?state, "Turn state");
        trace.transitions.push(state);
        self.status.send_replace(SessionStatus {
            state,
            message: message.map(str::to_string),
        });
    }

    async fn speak(&self, trace: &mut TurnTrace, kind: SpeechKind, text: &str) -> bool {
        self.enter(trace, TurnState::Speaking(kind), Some(text));
        self.speaker.say(text).await
    }

    async fn capture_failed(&self, trace: TurnTrace) -> TurnOutcome {
        self.finish(trace, TurnKind::CaptureFailed, CAPTURE_FAILED_MESSAGE, false, None)
            .await
    }

    async fn finish(
        &self,
        mut trace: TurnTrace,
        kind: TurnKind,
        display_text: &str,
        spoken: bool,
        confirmation: Option<Confirmation>,
    ) -> TurnOutcome {
        self.enter(&mut trace, TurnState::Idle, None);

        let duration_ms = trace.started.elapsed().as_millis() as u64;
        let record = TurnRecord {
            turn_id: trace.turn_id,
            identity: self.identity.clone(),
            utterance: trace.utterance.clone(),
            kind,
            reply_digest: trace.reply_digest.clone(),
            transaction_id: confirmation.as_ref().map(|c| c.transaction_id),
            created_at: Utc::now(),
            duration_ms,
        };
        if let Err(e) = self.services.audit.record(record).await {
            warn!(error = %e, "Failed to record turn audit");
        }

        info!(
            turn_id = %trace.turn_id,
            kind = ?kind,
            duration_ms,
            "Turn complete"
        );

        TurnOutcome {
            turn_id: trace.turn_id,
            kind,
            display_text: display_text.to_string(),
            spoken,
            refresh_requested: kind == TurnKind::TransactionApplied,
            confirmation,
            transitions: trace.transitions,
        }
    }
}

/// "Success! Added expense of 45 for Food."
pub fn confirmation_message(confirmation: &Confirmation) -> String {
    format!(
        "Success! Added {} of {} for {}.",
        confirmation.transaction_type.as_lowercase(),
        confirmation.amount.normalize(),
        confirmation.category
    )
}
