//! Language oracle trait and implementations
//!
//! The oracle maps (question, financial context) to free-form text that is
//! either prose or a structured transaction directive. It is fallible and
//! untrusted; callers bound it with a timeout and parse its output defensively.

use crate::error::AssistantError;
use crate::models::FinancialContext;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

pub mod gemini;
pub use gemini::GeminiOracle;

/// Trait for answering one question against a financial context
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn ask(&self, question: &str, context: &FinancialContext) -> Result<String>;
}

/// One queued response of a [`ScriptedOracle`]
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Fail(String),
    /// Sleep before answering; used to exercise timeouts
    Stall(Duration, String),
}

/// Oracle that replays a fixed script, for development and tests.
/// Keeps the assistant functional without an LLM dependency.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<ScriptedReply>>,
    questions: Mutex<Vec<(String, FinancialContext)>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.push(ScriptedReply::Text(text.into()));
        self
    }

    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.push(ScriptedReply::Fail(message.into()));
        self
    }

    pub fn with_stall(self, delay: Duration, text: impl Into<String>) -> Self {
        self.push(ScriptedReply::Stall(delay, text.into()));
        self
    }

    pub fn push(&self, reply: ScriptedReply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Questions received so far, with the context each was asked under
    pub fn questions(&self) -> Vec<(String, FinancialContext)> {
        self.questions
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn ask(&self, question: &str, context: &FinancialContext) -> Result<String> {
        if let Ok(mut questions) = self.questions.lock() {
            questions.push((question.to_string(), context.clone()));
        }

        let next = self
            .replies
            .lock()
            .map_err(|_| AssistantError::OracleError("script lock poisoned".to_string()))?
            .pop_front();

        match next {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail(message)) => Err(AssistantError::OracleError(message)),
            Some(ScriptedReply::Stall(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            None => Err(AssistantError::OracleError("script exhausted".to_string())),
        }
    }
}
