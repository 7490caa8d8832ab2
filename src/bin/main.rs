//! Console front end: each typed line stands in for one spoken utterance.

use async_trait::async_trait;
use voice_ledger_assistant::{
    applicator::{NoopRefresh, TransactionApplicator},
    audit::TurnAuditLog,
    config::AssistantConfig,
    ledger::{InMemoryLedgerStore, LedgerStore, PgLedgerStore},
    logging::{init_logging, LoggingConfig},
    oracle::{GeminiOracle, Oracle, ScriptedOracle},
    session::{AssistantServices, AssistantSession},
    speech::{SpeechCapture, SpeechSynthesizer, Voice},
    AssistantError,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing::info;

const DEMO_USER: &str = "demo_user";

struct StdinCapture {
    lines: Mutex<Lines<BufReader<Stdin>>>,
    exhausted: AtomicBool,
}

impl StdinCapture {
    fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
            exhausted: AtomicBool::new(false),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SpeechCapture for StdinCapture {
    async fn capture(&self) -> voice_ledger_assistant::Result<String> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        match self.lines.lock().await.next_line().await? {
            Some(line) => Ok(line),
            None => {
                self.exhausted.store(true, Ordering::Release);
                Err(AssistantError::CaptureError("end of input".to_string()))
            }
        }
    }
}

struct ConsoleSynthesizer;

#[async_trait]
impl SpeechSynthesizer for ConsoleSynthesizer {
    fn voices(&self) -> Vec<Voice> {
        vec![Voice::new("Console")]
    }

    fn cancel(&self) {}

    async fn speak(&self, text: &str, _voice: Option<&Voice>) -> voice_ledger_assistant::Result<()> {
        println!("🔊 {}", text);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AssistantConfig::from_env()?;
    init_logging(LoggingConfig::from_env())?;

    let identity = std::env::var("ASSISTANT_USER").unwrap_or_else(|_| DEMO_USER.to_string());

    let store: Arc<dyn LedgerStore> = match config.database_url.as_deref() {
        Some(url) => Arc::new(PgLedgerStore::connect_lazy(url)?),
        None => {
            let store = InMemoryLedgerStore::new();
            let user = store.insert_user(&identity, None).await;
            store
                .insert_account(user.id, "Current", Decimal::from(1000), true)
                .await;
            Arc::new(store)
        }
    };

    let oracle: Arc<dyn Oracle> = if config.gemini_api_key.is_empty() {
        info!("GEMINI_API_KEY not set, using scripted demo oracle");
        Arc::new(
            ScriptedOracle::new()
                .with_reply("Demo mode: your next sentence will be recorded as a lunch expense.")
                .with_reply(
                    r#"{"action":"create_transaction","amount":45,"category":"Food","type":"EXPENSE","description":"Lunch"}"#,
                ),
        )
    } else {
        Arc::new(GeminiOracle::new(
            config.gemini_api_key.clone(),
            &config.gemini_model,
        )?)
    };

    let services = AssistantServices {
        oracle,
        applicator: Arc::new(TransactionApplicator::new(
            store.clone(),
            Arc::new(NoopRefresh),
            config.amount_policy,
        )),
        store,
        audit: Arc::new(TurnAuditLog::with_capacity(config.audit_capacity)),
        oracle_timeout: config.oracle_timeout,
        preferred_voices: config.preferred_voices.clone(),
    };

    let capture = Arc::new(StdinCapture::new());
    let session = AssistantSession::new(
        services,
        Some(identity.clone()),
        capture.clone(),
        Arc::new(ConsoleSynthesizer),
    );

    println!("Voice Ledger Assistant ({}). Ctrl-D to quit.", identity);

    loop {
        let outcome = session.run_turn().await?;
        if capture.is_exhausted() {
            break;
        }
        if !outcome.spoken {
            println!("{}", outcome.display_text);
        }
    }

    Ok(())
}
