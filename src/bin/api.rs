use voice_ledger_assistant::{
    api::start_server,
    applicator::{BroadcastRefresh, TransactionApplicator},
    audit::TurnAuditLog,
    config::AssistantConfig,
    ledger::{InMemoryLedgerStore, LedgerStore, PgLedgerStore},
    logging::{init_logging, LoggingConfig},
    oracle::GeminiOracle,
    session::AssistantServices,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

const DEMO_USER: &str = "demo_user";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AssistantConfig::from_env()?;
    init_logging(LoggingConfig::from_env())?;

    if config.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY not set; every turn will fall back to the apology");
    }

    info!("Voice Ledger Assistant - API Server");
    info!("Port: {}", config.port);

    let store: Arc<dyn LedgerStore> = match config.database_url.as_deref() {
        Some(url) => Arc::new(PgLedgerStore::connect_lazy(url)?),
        None => {
            let store = InMemoryLedgerStore::new();
            let user = store.insert_user(DEMO_USER, Some("Demo")).await;
            store
                .insert_account(user.id, "Current", Decimal::from(1000), true)
                .await;
            info!(user = DEMO_USER, "Ledger backend: in-memory (seeded demo user)");
            Arc::new(store)
        }
    };

    let refresh = Arc::new(BroadcastRefresh::new(64));
    let mut refreshes = refresh.subscribe();
    tokio::spawn(async move {
        loop {
            match refreshes.recv().await {
                Ok(user_id) => info!(user_id = %user_id, "Ledger views invalidated"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Refresh listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let services = AssistantServices {
        oracle: Arc::new(GeminiOracle::new(
            config.gemini_api_key.clone(),
            &config.gemini_model,
        )?),
        applicator: Arc::new(TransactionApplicator::new(
            store.clone(),
            refresh,
            config.amount_policy,
        )),
        store,
        audit: Arc::new(TurnAuditLog::with_capacity(config.audit_capacity)),
        oracle_timeout: config.oracle_timeout,
        preferred_voices: config.preferred_voices.clone(),
    };

    info!("Assistant services initialized");
    info!("Starting API server...");

    start_server(services, config.port).await?;

    Ok(())
}
