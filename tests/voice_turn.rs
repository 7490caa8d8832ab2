//! End-to-end voice turns against the in-memory ledger

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use voice_ledger_assistant::{
    applicator::{BroadcastRefresh, TransactionApplicator},
    audit::TurnAuditLog,
    config::AmountPolicy,
    ledger::{InMemoryLedgerStore, LedgerStore},
    models::{Account, CandidateAction, TransactionType},
    oracle::ScriptedOracle,
    session::{
        AssistantServices, AssistantSession, SpeechKind, TurnKind, TurnState, ORACLE_APOLOGY,
    },
    speech::{RecordingSynthesizer, TranscriptCapture},
};

struct Harness {
    store: InMemoryLedgerStore,
    account: Account,
    refresh: Arc<BroadcastRefresh>,
    synth: Arc<RecordingSynthesizer>,
    session: AssistantSession,
}

async fn harness(oracle: ScriptedOracle, utterance: &str, timeout: Duration) -> Harness {
    let store = InMemoryLedgerStore::new();
    let user = store.insert_user("user_abc", Some("Asha")).await;
    let account = store
        .insert_account(user.id, "Current", Decimal::from(1000), true)
        .await;

    let shared: Arc<dyn LedgerStore> = Arc::new(store.clone());
    let refresh = Arc::new(BroadcastRefresh::new(8));
    let services = AssistantServices {
        oracle: Arc::new(oracle),
        applicator: Arc::new(TransactionApplicator::new(
            shared.clone(),
            refresh.clone(),
            AmountPolicy::default(),
        )),
        store: shared,
        audit: Arc::new(TurnAuditLog::new()),
        oracle_timeout: timeout,
        preferred_voices: vec!["Google".to_string(), "Female".to_string()],
    };

    let synth = Arc::new(RecordingSynthesizer::new());
    let session = AssistantSession::new(
        services,
        Some("user_abc".to_string()),
        Arc::new(TranscriptCapture::new(utterance)),
        synth.clone(),
    );

    Harness {
        store,
        account,
        refresh,
        synth,
        session,
    }
}

#[tokio::test]
async fn lunch_expense_is_applied_and_confirmed() {
    let oracle = ScriptedOracle::new().with_reply(
        r#"{"action":"create_transaction","amount":"45","category":"Food","type":"expense","description":"lunch"}"#,
    );
    let h = harness(oracle, "I spent 45 on lunch", Duration::from_secs(1)).await;
    let mut refreshes = h.refresh.subscribe();

    let outcome = h.session.run_turn().await.unwrap();

    assert_eq!(outcome.kind, TurnKind::TransactionApplied);
    assert!(outcome.refresh_requested);
    assert_eq!(h.synth.spoken(), vec!["Success! Added expense of 45 for Food."]);

    let account = h.store.account(h.account.id).await.unwrap();
    assert_eq!(account.balance, Decimal::new(95500, 2));

    let transactions = h.store.transactions_for_account(h.account.id).await;
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].transaction_type, TransactionType::Expense);
    assert_eq!(transactions[0].amount, Decimal::from(45));
    assert_eq!(transactions[0].description, "lunch");

    assert_eq!(refreshes.try_recv().unwrap(), h.account.user_id);
}

#[tokio::test]
async fn loan_answer_is_spoken_verbatim() {
    let reply = "You are eligible for a ₹5 Lakh home loan.";
    let oracle = ScriptedOracle::new().with_reply(reply);
    let h = harness(oracle, "I have a 1500 square foot house", Duration::from_secs(1)).await;
    let mut refreshes = h.refresh.subscribe();

    let outcome = h.session.run_turn().await.unwrap();

    assert_eq!(outcome.kind, TurnKind::Conversational);
    assert_eq!(outcome.display_text, reply);
    assert_eq!(h.synth.spoken(), vec![reply]);
    assert!(!outcome.refresh_requested);
    assert_eq!(h.store.transaction_count().await, 0);
    assert_eq!(
        h.store.account(h.account.id).await.unwrap().balance,
        Decimal::from(1000)
    );
    assert!(refreshes.try_recv().is_err());
}

#[tokio::test]
async fn oracle_failure_yields_apology() {
    let oracle = ScriptedOracle::new().with_failure("503 Service Unavailable");
    let h = harness(oracle, "what's my balance", Duration::from_secs(1)).await;

    let outcome = h.session.run_turn().await.unwrap();

    assert_eq!(outcome.kind, TurnKind::OracleUnavailable);
    assert_eq!(outcome.display_text, ORACLE_APOLOGY);
    assert_eq!(h.synth.spoken(), vec![ORACLE_APOLOGY]);
    assert_eq!(h.store.transaction_count().await, 0);
}

#[tokio::test]
async fn oracle_timeout_yields_apology() {
    let directive = r#"{"action":"create_transaction","amount":10,"category":"Food"}"#;
    let oracle = ScriptedOracle::new().with_stall(Duration::from_secs(10), directive);
    let h = harness(oracle, "spent 10 on food", Duration::from_millis(50)).await;

    let outcome = h.session.run_turn().await.unwrap();

    assert_eq!(outcome.kind, TurnKind::OracleUnavailable);
    assert_eq!(
        outcome.transitions,
        vec![
            TurnState::Listening,
            TurnState::Thinking,
            TurnState::Speaking(SpeechKind::Apology),
            TurnState::Idle,
        ]
    );
    assert_eq!(h.synth.spoken(), vec![ORACLE_APOLOGY]);
    assert_eq!(h.store.transaction_count().await, 0);
}

#[tokio::test]
async fn missing_type_and_description_fall_back() {
    let oracle = ScriptedOracle::new()
        .with_reply(r#"{"action":"create_transaction","amount":120,"category":"Groceries"}"#);
    let h = harness(oracle, "groceries were 120", Duration::from_secs(1)).await;

    let outcome = h.session.run_turn().await.unwrap();

    assert_eq!(outcome.kind, TurnKind::TransactionApplied);
    let transactions = h.store.transactions_for_account(h.account.id).await;
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].transaction_type, TransactionType::Expense);
    assert_eq!(transactions[0].description, "Groceries");
    assert_eq!(transactions[0].category, "Groceries");
    assert_eq!(
        h.store.account(h.account.id).await.unwrap().balance,
        Decimal::from(880)
    );
}

#[tokio::test]
async fn context_snapshot_reaches_oracle() {
    let oracle = Arc::new(ScriptedOracle::new().with_reply("Noted."));
    let store = InMemoryLedgerStore::new();
    let user = store.insert_user("user_abc", None).await;
    store
        .insert_account(user.id, "Current", Decimal::from(1000), true)
        .await;
    store
        .insert_account(user.id, "Savings", Decimal::from(500), false)
        .await;

    let shared: Arc<dyn LedgerStore> = Arc::new(store);
    let services = AssistantServices {
        oracle: oracle.clone(),
        applicator: Arc::new(TransactionApplicator::new(
            shared.clone(),
            Arc::new(BroadcastRefresh::new(1)),
            AmountPolicy::default(),
        )),
        store: shared,
        audit: Arc::new(TurnAuditLog::new()),
        oracle_timeout: Duration::from_secs(1),
        preferred_voices: vec![],
    };
    let session = AssistantSession::new(
        services,
        Some("user_abc".to_string()),
        Arc::new(TranscriptCapture::new("how much do I have")),
        Arc::new(RecordingSynthesizer::new()),
    );

    session.run_turn().await.unwrap();

    let questions = oracle.questions();
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].0, "how much do I have");
    assert_eq!(questions[0].1.balance, Decimal::from(1500));
}

#[tokio::test]
async fn concurrent_applications_do_not_lose_updates() {
    let store = InMemoryLedgerStore::new();
    let user = store.insert_user("user_abc", None).await;
    let account = store
        .insert_account(user.id, "Current", Decimal::from(1000), true)
        .await;

    let shared: Arc<dyn LedgerStore> = Arc::new(store.clone());
    let applicator = Arc::new(TransactionApplicator::new(
        shared,
        Arc::new(BroadcastRefresh::new(64)),
        AmountPolicy::default(),
    ));

    let mut handles = Vec::new();
    for i in 0..20 {
        let applicator = applicator.clone();
        handles.push(tokio::spawn(async move {
            let candidate = CandidateAction {
                amount: Some(if i % 2 == 0 { 10.0 } else { 2.5 }),
                category: "Other".to_string(),
                transaction_type: if i % 2 == 0 { "INCOME" } else { "EXPENSE" }.to_string(),
                description: format!("entry {}", i),
            };
            applicator.apply(Some("user_abc"), &candidate).await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // 1000 + 10 * 10 - 10 * 2.5
    let account = store.account(account.id).await.unwrap();
    assert_eq!(account.balance, Decimal::from(1075));
    assert_eq!(store.transaction_count().await, 20);
}
