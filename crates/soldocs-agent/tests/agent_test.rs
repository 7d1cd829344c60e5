use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use soldocs_agent::{Agent, AgentConfig, MAX_ATTEMPTS};
use soldocs_chain::{AccountInfo, ChainRpc};
use soldocs_core::{idl, ProgramStatus, QueueStatus, Result, SolDocsError};
use soldocs_llm::TextGenerator;
use soldocs_store::{QueueItemPatch, Store};
use tempfile::TempDir;

const DRIFT_ID: &str = "dRiftyHA39MWEi3m9aunc5MzRF1JYuBsbn6VPcn33UH";
const JUPITER_ID: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";
const MARINADE_ID: &str = "MarBmsSgKXdrN1egZf5sqe1TMai9K1rChYNDJgjq7aD";

fn mock_idl() -> Value {
    json!({
        "name": "test_program",
        "instructions": [
            {"name": "initialize", "accounts": [], "args": []},
            {"name": "update", "accounts": [], "args": []},
        ],
        "accounts": [{"name": "State", "type": {"kind": "struct", "fields": []}}],
    })
}

#[derive(Clone)]
enum MockAccount {
    Missing,
    Error(String),
}

/// Chain stub: account lookups answer from a fixed table; everything not
/// listed is absent.
struct MockChain {
    accounts: HashMap<String, MockAccount>,
}

impl MockChain {
    fn empty() -> Arc<Self> {
        Arc::new(Self {
            accounts: HashMap::new(),
        })
    }

    fn with(accounts: HashMap<String, MockAccount>) -> Arc<Self> {
        Arc::new(Self { accounts })
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn get_account(&self, address: &str) -> Result<Option<AccountInfo>> {
        match self.accounts.get(address) {
            Some(MockAccount::Error(message)) => Err(SolDocsError::Rpc(message.clone())),
            Some(MockAccount::Missing) | None => Ok(None),
        }
    }

    async fn get_version(&self) -> Result<String> {
        Ok("1.18.0".to_string())
    }
}

struct CountingLlm {
    calls: AtomicUsize,
}

impl CountingLlm {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for CountingLlm {
    async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!(
            "### section_{n}\n\nCanned output {n}.\n\n```rust\nlet _ = {n};\n```"
        ))
    }
}

fn agent_config(dir: &TempDir) -> AgentConfig {
    AgentConfig {
        discovery_interval: Duration::from_millis(25),
        concurrency: 1,
        webhook_url: None,
        seeds_dir: dir.path().join("seeds"),
    }
}

async fn open_store(dir: &TempDir) -> Arc<Store> {
    Arc::new(Store::new(dir.path().join("data")).await.expect("store"))
}

#[tokio::test]
async fn happy_path_documents_a_cached_program() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).await;
    let llm = CountingLlm::new();
    let agent = Agent::new(
        store.clone(),
        MockChain::empty(),
        llm.clone(),
        agent_config(&dir),
    );

    store.save_idl(DRIFT_ID, mock_idl()).await.expect("cache idl");
    store.add_to_queue(DRIFT_ID).await.expect("enqueue");

    agent.process_queue().await.expect("cycle");

    // 4 passes: overview, one instruction batch, accounts, security.
    assert_eq!(llm.calls(), 4);

    let doc = store
        .get_documentation(DRIFT_ID)
        .await
        .expect("get docs")
        .expect("docs persisted");
    assert!(!doc.overview.is_empty());
    assert!(!doc.instructions.is_empty());
    assert!(!doc.accounts.is_empty());
    assert!(!doc.security.is_empty());
    assert_eq!(doc.idl_hash, idl::hash_idl(&mock_idl()));

    let program = store
        .get_program(DRIFT_ID)
        .await
        .expect("get program")
        .expect("indexed");
    assert_eq!(program.status, ProgramStatus::Documented);
    assert_eq!(program.name, "test_program");
    assert_eq!(program.instruction_count, 2);
    assert_eq!(program.account_count, 1);

    assert!(store.list_queue().await.expect("queue").is_empty());
}

#[tokio::test]
async fn unchanged_idl_is_not_regenerated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).await;
    let llm = CountingLlm::new();
    let agent = Agent::new(
        store.clone(),
        MockChain::empty(),
        llm.clone(),
        agent_config(&dir),
    );

    store.save_idl(DRIFT_ID, mock_idl()).await.expect("cache idl");
    store.add_to_queue(DRIFT_ID).await.expect("enqueue");
    agent.process_queue().await.expect("first cycle");
    let first_calls = llm.calls();
    let first_doc = store
        .get_documentation(DRIFT_ID)
        .await
        .expect("get")
        .expect("present");

    // Same IDL, new queue entry: the hash short-circuit skips generation.
    store.add_to_queue(DRIFT_ID).await.expect("re-enqueue");
    agent.process_queue().await.expect("second cycle");

    assert_eq!(llm.calls(), first_calls);
    let second_doc = store
        .get_documentation(DRIFT_ID)
        .await
        .expect("get")
        .expect("still present");
    assert_eq!(second_doc.generated_at, first_doc.generated_at);
    assert!(store.list_queue().await.expect("queue").is_empty());
}

#[tokio::test]
async fn failures_retry_then_permanently_fail() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).await;
    let llm = CountingLlm::new();
    let chain = MockChain::with(HashMap::from([(
        DRIFT_ID.to_string(),
        MockAccount::Error("RPC error -32000: 401 unauthorized".to_string()),
    )]));
    let agent = Agent::new(store.clone(), chain, llm.clone(), agent_config(&dir));

    store.add_to_queue(DRIFT_ID).await.expect("enqueue");
    agent.process_queue().await.expect("cycle");

    let item = store.list_queue().await.expect("queue")[0].clone();
    assert_eq!(item.status, QueueStatus::Failed);
    assert_eq!(item.attempts, 1);
    assert!(item.last_error.expect("error recorded").contains("401"));

    let state = agent.get_state().await.expect("state");
    assert_eq!(state.recent_errors.len(), 1);
    assert_eq!(state.recent_errors[0].program_id, DRIFT_ID);

    // Exhaust the budget by hand, make the item runnable again, re-run.
    store
        .update_queue_item(
            DRIFT_ID,
            QueueItemPatch {
                status: Some(QueueStatus::Pending),
                attempts: Some(MAX_ATTEMPTS),
                ..Default::default()
            },
        )
        .await
        .expect("patch");
    agent.process_queue().await.expect("cycle");

    assert!(store.list_queue().await.expect("queue").is_empty());
    let program = store
        .get_program(DRIFT_ID)
        .await
        .expect("get")
        .expect("recorded");
    assert_eq!(program.status, ProgramStatus::Failed);
    assert!(program
        .error_message
        .expect("message")
        .contains("Permanently failed after 10 attempts"));
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn concurrent_batch_isolates_failures() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).await;
    let llm = CountingLlm::new();
    let mut config = agent_config(&dir);
    config.concurrency = 3;
    let agent = Agent::new(store.clone(), MockChain::empty(), llm.clone(), config);

    // A and C have cached IDLs and succeed; B has nothing anywhere.
    store.save_idl(DRIFT_ID, mock_idl()).await.expect("idl a");
    let mut other = mock_idl();
    other["name"] = json!("other_program");
    store.save_idl(MARINADE_ID, other).await.expect("idl c");

    store.add_to_queue(DRIFT_ID).await.expect("enqueue a");
    store.add_to_queue(JUPITER_ID).await.expect("enqueue b");
    store.add_to_queue(MARINADE_ID).await.expect("enqueue c");

    agent.process_queue().await.expect("cycle");

    for id in [DRIFT_ID, MARINADE_ID] {
        let program = store.get_program(id).await.expect("get").expect("present");
        assert_eq!(program.status, ProgramStatus::Documented, "{id}");
        assert!(store
            .get_documentation(id)
            .await
            .expect("get docs")
            .is_some());
    }

    let queue = store.list_queue().await.expect("queue");
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].program_id, JUPITER_ID);
    assert_eq!(queue[0].status, QueueStatus::Failed);
    assert_eq!(queue[0].attempts, 1);

    let failed = store
        .get_program(JUPITER_ID)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(failed.status, ProgramStatus::Failed);
}

async fn record_webhook(
    State(recorded): State<Arc<Mutex<Vec<Value>>>>,
    Json(body): Json<Value>,
) -> StatusCode {
    recorded.lock().expect("lock").push(body);
    StatusCode::OK
}

#[tokio::test]
async fn completion_fires_exactly_one_webhook() {
    let recorded: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/hook", post(record_webhook))
        .with_state(recorded.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).await;
    let llm = CountingLlm::new();
    let mut config = agent_config(&dir);
    config.webhook_url = Some(format!("http://{addr}/hook"));
    let agent = Agent::new(store.clone(), MockChain::empty(), llm.clone(), config);

    store.save_idl(DRIFT_ID, mock_idl()).await.expect("cache idl");
    store.add_to_queue(DRIFT_ID).await.expect("enqueue");
    agent.process_queue().await.expect("cycle");

    let bodies = recorded.lock().expect("lock").clone();
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["event"], "doc.completed");
    assert_eq!(body["programId"], DRIFT_ID);
    assert_eq!(body["name"], "test_program");
    assert_eq!(
        body["documentation"]["idlHash"],
        idl::hash_idl(&mock_idl())
    );
    let overview = body["documentation"]["overview"]
        .as_str()
        .expect("overview string");
    assert!(overview.chars().count() <= 500);
    assert!(body["documentation"]["instructionCount"].as_u64().expect("count") >= 1);
}

#[tokio::test]
async fn stuck_processing_items_are_recovered_at_start() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).await;
    let llm = CountingLlm::new();

    // Cached IDL plus matching docs: once recovered, the item is skipped
    // without regeneration and leaves the queue. Were recovery broken the
    // item would stay `processing` forever.
    store.save_idl(DRIFT_ID, mock_idl()).await.expect("cache idl");
    store.add_to_queue(DRIFT_ID).await.expect("enqueue");
    let agent = Agent::new(
        store.clone(),
        MockChain::empty(),
        llm.clone(),
        agent_config(&dir),
    );
    agent.process_queue().await.expect("prime docs");
    assert_eq!(llm.calls(), 4);

    store.add_to_queue(DRIFT_ID).await.expect("re-enqueue");
    store
        .update_queue_item(
            DRIFT_ID,
            QueueItemPatch {
                status: Some(QueueStatus::Processing),
                ..Default::default()
            },
        )
        .await
        .expect("simulate crash");

    let agent = Arc::new(Agent::new(
        store.clone(),
        MockChain::empty(),
        llm.clone(),
        agent_config(&dir),
    ));
    let runner = {
        let agent = agent.clone();
        tokio::spawn(async move { agent.start().await })
    };

    let mut drained = false;
    for _ in 0..200 {
        if store.list_queue().await.expect("queue").is_empty() {
            drained = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    agent.stop();
    runner.await.expect("join").expect("agent run");

    assert!(drained, "stuck item was never recovered and drained");
    assert_eq!(llm.calls(), 4, "recovery must not regenerate unchanged docs");
    assert!(!agent.is_running());
}

#[tokio::test]
async fn state_snapshot_reflects_store_and_ring() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir).await;
    let llm = CountingLlm::new();
    let chain = MockChain::with(HashMap::from([(
        JUPITER_ID.to_string(),
        MockAccount::Error("403 forbidden".to_string()),
    )]));
    let agent = Agent::new(store.clone(), chain, llm.clone(), agent_config(&dir));

    store.save_idl(DRIFT_ID, mock_idl()).await.expect("idl");
    store.add_to_queue(DRIFT_ID).await.expect("enqueue");
    store.add_to_queue(JUPITER_ID).await.expect("enqueue");
    agent.process_queue().await.expect("cycle");

    let state = agent.get_state().await.expect("state");
    assert!(!state.running);
    assert_eq!(state.programs_documented, 1);
    assert_eq!(state.programs_failed, 1);
    assert_eq!(state.total_processed, 2);
    assert_eq!(state.queue_length, 0); // the failed item is not pending
    assert_eq!(state.recent_errors.len(), 1);
}
