//! The agent main loop: drain the queue in bounded-parallelism batches,
//! recover crashed work at startup, periodically look for upgraded IDLs,
//! and record every failure without ever dying.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use soldocs_chain::ChainRpc;
use soldocs_core::{
    idl, AgentError, AgentState, ProgramMetadata, ProgramStatus, QueueItem, QueueStatus, Result,
    SolDocsError,
};
use soldocs_docgen::DocGenerator;
use soldocs_llm::TextGenerator;
use soldocs_store::{QueueItemPatch, Store};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::seed::seed_known_programs;
use crate::webhook::notify_completion;

/// A queue item survives this many failed runs before the program is
/// marked permanently failed.
pub const MAX_ATTEMPTS: u32 = 10;

const ERROR_RING_CAP: usize = 50;

/// Upgrade detection runs on every twelfth loop iteration.
const UPGRADE_CHECK_EVERY: u32 = 12;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub discovery_interval: Duration,
    pub concurrency: usize,
    pub webhook_url: Option<String>,
    pub seeds_dir: PathBuf,
}

#[derive(Default)]
struct AgentCounters {
    total_processed: u64,
    started_at: Option<DateTime<Utc>>,
    last_run_at: Option<DateTime<Utc>>,
    recent_errors: VecDeque<AgentError>,
}

pub struct Agent {
    store: Arc<Store>,
    chain: Arc<dyn ChainRpc>,
    generator: DocGenerator,
    config: AgentConfig,
    http: reqwest::Client,
    running: AtomicBool,
    stop_requested: AtomicBool,
    wake: Notify,
    counters: Mutex<AgentCounters>,
}

impl Agent {
    pub fn new(
        store: Arc<Store>,
        chain: Arc<dyn ChainRpc>,
        llm: Arc<dyn TextGenerator>,
        config: AgentConfig,
    ) -> Self {
        Self {
            store,
            chain,
            generator: DocGenerator::new(llm),
            config,
            http: reqwest::Client::new(),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            wake: Notify::new(),
            counters: Mutex::new(AgentCounters::default()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stopped(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Stop starting new batches at the next boundary and wake the
    /// inter-iteration sleep. In-flight items run to completion.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Run until [`Agent::stop`]. Loop-internal errors are recorded and the
    /// loop continues; only store-open-level failures before the first
    /// iteration propagate.
    pub async fn start(&self) -> Result<()> {
        self.stop_requested.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        self.counters.lock().started_at = Some(Utc::now());

        let recovered = self.store.recover_stuck_items().await?;
        if recovered > 0 {
            info!(recovered, "Requeued items stuck in processing");
        }

        if self.store.list_queue().await?.is_empty() && self.store.list_programs().await?.is_empty()
        {
            let seeded = seed_known_programs(&self.store, &self.config.seeds_dir).await?;
            debug!(seeded, "Store was empty at startup");
        }

        info!(
            concurrency = self.config.concurrency,
            interval_ms = self.config.discovery_interval.as_millis() as u64,
            "Agent started"
        );

        let mut upgrade_check_counter = 0u32;
        while self.is_running() {
            if let Err(err) = self.process_queue().await {
                self.record_error("agent-loop", &err.to_string());
            }
            self.counters.lock().last_run_at = Some(Utc::now());

            upgrade_check_counter += 1;
            if upgrade_check_counter >= UPGRADE_CHECK_EVERY {
                upgrade_check_counter = 0;
                if let Err(err) = self.check_for_upgrades().await {
                    self.record_error("agent-loop", &err.to_string());
                }
            }

            if self.is_running() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.discovery_interval) => {}
                    _ = self.wake.notified() => {}
                }
            }
        }

        info!("Agent stopped");
        Ok(())
    }

    /// Drain a snapshot of the pending queue in batches of
    /// `concurrency`, settling every item in a batch before the next one
    /// starts. Item failures are recorded, never propagated.
    pub async fn process_queue(&self) -> Result<()> {
        let pending = self.store.pending_queue().await?;
        if pending.is_empty() {
            return Ok(());
        }
        debug!(pending = pending.len(), "Draining queue");

        for batch in pending.chunks(self.config.concurrency.max(1)) {
            join_all(batch.iter().map(|item| self.process_program_safe(item))).await;
            if self.stopped() {
                debug!("Stopped between batches");
                break;
            }
        }
        Ok(())
    }

    /// Isolation wrapper: any failure inside [`Agent::process_program`]
    /// marks the queue item failed, records a failed program entry, and
    /// feeds the error ring.
    async fn process_program_safe(&self, item: &QueueItem) {
        let program_id = item.program_id.as_str();
        if let Err(err) = self.process_program(program_id).await {
            let message = err.to_string();
            warn!(program_id, error = %message, "Program processing failed");

            if let Err(store_err) = self
                .store
                .update_queue_item_safe(
                    program_id,
                    QueueItemPatch {
                        status: Some(QueueStatus::Failed),
                        attempts: Some(item.attempts + 1),
                        last_error: Some(Some(message.clone())),
                    },
                )
                .await
            {
                warn!(program_id, error = %store_err, "Failed to record queue failure");
            }

            if let Err(store_err) = self.upsert_failed_program(program_id, &message).await {
                warn!(program_id, error = %store_err, "Failed to record program failure");
            }

            self.record_error(program_id, &message);
            self.counters.lock().total_processed += 1;
        }
    }

    async fn process_program(&self, program_id: &str) -> Result<()> {
        // A queue item that exhausted its retry budget is retired before
        // any further work is attempted.
        let item = self
            .store
            .list_queue()
            .await?
            .into_iter()
            .find(|item| item.program_id == program_id);
        if let Some(item) = &item {
            if item.attempts >= MAX_ATTEMPTS {
                let message = format!(
                    "Permanently failed after {MAX_ATTEMPTS} attempts: {}",
                    item.last_error.as_deref().unwrap_or("unknown error")
                );
                warn!(program_id, "Retiring program from queue");
                self.store.remove_from_queue_safe(program_id).await?;
                self.upsert_failed_program(program_id, &message).await?;
                self.record_error(program_id, &message);
                self.counters.lock().total_processed += 1;
                return Ok(());
            }
        }

        self.store
            .update_queue_item_safe(
                program_id,
                QueueItemPatch {
                    status: Some(QueueStatus::Processing),
                    ..Default::default()
                },
            )
            .await?;

        let cached = self.store.get_idl(program_id).await?;
        let idl_doc = match &cached {
            Some(entry) => entry.idl.clone(),
            None => {
                let account = self
                    .chain
                    .get_account(program_id)
                    .await?
                    .ok_or_else(|| {
                        SolDocsError::NotFound(format!("Program account {program_id} not found"))
                    })?;
                if !account.executable {
                    return Err(SolDocsError::InvalidIdl(format!(
                        "Account {program_id} is not an executable program"
                    )));
                }
                soldocs_chain::fetch_idl(self.chain.as_ref(), program_id)
                    .await?
                    .ok_or_else(|| {
                        SolDocsError::NotFound(format!(
                            "No IDL account found for program {program_id}"
                        ))
                    })?
            }
        };

        let prior_docs = self.store.get_documentation(program_id).await?;
        let entry = self.store.save_idl_safe(program_id, idl_doc.clone()).await?;

        // Unchanged IDL with docs already on disk: nothing to regenerate.
        if let (Some(prior), Some(_)) = (&cached, &prior_docs) {
            if prior.hash == entry.hash {
                info!(program_id, "IDL unchanged, keeping existing documentation");
                self.store.remove_from_queue_safe(program_id).await?;
                return Ok(());
            }
        }

        let doc = self
            .generator
            .generate(&idl_doc, program_id, &entry.hash)
            .await?;
        self.store.save_documentation_safe(doc.clone()).await?;

        let existing = self.store.get_program(program_id).await?;
        let now = Utc::now();
        self.store
            .save_program_safe(ProgramMetadata {
                program_id: program_id.to_string(),
                name: doc.name.clone(),
                description: clean_description(&doc.overview),
                instruction_count: idl::array_len(&idl_doc, "instructions"),
                account_count: idl::array_len(&idl_doc, "accounts"),
                status: ProgramStatus::Documented,
                idl_hash: entry.hash.clone(),
                created_at: existing.as_ref().map_or(now, |e| e.created_at),
                updated_at: now,
                error_message: None,
            })
            .await?;

        if let Some(url) = &self.config.webhook_url {
            if let Err(err) = notify_completion(&self.http, url, &doc).await {
                warn!(program_id, error = %err, "Webhook notification failed");
            }
        }

        self.store.remove_from_queue_safe(program_id).await?;
        self.counters.lock().total_processed += 1;
        info!(program_id, name = %doc.name, "Program documented");
        Ok(())
    }

    /// Record a failed program in the index, preserving `created_at` and
    /// any prior counts when the program was seen before.
    async fn upsert_failed_program(&self, program_id: &str, message: &str) -> Result<()> {
        let existing = self.store.get_program(program_id).await?;
        let now = Utc::now();
        let placeholder = format!("{}...", &program_id[..8.min(program_id.len())]);
        self.store
            .save_program_safe(ProgramMetadata {
                program_id: program_id.to_string(),
                name: placeholder,
                description: existing
                    .as_ref()
                    .map_or(String::new(), |e| e.description.clone()),
                instruction_count: existing.as_ref().map_or(0, |e| e.instruction_count),
                account_count: existing.as_ref().map_or(0, |e| e.account_count),
                status: ProgramStatus::Failed,
                idl_hash: existing.as_ref().map_or(String::new(), |e| e.idl_hash.clone()),
                created_at: existing.as_ref().map_or(now, |e| e.created_at),
                updated_at: now,
                error_message: Some(message.to_string()),
            })
            .await
    }

    /// Re-enqueue every documented program whose on-chain IDL hash drifted
    /// from the cached one. Per-program fetch errors only skip that
    /// program.
    async fn check_for_upgrades(&self) -> Result<()> {
        let documented: Vec<String> = self
            .store
            .list_programs()
            .await?
            .into_iter()
            .filter(|p| p.status == ProgramStatus::Documented)
            .map(|p| p.program_id)
            .collect();

        debug!(candidates = documented.len(), "Running upgrade check");
        for program_id in documented {
            if self.stopped() {
                break;
            }
            match soldocs_chain::fetch_idl(self.chain.as_ref(), &program_id).await {
                Ok(Some(fresh)) => {
                    let fresh_hash = idl::hash_idl(&fresh);
                    let cached = self.store.get_idl(&program_id).await?;
                    if cached.map_or(true, |entry| entry.hash != fresh_hash) {
                        info!(%program_id, "On-chain IDL changed, re-enqueueing");
                        self.store.add_to_queue_safe(&program_id).await?;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(%program_id, error = %err, "Upgrade check fetch failed");
                }
            }
        }
        Ok(())
    }

    /// Live view: store stats and queue length are re-derived on every
    /// call, and the result shares no state with the agent.
    pub async fn get_state(&self) -> Result<AgentState> {
        let stats = self.store.stats().await?;
        let queue_length = self.store.pending_queue().await?.len();
        let counters = self.counters.lock();
        Ok(AgentState {
            running: self.is_running(),
            programs_documented: stats.documented as u64,
            programs_failed: stats.failed as u64,
            total_processed: counters.total_processed,
            queue_length,
            started_at: counters.started_at,
            last_run_at: counters.last_run_at,
            recent_errors: counters.recent_errors.iter().cloned().collect(),
        })
    }

    fn record_error(&self, program_id: &str, message: &str) {
        let mut counters = self.counters.lock();
        counters.recent_errors.push_back(AgentError {
            program_id: program_id.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
        while counters.recent_errors.len() > ERROR_RING_CAP {
            counters.recent_errors.pop_front();
        }
    }
}

/// First 200 characters of the overview with markdown noise stripped.
fn clean_description(overview: &str) -> String {
    let flattened: String = overview
        .chars()
        .filter(|c| !matches!(c, '#' | '*'))
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect();
    flattened.trim().chars().take(200).collect()
}

/// Probe the RPC endpoint before the agent starts; a node we cannot reach
/// is a refusal to boot, a dubious LLM key only warns.
pub async fn validate_startup(
    chain: &dyn ChainRpc,
    rpc_url: &str,
    anthropic_api_key: &str,
) -> Result<()> {
    let version = chain.get_version().await.map_err(|err| {
        SolDocsError::Configuration(format!("Cannot reach Solana RPC at {rpc_url}: {err}"))
    })?;
    info!(%version, "Connected to Solana RPC");

    if !anthropic_api_key.starts_with("sk-ant-") {
        warn!("ANTHROPIC_API_KEY does not look like an Anthropic key");
    }
    Ok(())
}
