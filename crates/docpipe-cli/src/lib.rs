//! Command-line interface for docpipe: worker loops over the three
//! processing queues, a local upload smoke test, and schema migration.
//! `main.rs` only maps [`run`]'s result to a process exit code; every
//! command's actual logic lives here, the same split the teacher's
//! `src/main.rs`/`src/cli.rs` uses.

mod backends;
mod rules_file;

use clap::{Parser, Subcommand};
use docpipe_config::RuntimeConfig;
use docpipe_orchestrator::{IdentityPageRenderer, LocalFsObjectStore, ObjectStore, OcrWorker, PipelineWorker, PushWorker};
use docpipe_queue::QueueFabric;
use docpipe_store::JobStore;
use docpipe_types::job::{Job, RuleRef};
use docpipe_utils::{DocpipeError, ExitCode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "docpipe")]
#[command(about = "Intelligent document processing pipeline: OCR, extraction, audit gate, sandbox, webhooks")]
#[command(version)]
pub struct Cli {
    /// Path to the TOML config file (defaults to discovering `docpipe.toml`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// JSON file of rule versions, pipelines, and webhook bindings
    /// consumed by the worker commands (rule/webhook CRUD is out of
    /// scope for this CLI; see DESIGN.md).
    #[arg(long, global = true)]
    pub rules_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one stage-worker loop until interrupted.
    Worker {
        #[arg(value_enum)]
        stage: Stage,

        /// Stop after this many empty polls (mainly for tests/smoke runs).
        #[arg(long)]
        max_idle_polls: Option<u32>,
    },

    /// Submit a local file as a queued job (dedup + enqueue smoke test).
    Upload {
        file: PathBuf,

        #[arg(long)]
        rule: String,

        #[arg(long)]
        rule_version: String,
    },

    /// Apply the queue/job-store schema migration and exit.
    Migrate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Stage {
    Ocr,
    Pipeline,
    Push,
}

/// Parse arguments and run the selected command.
///
/// # Errors
/// Returns the [`ExitCode`] to exit the process with on any failure;
/// `main.rs` only maps it to `std::process::exit`, it does not print.
pub fn run() -> Result<(), ExitCode> {
    docpipe_utils::logging::init();
    let cli = Cli::parse();
    let rt = tokio::runtime::Runtime::new().map_err(|e| {
        eprintln!("failed to start async runtime: {e}");
        ExitCode::OTHER
    })?;
    rt.block_on(dispatch(cli)).map_err(|e| {
        eprintln!("error: {e}");
        e.to_exit_code()
    })
}

async fn dispatch(cli: Cli) -> docpipe_utils::Result<()> {
    let config_path = cli.config.clone().or_else(RuntimeConfig::discover_path);
    let config = RuntimeConfig::load(config_path.as_deref())?;

    match cli.command {
        Commands::Migrate => {
            JobStore::connect(&config.queue.dsn).await?;
            QueueFabric::connect(&config.queue.dsn).await?;
            tracing::info!("schema migration complete");
            Ok(())
        }
        Commands::Upload { file, rule, rule_version } => upload(&config, &file, &rule, &rule_version).await,
        Commands::Worker { stage, max_idle_polls } => run_worker(cli.rules_file.as_deref(), &config, stage, max_idle_polls).await,
    }
}

async fn upload(config: &RuntimeConfig, file: &PathBuf, rule: &str, rule_version: &str) -> docpipe_utils::Result<()> {
    let bytes = std::fs::read(file).map_err(DocpipeError::Io)?;
    let content_hash = docpipe_types::content_hash(&bytes);

    let store = JobStore::connect(&config.queue.dsn).await?;
    let queue = QueueFabric::connect(&config.queue.dsn).await?;

    let filename = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "upload".to_string());

    if let Some(source) = store.find_dedup_source(&content_hash, rule, rule_version).await? {
        let clone = Job::new_instant_clone(
            instant_clone_job_id(),
            filename,
            source.object_key.clone(),
            content_hash,
            source.page_count,
            RuleRef { rule_id: rule.to_string(), rule_version: rule_version.to_string() },
            &source,
            chrono::Utc::now(),
        );
        store.insert_queued(&clone).await?;
        tracing::info!(job_id = %clone.id, source_job_id = %source.id, "duplicate upload, instant-cloned prior extraction");
        println!("{}", clone.id);
        return Ok(());
    }

    let object_key = format!("{}/{filename}", chrono::Utc::now().format("%Y/%m/%d"));
    let objects = LocalFsObjectStore::new(PathBuf::from("./object_store"));
    objects.put(&object_key, &bytes).await?;

    let job_id = content_hash_short(&content_hash);
    let job = Job::new_queued(
        job_id.clone(),
        filename,
        object_key,
        content_hash,
        1,
        RuleRef { rule_id: rule.to_string(), rule_version: rule_version.to_string() },
        chrono::Utc::now(),
    );
    store.insert_queued(&job).await?;
    queue.publish(docpipe_queue::QueueName::Ocr, &serde_json::json!({"job_id": job_id}), Duration::ZERO).await?;

    tracing::info!(job_id = %job.id, "queued");
    println!("{}", job.id);
    Ok(())
}

fn content_hash_short(hash: &[u8; 32]) -> String {
    hash.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// Instant-clone job ids can't reuse `content_hash_short` (deterministic
/// from the content hash alone, so it would collide with the source
/// job's id) — a random id is fine since the clone is looked up by
/// `(content_hash, rule_id, rule_version)`, not by id.
fn instant_clone_job_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

async fn run_worker(
    rules_file: Option<&std::path::Path>,
    config: &RuntimeConfig,
    stage: Stage,
    max_idle_polls: Option<u32>,
) -> docpipe_utils::Result<()> {
    let (rules, webhooks) = rules_file::load(rules_file)?;
    let store = JobStore::connect(&config.queue.dsn).await?;
    let queue = QueueFabric::connect(&config.queue.dsn).await?;
    let owner = format!("{}-{}", stage_name(stage), std::process::id());

    match stage {
        Stage::Ocr => {
            let primary = backends::build_ocr_backend(config.ocr.backend, &config.ocr);
            let fallback = config.ocr.fallback_backend.map(|kind| backends::build_ocr_backend(kind, &config.ocr));
            let parallelism = if backends::requires_serial_access(config.ocr.backend) { 1 } else { config.ocr.parallelism };
            let llm = backends::build_llm_backend(config)?;
            let llm_model = config.llm.as_ref().map(|l| l.model.clone()).unwrap_or_default();
            let llm_timeout = Duration::from_secs(config.llm.as_ref().map_or(60, |l| l.timeout_secs));
            let llm_vision_model = config.llm.as_ref().and_then(|l| l.vision_model.clone());
            let worker = OcrWorker::new(
                queue,
                store,
                rules,
                Arc::new(LocalFsObjectStore::new(PathBuf::from("./object_store"))),
                Arc::new(IdentityPageRenderer),
                primary,
                fallback,
                parallelism,
                config.ocr.page_separator.clone(),
                llm,
                llm_model,
                llm_timeout,
                llm_vision_model,
                owner,
            );
            poll_loop(max_idle_polls, || worker.claim_and_process()).await
        }
        Stage::Pipeline => {
            let worker = PipelineWorker::new(queue, store, rules, config.sandbox.interpreter.clone(), config.sandbox.retry_delay_cap_secs, owner);
            poll_loop(max_idle_polls, || worker.claim_and_process()).await
        }
        Stage::Push => {
            let worker = PushWorker::new(
                queue,
                store,
                webhooks,
                Arc::new(LocalFsObjectStore::new(PathBuf::from("./object_store"))),
                reqwest::Client::new(),
                config.erp.clone(),
                config.push.retry_delays_secs.clone(),
                config.push.retry_max,
                Duration::from_secs(config.push.timeout_secs),
                Duration::from_secs(config.push.presign_ttl_secs),
                owner,
            );
            poll_loop(max_idle_polls, || worker.claim_and_process()).await
        }
    }
}

fn stage_name(stage: Stage) -> &'static str {
    match stage {
        Stage::Ocr => "ocr-worker",
        Stage::Pipeline => "pipeline-worker",
        Stage::Push => "push-worker",
    }
}

/// Polls `claim_and_process` until `max_idle_polls` consecutive empty
/// polls occur (never, when `None`), sleeping briefly between empty
/// polls so an idle worker does not busy-loop.
async fn poll_loop<F, Fut>(max_idle_polls: Option<u32>, mut claim_and_process: F) -> docpipe_utils::Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = docpipe_utils::Result<bool>>,
{
    let mut idle_polls = 0u32;
    loop {
        if claim_and_process().await? {
            idle_polls = 0;
        } else {
            idle_polls += 1;
            if max_idle_polls.is_some_and(|max| idle_polls >= max) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}
