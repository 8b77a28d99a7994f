use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dotenvy::dotenv;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use taskmill::config::Config;
use taskmill::local_queue::LocalTaskQueue;
use taskmill::processor::NoopTaskProcessor;
use taskmill::producer::{LoopingProducer, RunOutcome};
use taskmill::queue::TaskQueue;
use taskmill::simulation::{SimulatedScanStrategy, SimulatedStore};
use taskmill::state::StateManager;
use taskmill::worker_pool::WorkerPool;

/// Dry-run driver: sweeps a simulated content store into an in-memory queue
/// and drains it with noop workers. Exercises the full produce/consume loop
/// without touching real storage.
#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    init_tracing();

    let cfg_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = Config::load(cfg_path)?;
    info!("starting taskmill dry run with config {:?}", cfg);

    let queue = Arc::new(LocalTaskQueue::new(
        &cfg.queue_name,
        cfg.visibility_timeout(),
    ));
    let dyn_queue: Arc<dyn TaskQueue> = queue.clone();

    let store = Arc::new(RwLock::new(seed_store()));
    let strategy = SimulatedScanStrategy::new(store, cfg.nibble_batch_size);
    let state = StateManager::load(&cfg.state_path)?;
    let mut producer = LoopingProducer::new(
        strategy,
        dyn_queue.clone(),
        state,
        cfg.max_task_queue_size,
        cfg.frequency,
    )
    .with_path_filter(cfg.path_filter()?);

    let mut pool = WorkerPool::new(
        dyn_queue.clone(),
        Arc::new(NoopTaskProcessor::new()),
        cfg.worker_pool_config(),
    );
    pool.start();

    // backpressure rounds resume once the pool drains the queue
    loop {
        match producer.run().await? {
            RunOutcome::Completed => break,
            RunOutcome::NotDue => {
                info!("next run not yet due; nothing to do");
                break;
            }
            RunOutcome::Backpressured => sleep(Duration::from_millis(500)).await,
        }
    }

    while dyn_queue.size().await? > 0 || queue.in_flight_count().await > 0 {
        sleep(Duration::from_millis(200)).await;
    }
    pool.shutdown().await;

    info!(
        "dry run complete: {} tasks processed, cumulative stats {:?}",
        queue.completed_count().await,
        producer.cumulative_stats()
    );
    Ok(())
}

fn seed_store() -> SimulatedStore {
    let mut store = SimulatedStore::new();
    for (account, space, count) in [
        ("alpha", "images", 2500usize),
        ("alpha", "documents", 800),
        ("beta", "archive", 1200),
    ] {
        let ids = (0..count).map(|i| format!("content-{i:06}")).collect();
        store.add_space(account, space, ids);
    }
    store.add_replica_orphans("beta", "archive", vec!["stale-000001".into()]);
    store
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();
}
