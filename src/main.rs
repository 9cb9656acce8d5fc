use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use tracing::info;

use siftwork::classify::MagicClassifier;
use siftwork::pool::ThreadPool;
use siftwork::task::{Priority, RunEnv, SystemClock, Task};
use siftwork::tasks::builtin_registry;
use siftwork::tasks::raw::RAW_TASK_NAME;
use siftwork::{Scheduler, cli, config, logging};

fn main() -> Result<()> {
    logging::init_logging();

    let cli_opts = cli::parse();
    let loaded = config::load_config(cli_opts.config_path.as_deref())?;
    let mut cfg = loaded.config;
    if let Some(workers) = cli_opts.workers {
        cfg.workers = workers;
    }
    if let Some(output) = cli_opts.output.as_ref() {
        cfg.results_file = output.to_string_lossy().into_owned();
    }

    let registry = Arc::new(builtin_registry()?);
    cfg.validate_modifiers(&registry);
    let cfg = Arc::new(cfg);

    info!(
        "starting run_id={} config_hash={} input={} workers={}",
        cfg.run_id,
        loaded.config_hash,
        cli_opts.input.display(),
        cfg.worker_count()
    );

    let env = Arc::new(RunEnv {
        registry: Arc::clone(&registry),
        classifier: Arc::new(MagicClassifier),
        config: Arc::clone(&cfg),
        clock: Arc::new(SystemClock),
    });
    let pool = ThreadPool::new(cfg.worker_count(), env);

    let mut scheduler = Scheduler::new(Box::new(pool), Arc::clone(&registry), Arc::clone(&cfg));
    let stop = scheduler.stop_flag();
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::Relaxed);
    })
    .context("cannot install interrupt handler")?;

    let seed = Task::resolve(
        &registry,
        RAW_TASK_NAME,
        &cli_opts.input,
        cli_opts.offset,
        Priority::from(cli_opts.priority),
    )?;
    scheduler.enqueue(seed);
    scheduler.run()?;

    let results_path = PathBuf::from(&cfg.results_file);
    let results = scheduler.into_results();
    results.save(&results_path)?;
    info!(
        "siftwork run finished: {} results written to {}",
        results.len(),
        results_path.display()
    );
    Ok(())
}
