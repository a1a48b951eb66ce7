//! Media acquisition worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vfetch_queue::{JobBroker, QueueConfig, RedisBroker, RedisStatusStore, StatusStore};
use vfetch_worker::{
    metrics, JobExecutor, JobProcessor, JobRunner, KeyPool, LoggingObserver, WorkerConfig,
};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vfetch=info".parse().unwrap())
        .add_directive("hyper=warn".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vfetch-worker");

    // Load configuration
    let config = WorkerConfig::from_env();
    let queue_config = QueueConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        match metrics::init_metrics(port) {
            Ok(()) => info!("Serving metrics on port {}", port),
            Err(e) => warn!("Failed to start metrics exporter: {}", e),
        }
    }

    let broker: Arc<dyn JobBroker> = match RedisBroker::new(queue_config.clone()) {
        Ok(b) => Arc::new(b),
        Err(e) => {
            error!("Failed to create job broker: {}", e);
            std::process::exit(1);
        }
    };

    let store: Arc<dyn StatusStore> = match RedisStatusStore::new(&queue_config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to create status store: {}", e);
            std::process::exit(1);
        }
    };

    let search_keys = JobProcessor::search_key_pool(&config);
    let ai_keys = KeyPool::new("OpenAI", config.ai_api_keys.clone());
    info!(
        search_keys = search_keys.lock().await.len(),
        ai_keys = ai_keys.len(),
        "Key pools loaded"
    );

    let processor = JobProcessor::from_config(&config, search_keys);
    let runner = JobRunner::new(Arc::new(processor), Arc::clone(&broker), store)
        .with_observer(Arc::new(LoggingObserver))
        .with_retry_base_delay(config.retry_base_delay)
        .with_time_limits(config.soft_time_limit, config.hard_time_limit);

    let executor = Arc::new(JobExecutor::new(config, broker, runner));

    // Setup signal handlers
    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    // Run executor
    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
