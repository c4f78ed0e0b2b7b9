use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stratum_core::activities::Activities;
use stratum_core::analysis::{AnalysisSubOrchestrator, ImageGroupAnalyzer};
use stratum_core::completion::{AnthropicClient, CompletionClient};
use stratum_core::config::CompletionProvider;
use stratum_core::deliberation::CompletionPanel;
use stratum_core::imagery::{HttpImageryProcessor, ImagerySubOrchestrator};
use stratum_core::site::MemorySiteStore;
use stratum_core::{
    create_audit_system, load_config, validate_config, AuditEvent, AuditStore, Config,
    CorrelationEventBus, HttpWorkQueue, MemoryAuditStore, SiteOrchestrator,
    SiteProcessingWorkflow,
};

use stratum_server::{create_router, AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Audit records kept in memory for the `/audit` endpoint
const AUDIT_RETENTION: usize = 10_000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("STRATUM_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Work queue: {}", config.queue.endpoint);
    info!(
        "Completion model: {} ({:?})",
        config.completion.model, config.completion.provider
    );

    // Hash the sanitized form so secrets never reach the audit trail
    let config_json = serde_json::to_string(&stratum_core::SanitizedConfig::from(&config))
        .unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    let audit_store: Arc<dyn AuditStore> = Arc::new(MemoryAuditStore::new(AUDIT_RETENTION));
    let (audit_handle, audit_writer) = create_audit_system(
        Arc::clone(&audit_store),
        config.orchestrator.audit_buffer_size,
    );
    let writer_handle = tokio::spawn(audit_writer.run());

    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;
    info!("Emitted ServiceStarted audit event");

    let workflow = build_workflow(&config)?;
    let orchestrator = Arc::new(SiteOrchestrator::new(
        config.orchestrator.clone(),
        workflow,
        Some(audit_handle.clone()),
    ));
    info!("Site orchestrator started");

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&orchestrator),
        audit_store,
    ));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Stopping orchestrator...");
    orchestrator.stop().await;

    info!("Server shutting down...");
    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // The writer drains once every AuditHandle clone is gone, and the
    // orchestrator holds one.
    drop(orchestrator);
    drop(audit_handle);

    let _ = writer_handle.await;
    info!("Audit writer stopped");

    Ok(())
}

/// Wire the collaborators named in `config` into a workflow.
fn build_workflow(config: &Config) -> Result<SiteProcessingWorkflow> {
    let store = Arc::new(MemorySiteStore::new());
    let activities = Activities::from_store(store);
    info!("Using in-memory site store");

    let queue = HttpWorkQueue::new(
        config.queue.endpoint.clone(),
        Duration::from_secs(config.queue.timeout_secs),
    )
    .context("Failed to create work queue client")?;
    let bus = Arc::new(CorrelationEventBus::new(
        Arc::new(queue),
        config.queue.blob_container_url.clone(),
    ));

    let completion = &config.completion;
    let client: Arc<dyn CompletionClient> = match completion.provider {
        CompletionProvider::Anthropic => {
            let mut client = AnthropicClient::new(&completion.api_key, &completion.model)
                .with_timeout(Duration::from_secs(completion.timeout_secs));
            if let Some(ref api_base) = completion.api_base {
                client = client.with_api_base(api_base);
            }
            Arc::new(client)
        }
    };

    let analyzer = ImageGroupAnalyzer::new(Arc::clone(&client))
        .with_max_tokens(completion.max_tokens)
        .with_temperature(completion.temperature);
    let panel = CompletionPanel::new(client)
        .with_max_tokens(completion.max_tokens)
        .with_temperature(completion.temperature);
    let analysis = AnalysisSubOrchestrator::new(analyzer, Arc::new(panel), activities.clone())
        .with_max_rounds(config.deliberation.max_rounds)
        .with_scoring(config.scoring.clone());

    let mut workflow = SiteProcessingWorkflow::new(bus, activities.clone(), Arc::new(analysis));

    match (&config.imagery.endpoint, config.imagery.enabled) {
        (Some(endpoint), true) => {
            let processor = HttpImageryProcessor::new(
                endpoint.clone(),
                Duration::from_secs(config.imagery.timeout_secs),
            )
            .context("Failed to create imagery processor client")?;
            info!("Satellite imagery enabled via {}", endpoint);
            workflow = workflow.with_imagery(Arc::new(ImagerySubOrchestrator::new(
                Arc::new(processor),
                activities,
            )));
        }
        (None, true) => warn!("Imagery enabled but no endpoint configured, skipping imagery"),
        (_, false) => info!("Satellite imagery disabled in config"),
    }

    Ok(workflow)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
