//! topo-operator: mirrors topology Kind resources into onos-topo.
//!
//! This daemon:
//! - Keeps its resource store in line with a manifest file
//! - Adds the topo finalizer to every Kind
//! - Creates a KIND object in onos-topo for every live Kind
//! - Deletes the object before releasing the finalizer of a deleted Kind

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use topo_operator::clients::GrpcConnector;
use topo_operator::config::{
    OperatorConfig, TopoEndpoint, DEFAULT_FINALIZER, DEFAULT_TOPO_PORT, DEFAULT_TOPO_SERVICE,
};
use topo_operator::controller::{BackoffConfig, Controller, ControllerConfig};
use topo_operator::reconciler::KindReconciler;
use topo_operator::scheme::Scheme;
use topo_operator::store::MemoryStore;
use topo_operator::{manifest, Kind};

/// topo-operator
#[derive(Parser, Debug)]
#[command(name = "topo-operator", version, about)]
struct Args {
    /// JSON manifest of Kind resources to keep in the store
    #[arg(long, env = "TOPO_OPERATOR_MANIFESTS")]
    manifests: Option<PathBuf>,

    /// Seconds between manifest re-reads; Kinds dropped from the manifest are deleted
    #[arg(long, env = "TOPO_OPERATOR_MANIFEST_INTERVAL", default_value = "30")]
    manifest_interval: u64,

    /// Name of the onos-topo service, resolved as <service>.<namespace>
    #[arg(long, env = "TOPO_SERVICE", default_value = DEFAULT_TOPO_SERVICE)]
    topo_service: String,

    /// onos-topo gRPC port
    #[arg(long, env = "TOPO_PORT", default_value_t = DEFAULT_TOPO_PORT)]
    topo_port: u16,

    /// Fixed onos-topo endpoint (e.g., http://[::1]:5150), overrides service resolution
    #[arg(long, env = "TOPO_ADDRESS")]
    topo_address: Option<String>,

    /// Finalizer token owned by this operator
    #[arg(long, default_value = DEFAULT_FINALIZER)]
    finalizer: String,

    /// Number of concurrent reconcile workers
    #[arg(long, default_value = "4")]
    workers: usize,

    /// Connect timeout for onos-topo in seconds
    #[arg(long, default_value = "5")]
    connect_timeout: u64,

    /// Deadline of a single reconcile in seconds
    #[arg(long, default_value = "30")]
    reconcile_timeout: u64,

    /// Initial requeue backoff in milliseconds
    #[arg(long, default_value = "100")]
    backoff_base_ms: u64,

    /// Maximum requeue backoff in seconds
    #[arg(long, default_value = "300")]
    backoff_max: u64,
}

impl Args {
    fn config(&self) -> OperatorConfig {
        OperatorConfig {
            finalizer: self.finalizer.clone(),
            topo: TopoEndpoint {
                service: self.topo_service.clone(),
                port: self.topo_port,
                address: self.topo_address.clone(),
                connect_timeout: Duration::from_secs(self.connect_timeout),
            },
            controller: ControllerConfig {
                workers: self.workers,
                reconcile_timeout: Duration::from_secs(self.reconcile_timeout),
                backoff: BackoffConfig {
                    base: Duration::from_millis(self.backoff_base_ms),
                    max: Duration::from_secs(self.backoff_max),
                },
                ..Default::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "topo_operator=info,tonic=warn,tower=warn,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.config();
    config.validate().context("Invalid configuration")?;

    info!("Starting topo-operator");
    match &config.topo.address {
        Some(address) => info!("onos-topo endpoint: {}", address),
        None => info!(
            "onos-topo endpoint: {}.<namespace>:{}",
            config.topo.service, config.topo.port
        ),
    }

    let scheme = Arc::new(Scheme::builder().register::<Kind>().build());
    let store = Arc::new(MemoryStore::<Kind>::new());
    let connector = Arc::new(GrpcConnector::new(config.topo.clone()));
    let reconciler = Arc::new(KindReconciler::new(
        store.clone(),
        connector,
        config.finalizer.clone(),
    ));

    info!("Kinds are finalized with {}", reconciler.finalizer());

    let controller = Controller::new(config.controller.clone(), reconciler);
    let watch = controller.watch(store.subscribe(), store.clone());
    info!("Controller {} watching Kinds", controller.name());

    let cancel = CancellationToken::new();

    let mut sync = None;
    if let Some(path) = args.manifests.clone() {
        let kinds: Vec<Kind> = manifest::load(&path, &scheme)
            .with_context(|| format!("Failed to load manifests from {}", path.display()))?;
        info!("Loaded {} Kinds from {}", kinds.len(), path.display());
        manifest::apply(&store, kinds)
            .await
            .context("Failed to store manifest Kinds")?;

        if args.manifest_interval > 0 {
            sync = Some(tokio::spawn(sync_manifests(
                path,
                Duration::from_secs(args.manifest_interval),
                scheme.clone(),
                store.clone(),
                cancel.clone(),
            )));
        }
    }

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown requested");
                    cancel.cancel();
                }
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
        });
    }

    controller.run(cancel).await;
    watch.abort();
    if let Some(sync) = sync {
        sync.abort();
    }

    Ok(())
}

/// Re-read the manifest every `period` and apply it to the store.
async fn sync_manifests(
    path: PathBuf,
    period: Duration,
    scheme: Arc<Scheme>,
    store: Arc<MemoryStore<Kind>>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately; startup already applied the manifest.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let kinds: Vec<Kind> = match manifest::load(&path, &scheme) {
                    Ok(kinds) => kinds,
                    Err(e) => {
                        warn!("Failed to reload manifests from {}: {}", path.display(), e);
                        continue;
                    }
                };
                match manifest::apply(&store, kinds).await {
                    Ok(summary) if summary.created + summary.deleted > 0 => info!(
                        "Manifest applied: {} created, {} deleted",
                        summary.created, summary.deleted
                    ),
                    Ok(_) => debug!("Manifest unchanged"),
                    Err(e) => error!("Failed to apply manifests: {}", e),
                }
            }
            _ = cancel.cancelled() => {
                info!("Manifest sync stopping");
                break;
            }
        }
    }
}
