//! lighthoused — Lighthouse service-mesh registry daemon.
//!
//! Providers stake and register service cards over the registry-rpc
//! protocol; clients locate them through the same protocol or the
//! read-only REST API, then connect to providers directly.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use iroh::protocol::Router;
use iroh::{Endpoint, RelayMode, SecretKey};

use lighthouse_api::{ApiState, NodeIdentity};
use lighthouse_core::addr::{multiaddr_for_socket, with_peer};
use lighthouse_core::config::LighthouseConfig;
use lighthouse_core::protocol::REGISTRY_ALPN;
use lighthouse_core::stake::ReplayGuard;
use lighthouse_services::semantic::QdrantIndex;
use lighthouse_services::state::RegistryState;
use lighthouse_services::store::RedisStore;

use lighthoused::rpc::{RegistryNode, RegistryRpcHandler};
use lighthoused::{advertise, gc, keys, restore};

/// TTL on durable records: one liveness window plus slack, so Redis
/// drops what the evictor would have dropped even if we crash first.
const REDIS_RECORD_TTL: Duration = Duration::from_secs(120);

#[derive(Debug, Parser)]
#[command(name = "lighthoused", about = "Lighthouse service-mesh registry daemon")]
struct Args {
    /// P2P listen port.
    #[arg(long)]
    port: Option<u16>,

    /// REST API port (avoid restricted ports like 6000).
    #[arg(long = "api-port")]
    api_port: Option<u16>,

    /// Extra DHT bootstrap node, host:port.
    #[arg(long)]
    bootstrap: Option<String>,

    /// Path to a 32-byte key file (e.g. registry.key); generated when
    /// missing. Without this flag the identity is ephemeral.
    #[arg(long)]
    key: Option<PathBuf>,

    /// LAN/dev mode: run without relay servers.
    #[arg(long)]
    dev: Option<bool>,

    /// Minimum stake required to register.
    #[arg(long = "min-stake")]
    min_stake: Option<f64>,

    /// Enable the Qdrant semantic index.
    #[arg(long = "qdrant-enabled")]
    qdrant_enabled: bool,

    /// Qdrant base URL.
    #[arg(long = "qdrant-url")]
    qdrant_url: Option<String>,

    /// Qdrant collection name.
    #[arg(long = "qdrant-collection")]
    qdrant_collection: Option<String>,

    /// Redis address (host:port) — if set, registrations are stored in
    /// both memory and Redis.
    #[arg(long)]
    redis: Option<String>,
}

impl Args {
    fn apply(self, config: &mut LighthouseConfig) {
        if let Some(port) = self.port {
            config.network.p2p_port = port;
        }
        if let Some(port) = self.api_port {
            config.network.api_port = port;
        }
        if let Some(bootstrap) = self.bootstrap {
            config.network.bootstrap = bootstrap;
        }
        if let Some(key) = self.key {
            config.identity.key_file = key;
        }
        if let Some(dev) = self.dev {
            config.network.dev_mode = dev;
        }
        if let Some(min_stake) = self.min_stake {
            config.stake.min_stake = min_stake;
        }
        if self.qdrant_enabled {
            config.semantic.enabled = true;
        }
        if let Some(url) = self.qdrant_url {
            config.semantic.url = url;
        }
        if let Some(collection) = self.qdrant_collection {
            config.semantic.collection = collection;
        }
        if let Some(redis) = self.redis {
            config.store.redis_addr = redis;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = match LighthouseConfig::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "failed to load config file, using defaults");
            LighthouseConfig::default()
        }
    };
    args.apply(&mut config);

    let secret_key = if config.identity.key_file.as_os_str().is_empty() {
        SecretKey::generate(&mut rand_core::OsRng)
    } else {
        keys::load_or_generate(&config.identity.key_file)?
    };

    let relay_mode = if config.network.dev_mode {
        RelayMode::Disabled
    } else {
        RelayMode::Default
    };
    let endpoint = Endpoint::builder()
        .secret_key(secret_key)
        .relay_mode(relay_mode)
        .bind_addr_v4(SocketAddrV4::new(
            Ipv4Addr::UNSPECIFIED,
            config.network.p2p_port,
        ))
        .bind()
        .await
        .context("failed to bind iroh endpoint")?;

    let semantic = if config.semantic.enabled
        && !config.semantic.url.is_empty()
        && !config.semantic.collection.is_empty()
    {
        tracing::info!(
            url = %config.semantic.url,
            collection = %config.semantic.collection,
            "qdrant semantic index enabled"
        );
        Some(Arc::new(QdrantIndex::new(
            &config.semantic.url,
            &config.semantic.collection,
        )?))
    } else {
        None
    };

    let store = if config.store.redis_addr.is_empty() {
        None
    } else {
        let store = RedisStore::connect(&config.store.redis_addr, REDIS_RECORD_TTL)
            .await
            .context("failed to initialize redis storage")?;
        Some(store)
    };

    let node = Arc::new(RegistryNode {
        state: Arc::new(RegistryState::new()),
        replay: ReplayGuard::new(),
        min_stake: config.stake.min_stake,
        store,
        semantic: semantic.clone(),
    });

    if let Err(err) = restore::restore_state(&node).await {
        tracing::warn!(error = %err, "failed to restore state from redis");
    }

    let router = Router::builder(endpoint.clone())
        .accept(REGISTRY_ALPN, RegistryRpcHandler::new(node.clone()))
        .spawn();

    let peer_id = endpoint.node_id().to_string();
    let multiaddrs: Vec<String> = endpoint
        .bound_sockets()
        .into_iter()
        .map(|socket| multiaddr_for_socket(&socket))
        .collect();
    tracing::info!(peer_id = %peer_id, min_stake = config.stake.min_stake, "REGISTRY ONLINE");
    for addr in &multiaddrs {
        tracing::info!(addr = %with_peer(addr, &peer_id), "listening");
    }

    // Advertise existence so providers and clients can find us.
    let advertise_task = {
        let bootstrap = (!config.network.bootstrap.is_empty())
            .then_some(config.network.bootstrap.as_str());
        let dht = advertise::start_dht(bootstrap).context("failed to start DHT client")?;
        let node_id = *endpoint.node_id().as_bytes();
        tokio::spawn(advertise::advertise_loop(dht, node_id))
    };

    let gc_task = tokio::spawn(gc::gc_loop(node.clone()));

    let api_task = {
        let api_state = ApiState {
            state: node.state.clone(),
            semantic,
            node: NodeIdentity {
                peer_id,
                multiaddrs,
            },
        };
        let api_port = config.network.api_port;
        tokio::spawn(async move {
            if let Err(err) = lighthouse_api::serve(api_state, api_port).await {
                tracing::error!(error = %err, "REST API server failed");
            }
        })
    };

    tokio::select! {
        r = advertise_task => tracing::error!("advertise task exited: {:?}", r),
        r = gc_task        => tracing::error!("gc task exited: {:?}", r),
        r = api_task       => tracing::error!("api task exited: {:?}", r),
    }

    let _ = router.shutdown().await;
    Ok(())
}
