// ===================================================================================================
// objmesh - Erasure-Coded Distributed Object Storage
// ===================================================================================================
//
// Boot wrapper: parses the role subcommand, loads configuration, wires the
// heartbeat publisher/consumer/sweeper background tasks, and starts the
// selected role's HTTP service.
use std::sync::Arc;

use clap::Parser;
use objmesh::bus::{self, Bus, FileBus};
use objmesh::cli::{Cli, Commands, RoleArgs};
use objmesh::codec::Codec;
use objmesh::config::Config;
use objmesh::error::ObjResult;
use objmesh::frontend_service::FrontendState;
use objmesh::index::Index;
use objmesh::logging;
use objmesh::membership::{self, Membership};
use objmesh::router;
use objmesh::storage_service::StorageState;

fn apply_role_args(mut config: Config, args: &RoleArgs) -> Config {
    if let Some(listen) = &args.listen {
        config.network.listen_addr = listen.clone();
    }
    if let Some(base_dir) = &args.base_dir {
        config.storage.base_dir = base_dir.clone();
    }
    if let Some(tmp_dir) = &args.tmp_dir {
        config.storage.tmp_dir = tmp_dir.clone();
    } else if args.base_dir.is_some() || args.listen.is_some() {
        config.storage.tmp_dir = config.node_dir();
    }
    config
}

#[tokio::main]
async fn main() -> ObjResult<()> {
    logging::init_logging_safe();

    let cli = Cli::parse();
    match cli.command {
        Commands::Frontend(args) => run_frontend(args).await,
        Commands::Storage(args) => run_storage(args).await,
    }
}

async fn run_frontend(args: RoleArgs) -> ObjResult<()> {
    let config = apply_role_args(Config::load_or_default(args.config.clone())?, &args);
    let node_dir = config.node_dir();
    tokio::fs::create_dir_all(&node_dir).await?;
    tokio::fs::create_dir_all(&config.storage.tmp_dir).await?;

    let index_path = args.index_path.clone().unwrap_or_else(|| node_dir.join("index"));
    let index = Index::open(&index_path)?;

    let codec = Arc::new(Codec::new(config.storage.data_shards, config.storage.parity_shards)?);
    let peers = Arc::new(Membership::new(config.peer_ttl()));
    let bus = make_bus(&config);

    spawn_heartbeat_tasks(
        bus.clone(),
        peers.clone(),
        &config,
        bus::HB_API_SERVERS,
        bus::HB_DATA_SERVERS,
    );

    let state = FrontendState::new(
        config.network.listen_addr.clone(),
        node_dir,
        config.storage.tmp_dir.clone(),
        index,
        peers,
        codec,
    );

    let app = router::frontend_router(state, config.read_timeout());
    serve(&config.network.listen_addr, app).await
}

async fn run_storage(args: RoleArgs) -> ObjResult<()> {
    let config = apply_role_args(Config::load_or_default(args.config.clone())?, &args);
    let node_dir = config.node_dir();
    tokio::fs::create_dir_all(&node_dir).await?;
    tokio::fs::create_dir_all(&config.storage.tmp_dir).await?;

    let index_path = args.index_path.clone().unwrap_or_else(|| node_dir.join("index"));
    let index = Index::open(&index_path)?;

    let peers = Arc::new(Membership::new(config.peer_ttl()));
    let bus = make_bus(&config);

    spawn_heartbeat_tasks(
        bus.clone(),
        peers.clone(),
        &config,
        bus::HB_DATA_SERVERS,
        bus::HB_API_SERVERS,
    );

    let state = StorageState::new(
        config.network.listen_addr.clone(),
        node_dir,
        config.storage.tmp_dir.clone(),
        index,
    );

    let app = router::storage_router(state, config.read_timeout());
    serve(&config.network.listen_addr, app).await
}

/// Builds this process's `Bus` handle: a `FileBus` rooted at
/// `<base_dir>/bus/`, polling at half the heartbeat interval so a peer's
/// latest heartbeat is picked up well within `PEER_TTL`. Both roles are
/// shipped as separate OS processes (cli.rs's `frontend`/`storage`
/// subcommands), so an in-process channel can't carry heartbeats between
/// them — only `InProcessBus` (used by the test harness, which runs both
/// roles in one process) could get away with that.
fn make_bus(config: &Config) -> Arc<dyn Bus> {
    Arc::new(FileBus::new(config.bus_root(), config.heartbeat_interval() / 2))
}

/// Starts this node's heartbeat publisher on `own_topic`, a consumer on
/// `peer_topic` feeding `membership`, and the periodic staleness sweep
/// (spec.md §4.6).
fn spawn_heartbeat_tasks(
    bus: Arc<dyn Bus>,
    membership: Arc<Membership>,
    config: &Config,
    own_topic: &'static str,
    peer_topic: &'static str,
) {
    membership::log_startup(&config.network.listen_addr);
    let publisher = membership::HeartbeatPublisher::new(
        bus.clone(),
        own_topic,
        config.network.listen_addr.clone(),
        config.heartbeat_interval(),
        config.bus.warn_count,
    );
    tokio::spawn(async move { publisher.run().await });

    let channel = membership::channel_name(peer_topic, &config.network.listen_addr);
    let subscription = bus.subscribe(peer_topic, &channel);
    let consumer_membership = membership.clone();
    tokio::spawn(membership::run_consumer(consumer_membership, subscription));

    tokio::spawn(membership::run_sweeper(membership, config.sweep_interval()));
}

async fn serve(listen_addr: &str, app: axum::Router) -> ObjResult<()> {
    tracing::info!("listening on {}", listen_addr);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| objmesh::error::ObjError::Generic(e.to_string()))
}
