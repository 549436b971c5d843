use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::{value_parser, Arg, Command};
use config::{Config, File as ConfigFile};
use namereg_registry::{
    ExpirationSweeper, IdentityRegistry, LookupEngine, RegistrySettings, SnapshotManager,
};
use namereg_rpc::AppState;
use namereg_storage::{KeyLocks, KvStore, SledKvStore};
use namereg_types::NetworkDef;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Node configuration, layered defaults-then-file through the `config` crate.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct NodeConfig {
    node_id: String,
    rpc_host: String,
    rpc_port: u16,
    db_path: String,
    snapshot_dir: String,
    sweep_interval_secs: u64,
    snapshot_interval_secs: u64,
    max_snapshots: usize,
    log_level: String,
    networks: Vec<NetworkEntry>,
    disallowed_names: Vec<String>,
}

/// One derivable network, with its id as a hex string (e.g. "0x404eff").
#[derive(Debug, Clone, Deserialize)]
struct NetworkEntry {
    name: String,
    id: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "namereg-node".into(),
            rpc_host: "127.0.0.1".into(),
            rpc_port: 8180,
            db_path: "./data/db".into(),
            snapshot_dir: "./data/snapshots".into(),
            sweep_interval_secs: 1,
            snapshot_interval_secs: 600,
            max_snapshots: 100,
            log_level: "info".into(),
            networks: vec![
                NetworkEntry {
                    name: "backbone".into(),
                    id: "0x0404202200000000".into(),
                },
                NetworkEntry {
                    name: "kelvpn".into(),
                    id: "0x1807202300000000".into(),
                },
            ],
            disallowed_names: Vec::new(),
        }
    }
}

impl NodeConfig {
    fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        builder = match path {
            Some(path) => builder.add_source(ConfigFile::with_name(path)),
            None => builder.add_source(ConfigFile::with_name("config/namereg").required(false)),
        };
        let config = builder.build().context("failed to load configuration")?;
        config
            .try_deserialize()
            .context("configuration file is invalid")
    }

    fn registry_settings(&self) -> Result<RegistrySettings> {
        let mut networks = Vec::with_capacity(self.networks.len());
        for net in &self.networks {
            let raw = net.id.trim_start_matches("0x");
            let net_id = u64::from_str_radix(raw, 16).with_context(|| {
                format!("invalid network id '{}' for network '{}'", net.id, net.name)
            })?;
            networks.push(NetworkDef {
                name: net.name.clone(),
                net_id,
            });
        }
        Ok(RegistrySettings {
            networks,
            disallowed_names: self.disallowed_names.clone(),
        })
    }

    fn snapshot_manager(
        &self,
        store: Arc<dyn KvStore>,
        locks: Arc<KeyLocks>,
    ) -> Result<SnapshotManager> {
        SnapshotManager::new(
            store,
            locks,
            &self.snapshot_dir,
            Duration::from_secs(self.snapshot_interval_secs),
            self.max_snapshots,
        )
        .with_context(|| format!("failed to open snapshot directory {}", self.snapshot_dir))
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn cli() -> Command {
    Command::new("namereg-node")
        .about("Name-to-identity registry node")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Path to a TOML configuration file"),
        )
        .subcommand(Command::new("run").about("Run the registry node (default)"))
        .subcommand(Command::new("snapshots").about("List available snapshots, newest first"))
        .subcommand(
            Command::new("restore")
                .about("Restore the registry from a snapshot (destructive bulk overwrite)")
                .arg(
                    Arg::new("index")
                        .long("index")
                        .value_parser(value_parser!(usize))
                        .default_value("0")
                        .help("Snapshot index as printed by `snapshots` (0 = newest)"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let config = NodeConfig::load(config_path)?;
    init_tracing(&config.log_level);

    match matches.subcommand() {
        Some(("snapshots", _)) => list_snapshots(&config),
        Some(("restore", sub)) => {
            let index = sub.get_one::<usize>("index").copied().unwrap_or(0);
            restore_snapshot(&config, index)
        }
        _ => run_node(config).await,
    }
}

async fn run_node(config: NodeConfig) -> Result<()> {
    let settings = Arc::new(config.registry_settings()?);
    let sled = Arc::new(
        SledKvStore::new(&config.db_path)
            .with_context(|| format!("failed to open store at {}", config.db_path))?,
    );
    let store: Arc<dyn KvStore> = sled.clone();
    let locks = Arc::new(KeyLocks::default());

    let registry = Arc::new(IdentityRegistry::new(
        store.clone(),
        locks.clone(),
        settings.clone(),
    ));
    let lookups = Arc::new(LookupEngine::new(store.clone(), settings.clone()));
    let sweeper = ExpirationSweeper::new(
        store.clone(),
        locks.clone(),
        Duration::from_secs(config.sweep_interval_secs.max(1)),
    );
    let snapshots = config.snapshot_manager(store, locks)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper_task = tokio::spawn(sweeper.run(shutdown_rx.clone()));
    let snapshot_task = tokio::spawn(snapshots.run(shutdown_rx));

    let rpc_addr = format!("{}:{}", config.rpc_host, config.rpc_port);
    let state = AppState {
        registry,
        lookups,
        node_id: config.node_id.clone(),
        start_time: Instant::now(),
        req_count: Arc::new(AtomicUsize::new(0)),
    };
    let rpc_handle = {
        let rpc_addr = rpc_addr.clone();
        tokio::spawn(async move {
            if let Err(err) = namereg_rpc::start_server(state, &rpc_addr).await {
                error!("RPC server error: {err}");
            }
        })
    };

    info!("namereg node is ready");
    info!("RPC API available at: http://{rpc_addr}");
    info!("Node ID: {}", config.node_id);

    tokio::signal::ctrl_c().await?;
    info!("shutting down namereg node");

    let _ = shutdown_tx.send(true);
    let _ = sweeper_task.await;
    let _ = snapshot_task.await;
    rpc_handle.abort();

    sled.flush()?;
    info!("namereg node shutdown complete");
    Ok(())
}

fn open_snapshot_manager(config: &NodeConfig) -> Result<(Arc<SledKvStore>, SnapshotManager)> {
    let sled = Arc::new(
        SledKvStore::new(&config.db_path)
            .with_context(|| format!("failed to open store at {}", config.db_path))?,
    );
    let store: Arc<dyn KvStore> = sled.clone();
    let manager = config.snapshot_manager(store, Arc::new(KeyLocks::default()))?;
    Ok((sled, manager))
}

fn list_snapshots(config: &NodeConfig) -> Result<()> {
    let (_, manager) = open_snapshot_manager(config)?;
    let snapshots = manager.list_snapshots()?;
    if snapshots.is_empty() {
        println!("No snapshots found in {}", config.snapshot_dir);
        return Ok(());
    }
    for (index, path) in snapshots.iter().enumerate() {
        println!("{index}: {}", path.display());
    }
    Ok(())
}

fn restore_snapshot(config: &NodeConfig, index: usize) -> Result<()> {
    let (sled, manager) = open_snapshot_manager(config)?;
    let snapshots = manager.list_snapshots()?;
    if snapshots.is_empty() {
        return Err(anyhow!("no snapshots found in {}", config.snapshot_dir));
    }
    let path = snapshots.get(index).ok_or_else(|| {
        anyhow!(
            "invalid index {index}, available range: 0-{}",
            snapshots.len() - 1
        )
    })?;
    manager.restore(path)?;
    sled.flush()?;
    println!("Restored registry from {}", path.display());
    Ok(())
}
