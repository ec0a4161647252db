use betcache_api::{create_router, ApiState};
#[cfg(not(feature = "rocksdb"))]
use betcache_storage::InMemoryStorage;
#[cfg(feature = "rocksdb")]
use betcache_storage::RocksDBStorage;
use betcache_storage::Storage;
use betcache_watcher::{Indexer, WatcherConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

fn get_storage_path() -> PathBuf {
    std::env::var("STORAGE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./data"))
}

fn get_bind_addr() -> String {
    std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string())
}

fn init_storage() -> Result<Arc<dyn Storage>, Box<dyn std::error::Error>> {
    #[cfg(feature = "rocksdb")]
    {
        let path = get_storage_path();
        std::fs::create_dir_all(&path)
            .map_err(|e| format!("Failed to create storage directory: {}", e))?;

        info!(path = %path.display(), "opening RocksDB storage");
        let storage = RocksDBStorage::open(&path)
            .map_err(|e| format!("Failed to open RocksDB storage: {:?}", e))?;

        Ok(Arc::new(storage))
    }

    #[cfg(not(feature = "rocksdb"))]
    {
        info!(
            ignored_path = %get_storage_path().display(),
            "using in-memory storage (rocksdb feature disabled)"
        );
        Ok(Arc::new(InMemoryStorage::new()))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let storage = init_storage()?;

    let config = WatcherConfig::default();
    info!(
        rpc_url = %config.rpc_url,
        factory = %config.factory_address,
        poll_interval_seconds = config.poll_interval_seconds,
        "starting indexer"
    );
    let indexer = Indexer::from_config(config, storage)?;

    let height = indexer
        .chain()
        .current_height()
        .await
        .map_err(|e| format!("Chain RPC unreachable at startup: {:#}", e))?;
    info!(height, checkpoint = ?indexer.cache().checkpoint()?, "connected to chain");

    let app = create_router(Arc::new(ApiState::from_indexer(&indexer)));

    let bind_addr = get_bind_addr();
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "API server listening");

    let server_handle = tokio::spawn(async move { axum::serve(listener, app).await });
    let (poller_handle, housekeeping_handle) = indexer.start();

    tokio::select! {
        result = server_handle => {
            result??;
        }
        _ = poller_handle => {
            error!("Poller task stopped unexpectedly");
        }
        _ = housekeeping_handle => {
            error!("Housekeeping task stopped unexpectedly");
        }
    }

    if let Err(e) = indexer.cache().flush() {
        error!(error = %e, "failed to flush storage on shutdown");
    }

    Ok(())
}
