//! Server setup and shared state.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use hlsgate::cache::spawn_sweeper;
use hlsgate::{GatewayConfig, PoolManager, SegmentCache};

use crate::api::routes;

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable permissive CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8787,
            enable_cors: true,
        }
    }
}

/// Shared application state. The cache and the pool registry are the
/// process-wide singletons; handlers reach them through clones of this
/// state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    pub config: Arc<GatewayConfig>,
    pub cache: Arc<SegmentCache>,
    pub pools: Arc<PoolManager>,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Self {
        let cache = Arc::new(SegmentCache::new(config.cache.clone()));
        let pools = Arc::new(PoolManager::new(config.pool.clone()));
        Self {
            start_time: Instant::now(),
            config: Arc::new(config),
            cache,
            pools,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

/// The relay's HTTP server.
pub struct ApiServer {
    config: ServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    fn build_router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router.layer(TraceLayer::new_for_http())
    }

    /// Bind, start the cache sweeper, and serve until the cancel token
    /// fires. Pools are drained on the way out.
    pub async fn run(&self) -> anyhow::Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid bind address: {e}"))?;

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "hlsgate listening");

        spawn_sweeper(Arc::clone(&self.state.cache), self.cancel_token.clone());

        let cancel = self.cancel_token.clone();
        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        self.state.pools.close_all();
        Ok(())
    }
}
