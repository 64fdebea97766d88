use clap::Parser;
use tracing::info;

use hlsgate::GatewayConfig;
use hlsgate_server::api::server::{ApiServer, AppState, ServerConfig};
use hlsgate_server::logging;

/// Transcoding-aware HLS reverse proxy.
#[derive(Parser, Debug)]
#[command(name = "hlsgate", version, about, long_about = None)]
struct Args {
    /// Bind address
    #[arg(long, default_value = "0.0.0.0", env = "HLSGATE_BIND")]
    bind: String,

    /// Listen port
    #[arg(short, long, default_value_t = 8787, env = "HLSGATE_PORT")]
    port: u16,

    /// Disable the permissive CORS layer
    #[arg(long)]
    no_cors: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let args = Args::parse();
    let server_config = ServerConfig {
        bind_address: args.bind,
        port: args.port,
        enable_cors: !args.no_cors,
    };

    let state = AppState::new(GatewayConfig::default());
    let server = ApiServer::new(server_config, state);

    let cancel = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            cancel.cancel();
        }
    });

    server.run().await
}
