//! Prepcore · learning engine HTTP host
//!
//! - Axum JSON API under /api/v1
//! - Optional OpenAI question generation (via environment variables)
//!
//! Important env variables:
//!   PORT                  : u16 (default 3000)
//!   OPENAI_API_KEY        : enables question generation if present
//!   OPENAI_BASE_URL       : default "https://api.openai.com/v1"
//!   OPENAI_MODEL          : default "gpt-4o-mini"
//!   PREPCORE_CONFIG_PATH  : path to TOML config (access policy, review mapping, catalog bank)
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::{error, info};

use prepcore::routes::build_router;
use prepcore::state::AppState;
use prepcore::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let state = match AppState::from_env().await {
    Ok(s) => Arc::new(s),
    Err(e) => {
      error!(target: "prepcore", error = %e, "Startup failed");
      return Err(e.into());
    }
  };

  let app = build_router(state);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "prepcore", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!(target: "prepcore", error = %e, "Failed to listen for shutdown signal");
    return;
  }
  info!(target: "prepcore", "Shutdown signal received");
}
