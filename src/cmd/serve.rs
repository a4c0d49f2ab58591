//! HTTP server command — `trofos serve`.

use anyhow::Result;
use trofos::config::TrofosConfig;
use trofos::tracker::server::{ServerConfig, start_server};

pub async fn cmd_serve(config: &TrofosConfig) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
    start_server(ServerConfig::from(config)).await
}
