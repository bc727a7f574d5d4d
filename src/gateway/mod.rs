pub mod http;
pub mod simulated;
pub mod traits;
pub mod types;

use std::sync::Arc;

use anyhow::Result;

use crate::config::{Backend, Settings};

pub use http::HttpGateway;
pub use simulated::SimulatedGateway;
pub use traits::ChatGateway;
pub use types::{ConversationDetail, GatewayError, PushStream};

/// Pick the backend once, at startup.
pub fn build_gateway(settings: &Settings) -> Result<Arc<dyn ChatGateway>> {
    let gateway: Arc<dyn ChatGateway> = match settings.backend {
        Backend::Live => Arc::new(HttpGateway::new(settings.base_url()?)),
        Backend::Simulated => Arc::new(
            SimulatedGateway::new()
                .with_latency(settings.sim_latency())
                .with_reply_delay(Some(settings.sim_reply_delay())),
        ),
    };
    tracing::info!("Using {} gateway", gateway.name());
    Ok(gateway)
}
