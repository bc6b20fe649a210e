use async_trait::async_trait;
use tracing::{info, warn};

use crate::events::{AutomintStatus, EngineEvent, EventListener};

/// Forwards engine events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl TracingListener {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventListener for TracingListener {
    async fn handle_event(
        &mut self,
        event: &EngineEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match event {
            EngineEvent::Automint(AutomintStatus::Failed { reason }) => {
                warn!(reason = %reason, "Automint failed")
            }
            EngineEvent::Automint(AutomintStatus::Minting {
                denomination,
                amount,
            }) => info!(denomination = %denomination, amount, "Automint minting"),
            other => info!(event = other.event_type(), "{}", other.to_json()?),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "TracingListener"
    }
}
