//! Engine lifecycle logging.

use crate::metrics;
use bayeux_core::{Engine, Event};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Log every engine event and keep the engine gauges current.
pub fn spawn(engine: Engine) -> JoinHandle<()> {
    let mut events = engine.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    log_event(&event);
                    metrics::record_event(event.name());
                    metrics::set_engine_stats(&engine.stats());
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event observer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &Event) {
    match event {
        Event::Handshake { client_id } => info!(client = %client_id, "Handshake"),
        Event::Disconnect { client_id } => info!(client = %client_id, "Disconnect"),
        Event::Close { client_id } => debug!(client = %client_id, "Client closed"),
        Event::Subscribe { client_id, channel } => {
            info!(client = %client_id, channel = %channel, "Subscribe");
        }
        Event::Unsubscribe { client_id, channel } => {
            info!(client = %client_id, channel = %channel, "Unsubscribe");
        }
        Event::ConnectionOpen { client_id } => debug!(client = %client_id, "Connection open"),
        Event::ConnectionClose { client_id } => debug!(client = %client_id, "Connection close"),
        Event::Publish {
            client_id, channel, ..
        } => debug!(client = ?client_id, channel = %channel, "Publish"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bayeux_core::EngineConfig;

    #[tokio::test]
    async fn test_observer_runs_until_aborted() {
        let engine = Engine::new(EngineConfig::default());
        let handle = spawn(engine.clone());

        let id = engine.create_client();
        engine.subscribe(&id, "/chat");
        tokio::task::yield_now().await;

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
