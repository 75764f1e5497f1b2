use std::sync::Arc;

use tokio::sync::broadcast;

use crate::clock::Clock;
use crate::config::Config;
use crate::models::route::StopEvent;
use crate::observability::metrics::Metrics;
use crate::storage::Storage;

pub struct AppState {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub storage: Storage,
    pub stop_events_tx: broadcast::Sender<StopEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config, clock: Arc<dyn Clock>) -> Self {
        let (stop_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size.max(1));

        Self {
            config,
            clock,
            storage: Storage::new(),
            stop_events_tx,
            metrics: Metrics::new(),
        }
    }
}
