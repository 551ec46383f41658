use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::engine::lifecycle::RequestLifecycle;
use crate::engine::matcher::DispatchMatcher;
use crate::engine::queue::RematchJob;
use crate::engine::registry::DriverAvailabilityRegistry;
use crate::observability::metrics::Metrics;
use crate::service::TransportService;

pub struct AppState {
    pub config: Config,
    pub service: TransportService,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> (Self, mpsc::Receiver<RematchJob>) {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Builds an isolated registry, lifecycle and matcher around `clock`.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> (Self, mpsc::Receiver<RematchJob>) {
        let (rematch_tx, rematch_rx) = mpsc::channel(config.rematch_queue_size);
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let metrics = Metrics::new();

        let registry = Arc::new(DriverAvailabilityRegistry::new(
            clock.clone(),
            config.dispatch.staleness_window,
        ));
        let lifecycle = Arc::new(RequestLifecycle::new(registry.clone(), clock.clone()));
        let matcher = DispatchMatcher::new(
            registry.clone(),
            lifecycle.clone(),
            config.dispatch.radius_steps_km.clone(),
        );

        let service = TransportService::new(
            registry,
            lifecycle,
            matcher,
            config.tariffs.clone(),
            config.dispatch.clone(),
            clock,
            events_tx,
            rematch_tx,
            metrics.clone(),
        );

        (
            Self {
                config,
                service,
                metrics,
            },
            rematch_rx,
        )
    }
}
