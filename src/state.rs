use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::engine::notify::{LogNotifier, Notifier};
use crate::models::tracking::LocationSample;
use crate::observability::metrics::Metrics;
use crate::relay::directory::SubscriptionDirectory;
use crate::store::drivers::DriverRegistry;
use crate::store::orders::OrderStore;
use crate::store::prescriptions::{InMemoryPrescriptionLedger, PrescriptionLedger};

/// Process-wide service state. Built once at startup and shared behind an `Arc`.
pub struct AppState {
    pub config: Config,
    pub orders: OrderStore,
    pub drivers: DriverRegistry,
    pub prescriptions: Arc<dyn PrescriptionLedger>,
    pub directory: SubscriptionDirectory,
    pub location_tx: mpsc::Sender<LocationSample>,
    pub notifier: Arc<dyn Notifier>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> (Self, mpsc::Receiver<LocationSample>) {
        let (location_tx, location_rx) = mpsc::channel(config.location_queue_size);
        let metrics = Metrics::new();
        let directory = SubscriptionDirectory::new(config.subscriber_buffer_size, metrics.clone());

        (
            Self {
                config,
                orders: OrderStore::new(),
                drivers: DriverRegistry::new(),
                prescriptions: Arc::new(InMemoryPrescriptionLedger::new()),
                directory,
                location_tx,
                notifier: Arc::new(LogNotifier),
                metrics,
            },
            location_rx,
        )
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_prescriptions(mut self, ledger: Arc<dyn PrescriptionLedger>) -> Self {
        self.prescriptions = ledger;
        self
    }
}
