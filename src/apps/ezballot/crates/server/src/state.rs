use ezballot_core::{ResultsSummary, VoteCoordinator};
use std::sync::Arc;
use tokio::sync::{Notify, watch};

use crate::election::{Election, Registration};
use crate::refresh::ResultsRefresher;

/// Shared state handed to every API handler.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<VoteCoordinator>,
    pub registration: Option<Registration>,
    pub results: watch::Receiver<Arc<ResultsSummary>>,
    pub refresh: Arc<Notify>,
}

impl AppState {
    pub fn new(election: &Election, refresher: &ResultsRefresher) -> Self {
        Self {
            coordinator: Arc::clone(&election.coordinator),
            registration: election.registration.clone(),
            results: refresher.subscribe(),
            refresh: refresher.trigger(),
        }
    }

    /// The most recently published results.
    pub fn latest_results(&self) -> Arc<ResultsSummary> {
        Arc::clone(&self.results.borrow())
    }
}
