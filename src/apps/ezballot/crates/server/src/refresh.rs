//! Periodic results publication.
//!
//! The dashboard polls results on an interval, so the service keeps one
//! precomputed [`ResultsSummary`] and swaps in a fresh one every tick, and
//! right after each accepted vote.

use ezballot_core::{ResultsPublisher, ResultsSummary};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

pub struct ResultsRefresher {
    publisher: ResultsPublisher,
    period: Duration,
    trigger: Arc<Notify>,
    tx: watch::Sender<Arc<ResultsSummary>>,
}

impl ResultsRefresher {
    pub fn new(publisher: ResultsPublisher, period: Duration) -> Self {
        let (tx, _) = watch::channel(Arc::new(publisher.summary()));
        Self {
            publisher,
            period,
            trigger: Arc::new(Notify::new()),
            tx,
        }
    }

    /// Receiver that always holds the latest published summary.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ResultsSummary>> {
        self.tx.subscribe()
    }

    /// Notify this to publish immediately.
    pub fn trigger(&self) -> Arc<Notify> {
        Arc::clone(&self.trigger)
    }

    /// Recompute and publish the summary now.
    pub fn publish(&self) {
        let summary = self.publisher.summary();
        debug!(
            version = summary.version,
            total_votes = summary.total_votes,
            "Publishing results"
        );
        self.tx.send_replace(Arc::new(summary));
    }

    /// Run the refresh loop until `shutdown` is notified.
    pub fn spawn(self, shutdown: Arc<Notify>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = self.trigger.notified() => {}
                    _ = shutdown.notified() => break,
                }
                self.publish();
            }
            debug!("Results refresher stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ezballot_core::{
        Candidate, CandidateId, CandidateSet, MemoryJournal, OpenEligibility, ReceiptSigner,
        VoteCoordinator, VoterIdentity,
    };

    fn coordinator() -> Arc<VoteCoordinator> {
        let candidates =
            CandidateSet::new([Candidate::new(1, "A", "P"), Candidate::new(2, "B", "Q")]).unwrap();
        Arc::new(
            VoteCoordinator::open(
                candidates,
                OpenEligibility,
                MemoryJournal::new(),
                ReceiptSigner::generate(),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn trigger_publishes_new_summary() {
        let coordinator = coordinator();
        let refresher = ResultsRefresher::new(coordinator.publisher(None), Duration::from_secs(3600));
        let mut rx = refresher.subscribe();
        let trigger = refresher.trigger();
        let shutdown = Arc::new(Notify::new());
        let task = refresher.spawn(Arc::clone(&shutdown));

        assert_eq!(rx.borrow_and_update().total_votes, 0);

        coordinator
            .submit_vote(&VoterIdentity::new("x1").unwrap(), CandidateId(2))
            .unwrap();
        trigger.notify_one();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                rx.changed().await.unwrap();
                if rx.borrow_and_update().total_votes == 1 {
                    break;
                }
            }
        })
        .await
        .unwrap();

        let summary = rx.borrow().clone();
        assert_eq!(summary.leader.as_ref().unwrap().candidate_id, CandidateId(2));

        shutdown.notify_one();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn interval_publishes_periodically() {
        let coordinator = coordinator();
        let refresher = ResultsRefresher::new(coordinator.publisher(None), Duration::from_secs(30));
        let mut rx = refresher.subscribe();
        let shutdown = Arc::new(Notify::new());
        let task = refresher.spawn(Arc::clone(&shutdown));

        coordinator
            .submit_vote(&VoterIdentity::new("x1").unwrap(), CandidateId(1))
            .unwrap();

        // The first tick fires immediately; later ones every 30s.
        tokio::time::sleep(Duration::from_secs(31)).await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().total_votes, 1);

        shutdown.notify_one();
        task.await.unwrap();
    }
}
