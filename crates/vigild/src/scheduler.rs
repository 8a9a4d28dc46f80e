//! Generation scheduler.
//!
//! A single periodic timer drives the due-check across all enabled
//! auto-generate services. Each claimed service's generation runs on
//! its own worker task so the tick loop never blocks on one service,
//! and the store-level due claim guarantees a service is never
//! double-triggered within one due window. No failure on this path is
//! allowed to stop the next tick.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use vigil_common::store::MonitorDb;
use vigil_common::synth;

pub struct GenerationScheduler {
    db: Arc<MonitorDb>,
    tick: Duration,
    /// Workers currently generating, for observability only. The
    /// correctness guard is the persisted due claim.
    in_flight: Arc<AtomicUsize>,
}

impl GenerationScheduler {
    pub fn new(db: Arc<MonitorDb>, tick: Duration) -> Self {
        Self {
            db,
            tick,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run the periodic due-check until the task is dropped.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.tick_once().await;
        }
    }

    /// One due-check pass: claim every due service and dispatch each
    /// claimed one to a worker. Returns the number dispatched.
    pub async fn tick_once(&self) -> usize {
        let now = Utc::now();
        let candidates = match self.db.generation_candidates() {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("Due-check could not list services: {e:#}");
                return 0;
            }
        };

        let mut dispatched = 0;
        for service in candidates {
            let claimed = match self.db.claim_due(service.id, now) {
                Ok(claimed) => claimed,
                Err(e) => {
                    warn!(service = %service.name, "Due claim failed: {e:#}");
                    continue;
                }
            };
            let Some(service) = claimed else {
                continue;
            };

            debug!(service = %service.name, "Service due, dispatching generation worker");
            dispatched += 1;
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            let db = self.db.clone();
            let in_flight = self.in_flight.clone();
            tokio::spawn(async move {
                let mut rng = StdRng::from_entropy();
                if let Err(e) = synth::generate_for_service(&db, &service, now, &mut rng) {
                    warn!(service = %service.name, "Generation cycle failed: {e:#}");
                }
                in_flight.fetch_sub(1, Ordering::SeqCst);
            });
        }
        dispatched
    }
}
