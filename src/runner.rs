use crate::coordinator::PollingCoordinator;
use crate::error::Result;
use crate::intake::BulkIntakeProcessor;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, info_span, Instrument};

struct IntakeLoop {
    processor: Arc<BulkIntakeProcessor>,
    dir: PathBuf,
    interval: Duration,
}

/// Drives the polling pass and bulk intake on their own intervals.
///
/// Each loop awaits its task before taking the next tick, so neither task
/// overlaps itself; the two loops run independently of each other.
pub struct Runner {
    coordinator: PollingCoordinator,
    poll_interval: Duration,
    intake: Option<IntakeLoop>,
}

impl Runner {
    pub fn new(coordinator: PollingCoordinator, poll_interval: Duration) -> Self {
        Self {
            coordinator,
            poll_interval,
            intake: None,
        }
    }

    pub fn with_intake(
        mut self,
        processor: BulkIntakeProcessor,
        dir: PathBuf,
        interval: Duration,
    ) -> Self {
        self.intake = Some(IntakeLoop {
            processor: Arc::new(processor),
            dir,
            interval,
        });
        self
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut loops = Vec::new();

        let coordinator = self.coordinator;
        loops.push(tokio::spawn(run_periodic(
            "polling",
            self.poll_interval,
            shutdown.clone(),
            move || {
                let coordinator = coordinator.clone();
                async move {
                    if let Err(e) = coordinator.run_pass().await {
                        error!("Polling pass failed: {}", e);
                    }
                }
            },
        )));

        if let Some(intake) = self.intake {
            info!("Bulk intake enabled for {}", intake.dir.display());
            let IntakeLoop {
                processor,
                dir,
                interval,
            } = intake;
            loops.push(tokio::spawn(run_periodic(
                "intake",
                interval,
                shutdown.clone(),
                move || {
                    let processor = processor.clone();
                    let dir = dir.clone();
                    async move {
                        if let Err(e) = processor.process_dir(&dir).await {
                            error!("Bulk intake sweep failed: {}", e);
                        }
                    }
                },
            )));
        } else {
            info!("Bulk intake disabled");
        }

        for handle in loops {
            if let Err(e) = handle.await {
                error!("Periodic task ended abnormally: {}", e);
            }
        }
        info!("Runner stopped");
        Ok(())
    }
}

async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    task: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut run = 0u64;

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                run += 1;
                task().instrument(info_span!("periodic", task = name, run)).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("{} loop stopped after {} run(s)", name, run);
}
