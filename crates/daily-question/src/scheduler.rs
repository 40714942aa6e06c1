//! Daily trigger for `open_round`.

use std::sync::Arc;

use chrono::{DateTime, Days, FixedOffset, NaiveTime, TimeZone, Utc};
use round_coordination::{OpenOutcome, RoundMachine};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A wall-clock time of day in a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
    offset: FixedOffset,
}

impl DailySchedule {
    pub fn new(at: NaiveTime, offset: FixedOffset) -> Self {
        Self { at, offset }
    }

    pub fn at(&self) -> NaiveTime {
        self.at
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// The first fire time strictly after `now`.
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset);
        let today = local.date_naive().and_time(self.at);
        let candidate = if today > local.naive_local() {
            today
        } else {
            // `checked_add_days` only fails at the end of chrono's range.
            today.checked_add_days(Days::new(1)).unwrap_or(today)
        };
        self.offset
            .from_local_datetime(&candidate)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now)
    }
}

/// Open one round, logging the outcome.
pub async fn fire(machine: &RoundMachine) {
    match machine.open_round().await {
        Ok(OpenOutcome::Opened {
            generation,
            question,
        }) => info!(generation, question = %question, "Scheduled round opened"),
        Ok(OpenOutcome::GenerationFailed { reason }) => {
            warn!(reason = %reason, "Scheduled round skipped")
        }
        Err(e) => error!(error = %e, "Scheduled round failed"),
    }
}

/// Fire once per day until `cancel` is triggered.
pub async fn run_daily(
    machine: Arc<RoundMachine>,
    schedule: DailySchedule,
    cancel: CancellationToken,
) {
    loop {
        let now = Utc::now();
        let next = schedule.next_fire_after(now);
        let delay = (next - now).to_std().unwrap_or_default();
        info!(next = %next.with_timezone(&schedule.offset), "Next question scheduled");

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Scheduler stopped");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        fire(&machine).await;
    }
}
