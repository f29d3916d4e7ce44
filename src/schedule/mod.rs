pub mod store;
pub mod types;

use crate::error::{Error, Result};
use store::ScheduleStore;
use tracing::warn;
pub use types::Schedule;

pub const SEND_INTERVAL: &str = "SEND_INTERVAL";
pub const NEXT_SEND: &str = "NEXT_SEND";
pub const SEND_EVERY: &str = "SEND_EVERY";

/// Builds the schedule from the three persisted settings.
pub fn load(store: &dyn ScheduleStore) -> Result<Schedule> {
    let send_every = require(store, SEND_EVERY)?;
    let interval = require(store, SEND_INTERVAL)?;
    let next_call = require(store, NEXT_SEND)?;
    let schedule = Schedule::parse(&send_every, &interval, &next_call)?;
    if !schedule.is_reachable() {
        warn!(
            granularity = %schedule.granularity,
            next_call = schedule.next_call,
            "{} is outside the {} range and will never match",
            NEXT_SEND,
            schedule.granularity
        );
    }
    Ok(schedule)
}

/// Writes the advanced `next_call` back. Only the `NEXT_SEND` field changes.
pub fn persist(store: &mut dyn ScheduleStore, schedule: &Schedule) -> Result<()> {
    store.write(NEXT_SEND, &schedule.next_call.to_string())
}

fn require(store: &dyn ScheduleStore, key: &str) -> Result<String> {
    store
        .read(key)?
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Configuration(format!("{key} is not set ({})", store.location())))
}
