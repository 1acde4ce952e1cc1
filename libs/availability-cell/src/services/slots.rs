use chrono::{Duration, NaiveTime};

use crate::models::{TimeSlot, BOOKING_INTERVAL_MINUTES};

/// Candidate booking start times for one window: every grid point from
/// `start_time` strictly before `end_time`. Pure and restartable, so a
/// listing can be recomputed at any point without drift.
pub fn bookable_times(slot: &TimeSlot) -> Vec<NaiveTime> {
    let step = Duration::minutes(BOOKING_INTERVAL_MINUTES);
    let mut times = Vec::new();
    let mut current = slot.start_time;

    while current < slot.end_time {
        times.push(current);
        match current.overflowing_add_signed(step) {
            // overflow means we wrapped past midnight
            (next, 0) => current = next,
            (_, _) => break,
        }
    }

    times
}

/// Merge the grids of several windows on the same day, ascending. Windows
/// never overlap (the overlap checker enforces that at write time) so no
/// dedup is needed.
pub fn merge_bookable_times(slots: &[TimeSlot]) -> Vec<NaiveTime> {
    let mut times: Vec<NaiveTime> = slots.iter().flat_map(|s| bookable_times(s)).collect();
    times.sort();
    times
}
