//! Synthetic litterbox usage.
//!
//! Produces a week of plausible visits for one device: two to four visits
//! a day, clustered around mornings and evenings, each lasting between
//! thirty seconds and five minutes. Weights are what a scale under the
//! box would read, in pounds at 0.1 lb resolution.

use std::f64::consts::TAU;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use litterbox_types::{EdgeDeviceId, UsageEvent, UsageEventId};
use rand::Rng;

/// Weight of the empty box in pounds.
const EMPTY_BOX_WEIGHT: f64 = 5.0;

/// Shortest visit in seconds.
const MIN_SESSION_SECS: f64 = 30.0;

/// Longest visit in seconds.
const MAX_SESSION_SECS: f64 = 300.0;

/// Mean visit length in seconds.
const SESSION_MEAN_SECS: f64 = 120.0;

/// Standard deviation of the visit length in seconds.
const SESSION_STD_DEV_SECS: f64 = 60.0;

/// Visit periods as `(start hour, end hour, likelihood in percent)`.
const PERIODS: [(u32, u32, u32); 5] = [
    (6, 10, 30),  // morning
    (10, 16, 20), // midday
    (16, 20, 35), // evening
    (20, 24, 10), // early night
    (0, 6, 5),    // late night
];

/// Generate a week of events starting at `week_start`.
pub fn generate_week(
    rng: &mut impl Rng,
    device: EdgeDeviceId,
    week_start: DateTime<Utc>,
) -> Vec<UsageEvent> {
    let mut events = Vec::new();
    for day_offset in 0..7 {
        let Some(day) = week_start.checked_add_signed(TimeDelta::days(day_offset)) else {
            continue;
        };
        for enter_time in usage_times(rng, day) {
            let Some(exit_time) = enter_time.checked_add_signed(session_duration(rng)) else {
                continue;
            };
            let (weight_enter, weight_exit) = weights(rng);
            events.push(UsageEvent {
                id: UsageEventId::new(),
                source_device_id: device,
                enter_time,
                exit_time,
                weight_enter,
                weight_exit,
                created_at: Utc::now(),
            });
        }
    }
    tracing::info!(%week_start, records = events.len(), "generated week of usage");
    events
}

/// Enter times for one day, sorted.
///
/// `day` is expected to be a midnight.
pub fn usage_times(rng: &mut impl Rng, day: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let visits: u32 = rng.random_range(2..=4);
    let mut times: Vec<DateTime<Utc>> = (0..visits)
        .filter_map(|_| {
            let (start, end) = pick_period(rng.random_range(0..100));
            let hour: i64 = rng.random_range(i64::from(start)..i64::from(end));
            let minute: i64 = rng.random_range(0..60);
            let second: i64 = rng.random_range(0..60);
            day.checked_add_signed(TimeDelta::hours(hour))?
                .checked_add_signed(TimeDelta::minutes(minute))?
                .checked_add_signed(TimeDelta::seconds(second))
        })
        .collect();
    times.sort_unstable();
    times
}

/// Map a percentage roll onto a visit period.
fn pick_period(roll: u32) -> (u32, u32) {
    let mut cumulative = 0_u32;
    for (start, end, likelihood) in PERIODS {
        cumulative = cumulative.saturating_add(likelihood);
        if roll < cumulative {
            return (start, end);
        }
    }
    (0, 6)
}

/// Visit length drawn from a clamped normal distribution, whole seconds.
pub fn session_duration(rng: &mut impl Rng) -> TimeDelta {
    // Box-Muller; `1 - u` keeps the logarithm's argument in (0, 1].
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos();
    let secs = SESSION_STD_DEV_SECS
        .mul_add(z, SESSION_MEAN_SECS)
        .clamp(MIN_SESSION_SECS, MAX_SESSION_SECS);
    let whole = Duration::try_from_secs_f64(secs).map_or(120, |d| d.as_secs());
    TimeDelta::seconds(i64::try_from(whole).unwrap_or(120))
}

/// Scale readings for one visit as `(enter, exit)`.
///
/// On entry the scale carries the box, the litter and the cat; on exit
/// the box, the litter and whatever the cat left behind.
pub fn weights(rng: &mut impl Rng) -> (f64, f64) {
    let litter = rng.random_range(17.6..33.1);
    let cat = rng.random_range(6.6..13.2);

    let visit: u32 = rng.random_range(0..100);
    let waste = if visit < 70 {
        rng.random_range(0.011..0.033)
    } else if visit < 95 {
        rng.random_range(0.011..0.033) + rng.random_range(0.022..0.066)
    } else {
        rng.random_range(0.022..0.066)
    };

    let enter = round_tenth(EMPTY_BOX_WEIGHT + litter + cat);
    let exit = round_tenth(EMPTY_BOX_WEIGHT + litter + waste);
    (enter, exit)
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveDate, Timelike};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    fn midnight() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn two_to_four_sorted_visits_within_the_day() {
        let mut rng = SmallRng::seed_from_u64(7);
        let day = midnight();
        for _ in 0..200 {
            let times = usage_times(&mut rng, day);
            assert!((2..=4).contains(&times.len()));
            assert!(times.is_sorted());
            for t in &times {
                assert_eq!(t.date_naive(), day.date_naive());
            }
        }
    }

    #[test]
    fn periods_cover_every_roll() {
        for roll in 0..100 {
            let (start, end) = pick_period(roll);
            assert!(start < end);
        }
        assert_eq!(pick_period(0), (6, 10));
        assert_eq!(pick_period(99), (0, 6));
    }

    #[test]
    fn sessions_last_thirty_seconds_to_five_minutes() {
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..1000 {
            let secs = session_duration(&mut rng).num_seconds();
            assert!((30..=300).contains(&secs), "session of {secs}s");
        }
    }

    #[test]
    fn weights_are_rounded_and_exit_is_lighter() {
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..1000 {
            let (enter, exit) = weights(&mut rng);
            assert!(exit < enter);
            assert!(((enter * 10.0).round() - enter * 10.0).abs() < 1e-6);
            assert!(((exit * 10.0).round() - exit * 10.0).abs() < 1e-6);
            assert!((22.0..52.0).contains(&enter));
        }
    }

    #[test]
    fn week_spans_seven_days_for_one_device() {
        let mut rng = SmallRng::seed_from_u64(42);
        let device = EdgeDeviceId::new();
        let start = midnight();
        let events = generate_week(&mut rng, device, start);

        assert!((14..=28).contains(&events.len()));
        let end = start + TimeDelta::days(7);
        for event in &events {
            assert_eq!(event.source_device_id, device);
            assert!(event.enter_time >= start && event.enter_time < end);
            assert!(event.exit_time > event.enter_time);
            assert!(event.implausibility().is_none());
            assert_eq!(event.enter_time.nanosecond(), 0);
        }
    }
}
