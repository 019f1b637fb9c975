//! Release planning.
//!
//! Turns a total quantity and a number of release days into a minute-level
//! [`ReleasePlan`]. Days share the total evenly, hours follow a weighted
//! traffic shape, and minutes inside an hour are uniform.

use crate::config::PlannerConfig;
use crate::error::{PoolError, PoolResult};
use crate::plan::{ReleaseEvent, ReleasePlan};
use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use rand::Rng;

pub const SECS_PER_DAY: i64 = 86_400;
const SECS_PER_HOUR: i64 = 3_600;
const SECS_PER_MINUTE: i64 = 60;

/// Above this a day's quantity is split proportionally before drawing the rest.
const PROPORTIONAL_THRESHOLD: u64 = 100;

/// Hourly traffic shape in percent: quiet nights, a midday plateau, an evening peak.
pub const DEFAULT_HOUR_WEIGHTS: [u32; 24] = [
    1, 1, 1, 1, 1, 1, 2, 3, 4, 5, 6, 6, //
    6, 5, 5, 5, 5, 5, 6, 7, 8, 7, 5, 4,
];

/// Hour-of-day weights, summing to 100.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourWeights {
    weights: [u32; 24],
    /// 100 slots, each naming an hour; hour `h` owns `weights[h]` slots.
    slots: Vec<u8>,
}

impl HourWeights {
    pub fn new(weights: &[u32]) -> PoolResult<Self> {
        let weights: [u32; 24] = weights.try_into().map_err(|_| {
            PoolError::InvalidArgument(format!(
                "expected 24 hourly weights, got {}",
                weights.len()
            ))
        })?;
        let sum: u32 = weights.iter().sum();
        if sum != 100 {
            return Err(PoolError::InvalidArgument(format!(
                "hourly weights must sum to 100, got {}",
                sum
            )));
        }
        Ok(Self::from_array(weights))
    }

    fn from_array(weights: [u32; 24]) -> Self {
        let slots = weights
            .iter()
            .enumerate()
            .flat_map(|(hour, &w)| std::iter::repeat(hour as u8).take(w as usize))
            .collect();
        Self { weights, slots }
    }

    pub fn weight(&self, hour: usize) -> u32 {
        self.weights[hour]
    }

    /// Draw one hour according to the weights.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.slots[rng.random_range(0..self.slots.len())] as usize
    }
}

impl Default for HourWeights {
    fn default() -> Self {
        Self::from_array(DEFAULT_HOUR_WEIGHTS)
    }
}

/// Split `total` across `days` buckets: an equal share each, leftovers to random days.
pub fn spread_days<R: Rng + ?Sized>(total: u64, days: u32, rng: &mut R) -> Vec<u64> {
    let days = days as usize;
    if days == 0 {
        return Vec::new();
    }
    let per_day = total / days as u64;
    let mut buckets = vec![per_day; days];
    for _ in 0..(total - per_day * days as u64) {
        buckets[rng.random_range(0..days)] += 1;
    }
    buckets
}

/// Split one day's quantity across 24 hours following `weights`.
///
/// Large quantities get their proportional share per hour first; whatever the
/// rounding leaves (or all of a small quantity) is drawn unit by unit.
pub fn spread_hours<R: Rng + ?Sized>(n: u64, weights: &HourWeights, rng: &mut R) -> [u64; 24] {
    let mut hours = [0u64; 24];
    let mut left = n;

    if n > PROPORTIONAL_THRESHOLD {
        for (hour, slot) in hours.iter_mut().enumerate() {
            let share = (n as u128 * weights.weight(hour) as u128 / 100) as u64;
            *slot = share;
            left -= share;
        }
    }

    for _ in 0..left {
        hours[weights.draw(rng)] += 1;
    }
    hours
}

/// Split one hour's quantity uniformly across 60 minutes.
pub fn spread_minutes<R: Rng + ?Sized>(h: u64, rng: &mut R) -> [u64; 60] {
    let per_minute = h / 60;
    let mut minutes = [per_minute; 60];
    for _ in 0..(h - per_minute * 60) {
        minutes[rng.random_range(0..60)] += 1;
    }
    minutes
}

/// Builds release plans for rewards.
#[derive(Debug, Clone)]
pub struct Planner {
    weights: HourWeights,
    utc_offset: FixedOffset,
}

impl Planner {
    pub fn new(weights: HourWeights, utc_offset_secs: i32) -> PoolResult<Self> {
        let utc_offset = FixedOffset::east_opt(utc_offset_secs).ok_or_else(|| {
            PoolError::InvalidArgument(format!("utc offset {} out of range", utc_offset_secs))
        })?;
        Ok(Self {
            weights,
            utc_offset,
        })
    }

    pub fn from_config(config: &PlannerConfig) -> PoolResult<Self> {
        Self::new(HourWeights::new(&config.hour_weights)?, config.utc_offset_secs)
    }

    /// Wall-clock hour of `now` in the planner's offset.
    pub fn hour_of_day(&self, now: i64) -> usize {
        DateTime::from_timestamp(now, 0)
            .map(|t| t.with_timezone(&self.utc_offset).hour() as usize)
            .unwrap_or(0)
    }

    /// Build a release plan for `total` units over `period_days` days starting at `now`.
    ///
    /// A zero period releases everything at `now`. Hour buckets are read
    /// rotated by the current hour, so the first hour slot of each day is the
    /// hour `now` falls in and no event lands before `now`.
    pub fn build<R: Rng + ?Sized>(
        &self,
        total: u64,
        period_days: u32,
        now: i64,
        rng: &mut R,
    ) -> ReleasePlan {
        if total == 0 {
            return ReleasePlan::new();
        }
        if period_days == 0 {
            return ReleasePlan::from_events(vec![ReleaseEvent {
                due_at: now,
                quantity: total,
            }]);
        }

        let current_hour = self.hour_of_day(now);
        let mut events = Vec::new();

        for (day, &day_total) in spread_days(total, period_days, rng).iter().enumerate() {
            if day_total == 0 {
                continue;
            }
            let hours = spread_hours(day_total, &self.weights, rng);
            let day_start = now + day as i64 * SECS_PER_DAY;

            for offset in 0..24usize {
                let hour_total = hours[(offset + current_hour) % 24];
                if hour_total == 0 {
                    continue;
                }
                let hour_start = day_start + offset as i64 * SECS_PER_HOUR;

                for (minute, &quantity) in spread_minutes(hour_total, rng).iter().enumerate() {
                    if quantity > 0 {
                        events.push(ReleaseEvent {
                            due_at: hour_start + minute as i64 * SECS_PER_MINUTE,
                            quantity,
                        });
                    }
                }
            }
        }

        ReleasePlan::from_events(events)
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self {
            weights: HourWeights::default(),
            utc_offset: Utc.fix(),
        }
    }
}
