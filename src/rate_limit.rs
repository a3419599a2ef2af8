//! # Rate Limiters
//! Two layers over the same ledger: a per-source sliding-hour allowance and a
//! global monthly/daily/hourly budget shared by every SerpAPI-kind source
//! across all tenants. Counts are recomputed from ledger rows on every call —
//! no live counters to drift or reset.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::ledger::ExecutionLedger;
use crate::source::Source;

/// Trailing window for the per-source allowance.
const PER_SOURCE_WINDOW_SECS: i64 = 3600;

/// Private hourly allowance for one source, from its config override.
#[derive(Debug)]
pub struct PerSourceRateLimiter {
    ledger: Arc<ExecutionLedger>,
    clock: Arc<dyn Clock>,
}

impl PerSourceRateLimiter {
    pub fn new(ledger: Arc<ExecutionLedger>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    fn window_start(&self) -> DateTime<Utc> {
        self.clock.now() - Duration::seconds(PER_SOURCE_WINDOW_SECS)
    }

    pub fn used(&self, source: &Source) -> u32 {
        self.ledger
            .runs_for_source_since(&source.id, self.window_start()) as u32
    }

    pub fn remaining(&self, source: &Source) -> u32 {
        source.rate_limit_per_hour().saturating_sub(self.used(source))
    }

    pub fn allowed(&self, source: &Source) -> bool {
        self.remaining(source) > 0
    }

    /// Seconds until the oldest in-window run ages out, 0 if the window is
    /// empty. Informational backoff hint only, never enforced.
    pub fn reset_in_seconds(&self, source: &Source) -> u64 {
        match self
            .ledger
            .oldest_run_in_window(&source.id, self.window_start())
        {
            None => 0,
            Some(oldest) => {
                let expires = oldest + Duration::seconds(PER_SOURCE_WINDOW_SECS);
                (expires - self.clock.now()).num_seconds().max(0) as u64
            }
        }
    }
}

/// Monthly/daily/hourly caps derived from a single monthly knob, spreading
/// the month's budget instead of front-loading it.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GlobalLimits {
    pub monthly: u32,
    pub daily: u32,
    pub hourly: u32,
}

impl GlobalLimits {
    pub fn from_monthly(monthly: u32) -> Self {
        let daily = monthly.div_ceil(31);
        let hourly = daily.div_ceil(24).max(1);
        Self {
            monthly,
            daily,
            hourly,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct WindowUsage {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub percent: f64,
}

impl WindowUsage {
    fn new(used: u32, limit: u32) -> Self {
        Self {
            used,
            limit,
            remaining: limit.saturating_sub(used),
            percent: if limit == 0 {
                0.0
            } else {
                used as f64 / limit as f64 * 100.0
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct UsageStats {
    pub monthly: WindowUsage,
    pub daily: WindowUsage,
    pub hourly: WindowUsage,
    /// Linear projection of the month-end total from days elapsed so far.
    pub projected_month_end: u32,
}

/// Shared budget across all tenants and all SerpAPI-kind sources. A single
/// noisy tenant can exhaust this for everyone; that protects the external
/// contract, so trips are logged with the offender.
#[derive(Debug)]
pub struct SerpApiGlobalRateLimiter {
    ledger: Arc<ExecutionLedger>,
    limits: GlobalLimits,
    clock: Arc<dyn Clock>,
}

impl SerpApiGlobalRateLimiter {
    pub fn new(ledger: Arc<ExecutionLedger>, limits: GlobalLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            limits,
            clock,
        }
    }

    pub fn limits(&self) -> GlobalLimits {
        self.limits
    }

    fn month_start(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(now)
    }

    fn day_start(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
            .single()
            .unwrap_or(now)
    }

    fn hour_start(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), now.hour(), 0, 0)
            .single()
            .unwrap_or(now)
    }

    pub fn monthly_used(&self) -> u32 {
        self.ledger.non_failed_serp_runs_since(self.month_start()) as u32
    }

    pub fn daily_used(&self) -> u32 {
        self.ledger.non_failed_serp_runs_since(self.day_start()) as u32
    }

    pub fn hourly_used(&self) -> u32 {
        self.ledger.non_failed_serp_runs_since(self.hour_start()) as u32
    }

    /// Monthly cap.
    pub fn allow(&self) -> bool {
        self.monthly_used() < self.limits.monthly
    }

    /// Daily soft cap.
    pub fn allow_today(&self) -> bool {
        self.daily_used() < self.limits.daily
    }

    /// Hourly cap.
    pub fn allow_this_hour(&self) -> bool {
        self.hourly_used() < self.limits.hourly
    }

    pub fn can_make_request(&self) -> bool {
        self.allow() && self.allow_today() && self.allow_this_hour()
    }

    pub fn usage_stats(&self) -> UsageStats {
        let now = self.clock.now();
        let monthly_used = self.monthly_used();
        let days_elapsed = now.day().max(1);
        let days_in_month = days_in_month(now.year(), now.month());
        let projected =
            (monthly_used as f64 / days_elapsed as f64 * days_in_month as f64).round() as u32;

        UsageStats {
            monthly: WindowUsage::new(monthly_used, self.limits.monthly),
            daily: WindowUsage::new(self.daily_used(), self.limits.daily),
            hourly: WindowUsage::new(self.hourly_used(), self.limits.hourly),
            projected_month_end: projected,
        }
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_y, next_m) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let first = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap();
    let next = Utc.with_ymd_and_hms(next_y, next_m, 1, 0, 0, 0).unwrap();
    (next - first).num_days() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_derive_from_one_knob() {
        let l = GlobalLimits::from_monthly(1000);
        assert_eq!(l.daily, 33); // ceil(1000/31)
        assert_eq!(l.hourly, 2); // ceil(33/24)

        let tiny = GlobalLimits::from_monthly(10);
        assert_eq!(tiny.daily, 1);
        assert_eq!(tiny.hourly, 1);
    }

    #[test]
    fn window_usage_percent() {
        let w = WindowUsage::new(25, 100);
        assert_eq!(w.remaining, 75);
        assert!((w.percent - 25.0).abs() < f64::EPSILON);

        let over = WindowUsage::new(7, 5);
        assert_eq!(over.remaining, 0);
    }

    #[test]
    fn month_lengths() {
        assert_eq!(days_in_month(2025, 2), 28);
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2025, 12), 31);
    }
}
