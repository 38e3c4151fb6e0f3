//! Calendar-month send quota for the relay.

use chrono::{DateTime, Datelike, Utc};

use crate::error::{EvieError, Result};

#[derive(Debug, Clone)]
pub struct MonthlyQuota {
    limit: u32,
    /// (year, month) the `used` counter belongs to.
    period: (i32, u32),
    used: u32,
}

impl MonthlyQuota {
    pub fn new(limit: u32, now: DateTime<Utc>) -> Self {
        Self {
            limit,
            period: (now.year(), now.month()),
            used: 0,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// # Errors
    /// `QuotaExceeded` when this month's allowance is spent.
    pub fn check(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.roll(now);
        if self.used >= self.limit {
            return Err(EvieError::QuotaExceeded { limit: self.limit });
        }
        Ok(())
    }

    pub fn record(&mut self, now: DateTime<Utc>) {
        self.roll(now);
        self.used = self.used.saturating_add(1);
    }

    pub fn remaining(&mut self, now: DateTime<Utc>) -> u32 {
        self.roll(now);
        self.limit.saturating_sub(self.used)
    }

    fn roll(&mut self, now: DateTime<Utc>) {
        let period = (now.year(), now.month());
        if period != self.period {
            self.period = period;
            self.used = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0)
            .single()
            .expect("valid date")
    }

    #[test]
    fn blocks_after_limit() {
        let now = at(2026, 3, 1);
        let mut quota = MonthlyQuota::new(2, now);
        quota.check(now).expect("first");
        quota.record(now);
        quota.check(now).expect("second");
        quota.record(now);
        let err = quota.check(now).expect_err("limit reached");
        assert_eq!(err.code(), "QUOTA_EXCEEDED");
        assert_eq!(quota.remaining(now), 0);
    }

    #[test]
    fn resets_at_month_boundary() {
        let march = at(2026, 3, 31);
        let mut quota = MonthlyQuota::new(1, march);
        quota.record(march);
        assert!(quota.check(march).is_err());

        let april = at(2026, 4, 1);
        assert!(quota.check(april).is_ok());
        assert_eq!(quota.remaining(april), 1);
    }
}
