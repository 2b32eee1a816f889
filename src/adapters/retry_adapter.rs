//! Price port wrapper that retries transient source failures.

use crate::domain::error::FundrankError;
use crate::domain::instrument::Instrument;
use crate::domain::price::PricePoint;
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PricePort;
use chrono::NaiveDate;
use std::thread;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 200;
const MAX_DELAY_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Reads `[prices] retry_attempts` and `retry_base_delay_ms`.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FundrankError> {
        let attempts = config.get_int("prices", "retry_attempts", DEFAULT_MAX_ATTEMPTS as i64);
        if attempts < 1 {
            return Err(FundrankError::config_invalid(
                "prices",
                "retry_attempts",
                "retry_attempts must be at least 1",
            ));
        }
        let delay = config.get_int("prices", "retry_base_delay_ms", DEFAULT_BASE_DELAY_MS as i64);
        if delay < 0 {
            return Err(FundrankError::config_invalid(
                "prices",
                "retry_base_delay_ms",
                "retry_base_delay_ms must not be negative",
            ));
        }
        Ok(RetryPolicy {
            max_attempts: attempts as u32,
            base_delay: Duration::from_millis(delay as u64),
        })
    }

    /// Delay before retry number `retry` (1-based), doubling and capped.
    fn delay(&self, retry: u32) -> Duration {
        let factor = 1u64 << (retry.saturating_sub(1)).min(16);
        let ms = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(ms.min(MAX_DELAY_MS))
    }
}

pub struct RetryingPricePort<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: PricePort> RetryingPricePort<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// attempts are used up. The final error reports how many attempts ran.
    fn with_retry<T>(
        &self,
        what: &str,
        op: impl Fn() -> Result<T, FundrankError>,
    ) -> Result<T, FundrankError> {
        let max = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Err(FundrankError::SourceUnavailable { reason, .. }) => {
                    if attempt >= max {
                        tracing::error!(
                            what,
                            attempts = attempt,
                            %reason,
                            "price source unavailable"
                        );
                        return Err(FundrankError::SourceUnavailable {
                            reason,
                            attempts: attempt,
                        });
                    }
                    let delay = self.policy.delay(attempt);
                    tracing::warn!(
                        what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "price source unavailable, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

impl<P: PricePort> PricePort for RetryingPricePort<P> {
    fn get_series(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, FundrankError> {
        self.with_retry(instrument_id, || self.inner.get_series(instrument_id, start, end))
    }

    fn get_instrument(&self, instrument_id: &str) -> Result<Option<Instrument>, FundrankError> {
        self.with_retry(instrument_id, || self.inner.get_instrument(instrument_id))
    }

    fn list_instruments(&self) -> Result<Vec<Instrument>, FundrankError> {
        self.with_retry("instruments", || self.inner.list_instruments())
    }
}
