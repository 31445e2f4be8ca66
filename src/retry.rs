// src/retry.rs
//! Retry policies passed explicitly into every network, browser and engine call site.
//!
//! A policy is plain data: `max_attempts` plus a backoff shape. `delay_after(n)` is pure,
//! so backoff behavior is testable without I/O; `run` performs the sleeps on the tokio
//! clock (pause it in tests).

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    /// `multiplier * 2^(attempt-1)` seconds, clamped to `[min, max]`.
    Exponential {
        multiplier: f64,
        min: Duration,
        max: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Feed fetches are cheap: short waits.
    pub fn feed() -> Self {
        Self::new(
            2,
            Backoff::Exponential {
                multiplier: 1.0,
                min: Duration::from_secs(2),
                max: Duration::from_secs(5),
            },
        )
    }

    /// Browser navigation: longer waits.
    pub fn browser() -> Self {
        Self::new(
            2,
            Backoff::Exponential {
                multiplier: 2.0,
                min: Duration::from_secs(4),
                max: Duration::from_secs(10),
            },
        )
    }

    pub fn download() -> Self {
        Self::new(2, Backoff::Fixed(Duration::from_secs(2)))
    }

    pub fn engine() -> Self {
        Self::new(
            3,
            Backoff::Exponential {
                multiplier: 2.0,
                min: Duration::from_secs(2),
                max: Duration::from_secs(20),
            },
        )
    }

    /// Delay to wait after the given (1-based) attempt failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { multiplier, min, max } => {
                let exp = 2f64.powi(attempt.saturating_sub(1).min(30) as i32);
                let secs = (multiplier * exp).max(0.0);
                Duration::from_secs_f64(secs).clamp(min, max.max(min))
            }
        }
    }

    /// Run `op` until it succeeds, the error is not retryable, or attempts run out.
    /// The last error is returned unchanged.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        is_retryable: impl Fn(&E) -> bool,
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if attempt >= self.max_attempts || !is_retryable(&e) {
                        return Err(e);
                    }
                    let wait = self.delay_after(attempt);
                    tracing::warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "retrying after failure"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn exponential_backoff_is_clamped() {
        let p = RetryPolicy::engine();
        assert_eq!(p.delay_after(1), Duration::from_secs(2));
        assert_eq!(p.delay_after(2), Duration::from_secs(4));
        assert_eq!(p.delay_after(3), Duration::from_secs(8));
        assert_eq!(p.delay_after(5), Duration::from_secs(20));

        let feed = RetryPolicy::feed();
        // 1s raw, raised to the 2s floor
        assert_eq!(feed.delay_after(1), Duration::from_secs(2));
        assert_eq!(feed.delay_after(4), Duration::from_secs(5));

        let browser = RetryPolicy::browser();
        assert_eq!(browser.delay_after(1), Duration::from_secs(4));
        assert!(browser.delay_after(1) > feed.delay_after(1));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let p = RetryPolicy::download();
        assert_eq!(p.delay_after(1), Duration::from_secs(2));
        assert_eq!(p.delay_after(9), Duration::from_secs(2));
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Backoff::Fixed(Duration::ZERO)).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let calls = Cell::new(0u32);
        let started = tokio::time::Instant::now();
        let out: Result<&str, String> = RetryPolicy::engine()
            .run("t", |_| true, || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(format!("boom {n}"))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;
        assert_eq!(out.unwrap(), "ok");
        assert_eq!(calls.get(), 3);
        // 2s + 4s of virtual time
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_stops_immediately() {
        let calls = Cell::new(0u32);
        let out: Result<(), String> = RetryPolicy::engine()
            .run("t", |e: &String| e != "fatal", || {
                calls.set(calls.get() + 1);
                async { Err("fatal".to_string()) }
            })
            .await;
        assert_eq!(out.unwrap_err(), "fatal");
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = Cell::new(0u32);
        let out: Result<(), String> = RetryPolicy::feed()
            .run("t", |_| true, || {
                calls.set(calls.get() + 1);
                async { Err("down".to_string()) }
            })
            .await;
        assert!(out.is_err());
        assert_eq!(calls.get(), 2);
    }
}
