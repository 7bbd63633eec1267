//! Sequential, throttled submission shared by the quote and order stages.
//!
//! Submissions are spaced start-to-start: the next one begins no earlier than
//! `1 / requests_per_second` after the previous one began. Slow responses
//! therefore eat into the wait instead of adding to it.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Floor applied to configured rates, so a zero or negative rate still makes progress.
pub const MIN_REQUESTS_PER_SECOND: f64 = 0.001;

#[derive(Debug, Clone)]
pub struct BatchExecutor {
    label: &'static str,
    interval: Duration,
}

impl BatchExecutor {
    pub fn new(label: &'static str, requests_per_second: f64) -> Self {
        let rate = requests_per_second.max(MIN_REQUESTS_PER_SECOND);
        let interval = if rate.is_finite() {
            Duration::from_secs_f64(1.0 / rate)
        } else {
            Duration::ZERO
        };
        Self { label, interval }
    }

    /// No spacing between submissions. Used for simulated (dry-run) batches.
    pub fn unthrottled(label: &'static str) -> Self {
        Self {
            label,
            interval: Duration::ZERO,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs `submit` once per item, strictly in input order, one at a time.
    ///
    /// Exactly one outcome is returned per item, in input order. `submit` is
    /// responsible for turning transport errors into an outcome; nothing it
    /// returns stops the batch.
    pub async fn run<T, O, F, Fut>(&self, items: Vec<T>, mut submit: F) -> Vec<O>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = O>,
    {
        let total = items.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut next_start: Option<Instant> = None;

        if total > 0 {
            tracing::info!(
                stage = self.label,
                items = total,
                interval_ms = self.interval.as_millis() as u64,
                "Starting batch"
            );
        }

        for (idx, item) in items.into_iter().enumerate() {
            if let Some(at) = next_start {
                tokio::time::sleep_until(at).await;
            }
            let started = Instant::now();
            next_start = Some(started + self.interval);

            tracing::debug!(stage = self.label, "Submitting item {}/{}", idx + 1, total);
            outcomes.push(submit(item).await);
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_spacing_is_start_to_start() {
        let executor = BatchExecutor::new("test", 2.0);
        let origin = Instant::now();

        let starts = executor
            .run(vec![0u32, 1, 2], |_| async move {
                let started = Instant::now();
                // Each submission takes longer than half the interval
                tokio::time::sleep(Duration::from_millis(300)).await;
                started
            })
            .await;

        let offsets: Vec<u128> = starts
            .iter()
            .map(|s| s.duration_since(origin).as_millis())
            .collect();
        assert_eq!(offsets, vec![0, 500, 1000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_submission_is_not_delayed_further() {
        let executor = BatchExecutor::new("test", 10.0);
        let origin = Instant::now();

        let starts = executor
            .run(vec![0u32, 1], |_| async move {
                let started = Instant::now();
                tokio::time::sleep(Duration::from_millis(400)).await;
                started
            })
            .await;

        assert_eq!(starts[1].duration_since(origin).as_millis(), 400);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_and_order_is_kept() {
        let executor = BatchExecutor::unthrottled("test");
        let items: Vec<u32> = (0..10).collect();

        let outcomes = executor
            .run(items, |n| async move {
                if n % 3 == 0 {
                    Err(format!("transport error on {}", n))
                } else {
                    Ok(n * 10)
                }
            })
            .await;

        assert_eq!(outcomes.len(), 10);
        for (n, outcome) in outcomes.iter().enumerate() {
            if n % 3 == 0 {
                assert_eq!(outcome, &Err(format!("transport error on {}", n)));
            } else {
                assert_eq!(outcome, &Ok(n as u32 * 10));
            }
        }
    }

    #[test]
    fn test_rate_is_floored() {
        assert_eq!(
            BatchExecutor::new("test", 0.0).interval(),
            Duration::from_secs(1000)
        );
        assert_eq!(
            BatchExecutor::new("test", f64::NAN).interval(),
            Duration::from_secs(1000)
        );
        assert_eq!(
            BatchExecutor::new("test", f64::INFINITY).interval(),
            Duration::ZERO
        );
        assert_eq!(
            BatchExecutor::new("test", 4.0).interval(),
            Duration::from_millis(250)
        );
    }
}
