//! Token bucket admission control
//!
//! A bucket holds up to `capacity` units and refills continuously at
//! `refill_rate` units per second. The level is computed lazily on every
//! access rather than by a background ticker. Either rate may be +∞, in which
//! case the bucket never makes anyone wait.
//!
//! Every grant is charged its full amount, even one larger than the bucket.
//! A caller that finds too little takes a reservation: the amount is deducted
//! at once, the level goes negative, and the caller sleeps until refill has
//! paid the debt off. Later callers queue behind that debt, so the total
//! granted by time `t` never exceeds `capacity + refill_rate * t`.
//!
//! State sits behind a synchronous mutex that is never held across an await.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Window over which [`TokenBucket::get_throughput`] averages grants
pub const THROUGHPUT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateLimitError {
    /// The bucket cannot grant the request within the configured bound
    #[error("Bucket '{bucket}' starved: would need to wait {needed:?} (limit {limit:?})")]
    Starved {
        bucket: String,
        needed: Duration,
        limit: Duration,
    },

    #[error("Cancelled while waiting for bucket '{0}'")]
    Cancelled(String),
}

enum Admission {
    Granted,
    /// Reserved; the caller may proceed after this long
    Reserved(Duration),
    /// Reserving would mean waiting longer than allowed; nothing was deducted
    TooLong(Duration),
    Never,
}

#[derive(Debug)]
struct BucketState {
    capacity: f64,
    refill_rate: f64,
    level: f64,
    last_refill: Instant,
    created: Instant,
    grants: VecDeque<(Instant, f64)>,
}

impl BucketState {
    fn is_unlimited(&self) -> bool {
        self.capacity == f64::INFINITY || self.refill_rate == f64::INFINITY
    }

    fn refill(&mut self, now: Instant) {
        if self.is_unlimited() {
            self.last_refill = now;
            return;
        }
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if self.refill_rate > 0.0 {
            self.level = (self.level + elapsed * self.refill_rate).min(self.capacity);
        }
        self.last_refill = now;
    }

    fn record(&mut self, now: Instant, amount: f64) {
        self.grants.push_back((now, amount));
        while let Some((at, _)) = self.grants.front()
            && now.saturating_duration_since(*at) > THROUGHPUT_WINDOW
        {
            self.grants.pop_front();
        }
    }

    fn admit(&mut self, amount: f64, now: Instant, max_wait: Option<Duration>) -> Admission {
        self.refill(now);
        if amount <= 0.0 || self.is_unlimited() {
            self.record(now, amount.max(0.0));
            return Admission::Granted;
        }
        if self.capacity <= 0.0 {
            return Admission::Never;
        }
        if self.level >= amount {
            self.level -= amount;
            self.record(now, amount);
            return Admission::Granted;
        }
        if self.refill_rate <= 0.0 {
            return Admission::Never;
        }
        let secs = (amount - self.level) / self.refill_rate;
        let wait = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        if max_wait.is_some_and(|limit| wait > limit) {
            return Admission::TooLong(wait);
        }
        self.level -= amount;
        Admission::Reserved(wait)
    }

    /// Give back units that were deducted but never used
    fn refund(&mut self, amount: f64, now: Instant) {
        self.refill(now);
        if !self.is_unlimited() && amount > 0.0 {
            self.level = (self.level + amount).min(self.capacity);
        }
    }
}

/// A single rate-limited resource (requests or tokens) of one service
#[derive(Debug)]
pub struct TokenBucket {
    name: String,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// A bucket that starts full
    pub fn new(name: impl Into<String>, capacity: f64, refill_rate: f64) -> Self {
        let now = Instant::now();
        let capacity = capacity.max(0.0);
        Self {
            name: name.into(),
            state: Mutex::new(BucketState {
                capacity,
                refill_rate: refill_rate.max(0.0),
                level: capacity,
                last_refill: now,
                created: now,
                grants: VecDeque::new(),
            }),
        }
    }

    pub fn unlimited(name: impl Into<String>) -> Self {
        Self::new(name, f64::INFINITY, f64::INFINITY)
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> f64 {
        self.lock().capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.lock().refill_rate
    }

    pub fn is_unlimited(&self) -> bool {
        self.lock().is_unlimited()
    }

    /// Current level after a lazy refill
    pub fn level(&self) -> f64 {
        let mut state = self.lock();
        state.refill(Instant::now());
        state.level
    }

    /// Take `amount` units if they are available right now
    pub fn try_acquire(&self, amount: f64) -> bool {
        // A zero bound never reserves
        matches!(
            self.lock().admit(amount, Instant::now(), Some(Duration::ZERO)),
            Admission::Granted
        )
    }

    /// Return `amount` units taken by an acquisition whose work never happened
    pub fn refund(&self, amount: f64) {
        self.lock().refund(amount, Instant::now());
    }

    /// Wait until `amount` units are available, then deduct them.
    ///
    /// Never fails; a bucket that can never refill makes the caller wait forever.
    pub async fn acquire(&self, amount: f64) {
        // Without a bound or a token the only possible outcome is Ok
        let _ = self.acquire_with(amount, None, None).await;
    }

    /// Like [`acquire`](Self::acquire), but gives up with
    /// [`RateLimitError::Starved`] once the total wait would exceed
    /// `max_wait`, and observes `cancel` while sleeping.
    ///
    /// Returns how long the caller waited.
    pub async fn acquire_with(
        &self,
        amount: f64,
        max_wait: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Duration, RateLimitError> {
        let admission = self.lock().admit(amount, Instant::now(), max_wait);
        let wait = match admission {
            Admission::Granted => return Ok(Duration::ZERO),
            Admission::Reserved(wait) => Some(wait),
            Admission::TooLong(needed) => {
                return Err(self.starved(needed, max_wait));
            }
            Admission::Never if max_wait.is_some() => {
                return Err(self.starved(Duration::MAX, max_wait));
            }
            Admission::Never => None,
        };

        trace!(bucket = %self.name, amount, wait = ?wait, "bucket wait");
        let sleep = async {
            match wait {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        if let Some(token) = cancel {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    if wait.is_some() {
                        self.refund(amount);
                    }
                    return Err(RateLimitError::Cancelled(self.name.clone()));
                }
                _ = sleep => {}
            }
        } else {
            sleep.await;
        }

        self.lock().record(Instant::now(), amount);
        Ok(wait.unwrap_or_default())
    }

    fn starved(&self, needed: Duration, limit: Option<Duration>) -> RateLimitError {
        RateLimitError::Starved {
            bucket: self.name.clone(),
            needed,
            limit: limit.unwrap_or(Duration::MAX),
        }
    }

    /// Replace the target rates, keeping the level accrued so far
    pub fn update(&self, capacity: f64, refill_rate: f64) {
        let now = Instant::now();
        let mut state = self.lock();
        state.refill(now);
        let was_unlimited = state.is_unlimited();
        state.capacity = capacity.max(0.0);
        state.refill_rate = refill_rate.max(0.0);
        state.level = if was_unlimited {
            state.capacity
        } else {
            state.level.min(state.capacity)
        };
    }

    /// Observed grants per second over the last [`THROUGHPUT_WINDOW`]
    pub fn get_throughput(&self) -> f64 {
        let now = Instant::now();
        let state = self.lock();
        let span = now
            .saturating_duration_since(state.created)
            .min(THROUGHPUT_WINDOW)
            .as_secs_f64();
        let granted: f64 = state
            .grants
            .iter()
            .filter(|(at, _)| now.saturating_duration_since(*at) <= THROUGHPUT_WINDOW)
            .map(|(_, amount)| amount)
            .sum();
        if span <= 0.0 { granted } else { granted / span }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_full_bucket_grants_immediately() {
        let bucket = TokenBucket::new("svc:requests", 5.0, 1.0);
        let start = Instant::now();
        for _ in 0..5 {
            bucket.acquire(1.0).await;
        }
        assert_eq!(Instant::now(), start);
        assert!(bucket.level() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_bucket_waits_for_refill() {
        let bucket = TokenBucket::new("svc:requests", 1.0, 2.0);
        bucket.acquire(1.0).await;
        let start = Instant::now();
        let waited = bucket.acquire_with(1.0, None, None).await.unwrap();
        assert_eq!(waited, Duration::from_millis(500));
        assert_eq!(Instant::now() - start, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grants_never_exceed_rate_times_window_plus_capacity() {
        let bucket = Arc::new(TokenBucket::new("svc:tokens", 3.0, 2.0));
        let start = Instant::now();
        let window = Duration::from_secs(5);
        let granted = Arc::new(Mutex::new(0.0f64));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let bucket = Arc::clone(&bucket);
            let granted = Arc::clone(&granted);
            handles.push(tokio::spawn(async move {
                loop {
                    bucket.acquire(1.0).await;
                    if Instant::now() - start > window {
                        break;
                    }
                    *granted.lock().unwrap() += 1.0;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let total = *granted.lock().unwrap();
        assert!(total <= 2.0 * window.as_secs_f64() + 3.0, "granted {total}");
        assert!(total >= 2.0 * window.as_secs_f64());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_never_waits() {
        let bucket = TokenBucket::unlimited("svc:requests");
        let start = Instant::now();
        for _ in 0..10_000 {
            bucket.acquire(1_000.0).await;
        }
        assert_eq!(Instant::now(), start);
        assert!(bucket.is_unlimited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_request_is_charged_in_full() {
        let bucket = TokenBucket::new("svc:tokens", 10.0, 10.0);
        let waited = bucket.acquire_with(500.0, None, None).await.unwrap();
        assert_eq!(waited, Duration::from_secs(49));
        assert!(bucket.level().abs() < 1e-9);
        let waited = bucket.acquire_with(500.0, None, None).await.unwrap();
        assert_eq!(waited, Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fractional_capacity_still_charges_whole_requests() {
        // rpm = 6: capacity and refill are 0.1 per second
        let bucket = TokenBucket::new("svc:requests", 0.1, 0.1);
        let start = Instant::now();
        let window = Duration::from_secs(10);
        let mut granted = 0;
        loop {
            bucket.acquire(1.0).await;
            if Instant::now() - start > window {
                break;
            }
            granted += 1;
        }
        assert!(f64::from(granted) <= 0.1 * window.as_secs_f64() + 0.1, "granted {granted}");
        assert_eq!(granted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reservations_queue_behind_each_other() {
        let bucket = Arc::new(TokenBucket::new("svc:requests", 1.0, 1.0));
        bucket.acquire(1.0).await;
        let start = Instant::now();
        let first = tokio::spawn({
            let bucket = Arc::clone(&bucket);
            async move { bucket.acquire_with(1.0, None, None).await.unwrap() }
        });
        let second = tokio::spawn({
            let bucket = Arc::clone(&bucket);
            async move { bucket.acquire_with(1.0, None, None).await.unwrap() }
        });
        let mut waits = vec![first.await.unwrap(), second.await.unwrap()];
        waits.sort();
        assert_eq!(waits, vec![Duration::from_secs(1), Duration::from_secs(2)]);
        assert_eq!(Instant::now() - start, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_reservation_is_refunded() {
        let bucket = TokenBucket::new("svc:requests", 1.0, 1.0);
        bucket.acquire(1.0).await;
        let token = CancellationToken::new();
        token.cancel();
        let err = bucket.acquire_with(5.0, None, Some(&token)).await.unwrap_err();
        assert!(matches!(err, RateLimitError::Cancelled(_)));
        assert!(bucket.level().abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_starvation_is_reported() {
        let bucket = TokenBucket::new("svc:requests", 1.0, 0.1);
        bucket.acquire(1.0).await;
        let err = bucket
            .acquire_with(1.0, Some(Duration::from_secs(2)), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RateLimitError::Starved { needed, .. } if needed == Duration::from_secs(10)
        ));
        // Nothing was reserved by the refused request
        assert!(bucket.level().abs() < 1e-9);

        let dead = TokenBucket::new("svc:dead", 0.0, 0.0);
        let err = dead
            .acquire_with(1.0, Some(Duration::from_secs(600)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RateLimitError::Starved { needed, .. } if needed == Duration::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_wait() {
        let bucket = TokenBucket::new("svc:dead", 0.0, 0.0);
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let err = bucket.acquire_with(1.0, None, Some(&token)).await.unwrap_err();
        assert_eq!(err, RateLimitError::Cancelled("svc:dead".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_keeps_accrued_level() {
        let bucket = TokenBucket::new("svc:requests", 10.0, 1.0);
        bucket.acquire(6.0).await;
        bucket.update(20.0, 5.0);
        assert!((bucket.level() - 4.0).abs() < 1e-9);
        assert_eq!(bucket.capacity(), 20.0);

        bucket.update(2.0, 1.0);
        assert!((bucket.level() - 2.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throughput_reflects_grants() {
        let bucket = TokenBucket::new("svc:requests", 100.0, 100.0);
        tokio::time::advance(Duration::from_secs(10)).await;
        for _ in 0..20 {
            bucket.acquire(1.0).await;
        }
        assert!((bucket.get_throughput() - 2.0).abs() < 1e-9);
    }
}
