//! Token bucket scoped to a single client.
//!
//! Tokens accrue lazily: every call first credits the tokens earned since the
//! last refill, so an idle bucket costs nothing until it is touched again.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, sleep, timeout};

use crate::config::LimiterConfig;

/// Outcome of a token request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// A token was taken; `remaining` are left in the bucket.
    Granted { remaining: u32 },
    /// The bucket is empty; the next token accrues after `wait`.
    NotYet { wait: Duration },
}

impl Acquire {
    pub fn is_granted(&self) -> bool {
        matches!(self, Acquire::Granted { .. })
    }
}

struct BucketState {
    tokens: u32,
    // tokens promised to callers waiting out the grace period
    reserved: u32,
    last_refill: Instant,
}

pub struct Bucket {
    capacity: u32,
    token_interval: Duration,
    state: Mutex<BucketState>,
}

// Claim on the next accruing token. Released on drop unless redeemed.
struct Reservation<'a> {
    bucket: &'a Bucket,
    redeemed: bool,
}

impl Reservation<'_> {
    async fn redeem(mut self) -> u32 {
        loop {
            let wait = {
                let now = Instant::now();
                let mut state = self.bucket.state.lock();
                self.bucket.refill(&mut state, now);
                if state.tokens > 0 {
                    state.tokens -= 1;
                    state.reserved -= 1;
                    self.redeemed = true;
                    return state.tokens.saturating_sub(state.reserved);
                }
                self.bucket.next_token_in(&state, now)
            };
            sleep(wait).await;
        }
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.redeemed {
            self.bucket.state.lock().reserved -= 1;
        }
    }
}

impl Bucket {
    /// A full bucket for a client.
    ///
    /// `config` is expected to have passed [`LimiterConfig::validate`]; a
    /// zero capacity yields a bucket that never grants.
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            capacity: config.capacity,
            token_interval: config.token_interval(),
            state: Mutex::new(BucketState {
                tokens: config.capacity,
                reserved: 0,
                last_refill: Instant::now(),
            }),
        }
    }

    // credit whole tokens earned since last_refill, keeping the fractional remainder
    fn refill(&self, state: &mut BucketState, now: Instant) {
        if state.tokens >= self.capacity {
            state.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(state.last_refill);
        let accrued = elapsed.as_nanos() / self.token_interval.as_nanos();
        if accrued == 0 {
            return;
        }

        let missing = u128::from(self.capacity - state.tokens);
        if accrued >= missing {
            state.tokens = self.capacity;
            state.last_refill = now;
        } else {
            // accrued < capacity, fits in u32
            let accrued = accrued as u32;
            state.tokens += accrued;
            state.last_refill += self.token_interval * accrued;
        }
    }

    fn next_token_in(&self, state: &BucketState, now: Instant) -> Duration {
        self.token_interval
            .saturating_sub(now.saturating_duration_since(state.last_refill))
    }

    // time until a token nobody has claimed accrues
    fn next_free_token_in(&self, state: &BucketState, now: Instant) -> Duration {
        let queued = state.reserved.saturating_sub(state.tokens);
        self.next_token_in(state, now) + self.token_interval * queued
    }

    fn take_free(&self, state: &mut BucketState, now: Instant) -> Acquire {
        if state.tokens > state.reserved {
            state.tokens -= 1;
            Acquire::Granted {
                remaining: state.tokens - state.reserved,
            }
        } else {
            Acquire::NotYet {
                wait: self.next_free_token_in(state, now),
            }
        }
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&self) -> Acquire {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        self.take_free(&mut state, now)
    }

    /// Tokens currently available to a new caller.
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());
        state.tokens.saturating_sub(state.reserved)
    }

    /// Take a token, waiting at most `grace` for one to accrue.
    ///
    /// Returns immediately when a token is present, or when the next free
    /// token is further away than `grace`. Otherwise that token is reserved,
    /// so later callers cannot take it first; dropping the returned future
    /// gives the reservation back.
    pub async fn acquire_within(&self, grace: Duration) -> Acquire {
        let reservation = {
            let now = Instant::now();
            let mut state = self.state.lock();
            self.refill(&mut state, now);
            match self.take_free(&mut state, now) {
                Acquire::NotYet { wait } if wait <= grace => {
                    state.reserved += 1;
                    Reservation {
                        bucket: self,
                        redeemed: false,
                    }
                }
                outcome => return outcome,
            }
        };

        match timeout(grace, reservation.redeem()).await {
            Ok(remaining) => Acquire::Granted { remaining },
            Err(_) => {
                let now = Instant::now();
                let mut state = self.state.lock();
                self.refill(&mut state, now);
                Acquire::NotYet {
                    wait: self.next_free_token_in(&state, now),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::advance;

    fn bucket() -> Bucket {
        Bucket::new(&LimiterConfig::default())
    }

    fn bucket_with(capacity: u32, refill_window: Duration) -> Bucket {
        Bucket::new(&LimiterConfig {
            capacity,
            refill_window,
            ..LimiterConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_bucket_allows_full_burst() {
        let bucket = bucket();
        for expected in (0..5).rev() {
            assert_eq!(bucket.try_acquire(), Acquire::Granted { remaining: expected });
        }
        assert_eq!(
            bucket.try_acquire(),
            Acquire::NotYet { wait: Duration::from_secs(2) }
        );
        assert_eq!(bucket.available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_bucket_keeps_reporting_not_yet() {
        let bucket = bucket();
        for _ in 0..5 {
            bucket.try_acquire();
        }
        for _ in 0..10 {
            assert!(!bucket.try_acquire().is_granted());
        }
        assert_eq!(bucket.available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refill_follows_elapsed_time() {
        let bucket = bucket();
        for _ in 0..5 {
            bucket.try_acquire();
        }

        advance(Duration::from_millis(1999)).await;
        assert_eq!(bucket.available(), 0);
        assert_eq!(
            bucket.try_acquire(),
            Acquire::NotYet { wait: Duration::from_millis(1) }
        );

        advance(Duration::from_millis(1)).await;
        assert_eq!(bucket.available(), 1);

        // partial progress toward the next token is kept
        advance(Duration::from_millis(3000)).await;
        assert_eq!(bucket.available(), 2);
        advance(Duration::from_millis(1000)).await;
        assert_eq!(bucket.available(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn refill_is_capped_at_capacity() {
        let bucket = bucket();
        bucket.try_acquire();
        advance(Duration::from_secs(600)).await;
        assert_eq!(bucket.available(), 5);
        for _ in 0..5 {
            assert!(bucket.try_acquire().is_granted());
        }
        assert!(!bucket.try_acquire().is_granted());
    }

    #[tokio::test(start_paused = true)]
    async fn window_scenario() {
        let bucket = bucket();
        for _ in 0..5 {
            assert!(bucket.try_acquire().is_granted());
        }
        advance(Duration::from_millis(50)).await;
        assert!(!bucket.try_acquire().is_granted());
        advance(Duration::from_millis(10_050)).await;
        assert!(bucket.try_acquire().is_granted());
    }

    #[tokio::test(start_paused = true)]
    async fn grace_covers_imminent_token() {
        let bucket = bucket();
        for _ in 0..5 {
            bucket.try_acquire();
        }
        advance(Duration::from_secs(2) - Duration::from_micros(40)).await;

        let outcome = bucket.acquire_within(Duration::from_micros(100)).await;
        assert_eq!(outcome, Acquire::Granted { remaining: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn distant_token_is_refused_without_waiting() {
        let bucket = bucket();
        for _ in 0..5 {
            bucket.try_acquire();
        }
        let before = Instant::now();

        let outcome = bucket.acquire_within(Duration::from_micros(100)).await;
        assert_eq!(outcome, Acquire::NotYet { wait: Duration::from_secs(2) });
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_grace_is_plain_try_acquire() {
        let bucket = bucket_with(1, Duration::from_secs(1));
        assert!(bucket.acquire_within(Duration::ZERO).await.is_granted());
        assert!(!bucket.acquire_within(Duration::ZERO).await.is_granted());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_wait_consumes_nothing() {
        let bucket = bucket();
        for _ in 0..5 {
            bucket.try_acquire();
        }
        advance(Duration::from_millis(1990)).await;

        let pending = timeout(
            Duration::from_millis(1),
            bucket.acquire_within(Duration::from_secs(1)),
        )
        .await;
        assert!(pending.is_err());

        advance(Duration::from_millis(20)).await;
        assert_eq!(bucket.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_caller_keeps_its_token() {
        let bucket = Arc::new(bucket());
        for _ in 0..5 {
            bucket.try_acquire();
        }
        advance(Duration::from_secs(2) - Duration::from_micros(50)).await;

        let waiter = {
            let bucket = Arc::clone(&bucket);
            tokio::spawn(async move { bucket.acquire_within(Duration::from_micros(100)).await })
        };
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(bucket.available(), 0);

        // the token has accrued but is promised to the waiter
        advance(Duration::from_micros(60)).await;
        assert!(!bucket.try_acquire().is_granted());
        assert!(!bucket.acquire_within(Duration::from_micros(100)).await.is_granted());

        assert!(waiter.await.unwrap().is_granted());
        assert_eq!(bucket.available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refill_rate_comes_from_config() {
        let bucket = bucket_with(3, Duration::from_secs(6));
        for _ in 0..3 {
            bucket.try_acquire();
        }
        assert_eq!(
            bucket.try_acquire(),
            Acquire::NotYet { wait: Duration::from_secs(2) }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_capacity_never_grants() {
        let bucket = bucket_with(0, Duration::from_secs(10));
        assert_eq!(bucket.available(), 0);
        assert!(!bucket.try_acquire().is_granted());
        advance(Duration::from_secs(60)).await;
        assert!(!bucket.acquire_within(Duration::from_micros(100)).await.is_granted());
    }

    #[test]
    fn racing_callers_never_overdraw() {
        let bucket = Arc::new(bucket_with(5, Duration::from_secs(3600)));
        let granted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let bucket = Arc::clone(&bucket);
                    scope.spawn(move || bucket.try_acquire().is_granted() as usize)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(granted, 5);
        assert_eq!(bucket.available(), 0);
    }
}
