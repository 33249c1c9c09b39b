use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time;

#[derive(Debug)]
struct BucketState {
    available: f64,
    refreshed: Instant,
}

/// Client-side request pacing. Disabled entirely when the configured
/// rate is zero, which is the default for the mock source.
#[derive(Debug)]
pub(crate) struct TokenBucketLimiter {
    rate: f64,
    capacity: f64,
    state: AsyncMutex<BucketState>,
}

impl TokenBucketLimiter {
    pub(crate) fn new(tokens_per_second: u64, burst: u64) -> Option<Arc<Self>> {
        if tokens_per_second == 0 {
            return None;
        }
        let capacity = burst.max(tokens_per_second).max(1) as f64;
        Some(Arc::new(Self {
            rate: tokens_per_second as f64,
            capacity,
            state: AsyncMutex::new(BucketState {
                available: capacity,
                refreshed: Instant::now(),
            }),
        }))
    }

    pub(crate) async fn acquire(&self) {
        while let Some(wait) = self.take_or_wait().await {
            time::sleep(wait).await;
        }
    }

    /// Takes a token when one is available, otherwise reports how long to
    /// wait before the next try.
    async fn take_or_wait(&self) -> Option<Duration> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(state.refreshed).as_secs_f64();
        if elapsed > 0.0 {
            state.available = (state.available + elapsed * self.rate).min(self.capacity);
            state.refreshed = now;
        }
        if state.available >= 1.0 {
            state.available -= 1.0;
            return None;
        }
        let shortfall = (1.0 - state.available).max(0.0);
        Some(Duration::from_secs_f64((shortfall / self.rate).max(0.001)))
    }
}

pub(crate) fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    let header = response.headers().get(reqwest::header::RETRY_AFTER)?;
    let seconds = header.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

/// Exponential backoff capped at `max_ms`, except a Retry-After hint may
/// raise the cap. Jitter is a deterministic hash of the operation name so
/// concurrent callers of different endpoints spread out.
pub(crate) fn compute_retry_delay(
    base_ms: u64,
    max_ms: u64,
    jitter_ms: u64,
    attempt: u32,
    op: &str,
    retry_after: Option<Duration>,
) -> Duration {
    let floor = base_ms.max(1);
    let hinted_ms = retry_after.map(duration_to_ms);

    let mut ceiling = max_ms.max(floor);
    if let Some(hint) = hinted_ms {
        ceiling = ceiling.max(hint);
    }

    let doubled = floor.saturating_mul(1u64 << attempt.min(10));
    let mut delay = doubled.min(ceiling);
    if let Some(hint) = hinted_ms {
        delay = delay.max(hint.min(ceiling));
    }

    let jitter = retry_jitter_ms(op, attempt, jitter_ms);
    Duration::from_millis(
        delay
            .saturating_add(jitter)
            .min(ceiling.saturating_add(jitter_ms)),
    )
}

fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

fn retry_jitter_ms(op: &str, attempt: u32, max_jitter_ms: u64) -> u64 {
    if max_jitter_ms == 0 {
        return 0;
    }
    let mut hasher = DefaultHasher::new();
    (op, attempt).hash(&mut hasher);
    hasher.finish() % (max_jitter_ms + 1)
}
