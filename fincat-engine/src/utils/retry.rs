//! Retry wrapper for transient failures
//!
//! Only failures the caller classifies as transient are retried, up to
//! the policy's attempt limit, sleeping the scheduled base delay with
//! jitter between attempts. Permanent failures surface immediately on
//! the attempt that produced them.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::RetryPolicy;

/// Why a retried operation ultimately failed
#[derive(Debug)]
pub enum RetryError<E> {
    /// All attempts failed with transient errors; carries the last one
    Exhausted { attempts: u32, last: E },
    /// A non-transient failure, surfaced without further attempts
    Permanent(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Permanent(e) => e,
        }
    }
}

/// Apply jitter to a base delay: uniform in base * (1 ± jitter_pct)
fn jittered(base: Duration, jitter_pct: f64) -> Duration {
    if jitter_pct <= 0.0 {
        return base;
    }
    let factor = 1.0 + rand::thread_rng().gen_range(-jitter_pct..=jitter_pct);
    base.mul_f64(factor.max(0.0))
}

/// Run `op` until it succeeds, a permanent error occurs, or attempts run out
pub async fn retry_transient<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    is_transient: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_transient(&e) => return Err(RetryError::Permanent(e)),
            Err(e) if attempt >= policy.max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: e,
                })
            }
            Err(e) => {
                let delay = jittered(policy.base_delay(attempt), policy.jitter_pct);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
