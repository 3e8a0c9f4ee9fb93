//! Concurrency bound shared by every external call of a job.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::GatewayError;

/// Counting limiter for in-flight gateway calls.
///
/// A permit covers exactly one external call. Callers must drop it before
/// escalating to a fallback, so nested fallbacks never wait on a slot they
/// already hold.
#[derive(Clone)]
pub struct CallLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl CallLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a slot.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, GatewayError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GatewayError::Unavailable("call limiter closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_permits_are_bounded() {
        let limiter = CallLimiter::new(2);
        let a = limiter.acquire().await.unwrap();
        let _b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available(), 0);

        drop(a);
        assert_eq!(limiter.available(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        assert_eq!(CallLimiter::new(0).capacity(), 1);
    }
}
