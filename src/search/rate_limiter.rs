use std::num::NonZeroU32;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use super::SearchError;

/// Client-side request budget shared by every session.
pub struct SearchRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    requests_per_minute: u32,
}

impl SearchRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_minute(rpm)),
            requests_per_minute: rpm.get(),
        }
    }

    pub fn check(&self) -> Result<(), SearchError> {
        self.limiter.check().map_err(|_| SearchError::RateLimited)
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }
}
