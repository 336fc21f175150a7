//! Rate limiting logic and state management.

mod backend;
mod clock;
mod limiter;
mod optimistic;
mod policy;
mod rate;
pub mod window;

pub use backend::RateLimiterBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{RateLimiter, DEFAULT_LOCK_STRIPES};
pub use optimistic::{OptimisticRateLimiter, DEFAULT_MAX_ATTEMPTS};
pub use policy::Policy;
pub use rate::{RateState, FLOOR};
