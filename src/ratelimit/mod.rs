//! Client-side rate limiting.

mod limiter;
mod window;

pub use limiter::RateLimiter;
pub use window::TimeWindow;
