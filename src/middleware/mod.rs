pub mod rate_limit;
pub mod request_id;

pub use rate_limit::{RateLimitState, SlidingWindowLimiter, rate_limit_middleware};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
