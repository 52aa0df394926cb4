//! Stream combinators

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
