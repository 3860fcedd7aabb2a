//! Per-session request bookkeeping.

mod in_flight;
pub use in_flight::{InFlight, RequestManager};
