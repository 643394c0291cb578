//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `TradeRouter`: Resolves a trade's sink key and forwards it
//! - `ConnectionStatusBoard`: Tracks every connection's health for reporting

mod router;
mod status;

pub use router::{RouteOutcome, TradeRouter};
pub use status::{ConnectionSnapshot, ConnectionStatusBoard, StatusCounts};
