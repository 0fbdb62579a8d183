//! Application Services
//!
//! - `StateCoordinator`: latest-value cache and change notifications for one
//!   site, fed by the subscription client

mod coordinator;

pub use coordinator::StateCoordinator;
