//! Application Layer - Ports and services.
//!
//! Defines the transport capability the feed adapter is built on and the
//! coordinator that turns raw payloads into queryable state.

/// Port interfaces for the streaming transport.
pub mod ports;

/// Price cache coordination.
pub mod services;
