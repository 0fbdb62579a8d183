//! Domain Layer - Price payload types and channel indexing.
//!
//! This layer contains the core domain types for the live price feed
//! with no I/O. Everything here is pure data transformation over the
//! decoded JSON messages.

/// Live price payload and channel entry views.
pub mod payload;

/// Per-channel index over a payload.
pub mod cache;
