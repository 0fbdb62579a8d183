//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the feed adapter built on the transport port defined
//! in the application layer, plus configuration and observability.

/// Live-prices WebSocket client and transport.
pub mod feed;

/// Listener fan-out and host event bus.
pub mod broadcast;

/// Configuration loading from the environment.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
