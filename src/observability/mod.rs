//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All resilience layers produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stderr, JSON)
//!     → Whatever metrics recorder the host application installs
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Each protected call runs in a span with a call ID
//! - Metrics are cheap (no-ops without a recorder)

pub mod logging;
pub mod metrics;
