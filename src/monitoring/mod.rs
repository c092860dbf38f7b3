/*!
 * Monitoring
 * Structured tracing setup and spans for long-running kernel operations
 */

mod tracer;

pub use tracer::{init_tracing, span_sync, SyncSpan};
