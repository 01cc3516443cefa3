//! Thin instrumentation layer over `tracing`.
//!
//! The cache does not emit metrics of its own; it opens a span per namespace
//! operation when the namespace was configured with telemetry, and individual
//! tier steps emit trace events. Everything else is up to the subscriber.

use tracing::{field, Span};

/// Opens a span for a namespace operation, or a disabled span when telemetry
/// is off.
///
/// The `key` / `keys` attributes are declared empty and attached by the
/// caller via [`Span::record`]; recording on a disabled span is a no-op.
pub(crate) fn op_span(enabled: bool, op: &'static str, namespace: &str) -> Span {
    if !enabled {
        return Span::none();
    }
    tracing::debug_span!(
        "cache.operation",
        op,
        namespace = %namespace,
        key = field::Empty,
        keys = field::Empty,
    )
}
