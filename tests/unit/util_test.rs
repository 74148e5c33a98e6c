//! Tests for utility functions

use prometheus_event_loop::util::{init_tracing, init_tracing_with, DEFAULT_FILTER};

#[test]
fn test_default_filter_targets_crate() {
    assert!(DEFAULT_FILTER.starts_with("prometheus_event_loop"));
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    init_tracing_with("debug");
    tracing::info!("tracing initialised twice without panicking");
}
