//! Tests for configuration validation

use prometheus_event_loop::config::{DeliveryMode, FrameConfig, SchedulerConfig, ENV_PREFIX};
use std::time::Duration;

#[test]
fn test_default_config_is_valid() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.delivery.mode, DeliveryMode::Inline);
    assert_eq!(cfg.frame.target_fps, 20);
}

#[test]
fn test_invalid_queue_capacity() {
    let cfg = SchedulerConfig::new().with_queue_capacity(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_invalid_callback_capacity() {
    let cfg = SchedulerConfig::new().with_callback_queue_capacity(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_invalid_frame_rate() {
    assert!(SchedulerConfig::new().with_frame(0, 0).validate().is_err());
    assert!(SchedulerConfig::new().with_frame(5_000, 0).validate().is_err());
}

#[test]
fn test_zero_low_slice_is_allowed() {
    let cfg = SchedulerConfig::new().with_frame(60, 0);
    assert!(cfg.validate().is_ok());
    assert!(cfg.frame.low_slice().is_zero());
}

#[test]
fn test_builder_methods() {
    let cfg = SchedulerConfig::new()
        .with_queue_capacity(10)
        .with_delivery(DeliveryMode::Async, Duration::from_millis(250))
        .with_readiness_timeout(Duration::from_secs(1))
        .with_shutdown_timeout(Duration::from_secs(3));
    assert_eq!(cfg.queue_capacity, 10);
    assert_eq!(cfg.delivery.timeout(), Duration::from_millis(250));
    assert_eq!(cfg.readiness_timeout(), Duration::from_secs(1));
    assert_eq!(cfg.shutdown_timeout(), Duration::from_secs(3));
}

#[test]
fn test_from_json_partial() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{"queue_capacity": 32, "delivery": {"mode": "async", "timeout_ms": 50}}"#,
    )
    .unwrap();
    assert_eq!(cfg.queue_capacity, 32);
    assert_eq!(cfg.delivery.mode, DeliveryMode::Async);
    assert_eq!(cfg.frame, FrameConfig::default());
}

#[test]
fn test_from_json_partial_nested_sections() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{"delivery": {"mode": "async"}, "frame": {"low_slice_ms": 5}}"#,
    )
    .unwrap();
    assert_eq!(cfg.delivery.mode, DeliveryMode::Async);
    assert_eq!(cfg.delivery.timeout(), Duration::from_secs(1));
    assert_eq!(cfg.frame.target_fps, FrameConfig::default().target_fps);
    assert_eq!(cfg.frame.low_slice_ms, 5);
}

#[test]
fn test_from_json_rejects_invalid() {
    assert!(SchedulerConfig::from_json_str(r#"{"queue_capacity": 0}"#).is_err());
    assert!(SchedulerConfig::from_json_str("not json").is_err());
}

#[test]
fn test_json_round_trip_preserves_fields() {
    let cfg = SchedulerConfig::new().with_frame(30, 5);
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(SchedulerConfig::from_json_str(&json).unwrap(), cfg);
}

#[test]
fn test_from_vars_uses_prefix() {
    let cfg = SchedulerConfig::from_vars(|key| {
        (key == format!("{ENV_PREFIX}TARGET_FPS")).then(|| "60".to_string())
    })
    .unwrap();
    assert_eq!(cfg.frame.target_fps, 60);
}
