//! Tests for per-provider availability breakers.

use std::sync::Arc;
use std::time::Duration;

use eir::{BreakerConfig, BreakerRegistry, BreakerState, TripReason};

fn registry() -> BreakerRegistry {
    let registry = BreakerRegistry::default();
    registry.register("huggingface", "meta-llama/Llama-3.1-8B-Instruct");
    registry.register("groq", "llama-3.1-8b-instant");
    registry.register("deepseek", "deepseek-chat");
    registry
}

#[test]
fn providers_start_available() {
    let registry = registry();
    for d in registry.descriptors() {
        assert_eq!(d.state, BreakerState::Available);
        assert_eq!(d.trip_reason, None);
        assert!(registry.is_available(&d.name));
    }
}

#[test]
fn unknown_provider_is_available() {
    let registry = registry();
    assert!(registry.is_available("openai"));
    assert_eq!(registry.state("openai"), None);
}

#[test]
fn trip_is_sticky_and_reports_reason() {
    let registry = registry();
    assert!(registry.trip("huggingface", TripReason::QuotaExhausted));

    assert!(!registry.is_available("huggingface"));
    assert_eq!(registry.state("huggingface"), Some(BreakerState::Tripped));
    assert_eq!(
        registry.trip_reason("huggingface"),
        Some(TripReason::QuotaExhausted)
    );
    // Other breakers are independent.
    assert!(registry.is_available("groq"));

    // Success without recovery configured does not close it.
    registry.record_success("huggingface");
    assert!(!registry.is_available("huggingface"));
}

#[test]
fn second_trip_is_not_a_transition() {
    let registry = registry();
    assert!(registry.trip("groq", TripReason::Unauthorized));
    assert!(!registry.trip("groq", TripReason::QuotaExhausted));
    assert_eq!(registry.trip_reason("groq"), Some(TripReason::QuotaExhausted));
}

#[test]
fn reset_restores_availability() {
    let registry = registry();
    registry.trip("deepseek", TripReason::NotConfigured);
    assert!(registry.reset("deepseek"));
    assert!(registry.is_available("deepseek"));
    assert!(!registry.reset("openai"));
}

#[test]
fn reset_all_and_reason_counts() {
    let registry = registry();
    registry.trip("huggingface", TripReason::QuotaExhausted);
    registry.trip("groq", TripReason::QuotaExhausted);
    registry.trip("deepseek", TripReason::Unauthorized);

    let counts = registry.tripped_by_reason();
    assert_eq!(counts.get(&TripReason::QuotaExhausted), Some(&2));
    assert_eq!(counts.get(&TripReason::Unauthorized), Some(&1));

    registry.reset_all();
    assert!(registry.tripped_by_reason().is_empty());
}

#[test]
fn descriptors_keep_registration_order_and_model() {
    let registry = registry();
    registry.register("groq", "other-model");
    let descriptors = registry.descriptors();
    let names: Vec<_> = descriptors.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, ["huggingface", "groq", "deepseek"]);
    assert_eq!(descriptors[1].model, "llama-3.1-8b-instant");
}

#[test]
fn trip_is_visible_across_threads() {
    let registry = Arc::new(registry());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.trip("groq", TripReason::QuotaExhausted))
        })
        .collect();
    let transitions = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|changed| *changed)
        .count();

    assert_eq!(transitions, 1);
    assert!(!registry.is_available("groq"));
}

#[tokio::test(start_paused = true)]
async fn recovery_admits_one_probe_per_window() {
    let registry = BreakerRegistry::new(
        BreakerConfig::new().recovery_after(Some(Duration::from_secs(60))),
    );
    registry.register("groq", "llama-3.1-8b-instant");
    registry.trip("groq", TripReason::QuotaExhausted);

    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(!registry.is_available("groq"));

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(registry.is_available("groq"), "probe admitted");
    assert!(!registry.is_available("groq"), "only one probe per window");

    // Probe failed: the next window starts from the probe.
    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(registry.is_available("groq"));

    // Probe succeeded: breaker closes.
    registry.record_success("groq");
    assert_eq!(registry.state("groq"), Some(BreakerState::Available));
    assert!(registry.is_available("groq"));
    assert!(registry.is_available("groq"));
}
