use eir::{EirError, ProviderFailure, Result, TripReason};

#[test]
fn test_error_display() {
    let err = EirError::NotConfigured("groq API key missing".to_string());
    assert!(err.to_string().contains("groq API key missing"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(EirError::Timeout)
    }
    assert!(returns_error().is_err());
}

// ============================================================================
// Breaker classification
// ============================================================================

#[test]
fn breaker_tripping_errors() {
    assert_eq!(
        EirError::Unauthorized.trip_reason(),
        Some(TripReason::Unauthorized)
    );
    assert_eq!(
        EirError::QuotaExhausted.trip_reason(),
        Some(TripReason::QuotaExhausted)
    );
    assert_eq!(
        EirError::NotConfigured("no key".into()).trip_reason(),
        Some(TripReason::NotConfigured)
    );
}

#[test]
fn transient_errors_do_not_trip() {
    for err in [
        EirError::Timeout,
        EirError::Unavailable("HTTP 500".into()),
        EirError::MalformedResponse("no choices".into()),
    ] {
        assert!(err.is_transient(), "{err}");
        assert_eq!(err.trip_reason(), None, "{err}");
    }
}

#[test]
fn non_provider_errors_are_neither() {
    let err = EirError::Configuration("bad order".into());
    assert!(!err.is_transient());
    assert_eq!(err.trip_reason(), None);
}

#[test]
fn kinds_are_snake_case_labels() {
    assert_eq!(EirError::QuotaExhausted.kind(), "quota_exhausted");
    assert_eq!(EirError::Timeout.kind(), "timeout");
    assert_eq!(
        EirError::AllProvidersExhausted { failures: vec![] }.kind(),
        "all_providers_exhausted"
    );
}

// ============================================================================
// Exhaustion reporting
// ============================================================================

#[test]
fn exhaustion_message_lists_providers() {
    let err = EirError::AllProvidersExhausted {
        failures: vec![
            ProviderFailure {
                provider: "huggingface".into(),
                reason: "skipped: breaker tripped (quota exhausted)".into(),
                skipped: true,
            },
            ProviderFailure {
                provider: "groq".into(),
                reason: "request timed out".into(),
                skipped: false,
            },
        ],
    };
    let message = err.to_string();
    assert!(message.contains("huggingface"));
    assert!(message.contains("groq: request timed out"));
}

#[test]
fn trip_reason_serializes_snake_case() {
    let json = serde_json::to_string(&TripReason::QuotaExhausted).unwrap();
    assert_eq!(json, "\"quota_exhausted\"");
}
