//! Centralized constants: every numeric threshold named in §4.8/§4.10 lives here
//! once, so the state machine, the orchestrator and the persistence adapter read
//! the same numbers instead of each hard-coding its own copy.

/// Service endpoints, overridable via env var, falling back to a local default.
pub mod endpoints {
    use once_cell::sync::Lazy;

    pub static QDRANT_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6333".to_string())
    });

    pub static SCYLLA_DEFAULT: Lazy<String> = Lazy::new(|| {
        std::env::var("SCYLLA_HOSTS").unwrap_or_else(|_| "127.0.0.1:9042".to_string())
    });
}

/// Catalog matching thresholds (§4.3, §4.8 Collecting branch).
pub mod catalog {
    /// CatalogIndex.search's minScore argument in the Collecting branch.
    pub const MIN_SCORE: f32 = 0.5;
    /// Fuzzy-substring fallback's own acceptance score (§4.3).
    pub const FUZZY_FALLBACK_SCORE: f32 = 0.7;
    pub const SEARCH_K: usize = 3;
}

/// Confidence floors and the escalation band (§4.8).
pub mod dialogue {
    /// Floor applied when Greeting unconditionally recurses into Collecting.
    pub const GREETING_FLOOR: f32 = 0.95;
    /// Floor applied when Clarifying re-runs the Collecting branch.
    pub const CLARIFYING_FLOOR: f32 = 0.85;
    /// Floor applied when an additive keyword re-enters Collecting from Confirming.
    pub const ADDITIVE_FLOOR: f32 = 0.90;
    /// Below this, a single utterance increments the attempts counter.
    pub const LOW_CONFIDENCE_THRESHOLD: f32 = 0.70;
    /// Escalation band upper bound: average confidence in (0, 0.70) escalates.
    pub const ESCALATION_CONFIDENCE_UPPER: f32 = 0.70;
    pub const ESCALATION_ATTEMPTS_CEILING: u32 = 3;
    /// A quantity outside (0, 1000] is treated as not-found for that item.
    pub const MIN_QUANTITY: i64 = 1;
    pub const MAX_QUANTITY: i64 = 1000;
}

/// Order review thresholds (§4.10).
pub mod order_review {
    pub const TOTAL_AMOUNT_THRESHOLD: f64 = 10_000.0;
    pub const CONFIDENCE_THRESHOLD: f32 = 0.85;
}

/// Per-operation deadlines and session ceiling (§5).
pub mod deadlines {
    pub const SESSION_MAX_SECS: u64 = 30 * 60;
    pub const LLM_EXTRACT_MS: u64 = 8_000;
    pub const CATALOG_SEARCH_MS: u64 = 1_000;
    pub const STOCK_CHECK_MS: u64 = 1_000;
    pub const TTS_FIRST_CHUNK_MS: u64 = 2_000;
    pub const ORDER_SINK_MS: u64 = 5_000;
    pub const OUTBOUND_DRAIN_ON_CANCEL_MS: u64 = 500;
}

/// CallRegistry reaper cadence (§4.7).
pub mod reaper {
    pub const INTERVAL_SECS: u64 = 60;
    pub const STALE_AFTER_SECS: u64 = 30 * 60;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_thresholds_in_unit_range() {
        assert!((0.0..=1.0).contains(&catalog::MIN_SCORE));
        assert!((0.0..=1.0).contains(&catalog::FUZZY_FALLBACK_SCORE));
    }

    #[test]
    fn escalation_band_matches_low_confidence_threshold() {
        assert_eq!(
            dialogue::ESCALATION_CONFIDENCE_UPPER,
            dialogue::LOW_CONFIDENCE_THRESHOLD
        );
    }

    #[test]
    fn quantity_bounds_are_ordered() {
        assert!(dialogue::MIN_QUANTITY <= dialogue::MAX_QUANTITY);
    }
}
