use courier_core::{CourierError, CourierResult};
use regex::Regex;

/// Task types that must never rest in the durable offline store.
const BLOCKED_TYPES: &[&str] = &["financial", "payment", "billing"];

/// Field-name markers that indicate sensitive data in a serialized payload.
const SENSITIVE_MARKERS: &[&str] = &[
    "card_number",
    "cardnumber",
    "cvv",
    "cvc",
    "expiry",
    "iban",
    "swift",
    "routing_number",
    "account_number",
    "bank_account",
    "password",
    "credential",
    "secret",
    "api_key",
    "token",
];

/// Policy gate for offline deferral.
///
/// Entries whose type is financial in nature, or whose serialized payload
/// contains card-number digit runs or credential/bank field markers, must
/// execute immediately while online or fail fast — they are never persisted.
pub struct SafetyClassifier {
    card_pattern: Regex,
}

impl SafetyClassifier {
    /// Build the classifier.
    ///
    /// The card pattern matches 13–19 digit runs with optional space or dash
    /// separators, covering the major card network formats.
    pub fn new() -> Self {
        #[allow(clippy::expect_used)]
        let card_pattern = Regex::new(r"\b\d(?:[ -]?\d){12,18}\b")
            .expect("card number pattern is a valid regex");
        Self { card_pattern }
    }

    /// Whether an entry of this type with this payload may be queued offline.
    pub fn is_safe_for_offline(&self, entry_type: &str, payload: &serde_json::Value) -> bool {
        let type_lower = entry_type.to_lowercase();
        if BLOCKED_TYPES.iter().any(|t| type_lower.contains(t)) {
            return false;
        }

        let serialized = payload.to_string().to_lowercase();
        if SENSITIVE_MARKERS.iter().any(|m| serialized.contains(m)) {
            return false;
        }

        !self.card_pattern.is_match(&serialized)
    }

    /// Like [`Self::is_safe_for_offline`], but returns the policy rejection
    /// as an error suitable for surfacing to the caller.
    pub fn check(&self, entry_type: &str, payload: &serde_json::Value) -> CourierResult<()> {
        if self.is_safe_for_offline(entry_type, payload) {
            Ok(())
        } else {
            Err(CourierError::UnsafeForOffline(format!(
                "entry type '{entry_type}' carries financial or sensitive data"
            )))
        }
    }
}

impl Default for SafetyClassifier {
    fn default() -> Self {
        Self::new()
    }
}
