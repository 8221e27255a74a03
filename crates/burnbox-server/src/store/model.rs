use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::error::StoreError;

pub const DAY_SECS: i64 = 24 * 60 * 60;
/// Expiry applied when the creator asks for none.
pub const DEFAULT_TTL_SECS: i64 = 7 * DAY_SECS;
/// Hard ceiling on how long any secret may live.
pub const MAX_TTL_SECS: i64 = 30 * DAY_SECS;

/// Stored in the secrets table as bincode-encoded bytes.
/// `ciphertext` is one of the self-describing codec formats; the store never
/// interprets it. Expiry metadata stays plaintext so the sweep can evict
/// without any key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    /// Hex SHA-256 of the ephemeral identifier.
    pub storage_key: String,
    pub ciphertext: String,
    /// Unix timestamp (seconds) when the record was created.
    pub created_at: i64,
    /// Unix timestamp (seconds) after which the record is gone. `0` means unset.
    pub expires_at: i64,
}

impl SecretRecord {
    /// True once `expires_at` is set and strictly in the past.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at != 0 && self.expires_at < now
    }
}

pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Clamp a requested expiry into `[now, now + 30d]`, defaulting to `now + 7d`.
/// A past request becomes `now`: the record is born already at its deadline.
pub fn compute_expiry(requested: Option<i64>, now: i64) -> i64 {
    let requested = requested.unwrap_or(now + DEFAULT_TTL_SECS);
    requested.clamp(now, now + MAX_TTL_SECS)
}

/// What a fetch by storage key turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Fresh(SecretRecord),
    Expired(SecretRecord),
    NotFound,
    StoreError(StoreError),
}

/// Classify the result of a store lookup at `now`.
pub fn classify(fetched: Result<Option<SecretRecord>, StoreError>, now: i64) -> Classification {
    match fetched {
        Err(e) => Classification::StoreError(e),
        Ok(None) => Classification::NotFound,
        Ok(Some(record)) if record.is_expired(now) => Classification::Expired(record),
        Ok(Some(record)) => Classification::Fresh(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn record(expires_at: i64) -> SecretRecord {
        SecretRecord {
            storage_key: "k".into(),
            ciphertext: "v2$S$00".into(),
            created_at: NOW - 10,
            expires_at,
        }
    }

    #[test]
    fn default_expiry_is_seven_days() {
        assert_eq!(compute_expiry(None, NOW), NOW + 7 * DAY_SECS);
    }

    #[test]
    fn expiry_clamped_to_thirty_days() {
        assert_eq!(compute_expiry(Some(NOW + 40 * DAY_SECS), NOW), NOW + 30 * DAY_SECS);
    }

    #[test]
    fn past_expiry_clamped_to_now() {
        assert_eq!(compute_expiry(Some(NOW - 3600), NOW), NOW);
    }

    #[test]
    fn in_range_expiry_kept() {
        assert_eq!(compute_expiry(Some(NOW + 3 * DAY_SECS), NOW), NOW + 3 * DAY_SECS);
    }

    #[test]
    fn expiry_against_wall_clock() {
        let now = now();
        let got = compute_expiry(Some(now + 40 * DAY_SECS), now);
        assert!((got - (now + MAX_TTL_SECS)).abs() <= 2);
    }

    #[test]
    fn classify_states() {
        assert_eq!(classify(Ok(None), NOW), Classification::NotFound);
        assert_eq!(
            classify(Ok(Some(record(NOW + 60))), NOW),
            Classification::Fresh(record(NOW + 60))
        );
        assert_eq!(
            classify(Ok(Some(record(NOW - 1))), NOW),
            Classification::Expired(record(NOW - 1))
        );
        assert!(matches!(
            classify(Err(StoreError::Io("down".into())), NOW),
            Classification::StoreError(_)
        ));
    }

    #[test]
    fn expiry_boundary_is_strict() {
        // Born at its deadline: still readable during that same second.
        assert!(!record(NOW).is_expired(NOW));
        assert!(record(NOW).is_expired(NOW + 1));
        // Unset expiry never lapses.
        assert!(!record(0).is_expired(NOW));
    }
}
