//! Credential validity classification
//!
//! Pure functions over a stored credential and the current time. The manager
//! calls these on every read; `/health` calls them to report state.

use chrono::{DateTime, Duration, Utc};
use spotify_auth::Credential;

/// Default safety margin before `expires_at` at which a token counts as expired.
pub const DEFAULT_SAFETY_MARGIN_SECS: i64 = 60;

/// Where the stored credential sits in its lifecycle.
///
/// Transitions:
/// - Uninitialized → Valid (authorization code exchanged)
/// - Valid → NearExpiry (clock passes `expires_at - margin`)
/// - NearExpiry → Valid (refresh succeeded)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Uninitialized,
    Valid,
    NearExpiry,
}

impl CredentialState {
    /// Classify `credential` as of `now`.
    pub fn classify(credential: Option<&Credential>, now: DateTime<Utc>, margin: Duration) -> Self {
        match credential {
            None => CredentialState::Uninitialized,
            Some(c) if needs_refresh(c.expires_at, now, margin) => CredentialState::NearExpiry,
            Some(_) => CredentialState::Valid,
        }
    }

    /// Label for health output and logs.
    pub fn label(&self) -> &'static str {
        match self {
            CredentialState::Uninitialized => "uninitialized",
            CredentialState::Valid => "valid",
            CredentialState::NearExpiry => "near_expiry",
        }
    }
}

/// True when `now + margin` has reached `expires_at`.
pub fn needs_refresh(expires_at: DateTime<Utc>, now: DateTime<Utc>, margin: Duration) -> bool {
    match now.checked_add_signed(margin) {
        Some(deadline) => deadline >= expires_at,
        None => true,
    }
}

/// Absolute expiry for a token issued at `issued_at` with `expires_in` seconds of life.
pub fn expiry_from(issued_at: DateTime<Utc>, expires_in: u64) -> DateTime<Utc> {
    let lifetime = i64::try_from(expires_in)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX);
    issued_at
        .checked_add_signed(lifetime)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential_expiring_at(expires_at: DateTime<Utc>) -> Credential {
        Credential {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            expires_at,
        }
    }

    fn margin() -> Duration {
        Duration::seconds(DEFAULT_SAFETY_MARGIN_SECS)
    }

    #[test]
    fn no_credential_is_uninitialized() {
        assert_eq!(
            CredentialState::classify(None, Utc::now(), margin()),
            CredentialState::Uninitialized
        );
    }

    #[test]
    fn beyond_margin_is_valid() {
        let now = Utc::now();
        let cred = credential_expiring_at(now + Duration::seconds(61));
        assert_eq!(
            CredentialState::classify(Some(&cred), now, margin()),
            CredentialState::Valid
        );
    }

    #[test]
    fn exactly_at_margin_is_near_expiry() {
        let now = Utc::now();
        let cred = credential_expiring_at(now + Duration::seconds(60));
        assert_eq!(
            CredentialState::classify(Some(&cred), now, margin()),
            CredentialState::NearExpiry
        );
    }

    #[test]
    fn already_expired_is_near_expiry() {
        let now = Utc::now();
        let cred = credential_expiring_at(now - Duration::seconds(10));
        assert_eq!(
            CredentialState::classify(Some(&cred), now, margin()),
            CredentialState::NearExpiry
        );
    }

    #[test]
    fn zero_margin_only_refreshes_at_expiry() {
        let now = Utc::now();
        assert!(!needs_refresh(now + Duration::seconds(1), now, Duration::zero()));
        assert!(needs_refresh(now, now, Duration::zero()));
    }

    #[test]
    fn expiry_is_issue_time_plus_lifetime() {
        let issued_at = Utc::now();
        assert_eq!(
            expiry_from(issued_at, 3600),
            issued_at + Duration::seconds(3600)
        );
    }

    #[test]
    fn absurd_lifetime_saturates_instead_of_panicking() {
        let expires_at = expiry_from(Utc::now(), u64::MAX);
        assert_eq!(expires_at, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn labels() {
        assert_eq!(CredentialState::Uninitialized.label(), "uninitialized");
        assert_eq!(CredentialState::Valid.label(), "valid");
        assert_eq!(CredentialState::NearExpiry.label(), "near_expiry");
    }
}
