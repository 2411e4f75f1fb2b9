use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque identifier of the entity a session belongs to.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectKey(pub String);

impl SubjectKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SubjectKey {
    fn from(s: &str) -> Self {
        SubjectKey(s.to_owned())
    }
}

/// Random identifier minted per session instance and carried in the wire token.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub String);

impl TokenId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `now + ttl`, pinned to the latest representable instant instead of overflowing.
pub fn expire_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Extra data embedded alongside a session, handed back on every validation.
pub type Claims = serde_json::Map<String, serde_json::Value>;

/// Server-side state backing one wire token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub subject: SubjectKey,
    pub token_id: TokenId,
    #[serde(default)]
    pub claims: Claims,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
    /// Midpoint of the lifetime; auto-refresh kicks in once it has passed.
    pub refresh_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn new(
        subject: SubjectKey,
        token_id: TokenId,
        claims: Claims,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        let mut record = TokenRecord {
            subject,
            token_id,
            claims,
            created_at: now,
            expire_at: now,
            refresh_at: now,
        };
        record.restart(now, lifetime);
        record
    }

    /// Resets the lifetime window so that it starts at `now`.
    pub fn restart(&mut self, now: DateTime<Utc>, lifetime: Duration) {
        self.created_at = now;
        self.expire_at = expire_after(now, lifetime);
        self.refresh_at = expire_after(now, lifetime / 2);
    }

    pub fn is_refresh_due(&self, now: DateTime<Utc>) -> bool {
        now > self.refresh_at
    }

    /// Lifetime left at `now`, or `None` once the record has expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        match (self.expire_at - now).to_std() {
            Ok(d) if !d.is_zero() => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record_at(now: DateTime<Utc>) -> TokenRecord {
        TokenRecord::new(
            SubjectKey::from("42"),
            TokenId("abc".to_string()),
            Claims::new(),
            now,
            Duration::from_secs(100),
        )
    }

    #[test]
    fn timestamps_follow_lifetime() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = record_at(now);

        assert_eq!(record.created_at, now);
        assert_eq!(record.expire_at, now + chrono::Duration::seconds(100));
        assert_eq!(record.refresh_at, now + chrono::Duration::seconds(50));
    }

    #[test]
    fn refresh_due_only_after_midpoint() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = record_at(now);

        assert!(!record.is_refresh_due(now + chrono::Duration::seconds(50)));
        assert!(record.is_refresh_due(now + chrono::Duration::seconds(51)));
    }

    #[test]
    fn remaining_is_none_once_expired() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = record_at(now);

        assert_eq!(
            record.remaining(now + chrono::Duration::seconds(40)),
            Some(Duration::from_secs(60))
        );
        assert_eq!(record.remaining(now + chrono::Duration::seconds(100)), None);
        assert_eq!(record.remaining(now + chrono::Duration::seconds(130)), None);
    }

    #[test]
    fn huge_lifetime_saturates() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut record = record_at(now);
        record.restart(now, Duration::MAX);

        assert_eq!(record.expire_at, DateTime::<Utc>::MAX_UTC);
        assert_eq!(record.refresh_at, DateTime::<Utc>::MAX_UTC);
        assert!(!record.is_refresh_due(now));
        assert!(record.remaining(now).is_some());
    }

    #[test]
    fn record_json_shape() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut record = record_at(now);
        record
            .claims
            .insert("role".to_string(), serde_json::json!("admin"));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["subject"], "42");
        assert_eq!(value["token_id"], "abc");
        assert_eq!(value["claims"]["role"], "admin");

        let back: TokenRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
