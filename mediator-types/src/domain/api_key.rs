use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::UserId;

entity_id!(
    /// Unique identifier for an API key.
    ApiKeyId
);

/// Bearer credential bound to a user. Only the SHA-256 hash is stored.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub user_id: UserId,
    pub name: String,
    /// Leading characters of the raw key, for display.
    pub key_prefix: String,
    #[serde(skip)]
    pub key_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub const PREFIX_LEN: usize = 11;

    pub fn new(
        user_id: UserId,
        name: String,
        raw_key: &str,
        key_hash: String,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ApiKeyId::new(),
            user_id,
            name,
            key_prefix: raw_key.chars().take(Self::PREFIX_LEN).collect(),
            key_hash,
            is_active: true,
            created_at: now,
            expires_at,
            last_used_at: None,
        }
    }

    /// Active and not yet expired.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|exp| now < exp)
    }

    /// Swaps in a freshly generated key, keeping id and ownership.
    pub fn rotate(&mut self, raw_key: &str, key_hash: String) {
        self.key_prefix = raw_key.chars().take(Self::PREFIX_LEN).collect();
        self.key_hash = key_hash;
        self.last_used_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_api_key_validity() {
        let now = Utc::now();
        let mut key = ApiKey::new(
            UserId::new(),
            "ci".into(),
            "mk_abcdefghijklmnop",
            "hash".into(),
            Some(now + Duration::days(1)),
            now,
        );
        assert_eq!(key.key_prefix, "mk_abcdefgh");
        assert!(key.is_valid(now));
        assert!(!key.is_valid(now + Duration::days(1)));

        key.is_active = false;
        assert!(!key.is_valid(now));
    }

    #[test]
    fn test_hash_never_serialized() {
        let key = ApiKey::new(UserId::new(), "ci".into(), "mk_x", "secret".into(), None, Utc::now());
        let json = serde_json::to_string(&key).unwrap();
        assert!(!json.contains("secret"));
    }
}
