//! Record keys and typed access to the durable store.

use bastion_core::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::store::DurableStore;

/// Prefix of persisted response cache entries.
pub const CACHE_PREFIX: &str = "cache/";
pub const CLAIMS_KEY: &str = "claims";
pub const WAR_CONFIG_KEY: &str = "war_config";
pub const NOTES_KEY: &str = "notes";
pub const CHAIN_STATE_KEY: &str = "chain_state";
pub const SYNC_MARKS_KEY: &str = "sync_marks";

pub fn cache_record_key(request_key: &str) -> String {
    format!("{CACHE_PREFIX}{request_key}")
}

pub async fn load_record<T: DeserializeOwned>(
    store: &dyn DurableStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StorageError::Serialization {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

pub async fn save_record<T: Serialize + ?Sized>(
    store: &dyn DurableStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let value = serde_json::to_value(value).map_err(|e| StorageError::Serialization {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    store.set(key, value).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryDurableStore;
    use bastion_core::WarConfig;

    #[tokio::test]
    async fn test_typed_roundtrip() {
        let store = InMemoryDurableStore::new();
        let config = WarConfig::default().with_quota(4);
        save_record(&store, WAR_CONFIG_KEY, &config).await.expect("save");
        let loaded: Option<WarConfig> = load_record(&store, WAR_CONFIG_KEY).await.expect("load");
        assert_eq!(loaded, Some(config));
    }

    #[tokio::test]
    async fn test_wrong_shape_is_serialization_error() {
        let store = InMemoryDurableStore::new();
        save_record(&store, WAR_CONFIG_KEY, "not a config").await.expect("save");
        let err = load_record::<WarConfig>(&store, WAR_CONFIG_KEY)
            .await
            .expect_err("shape mismatch");
        assert!(matches!(err, StorageError::Serialization { .. }));
    }

    #[test]
    fn test_cache_record_key() {
        assert_eq!(cache_record_key("user/42"), "cache/user/42");
    }
}
