use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::store::{get_json, keys, set_json, KeyValueStore, StoreError};

/// Display theme. Serialized lowercase to match the persisted record shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// The single persisted preference record.
///
/// Created implicitly on first read (as the default, in memory only) and
/// persisted only once an explicit save occurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub language: String,
    pub theme: Theme,
    pub voice_enabled: bool,
    pub location: String,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            theme: Theme::Light,
            voice_enabled: true,
            location: String::new(),
        }
    }
}

/// A form draft saved locally before submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub id: String,
    pub page: String,
    pub body: serde_json::Value,
    pub saved_at_ms: u64,
}

/// Generic string-keyed cache bucket shared by the informational pages.
pub type CacheBucket = BTreeMap<String, serde_json::Value>;

/// Binds a fixed key and a default value to the generic store adapter.
///
/// `load` reads once per call; there is no subscription. A missing record
/// yields a clone of the default and does NOT write it back, so an unrelated
/// reader still observes the key as absent at the store layer.
#[derive(Debug, Clone)]
pub struct ScopedRecord<T> {
    key: &'static str,
    default: T,
}

impl<T> ScopedRecord<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn new(key: &'static str, default: T) -> Self {
        Self { key, default }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub async fn load<S: KeyValueStore + ?Sized>(&self, store: &S) -> Result<T, StoreError> {
        Ok(get_json(store, self.key)
            .await?
            .unwrap_or_else(|| self.default.clone()))
    }

    pub async fn save<S: KeyValueStore + ?Sized>(
        &self,
        store: &S,
        value: &T,
    ) -> Result<(), StoreError> {
        set_json(store, self.key, value).await
    }

    pub async fn reset<S: KeyValueStore + ?Sized>(&self, store: &S) -> Result<(), StoreError> {
        store.remove(self.key).await
    }
}

pub fn user_preferences() -> ScopedRecord<UserPreferences> {
    ScopedRecord::new(keys::USER_PREFERENCES, UserPreferences::default())
}

pub fn drafts() -> ScopedRecord<Vec<Draft>> {
    ScopedRecord::new(keys::DRAFTS, Vec::new())
}

pub fn cache_bucket() -> ScopedRecord<CacheBucket> {
    ScopedRecord::new(keys::CACHE, CacheBucket::new())
}
