//! Offline persistence core for the AgriSeva portal.
//!
//! The portal is a client-side application; everything here runs locally.
//! The crate provides the key-value store adapter, typed preference/draft
//! accessors, the offline submission queue with its bounded-retry policy,
//! the network status monitor, the cache-first fetch worker, and the
//! rule-based advisory evaluators that produce the queued payloads.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod advisory;
pub mod network;
pub mod prefs;
pub mod queue;
pub mod store;
pub mod worker;

pub use advisory::{
    detect_disease, recommend_crops, CropRecommendation, DiseaseFinding, Season, SoilSample,
    WeatherSnapshot,
};
pub use network::NetworkMonitor;
pub use prefs::{cache_bucket, drafts, user_preferences, ScopedRecord, Theme, UserPreferences};
pub use queue::{
    OfflineQueue, ProcessReport, ProcessorError, QueueItem, QueueItemId, QueueProcessor,
    Submission, UnixTimeMs, MAX_ATTEMPTS,
};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use worker::{
    CacheBackend, CacheWorker, FetchRequest, FetchResponse, Fetcher, MemoryCacheBackend, Notifier,
    PushPayload, CACHE_VERSION, PRECACHE_MANIFEST,
};
