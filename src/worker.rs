//! Cache-first fetch worker.
//!
//! Mirrors the three service-worker lifecycle events: a strict precache at
//! install, cache-first interception of fetches, and eviction of stale cache
//! generations at activation. The hosting runtime triggers each event; this
//! module only supplies the handlers. Network access, the cache storage, and
//! notification display are injected behind traits so the same logic runs
//! against a browser shell or an in-memory test double.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

/// Current cache generation. Anything else is evicted at activation.
pub const CACHE_VERSION: &str = "agriseva-v1";

/// Paths precached at install, before any navigation.
pub const PRECACHE_MANIFEST: &[&str] = &[
    "/",
    "/static/css/main.css",
    "/static/js/main.js",
    "/crop-advisory",
    "/disease-detection",
    "/marketplace",
    "/support",
    "/news",
    "/forum",
    "/manifest.json",
];

pub const SYNC_TAG_OFFLINE: &str = "offline-sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDestination {
    Document,
    Script,
    Style,
    Image,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: Url,
    pub method: HttpMethod,
    pub destination: RequestDestination,
}

impl FetchRequest {
    pub fn get(url: Url, destination: RequestDestination) -> Self {
        Self {
            url,
            method: HttpMethod::Get,
            destination,
        }
    }
}

/// Response type as classified by the platform fetch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Same-origin response; the only kind eligible for caching.
    Basic,
    Cors,
    Opaque,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub kind: ResponseKind,
    pub body: Bytes,
    pub content_type: Option<String>,
}

impl FetchResponse {
    pub fn basic(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            kind: ResponseKind::Basic,
            body: body.into(),
            content_type: None,
        }
    }

    /// Opaque and error responses must never be cached.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.kind == ResponseKind::Basic
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("network unreachable")]
    Offline,

    #[error("fetch failed: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("precache failed for {url}: {reason}")]
    PrecacheFailed { url: String, reason: String },

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchFailure),

    #[error("cache backend error: {0}")]
    Cache(String),

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid push payload: {0}")]
    Push(String),

    #[error("notification error: {0}")]
    Notification(String),
}

// ============================================================================
// Seams
// ============================================================================

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchFailure>;
}

/// Named response caches, one name per generation.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn put(&self, cache: &str, url: &Url, response: FetchResponse)
        -> Result<(), WorkerError>;
    async fn get(&self, cache: &str, url: &Url) -> Result<Option<FetchResponse>, WorkerError>;
    /// Looks the URL up across every open cache, any generation.
    async fn match_any(&self, url: &Url) -> Result<Option<FetchResponse>, WorkerError>;
    async fn names(&self) -> Result<Vec<String>, WorkerError>;
    async fn delete(&self, cache: &str) -> Result<bool, WorkerError>;
}

/// Platform notification/window primitives. Pass-through only.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show_notification(
        &self,
        title: &str,
        body: &str,
        url: Option<&Url>,
    ) -> Result<(), WorkerError>;
    async fn open_window(&self, url: &Url) -> Result<(), WorkerError>;
}

// ============================================================================
// Push payload
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: Option<PushData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushData {
    #[serde(default)]
    pub url: Option<String>,
}

impl PushPayload {
    pub fn parse(raw: &[u8]) -> Result<Self, WorkerError> {
        serde_json::from_slice(raw).map_err(|e| WorkerError::Push(e.to_string()))
    }

    fn target_url(&self, origin: &Url) -> Result<Url, WorkerError> {
        match self.data.as_ref().and_then(|d| d.url.as_deref()) {
            Some(raw) => resolve(origin, raw),
            None => Ok(origin.clone()),
        }
    }
}

fn resolve(origin: &Url, path: &str) -> Result<Url, WorkerError> {
    origin.join(path).map_err(|e| WorkerError::InvalidUrl {
        url: path.to_string(),
        reason: e.to_string(),
    })
}

// ============================================================================
// Worker
// ============================================================================

pub struct CacheWorker<B, F> {
    origin: Url,
    version: String,
    caches: Arc<B>,
    fetcher: F,
}

impl<B, F> CacheWorker<B, F>
where
    B: CacheBackend + 'static,
    F: Fetcher,
{
    pub fn new(origin: Url, caches: Arc<B>, fetcher: F) -> Self {
        Self {
            origin,
            version: CACHE_VERSION.to_string(),
            caches,
            fetcher,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Precaches the manifest into the current-version cache.
    ///
    /// Strict: every manifest URL is fetched first, and any failure (network
    /// or non-200) fails the whole install before a single entry is stored,
    /// so a partial precache is never left behind.
    pub async fn install(&self) -> Result<(), WorkerError> {
        let mut fetched = Vec::with_capacity(PRECACHE_MANIFEST.len());

        for path in PRECACHE_MANIFEST {
            let url = resolve(&self.origin, path)?;
            let request = FetchRequest::get(url.clone(), RequestDestination::Other);
            let response =
                self.fetcher
                    .fetch(&request)
                    .await
                    .map_err(|e| WorkerError::PrecacheFailed {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })?;
            if response.status != 200 {
                return Err(WorkerError::PrecacheFailed {
                    url: url.to_string(),
                    reason: format!("status {}", response.status),
                });
            }
            fetched.push((url, response));
        }

        for (url, response) in fetched {
            self.caches.put(&self.version, &url, response).await?;
        }

        info!(
            cache = self.version.as_str(),
            entries = PRECACHE_MANIFEST.len(),
            "precache complete"
        );
        Ok(())
    }

    /// Cache-first interception of a single request.
    ///
    /// A cache hit returns immediately with no network attempt and no
    /// freshness check. On a miss the network is consulted; a 200 same-origin
    /// basic response is copied into the current cache by a detached task so
    /// the caller is not blocked on the write. When the network fails,
    /// document requests fall back to the cached root as an offline shell;
    /// every other destination propagates the failure.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchResponse, WorkerError> {
        if request.method != HttpMethod::Get {
            return Ok(self.fetcher.fetch(request).await?);
        }

        if let Some(cached) = self.caches.match_any(&request.url).await? {
            return Ok(cached);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.spawn_cache_write(request.url.clone(), response.clone());
                }
                Ok(response)
            }
            Err(failure) => {
                if request.destination == RequestDestination::Document {
                    let root = resolve(&self.origin, "/")?;
                    if let Some(shell) = self.caches.match_any(&root).await? {
                        info!(url = request.url.as_str(), "serving offline shell");
                        return Ok(shell);
                    }
                }
                Err(failure.into())
            }
        }
    }

    // Fire-and-forget: the response return path never waits on the cache
    // write, and write errors are logged and swallowed.
    fn spawn_cache_write(&self, url: Url, response: FetchResponse) {
        let caches = Arc::clone(&self.caches);
        let version = self.version.clone();
        tokio::spawn(async move {
            if let Err(e) = caches.put(&version, &url, response).await {
                warn!(url = url.as_str(), "cache write failed: {e}");
            }
        });
    }

    /// Deletes every cache generation other than the current version.
    /// Returns the names that were removed.
    pub async fn activate(&self) -> Result<Vec<String>, WorkerError> {
        let mut deleted = Vec::new();
        for name in self.caches.names().await? {
            if name != self.version && self.caches.delete(&name).await? {
                info!(cache = name.as_str(), "deleted stale cache");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Background-sync hook. Placeholder: the real flush happens through
    /// `OfflineQueue::process_queue`, driven by the page context.
    pub fn handle_sync(&self, tag: &str) -> bool {
        if tag == SYNC_TAG_OFFLINE {
            info!("sync event received, offline data will be flushed");
            true
        } else {
            false
        }
    }

    /// Displays a notification for a push payload.
    pub async fn handle_push<N: Notifier>(
        &self,
        notifier: &N,
        raw: &[u8],
    ) -> Result<(), WorkerError> {
        let payload = PushPayload::parse(raw)?;
        let url = payload.target_url(&self.origin)?;
        notifier
            .show_notification(&payload.title, &payload.body, Some(&url))
            .await
    }

    /// Routes a notification click: the `view` action opens the payload URL
    /// (or the portal root), anything else just dismisses.
    pub async fn handle_notification_click<N: Notifier>(
        &self,
        notifier: &N,
        action: &str,
        payload: &PushPayload,
    ) -> Result<(), WorkerError> {
        if action != "view" {
            return Ok(());
        }
        let url = payload.target_url(&self.origin)?;
        notifier.open_window(&url).await
    }
}

// ============================================================================
// In-memory cache backend
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    caches: RwLock<HashMap<String, HashMap<String, FetchResponse>>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn put(
        &self,
        cache: &str,
        url: &Url,
        response: FetchResponse,
    ) -> Result<(), WorkerError> {
        self.caches
            .write()
            .await
            .entry(cache.to_string())
            .or_default()
            .insert(url.to_string(), response);
        Ok(())
    }

    async fn get(&self, cache: &str, url: &Url) -> Result<Option<FetchResponse>, WorkerError> {
        Ok(self
            .caches
            .read()
            .await
            .get(cache)
            .and_then(|entries| entries.get(url.as_str()))
            .cloned())
    }

    async fn match_any(&self, url: &Url) -> Result<Option<FetchResponse>, WorkerError> {
        let caches = self.caches.read().await;
        for entries in caches.values() {
            if let Some(response) = entries.get(url.as_str()) {
                return Ok(Some(response.clone()));
            }
        }
        Ok(None)
    }

    async fn names(&self) -> Result<Vec<String>, WorkerError> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, cache: &str) -> Result<bool, WorkerError> {
        Ok(self.caches.write().await.remove(cache).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn origin() -> Url {
        Url::parse("https://agriseva.example").unwrap()
    }

    /// Fetcher serving a fixed URL->response map, counting calls per URL.
    #[derive(Default)]
    struct ScriptedFetcher {
        responses: HashMap<String, FetchResponse>,
        offline: std::sync::atomic::AtomicBool,
        calls: Mutex<HashMap<String, usize>>,
        total_calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn serving_manifest() -> Self {
            let mut fetcher = Self::default();
            for path in PRECACHE_MANIFEST {
                let url = origin().join(path).unwrap();
                fetcher.responses.insert(
                    url.to_string(),
                    FetchResponse::basic(200, format!("body of {path}")),
                );
            }
            fetcher
        }

        fn with_response(mut self, path: &str, response: FetchResponse) -> Self {
            let url = origin().join(path).unwrap();
            self.responses.insert(url.to_string(), response);
            self
        }

        fn go_offline(&self) {
            self.offline.store(true, Ordering::SeqCst);
        }

        fn calls_for(&self, path: &str) -> usize {
            let url = origin().join(path).unwrap();
            *self.calls.lock().unwrap().get(url.as_str()).unwrap_or(&0)
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchFailure> {
            self.total_calls.fetch_add(1, Ordering::SeqCst);
            *self
                .calls
                .lock()
                .unwrap()
                .entry(request.url.to_string())
                .or_insert(0) += 1;

            if self.offline.load(Ordering::SeqCst) {
                return Err(FetchFailure::Offline);
            }
            self.responses
                .get(request.url.as_str())
                .cloned()
                .ok_or_else(|| FetchFailure::Other("no route".into()))
        }
    }

    fn worker(fetcher: ScriptedFetcher) -> CacheWorker<MemoryCacheBackend, ScriptedFetcher> {
        CacheWorker::new(origin(), Arc::new(MemoryCacheBackend::new()), fetcher)
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn doc_request(path: &str) -> FetchRequest {
        FetchRequest::get(origin().join(path).unwrap(), RequestDestination::Document)
    }

    #[tokio::test]
    async fn install_precaches_whole_manifest() {
        let worker = worker(ScriptedFetcher::serving_manifest());
        worker.install().await.unwrap();

        for path in PRECACHE_MANIFEST {
            let url = origin().join(path).unwrap();
            let cached = worker.caches.get(CACHE_VERSION, &url).await.unwrap();
            assert!(cached.is_some(), "missing precache entry for {path}");
        }
    }

    #[tokio::test]
    async fn install_fails_whole_on_single_bad_url() {
        let fetcher = ScriptedFetcher::serving_manifest()
            .with_response("/news", FetchResponse::basic(404, ""));
        let worker = worker(fetcher);

        let result = worker.install().await;
        assert_matches!(result, Err(WorkerError::PrecacheFailed { .. }));

        // Strict install: nothing was stored.
        assert!(worker.caches.names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn precached_url_never_hits_network() {
        let worker = worker(ScriptedFetcher::serving_manifest());
        worker.install().await.unwrap();
        let installs = worker.fetcher.total_calls.load(Ordering::SeqCst);

        let response = worker.handle_fetch(&doc_request("/news")).await.unwrap();
        assert_eq!(response.body, Bytes::from("body of /news"));
        assert_eq!(worker.fetcher.total_calls.load(Ordering::SeqCst), installs);
    }

    #[tokio::test]
    async fn uncached_url_fetched_once_then_served_from_cache() {
        let fetcher = ScriptedFetcher::serving_manifest()
            .with_response("/api/news-feed", FetchResponse::basic(200, "feed"));
        let worker = worker(fetcher);

        let request = FetchRequest::get(
            origin().join("/api/news-feed").unwrap(),
            RequestDestination::Other,
        );

        let first = worker.handle_fetch(&request).await.unwrap();
        assert_eq!(first.body, Bytes::from("feed"));
        settle().await;

        let second = worker.handle_fetch(&request).await.unwrap();
        assert_eq!(second.body, Bytes::from("feed"));
        assert_eq!(worker.fetcher.calls_for("/api/news-feed"), 1);
    }

    #[tokio::test]
    async fn non_basic_and_non_200_responses_are_not_cached() {
        let fetcher = ScriptedFetcher::default()
            .with_response("/missing", FetchResponse::basic(404, "not found"))
            .with_response(
                "/cdn-asset",
                FetchResponse {
                    status: 200,
                    kind: ResponseKind::Opaque,
                    body: Bytes::from("opaque"),
                    content_type: None,
                },
            );
        let worker = worker(fetcher);

        for path in ["/missing", "/cdn-asset"] {
            let request =
                FetchRequest::get(origin().join(path).unwrap(), RequestDestination::Other);
            // Returned unmodified both times; the network is consulted again
            // because nothing was stored.
            worker.handle_fetch(&request).await.unwrap();
            settle().await;
            worker.handle_fetch(&request).await.unwrap();
            assert_eq!(worker.fetcher.calls_for(path), 2);
        }
    }

    #[tokio::test]
    async fn offline_document_request_falls_back_to_root_shell() {
        let worker = worker(ScriptedFetcher::serving_manifest());
        worker.install().await.unwrap();
        worker.fetcher.go_offline();

        let response = worker
            .handle_fetch(&doc_request("/some/uncached/page"))
            .await
            .unwrap();
        assert_eq!(response.body, Bytes::from("body of /"));
    }

    #[tokio::test]
    async fn offline_non_document_request_propagates_failure() {
        let worker = worker(ScriptedFetcher::serving_manifest());
        worker.install().await.unwrap();
        worker.fetcher.go_offline();

        let request = FetchRequest::get(
            origin().join("/uncached.png").unwrap(),
            RequestDestination::Image,
        );
        let result = worker.handle_fetch(&request).await;
        assert_matches!(result, Err(WorkerError::Fetch(FetchFailure::Offline)));
    }

    #[tokio::test]
    async fn activation_keeps_only_current_version() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let url = origin().join("/").unwrap();
        backend
            .put("agriseva-v0", &url, FetchResponse::basic(200, "old"))
            .await
            .unwrap();
        backend
            .put("agriseva-v1", &url, FetchResponse::basic(200, "new"))
            .await
            .unwrap();

        let worker = CacheWorker::new(origin(), backend, ScriptedFetcher::default());
        let deleted = worker.activate().await.unwrap();

        assert_eq!(deleted, vec!["agriseva-v0".to_string()]);
        assert_eq!(
            worker.caches.names().await.unwrap(),
            vec![CACHE_VERSION.to_string()]
        );
    }

    #[tokio::test]
    async fn non_get_requests_bypass_cache() {
        let fetcher = ScriptedFetcher::default()
            .with_response("/api/submit", FetchResponse::basic(200, "accepted"));
        let worker = worker(fetcher);

        let request = FetchRequest {
            url: origin().join("/api/submit").unwrap(),
            method: HttpMethod::Post,
            destination: RequestDestination::Other,
        };

        worker.handle_fetch(&request).await.unwrap();
        settle().await;
        worker.handle_fetch(&request).await.unwrap();
        assert_eq!(worker.fetcher.calls_for("/api/submit"), 2);
    }

    #[test]
    fn sync_hook_recognizes_offline_tag() {
        let worker = worker(ScriptedFetcher::default());
        assert!(worker.handle_sync(SYNC_TAG_OFFLINE));
        assert!(!worker.handle_sync("periodic-cleanup"));
    }

    /// Notifier double recording shown notifications and opened windows.
    #[derive(Default)]
    struct RecordingNotifier {
        shown: Mutex<Vec<(String, String, Option<String>)>>,
        opened: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn show_notification(
            &self,
            title: &str,
            body: &str,
            url: Option<&Url>,
        ) -> Result<(), WorkerError> {
            self.shown.lock().unwrap().push((
                title.to_string(),
                body.to_string(),
                url.map(|u| u.to_string()),
            ));
            Ok(())
        }

        async fn open_window(&self, url: &Url) -> Result<(), WorkerError> {
            self.opened.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn push_payload_shows_notification() {
        let worker = worker(ScriptedFetcher::default());
        let notifier = RecordingNotifier::default();

        let raw = serde_json::json!({
            "title": "Mandi prices updated",
            "body": "Soybean up 4% in your district",
            "data": { "url": "/marketplace" }
        });
        worker
            .handle_push(&notifier, raw.to_string().as_bytes())
            .await
            .unwrap();

        let shown = notifier.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].0, "Mandi prices updated");
        assert_eq!(
            shown[0].2.as_deref(),
            Some("https://agriseva.example/marketplace")
        );
    }

    #[tokio::test]
    async fn malformed_push_payload_is_an_error() {
        let worker = worker(ScriptedFetcher::default());
        let notifier = RecordingNotifier::default();

        let result = worker.handle_push(&notifier, b"not json").await;
        assert_matches!(result, Err(WorkerError::Push(_)));
        assert!(notifier.shown.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn notification_click_routes_view_action_only() {
        let worker = worker(ScriptedFetcher::default());
        let notifier = RecordingNotifier::default();

        let payload = PushPayload {
            title: "t".into(),
            body: "b".into(),
            data: Some(PushData {
                url: Some("/forum".into()),
            }),
        };

        worker
            .handle_notification_click(&notifier, "close", &payload)
            .await
            .unwrap();
        assert!(notifier.opened.lock().unwrap().is_empty());

        worker
            .handle_notification_click(&notifier, "view", &payload)
            .await
            .unwrap();
        assert_eq!(
            *notifier.opened.lock().unwrap(),
            vec!["https://agriseva.example/forum".to_string()]
        );
    }

    #[tokio::test]
    async fn click_without_data_url_opens_root() {
        let worker = worker(ScriptedFetcher::default());
        let notifier = RecordingNotifier::default();

        let payload = PushPayload {
            title: "t".into(),
            body: "b".into(),
            data: None,
        };
        worker
            .handle_notification_click(&notifier, "view", &payload)
            .await
            .unwrap();
        assert_eq!(
            *notifier.opened.lock().unwrap(),
            vec!["https://agriseva.example/".to_string()]
        );
    }
}
