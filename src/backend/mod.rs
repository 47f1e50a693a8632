//! Reference backend: the operations the shell calls, served from memory.
//!
//! Run as the `postdesk-backend` binary over stdio, or embedded through a
//! `LocalTransport`. Posts live in an in-memory store seeded at startup.
//! Listings go through a cache-aside layer with a TTL; writes invalidate it,
//! and when the cache is offline reads fall back to the store silently.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::bridge::{CommandRegistry, Envelope, Operation};
use crate::commands::{
    CheckRedisConnection, CreatePost, CreatePostRequest, DeletePost, DeletePostRequest,
    GetAllPosts, Greet, GreetParams, NoParams, Payload, Post, UpdatePost, UpdatePostRequest,
};
use crate::config::ConfigError;
use crate::TokioMutex;

/// JSON file with an array of posts to start from.
pub const SEED_ENV: &str = "POSTDESK_SEED";

/// When set to `1`/`true`, the cache liveness check reports a refused connection.
pub const CACHE_OFFLINE_ENV: &str = "POSTDESK_CACHE_OFFLINE";

/// How long a cached post listing stays fresh.
pub const CACHE_TTL: Duration = Duration::from_secs(60);

// ─── Options ─────────────────────────────────────────────────────────────────

/// Startup options for the reference backend.
#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub seed: Vec<Post>,
    pub cache_online: bool,
    pub cache_ttl: Duration,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            seed: Vec::new(),
            cache_online: true,
            cache_ttl: CACHE_TTL,
        }
    }
}

impl BackendOptions {
    /// Read options from `POSTDESK_SEED` and `POSTDESK_CACHE_OFFLINE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let seed = match std::env::var_os(SEED_ENV).filter(|v| !v.is_empty()) {
            Some(path) => load_seed(&PathBuf::from(path))?,
            None => Vec::new(),
        };

        let cache_online = !matches!(
            std::env::var(CACHE_OFFLINE_ENV).ok().as_deref(),
            Some("1") | Some("true")
        );

        Ok(Self {
            seed,
            cache_online,
            ..Self::default()
        })
    }
}

fn load_seed(path: &Path) -> Result<Vec<Post>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

// ─── PostStore ───────────────────────────────────────────────────────────────

/// Posts keyed by id; ids are assigned here and never reused.
#[derive(Debug)]
pub struct PostStore {
    posts: BTreeMap<i32, Post>,
    /// `None` once every id up to `i32::MAX` has been handed out.
    next_id: Option<i32>,
}

impl PostStore {
    /// Build a store from seed posts. New ids continue after the largest seed id.
    pub fn new(seed: Vec<Post>) -> Result<Self, ConfigError> {
        let posts: BTreeMap<i32, Post> = seed.into_iter().map(|p| (p.id, p)).collect();
        let next_id = match posts.keys().next_back() {
            Some(&max) => max.checked_add(1).ok_or_else(|| ConfigError::InvalidSeed {
                reason: format!("post id {max} leaves no room for new posts"),
            })?,
            None => 1,
        };
        Ok(Self {
            posts,
            next_id: Some(next_id),
        })
    }

    /// All posts in ascending id order.
    pub fn all(&self) -> Vec<Post> {
        self.posts.values().cloned().collect()
    }

    /// Insert a new post, or `None` when the id space is exhausted.
    pub fn create(&mut self, title: String, text: String) -> Option<Post> {
        let id = self.next_id?;
        self.next_id = id.checked_add(1);
        let post = Post { id, title, text };
        self.posts.insert(id, post.clone());
        Some(post)
    }

    pub fn update(&mut self, id: i32, title: String, text: String) -> Option<Post> {
        let post = self.posts.get_mut(&id)?;
        post.title = title;
        post.text = text;
        Some(post.clone())
    }

    pub fn delete(&mut self, id: i32) -> bool {
        self.posts.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

// ─── PostCache ───────────────────────────────────────────────────────────────

/// Cached copy of the full post listing.
#[derive(Debug)]
pub struct PostCache {
    ttl: Duration,
    entry: Option<(Instant, Vec<Post>)>,
}

impl PostCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    /// The cached listing, if it was stored less than `ttl` before `now`.
    pub fn get(&self, now: Instant) -> Option<Vec<Post>> {
        match &self.entry {
            Some((stored, posts)) if now.saturating_duration_since(*stored) < self.ttl => {
                Some(posts.clone())
            }
            _ => None,
        }
    }

    pub fn put(&mut self, now: Instant, posts: Vec<Post>) {
        self.entry = Some((now, posts));
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

// ─── State & Registry ────────────────────────────────────────────────────────

/// Shared state behind every handler.
///
/// Lock order is store, then cache. Writers invalidate while still holding
/// the store, so a listing read before a write is never cached after it.
pub struct BackendState {
    store: TokioMutex<PostStore>,
    cache: TokioMutex<PostCache>,
    cache_online: bool,
}

impl BackendState {
    pub fn new(options: BackendOptions) -> Result<Self, ConfigError> {
        Ok(Self {
            store: TokioMutex::new(PostStore::new(options.seed)?),
            cache: TokioMutex::new(PostCache::new(options.cache_ttl)),
            cache_online: options.cache_online,
        })
    }

    /// All posts, from the cache when it is online and fresh.
    pub async fn list_posts(&self) -> Vec<Post> {
        if !self.cache_online {
            return self.store.lock().await.all();
        }

        if let Some(posts) = self.cache.lock().await.get(Instant::now()) {
            tracing::debug!(count = posts.len(), "post listing served from cache");
            return posts;
        }

        let store = self.store.lock().await;
        let posts = store.all();
        self.cache.lock().await.put(Instant::now(), posts.clone());
        posts
    }

    pub async fn create_post(&self, title: String, text: String) -> Option<Post> {
        let mut store = self.store.lock().await;
        let post = store.create(title, text)?;
        self.invalidate_listing().await;
        Some(post)
    }

    pub async fn update_post(&self, id: i32, title: String, text: String) -> Option<Post> {
        let mut store = self.store.lock().await;
        let post = store.update(id, title, text)?;
        self.invalidate_listing().await;
        Some(post)
    }

    pub async fn delete_post(&self, id: i32) -> bool {
        let mut store = self.store.lock().await;
        let removed = store.delete(id);
        if removed {
            self.invalidate_listing().await;
        }
        removed
    }

    async fn invalidate_listing(&self) {
        if self.cache_online {
            self.cache.lock().await.invalidate();
        }
    }
}

/// Build the registry serving every shell operation.
pub fn registry(state: Arc<BackendState>) -> CommandRegistry {
    let mut registry =
        CommandRegistry::new("postdesk-backend").with_version(env!("CARGO_PKG_VERSION"));

    registry.register(Greet::NAME, |p: GreetParams| async move {
        Ok::<_, String>(format!("Hello, {}!", p.name))
    });

    let s = Arc::clone(&state);
    registry.register(GetAllPosts::NAME, move |_: NoParams| {
        let state = Arc::clone(&s);
        async move { Ok::<_, String>(Envelope::success(state.list_posts().await)) }
    });

    let s = Arc::clone(&state);
    registry.register(CreatePost::NAME, move |p: Payload<CreatePostRequest>| {
        let state = Arc::clone(&s);
        async move {
            let CreatePostRequest { title, text } = p.payload;
            if title.trim().is_empty() {
                return Ok::<Envelope<Post>, String>(Envelope::error(
                    "Failed to create post: title must not be empty",
                ));
            }
            Ok(match state.create_post(title, text).await {
                Some(post) => {
                    tracing::info!(id = post.id, "created post");
                    Envelope::success(post)
                }
                None => Envelope::error("Failed to create post: id space exhausted"),
            })
        }
    });

    let s = Arc::clone(&state);
    registry.register(UpdatePost::NAME, move |p: Payload<UpdatePostRequest>| {
        let state = Arc::clone(&s);
        async move {
            let UpdatePostRequest { id, title, text } = p.payload;
            Ok::<_, String>(match state.update_post(id, title, text).await {
                Some(post) => Envelope::success(post),
                None => Envelope::error(format!("No post found with ID: {id}")),
            })
        }
    });

    let s = Arc::clone(&state);
    registry.register(DeletePost::NAME, move |p: Payload<DeletePostRequest>| {
        let state = Arc::clone(&s);
        async move {
            let id = p.payload.id;
            Ok::<_, String>(if state.delete_post(id).await {
                Envelope::<()>::empty()
            } else {
                Envelope::error(format!("No post found with ID: {id}"))
            })
        }
    });

    registry.register(CheckRedisConnection::NAME, move |_: NoParams| {
        let online = state.cache_online;
        async move {
            Ok::<_, String>(if online {
                Envelope::success("Redis is connected".to_string())
            } else {
                Envelope::error("connection refused")
            })
        }
    });

    registry
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{Bridge, LocalTransport};
    use crate::commands::{self, CallOutcome};

    fn hello_world() -> Post {
        Post {
            id: 1,
            title: "Hello".into(),
            text: "World".into(),
        }
    }

    fn bridge(options: BackendOptions) -> Bridge {
        let registry = registry(Arc::new(BackendState::new(options).unwrap()));
        Bridge::from_transport(LocalTransport::new(Arc::new(registry)))
    }

    fn seeded() -> Bridge {
        bridge(BackendOptions {
            seed: vec![hello_world()],
            ..BackendOptions::default()
        })
    }

    fn post(id: i32) -> Post {
        Post {
            id,
            title: format!("t{id}"),
            text: "x".into(),
        }
    }

    #[test]
    fn test_store_assigns_ids_after_seed() {
        let mut store = PostStore::new(vec![post(7)]).unwrap();
        let created = store.create("next".into(), "body".into()).unwrap();
        assert_eq!(created.id, 8);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_store_ids_not_reused_after_delete() {
        let mut store = PostStore::new(Vec::new()).unwrap();
        assert!(store.is_empty());
        let first = store.create("a".into(), "a".into()).unwrap();
        assert!(store.delete(first.id));
        let second = store.create("b".into(), "b".into()).unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_seed_at_max_id_is_rejected() {
        let err = PostStore::new(vec![post(i32::MAX)]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSeed { .. }));
        assert!(BackendState::new(BackendOptions {
            seed: vec![post(i32::MAX)],
            ..BackendOptions::default()
        })
        .is_err());
    }

    #[test]
    fn test_store_stops_at_last_id() {
        let mut store = PostStore::new(vec![post(i32::MAX - 1)]).unwrap();
        let last = store.create("last".into(), "x".into()).unwrap();
        assert_eq!(last.id, i32::MAX);
        assert!(store.create("one more".into(), "x".into()).is_none());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_id_space_is_a_business_error() {
        let bridge = bridge(BackendOptions {
            seed: vec![post(i32::MAX - 1)],
            ..BackendOptions::default()
        });
        assert!(commands::create_post(&bridge, "last", "x").await.is_completed());
        match commands::create_post(&bridge, "overflow", "x").await {
            CallOutcome::Rejected { message } => assert_eq!(
                message.as_deref(),
                Some("Failed to create post: id space exhausted")
            ),
            other => panic!("expected Rejected, got {other:?}"),
        }
        let ids: Vec<i32> = commands::get_all_posts(&bridge)
            .await
            .data()
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![i32::MAX - 1, i32::MAX]);
    }

    #[test]
    fn test_cache_entry_expires_after_ttl() {
        let mut cache = PostCache::new(Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(cache.get(t0).is_none());

        cache.put(t0, vec![post(1)]);
        assert_eq!(cache.get(t0 + Duration::from_secs(59)), Some(vec![post(1)]));
        assert!(cache.get(t0 + Duration::from_secs(60)).is_none());

        cache.put(t0, vec![post(1)]);
        cache.invalidate();
        assert!(cache.get(t0).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_cached_until_ttl() {
        let state = BackendState::new(BackendOptions {
            seed: vec![post(1)],
            ..BackendOptions::default()
        })
        .unwrap();
        assert_eq!(state.list_posts().await, vec![post(1)]);

        // Bypass the write path so only expiry can refresh the listing.
        state.store.lock().await.create("hidden".into(), "x".into());
        assert_eq!(state.list_posts().await.len(), 1);

        tokio::time::advance(CACHE_TTL).await;
        assert_eq!(state.list_posts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_writes_invalidate_cached_listing() {
        let state = BackendState::new(BackendOptions {
            seed: vec![post(1)],
            ..BackendOptions::default()
        })
        .unwrap();
        assert_eq!(state.list_posts().await.len(), 1);

        let created = state.create_post("new".into(), "x".into()).await.unwrap();
        assert_eq!(state.list_posts().await.len(), 2);

        state.update_post(created.id, "renamed".into(), "y".into()).await.unwrap();
        assert_eq!(state.list_posts().await[1].title, "renamed");

        assert!(state.delete_post(created.id).await);
        assert_eq!(state.list_posts().await, vec![post(1)]);
    }

    #[tokio::test]
    async fn test_offline_cache_falls_back_to_store() {
        let state = BackendState::new(BackendOptions {
            seed: vec![post(1)],
            cache_online: false,
            ..BackendOptions::default()
        })
        .unwrap();
        assert_eq!(state.list_posts().await.len(), 1);
        state.store.lock().await.create("fresh".into(), "x".into());
        assert_eq!(state.list_posts().await.len(), 2);
        assert!(state.cache.lock().await.get(Instant::now()).is_none());
    }

    #[test]
    fn test_registry_exposes_every_operation() {
        let registry = registry(Arc::new(BackendState::new(BackendOptions::default()).unwrap()));
        for op in [
            Greet::NAME,
            GetAllPosts::NAME,
            CreatePost::NAME,
            UpdatePost::NAME,
            DeletePost::NAME,
            CheckRedisConnection::NAME,
        ] {
            assert!(registry.contains(op), "missing {op}");
        }
        assert_eq!(registry.operations().len(), 6);
    }

    #[tokio::test]
    async fn test_get_all_posts_envelope_on_the_wire() {
        let value: serde_json::Value = seeded()
            .invoke("get_all_posts", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "status": "success",
                "data": [{"id": 1, "title": "Hello", "text": "World"}],
                "message": null
            })
        );
    }

    #[tokio::test]
    async fn test_get_all_posts_is_idempotent() {
        let bridge = seeded();
        commands::create_post(&bridge, "Second", "Post").await;

        let first = commands::get_all_posts(&bridge).await.data().unwrap();
        let second = commands::get_all_posts(&bridge).await.data().unwrap();
        assert_eq!(first, second);
        let ids: Vec<i32> = first.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_crud_round() {
        let bridge = seeded();

        let created = commands::create_post(&bridge, "Draft", "Body").await.data().unwrap();
        let updated = commands::update_post(&bridge, created.id, "Final", "Body v2")
            .await
            .data()
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.title, "Final");

        assert!(commands::delete_post(&bridge, created.id).await.is_completed());
        let posts = commands::get_all_posts(&bridge).await.data().unwrap();
        assert_eq!(posts, vec![hello_world()]);
    }

    #[tokio::test]
    async fn test_missing_ids_are_business_errors() {
        let bridge = seeded();

        match commands::update_post(&bridge, 42, "x", "y").await {
            CallOutcome::Rejected { message } => {
                assert_eq!(message.as_deref(), Some("No post found with ID: 42"))
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert!(matches!(
            commands::delete_post(&bridge, 42).await,
            CallOutcome::Rejected { .. }
        ));
    }

    #[tokio::test]
    async fn test_empty_title_rejected() {
        let outcome = commands::create_post(&seeded(), "  ", "body").await;
        assert!(matches!(outcome, CallOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_cache_offline_reports_connection_refused() {
        let bridge = bridge(BackendOptions {
            cache_online: false,
            ..BackendOptions::default()
        });
        match commands::check_redis_connection(&bridge).await {
            CallOutcome::Rejected { message } => {
                assert_eq!(message.as_deref(), Some("connection refused"))
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_greet_scenario() {
        assert_eq!(commands::greet(&seeded(), "Ada").await.unwrap(), "Hello, Ada!");
    }

    #[tokio::test]
    async fn test_bad_payload_rejects_call() {
        let result = seeded()
            .invoke::<Envelope<Post>>("create_post", serde_json::json!({"title": "no payload key"}))
            .await;
        assert!(matches!(
            result,
            Err(crate::bridge::BridgeError::CommandFailed { .. })
        ));
    }

    #[test]
    fn test_load_seed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(&path, r#"[{"id": 3, "title": "Seeded", "text": "from disk"}]"#).unwrap();
        let posts = load_seed(&path).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, 3);
    }

    #[test]
    fn test_load_seed_missing_file() {
        let err = load_seed(Path::new("/nonexistent/seed.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
