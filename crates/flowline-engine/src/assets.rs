//! Immutable reference data and the read-through asset cache.
//!
//! Assets are fetched by (type, identifier) from an [`AssetSource`] and
//! cached. Once returned, an asset is treated as immutable for the lifetime
//! of any session holding it — everything is handed out as `Arc`. The cache
//! is bounded per type with a TTL, safe for concurrent readers, and
//! guarantees at-most-one concurrent fetch per key.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::types::FlowDef;

// ---------------------------------------------------------------------------
// Asset kinds
// ---------------------------------------------------------------------------

/// The kinds of reference data the engine can look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum AssetType {
    Flow,
    Group,
    Field,
    Classifier,
    Resthook,
    Ticketer,
    Channel,
    Label,
    Location,
    Template,
}

impl AssetType {
    pub const ALL: &'static [AssetType] = &[
        Self::Flow,
        Self::Group,
        Self::Field,
        Self::Classifier,
        Self::Resthook,
        Self::Ticketer,
        Self::Channel,
        Self::Label,
        Self::Location,
        Self::Template,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Flow => "flow",
            Self::Group => "group",
            Self::Field => "field",
            Self::Classifier => "classifier",
            Self::Resthook => "resthook",
            Self::Ticketer => "ticketer",
            Self::Channel => "channel",
            Self::Label => "label",
            Self::Location => "location",
            Self::Template => "template",
        }
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Asset payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub uuid: Uuid,
    pub name: String,
    /// Present for dynamic groups whose membership is query-driven.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classifier {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intents: Vec<String>,
}

/// A named set of subscriber URLs receiving a common JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resthook {
    pub slug: String,
    #[serde(default)]
    pub subscribers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticketer {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schemes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub uuid: Uuid,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum AssetError {
    #[error("no such {kind} with identifier '{key}'")]
    NotFound { kind: AssetType, key: String },
    #[error("unable to fetch {kind} '{key}': {message}")]
    Fetch {
        kind: AssetType,
        key: String,
        message: String,
    },
    #[error("invalid {kind} '{key}': {message}")]
    Invalid {
        kind: AssetType,
        key: String,
        message: String,
    },
}

/// Where raw asset JSON comes from — an HTTP asset server in production,
/// a static map in tests.
#[async_trait]
pub trait AssetSource: Send + Sync {
    async fn fetch(&self, kind: AssetType, key: &str) -> Result<Value, AssetError>;
}

/// In-memory source backed by a map, used by tests and embedders that
/// preload their definitions.
#[derive(Default)]
pub struct StaticAssetSource {
    entries: BTreeMap<(AssetType, String), Value>,
}

impl StaticAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: AssetType, key: impl Into<String>, value: Value) -> &mut Self {
        self.entries.insert((kind, key.into()), value);
        self
    }

    /// Add a flow definition, keyed by the `uuid` field of the JSON.
    pub fn add_flow(&mut self, value: Value) -> &mut Self {
        let key = value
            .get("uuid")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        self.add(AssetType::Flow, key, value)
    }
}

#[async_trait]
impl AssetSource for StaticAssetSource {
    async fn fetch(&self, kind: AssetType, key: &str) -> Result<Value, AssetError> {
        self.entries
            .get(&(kind, key.to_string()))
            .cloned()
            .ok_or_else(|| AssetError::NotFound {
                kind,
                key: key.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Per-type bounds for the asset cache.
#[derive(Debug, Clone, Copy)]
pub struct AssetCacheBounds {
    pub capacity: u64,
    pub ttl: Duration,
}

impl Default for AssetCacheBounds {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            ttl: Duration::from_secs(300),
        }
    }
}

/// Cache configuration: defaults plus per-type overrides.
#[derive(Debug, Clone, Default)]
pub struct AssetCacheConfig {
    pub default: AssetCacheBounds,
    pub overrides: HashMap<AssetType, AssetCacheBounds>,
}

impl AssetCacheConfig {
    fn bounds(&self, kind: AssetType) -> AssetCacheBounds {
        self.overrides.get(&kind).copied().unwrap_or(self.default)
    }
}

#[derive(Clone)]
enum CachedAsset {
    Flow(Arc<FlowDef>),
    Group(Arc<Group>),
    Field(Arc<Field>),
    Classifier(Arc<Classifier>),
    Resthook(Arc<Resthook>),
    Ticketer(Arc<Ticketer>),
    Channel(Arc<Channel>),
    Label(Arc<Label>),
    Location(Arc<Location>),
    Template(Arc<Template>),
}

/// Read-through cache over an [`AssetSource`].
///
/// Shared across sessions; `moka` provides bounded size, TTL expiry and the
/// single-flight guarantee on the insertion path.
pub struct AssetCache {
    source: Arc<dyn AssetSource>,
    caches: HashMap<AssetType, Cache<String, CachedAsset>>,
}

impl AssetCache {
    pub fn new(source: Arc<dyn AssetSource>) -> Self {
        Self::with_config(source, AssetCacheConfig::default())
    }

    pub fn with_config(source: Arc<dyn AssetSource>, config: AssetCacheConfig) -> Self {
        let mut caches = HashMap::new();
        for &kind in AssetType::ALL {
            let bounds = config.bounds(kind);
            caches.insert(
                kind,
                Cache::builder()
                    .max_capacity(bounds.capacity)
                    .time_to_live(bounds.ttl)
                    .build(),
            );
        }
        Self { source, caches }
    }

    async fn cached(&self, kind: AssetType, key: &str) -> Result<CachedAsset, AssetError> {
        let cache = &self.caches[&kind];
        let source = self.source.clone();
        let owned_key = key.to_string();
        cache
            .try_get_with(owned_key.clone(), async move {
                let raw = source.fetch(kind, &owned_key).await?;
                parse_asset(kind, &owned_key, raw)
            })
            .await
            .map_err(|e: Arc<AssetError>| (*e).clone())
    }

    pub async fn flow(&self, uuid: Uuid) -> Result<Arc<FlowDef>, AssetError> {
        match self.cached(AssetType::Flow, &uuid.to_string()).await? {
            CachedAsset::Flow(f) => Ok(f),
            _ => unreachable!("flow cache holds flows"),
        }
    }

    pub async fn group(&self, uuid: Uuid) -> Result<Arc<Group>, AssetError> {
        match self.cached(AssetType::Group, &uuid.to_string()).await? {
            CachedAsset::Group(g) => Ok(g),
            _ => unreachable!("group cache holds groups"),
        }
    }

    pub async fn field(&self, key: &str) -> Result<Arc<Field>, AssetError> {
        match self.cached(AssetType::Field, key).await? {
            CachedAsset::Field(f) => Ok(f),
            _ => unreachable!("field cache holds fields"),
        }
    }

    pub async fn classifier(&self, uuid: Uuid) -> Result<Arc<Classifier>, AssetError> {
        match self.cached(AssetType::Classifier, &uuid.to_string()).await? {
            CachedAsset::Classifier(c) => Ok(c),
            _ => unreachable!("classifier cache holds classifiers"),
        }
    }

    pub async fn resthook(&self, slug: &str) -> Result<Arc<Resthook>, AssetError> {
        match self.cached(AssetType::Resthook, slug).await? {
            CachedAsset::Resthook(r) => Ok(r),
            _ => unreachable!("resthook cache holds resthooks"),
        }
    }

    pub async fn ticketer(&self, uuid: Uuid) -> Result<Arc<Ticketer>, AssetError> {
        match self.cached(AssetType::Ticketer, &uuid.to_string()).await? {
            CachedAsset::Ticketer(t) => Ok(t),
            _ => unreachable!("ticketer cache holds ticketers"),
        }
    }

    pub async fn channel(&self, uuid: Uuid) -> Result<Arc<Channel>, AssetError> {
        match self.cached(AssetType::Channel, &uuid.to_string()).await? {
            CachedAsset::Channel(c) => Ok(c),
            _ => unreachable!("channel cache holds channels"),
        }
    }

    pub async fn label(&self, uuid: Uuid) -> Result<Arc<Label>, AssetError> {
        match self.cached(AssetType::Label, &uuid.to_string()).await? {
            CachedAsset::Label(l) => Ok(l),
            _ => unreachable!("label cache holds labels"),
        }
    }

    pub async fn location(&self, name: &str) -> Result<Arc<Location>, AssetError> {
        match self.cached(AssetType::Location, name).await? {
            CachedAsset::Location(l) => Ok(l),
            _ => unreachable!("location cache holds locations"),
        }
    }

    pub async fn template(&self, uuid: Uuid) -> Result<Arc<Template>, AssetError> {
        match self.cached(AssetType::Template, &uuid.to_string()).await? {
            CachedAsset::Template(t) => Ok(t),
            _ => unreachable!("template cache holds templates"),
        }
    }
}

fn parse_asset(kind: AssetType, key: &str, raw: Value) -> Result<CachedAsset, AssetError> {
    let invalid = |e: String| AssetError::Invalid {
        kind,
        key: key.to_string(),
        message: e,
    };
    Ok(match kind {
        AssetType::Flow => {
            let flow: FlowDef = serde_json::from_value(raw).map_err(|e| invalid(e.to_string()))?;
            flow.validate().map_err(|e| invalid(e.to_string()))?;
            CachedAsset::Flow(Arc::new(flow))
        }
        AssetType::Group => CachedAsset::Group(Arc::new(
            serde_json::from_value(raw).map_err(|e| invalid(e.to_string()))?,
        )),
        AssetType::Field => CachedAsset::Field(Arc::new(
            serde_json::from_value(raw).map_err(|e| invalid(e.to_string()))?,
        )),
        AssetType::Classifier => CachedAsset::Classifier(Arc::new(
            serde_json::from_value(raw).map_err(|e| invalid(e.to_string()))?,
        )),
        AssetType::Resthook => CachedAsset::Resthook(Arc::new(
            serde_json::from_value(raw).map_err(|e| invalid(e.to_string()))?,
        )),
        AssetType::Ticketer => CachedAsset::Ticketer(Arc::new(
            serde_json::from_value(raw).map_err(|e| invalid(e.to_string()))?,
        )),
        AssetType::Channel => CachedAsset::Channel(Arc::new(
            serde_json::from_value(raw).map_err(|e| invalid(e.to_string()))?,
        )),
        AssetType::Label => CachedAsset::Label(Arc::new(
            serde_json::from_value(raw).map_err(|e| invalid(e.to_string()))?,
        )),
        AssetType::Location => CachedAsset::Location(Arc::new(
            serde_json::from_value(raw).map_err(|e| invalid(e.to_string()))?,
        )),
        AssetType::Template => CachedAsset::Template(Arc::new(
            serde_json::from_value(raw).map_err(|e| invalid(e.to_string()))?,
        )),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        inner: StaticAssetSource,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl AssetSource for CountingSource {
        async fn fetch(&self, kind: AssetType, key: &str) -> Result<Value, AssetError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(kind, key).await
        }
    }

    fn source_with_group(uuid: &str) -> StaticAssetSource {
        let mut source = StaticAssetSource::new();
        source.add(
            AssetType::Group,
            uuid,
            json!({"uuid": uuid, "name": "Testers"}),
        );
        source
    }

    #[tokio::test]
    async fn read_through_and_memoize() {
        let uuid: Uuid = "5fa925e4-edd8-4e2a-ab24-b3dbb5932830".parse().unwrap();
        let source = Arc::new(CountingSource {
            inner: source_with_group(&uuid.to_string()),
            fetches: AtomicUsize::new(0),
        });
        let cache = AssetCache::new(source.clone());

        let first = cache.group(uuid).await.unwrap();
        let second = cache.group(uuid).await.unwrap();
        assert_eq!(first.name, "Testers");
        assert_eq!(second.name, "Testers");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_asset_is_not_found() {
        let cache = AssetCache::new(Arc::new(StaticAssetSource::new()));
        let err = cache.resthook("new-registration").await.unwrap_err();
        assert!(matches!(err, AssetError::NotFound { kind: AssetType::Resthook, .. }));
    }

    #[tokio::test]
    async fn invalid_flow_fails_validation_at_load() {
        let mut source = StaticAssetSource::new();
        source.add_flow(json!({
            "uuid": "76f0a02f-3b75-4b86-9064-e9195e1b3a02",
            "name": "Broken",
            "nodes": [{
                "uuid": "a58be63b-907d-4a1a-856b-0bb5579d7507",
                "exits": [{
                    "uuid": "37d8813f-1402-4ad2-9cc2-e9054a96525b",
                    "destination_uuid": "00000000-0000-0000-0000-000000000099"
                }]
            }]
        }));
        let cache = AssetCache::new(Arc::new(source));
        let err = cache
            .flow("76f0a02f-3b75-4b86-9064-e9195e1b3a02".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::Invalid { .. }));
    }

    #[tokio::test]
    async fn resthook_subscribers_parse() {
        let mut source = StaticAssetSource::new();
        source.add(
            AssetType::Resthook,
            "new-registration",
            json!({"slug": "new-registration", "subscribers": ["http://localhost/hook"]}),
        );
        let cache = AssetCache::new(Arc::new(source));
        let hook = cache.resthook("new-registration").await.unwrap();
        assert_eq!(hook.subscribers.len(), 1);
    }
}
