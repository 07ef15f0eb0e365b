//! Mosaic registration.
//!
//! Tile URLs address a *mosaic*: a server-side search over a STAC collection
//! restricted to a date window and a cloud-cover ceiling. Registering the
//! search returns an opaque key that is substituted into the tile URL
//! template.
//!
//! ```text
//! POST /mosaic/register  { CQL2-JSON filter, sortby }
//!   → { ..., "links": [{ "href": ".../mosaic/<key>/info" }, ...] }
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use super::{HttpClient, ProviderError};
use crate::raster::DataProduct;

/// Planetary Computer mosaic registration endpoint.
pub const PLANETARY_COMPUTER_REGISTER_URL: &str =
    "https://planetarycomputer.microsoft.com/api/data/v1/mosaic/register";

const KEY_PATTERN: &str = r"(?i)mosaic/(?P<key>\w+)/info";

/// Inclusive range of acquisition dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A mosaic search to register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MosaicQuery {
    pub product: DataProduct,
    pub window: DateWindow,
    /// Maximum scene cloud cover in percent (0–100).
    pub max_cloud_cover: u8,
}

impl MosaicQuery {
    pub fn new(product: DataProduct, window: DateWindow, max_cloud_cover: u8) -> Self {
        Self {
            product,
            window,
            max_cloud_cover: max_cloud_cover.min(100),
        }
    }

    /// CQL2-JSON search body.
    ///
    /// Scenes are filtered by collection and acquisition datetime (the end
    /// date is inclusive up to 23:59:59Z) and, for collections with cloud
    /// metadata, by `eo:cloud_cover`. Results are ordered least cloudy first,
    /// then newest first.
    pub fn to_search_body(&self) -> Value {
        let mut args = vec![
            json!({
                "op": "=",
                "args": [{ "property": "collection" }, self.product.collection()]
            }),
            json!({
                "op": "anyinteracts",
                "args": [
                    { "property": "datetime" },
                    { "interval": [
                        self.window.start.format("%Y-%m-%d").to_string(),
                        format!("{}T23:59:59Z", self.window.end.format("%Y-%m-%d")),
                    ] }
                ]
            }),
        ];

        let mut sortby = Vec::new();
        if self.product.uses_cloud_filter() {
            args.push(json!({
                "op": "<=",
                "args": [{ "property": "eo:cloud_cover" }, self.max_cloud_cover]
            }));
            sortby.push(json!({ "field": "eo:cloud_cover", "direction": "asc" }));
        }
        sortby.push(json!({ "field": "datetime", "direction": "desc" }));

        json!({
            "filter-lang": "cql2-json",
            "filter": { "op": "and", "args": args },
            "sortby": sortby,
        })
    }
}

/// Key of a registered mosaic, tied to the window it was registered for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MosaicKey {
    pub id: String,
    pub window: DateWindow,
}

impl MosaicKey {
    pub fn new(id: impl Into<String>, window: DateWindow) -> Self {
        Self {
            id: id.into(),
            window,
        }
    }
}

impl fmt::Display for MosaicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Registers mosaic searches and returns their keys.
pub trait MosaicRegistrar: Send + Sync {
    fn register(&self, query: &MosaicQuery) -> Result<MosaicKey, ProviderError>;
}

/// Registrar for the Microsoft Planetary Computer data API.
pub struct PlanetaryComputerRegistrar<C: HttpClient> {
    http_client: C,
    endpoint: String,
    key_pattern: Regex,
}

impl<C: HttpClient> PlanetaryComputerRegistrar<C> {
    /// Creates a registrar posting to the public endpoint.
    pub fn new(http_client: C) -> Result<Self, ProviderError> {
        Self::with_endpoint(http_client, PLANETARY_COMPUTER_REGISTER_URL)
    }

    pub fn with_endpoint(
        http_client: C,
        endpoint: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let key_pattern = Regex::new(KEY_PATTERN)
            .map_err(|e| ProviderError::Registration(format!("Invalid key pattern: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            key_pattern,
        })
    }

    /// Extracts the mosaic key from a registration response body.
    fn extract_key(&self, body: &str) -> Option<String> {
        self.key_pattern
            .captures(body)
            .and_then(|c| c.name("key"))
            .map(|m| m.as_str().to_string())
    }
}

impl<C: HttpClient> MosaicRegistrar for PlanetaryComputerRegistrar<C> {
    fn register(&self, query: &MosaicQuery) -> Result<MosaicKey, ProviderError> {
        let body = query.to_search_body().to_string();
        let response = self.http_client.post_json(&self.endpoint, &body)?;
        let text = String::from_utf8_lossy(&response);

        let id = self.extract_key(&text).ok_or_else(|| {
            ProviderError::Registration(format!(
                "no mosaic key in response for {} {}",
                query.product, query.window
            ))
        })?;

        debug!(
            product = %query.product,
            window = %query.window,
            max_cloud_cover = query.max_cloud_cover,
            key = %id,
            "Registered mosaic"
        );
        Ok(MosaicKey::new(id, query.window))
    }
}

/// Registrar wrapper that remembers keys per query.
///
/// Every cloudy tile walks the same sequence of windows, so the backward
/// search registers each window once and shares the key. Two workers racing
/// on a missing key may both register it; the last insert wins.
pub struct CachedRegistrar {
    inner: Arc<dyn MosaicRegistrar>,
    keys: DashMap<MosaicQuery, MosaicKey>,
}

impl CachedRegistrar {
    pub fn new(inner: Arc<dyn MosaicRegistrar>) -> Self {
        Self {
            inner,
            keys: DashMap::new(),
        }
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl MosaicRegistrar for CachedRegistrar {
    fn register(&self, query: &MosaicQuery) -> Result<MosaicKey, ProviderError> {
        if let Some(key) = self.keys.get(query) {
            return Ok(key.clone());
        }
        let key = self.inner.register(query)?;
        self.keys.insert(*query, key.clone());
        Ok(key)
    }
}
