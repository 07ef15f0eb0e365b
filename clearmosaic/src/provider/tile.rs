//! Tile sources.

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use super::{HttpClient, MosaicKey, ProviderError};
use crate::coord::{tiles_per_axis, MAX_ZOOM};
use crate::raster::{decode_tile, DataProduct, TileBuffer};

/// Address of one tile of one product in one registered mosaic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileRequest {
    pub key: MosaicKey,
    pub product: DataProduct,
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileRequest {
    pub fn new(key: MosaicKey, product: DataProduct, zoom: u8, x: u32, y: u32) -> Self {
        Self {
            key,
            product,
            zoom,
            x,
            y,
        }
    }

    /// Same tile and mosaic, different product.
    pub fn with_product(&self, product: DataProduct) -> Self {
        Self {
            product,
            ..self.clone()
        }
    }

    /// Same tile and product in another mosaic.
    pub fn with_key(&self, key: MosaicKey) -> Self {
        Self {
            key,
            ..self.clone()
        }
    }
}

impl fmt::Display for TileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} z{} ({}, {}) [{}]",
            self.product, self.zoom, self.x, self.y, self.key
        )
    }
}

/// Source of decoded tiles.
///
/// Implementations must be safe to call from many worker threads at once.
pub trait TileSource: Send + Sync {
    /// Fetches and decodes one tile.
    ///
    /// The returned buffer has the product's band count. An empty response
    /// is [`ProviderError::EmptyTile`], a missing tile
    /// [`ProviderError::TileNotFound`].
    fn fetch(&self, request: &TileRequest) -> Result<TileBuffer, ProviderError>;
}

/// Tile URL templates per product.
///
/// Templates use `{key}`, `{z}`, `{x}` and `{y}` placeholders. Products
/// without an override use [`DataProduct::default_template`], or the legacy
/// template when the mosaic window starts before it applies.
#[derive(Debug, Clone, Default)]
pub struct UrlTemplates {
    overrides: HashMap<DataProduct, String>,
}

impl UrlTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the template of one product.
    pub fn with_template(mut self, product: DataProduct, template: impl Into<String>) -> Self {
        self.overrides.insert(product, template.into());
        self
    }

    /// Template used for `request`.
    pub fn template_for(&self, request: &TileRequest) -> String {
        if let Some(template) = self.overrides.get(&request.product) {
            return template.clone();
        }
        request
            .product
            .legacy_template(request.key.window.start)
            .unwrap_or_else(|| request.product.default_template())
    }

    /// Formats the URL of `request`.
    pub fn url_for(&self, request: &TileRequest) -> String {
        self.template_for(request)
            .replace("{key}", &request.key.id)
            .replace("{z}", &request.zoom.to_string())
            .replace("{x}", &request.x.to_string())
            .replace("{y}", &request.y.to_string())
    }
}

/// Tile source fetching over HTTP and decoding PNG/TIFF bodies.
pub struct HttpTileSource<C: HttpClient> {
    http_client: C,
    templates: UrlTemplates,
}

impl<C: HttpClient> HttpTileSource<C> {
    pub fn new(http_client: C, templates: UrlTemplates) -> Self {
        Self {
            http_client,
            templates,
        }
    }

    pub fn templates(&self) -> &UrlTemplates {
        &self.templates
    }
}

impl<C: HttpClient> TileSource for HttpTileSource<C> {
    fn fetch(&self, request: &TileRequest) -> Result<TileBuffer, ProviderError> {
        if request.zoom > MAX_ZOOM {
            return Err(ProviderError::UnsupportedZoom(request.zoom));
        }
        let last = tiles_per_axis(request.zoom);
        if request.x >= last || request.y >= last {
            return Err(ProviderError::TileNotFound(request.to_string()));
        }

        let url = self.templates.url_for(request);
        trace!(url = %url, "Fetching tile");

        let body = self.http_client.get(&url)?;
        if body.is_empty() {
            return Err(ProviderError::EmptyTile(url));
        }

        let product = request.product;
        Ok(decode_tile(&body, product.encoding(), product.band_count())?)
    }
}
