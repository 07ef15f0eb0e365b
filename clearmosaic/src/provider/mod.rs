//! Imagery provider abstraction
//!
//! External collaborators of the mosaic engine, each behind a trait so that
//! tests can substitute mocks:
//!
//! - [`HttpClient`]: blocking HTTP transport ([`ReqwestClient`])
//! - [`TileSource`]: fetch + decode one tile ([`HttpTileSource`])
//! - [`MosaicRegistrar`]: register a date-windowed search and obtain its key
//!   ([`PlanetaryComputerRegistrar`], [`CachedRegistrar`])
//!
//! # Example
//!
//! ```ignore
//! use clearmosaic::provider::{HttpTileSource, ReqwestClient, UrlTemplates};
//!
//! let client = ReqwestClient::with_timeout(Duration::from_secs(30))?;
//! let source = HttpTileSource::new(client, UrlTemplates::new());
//! let tile = source.fetch(&request)?;
//! ```

mod http;
mod registrar;
mod tile;
mod types;

pub use http::{HttpClient, ReqwestClient, DEFAULT_TIMEOUT};
pub use registrar::{
    CachedRegistrar, DateWindow, MosaicKey, MosaicQuery, MosaicRegistrar,
    PlanetaryComputerRegistrar, PLANETARY_COMPUTER_REGISTER_URL,
};
pub use tile::{HttpTileSource, TileRequest, TileSource, UrlTemplates};
pub use types::ProviderError;

#[cfg(test)]
pub use http::tests::MockHttpClient;
#[cfg(test)]
pub use registrar::tests::MockRegistrar;
#[cfg(test)]
pub use tile::tests::MockTileSource;
