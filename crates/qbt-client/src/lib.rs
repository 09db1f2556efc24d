//! Async client SDK for the qbt torrent-management Web API.
//!
//! The server exposes two historically incompatible wire generations; this
//! crate resolves which one a server speaks (once, on first use), routes
//! every operation through generation-specific URL and request builders,
//! maintains a caller-side mirror of the server's mutable collections via
//! the incremental sync protocol, and rebuilds the RSS folder/feed tree
//! from the flat listing the server returns.
//!
//! ```no_run
//! use qbt_client::{Client, RequestContext, SyncMirror};
//! use url::Url;
//!
//! # async fn run() -> qbt_client::Result<()> {
//! let client = Client::builder()
//!     .base_url(Url::parse("http://localhost:8080/").unwrap())
//!     .credentials("admin", "adminadmin")
//!     .build()?;
//!
//! let ctx = RequestContext::background();
//! client.login(&ctx).await?;
//!
//! let mut mirror = SyncMirror::new();
//! client.sync_step(&ctx, &mut mirror).await?;
//! for (hash, torrent) in mirror.torrents() {
//!     println!("{hash}: {:?}", torrent.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod generation;
pub mod hash;
pub mod request;
pub mod rss;
pub mod sync;

pub use crate::client::{Client, ClientBuilder, Credentials};
pub use crate::context::{CancelToken, RequestContext};
pub use crate::endpoint::{HASH_SEPARATOR, TorrentListParams, UrlBuilder};
pub use crate::error::{Error, Result};
pub use crate::generation::{ApiGeneration, V2_MIN_LEGACY_VERSION};
pub use crate::hash::{is_valid_hash, validate_hash, validate_hashes};
pub use crate::request::{AddTorrentOptions, Body, PreparedRequest, RequestBuilder, TorrentUpload};
pub use crate::rss::{PATH_SEPARATOR, RssFeed, RssFolder, RssNode, parse_items};
pub use crate::sync::SyncMirror;

// Re-export the wire records so most callers need only this crate.
pub use qbt_types::{
    Category, MainData, RssArticle, ServerState, Torrent, TorrentContent, TorrentFilter,
    TorrentProperties, TorrentState, Tracker, TransferInfo,
};
