//! Wire-level data records for the qbt Web API client.
//!
//! Everything here is a plain serde record mirroring a JSON payload the
//! server produces. No I/O and no client logic lives in this crate; the
//! protocol layer in `qbt-client` consumes these types.

pub mod rss;
pub mod sync;
pub mod torrent;

pub use crate::rss::RssArticle;
pub use crate::sync::{Category, MainData, ServerState, TransferInfo};
pub use crate::torrent::{
    Torrent, TorrentContent, TorrentFilter, TorrentProperties, TorrentState, Tracker,
};
