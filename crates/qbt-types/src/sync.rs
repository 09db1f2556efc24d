//! Incremental sync payloads.
//!
//! The sync endpoint answers each cursor with a partial snapshot: only the
//! collections that changed since the supplied cursor are present. An absent
//! collection means "no change"; a collection present with zero entries means
//! "became empty". The `Option` fields below preserve that distinction.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::torrent::Torrent;

/// One category as tracked by the server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(rename = "savePath", default)]
    pub save_path: String,
}

/// The partial snapshot returned by one sync fetch.
///
/// `rid` is the cursor to supply to the next fetch. `full_update` marks a
/// snapshot that carries the complete state of every tracked collection;
/// it is always set when fetching with cursor 0.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MainData {
    pub rid: u64,
    #[serde(default)]
    pub full_update: bool,
    /// Changed torrents keyed by hash; records may be partial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torrents: Option<HashMap<String, Torrent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torrents_removed: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories_added: Option<HashMap<String, Category>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories_changed: Option<HashMap<String, Category>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories_removed: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags_added: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags_removed: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_state: Option<ServerState>,
}

impl MainData {
    /// True when any removal list is present and non-empty. A full update
    /// must never carry removals; the mirror layer rejects that shape.
    pub fn has_removals(&self) -> bool {
        let non_empty = |list: &Option<Vec<String>>| list.as_ref().is_some_and(|l| !l.is_empty());
        non_empty(&self.torrents_removed)
            || non_empty(&self.categories_removed)
            || non_empty(&self.tags_removed)
    }
}

/// Global transfer counters carried in sync payloads. Partial for the same
/// reason torrent records are: deltas report only changed fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dl_info_speed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dl_info_data: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub up_info_speed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub up_info_data: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dl_rate_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub up_rate_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dht_nodes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queueing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_alt_speed_limits: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_space_on_disk: Option<i64>,
}

impl ServerState {
    /// Overlays fields present in `patch` onto `self`.
    pub fn merge_from(&mut self, patch: &ServerState) {
        macro_rules! overlay {
            ($($field:ident),+ $(,)?) => {
                $(
                    if patch.$field.is_some() {
                        self.$field = patch.$field.clone();
                    }
                )+
            };
        }
        overlay!(
            dl_info_speed,
            dl_info_data,
            up_info_speed,
            up_info_data,
            dl_rate_limit,
            up_rate_limit,
            dht_nodes,
            connection_status,
            queueing,
            use_alt_speed_limits,
            refresh_interval,
            free_space_on_disk,
        );
    }
}

/// Snapshot of global transfer counters from the transfer-info endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferInfo {
    #[serde(default)]
    pub dl_info_speed: i64,
    #[serde(default)]
    pub dl_info_data: i64,
    #[serde(default)]
    pub up_info_speed: i64,
    #[serde(default)]
    pub up_info_data: i64,
    #[serde(default)]
    pub dl_rate_limit: i64,
    #[serde(default)]
    pub up_rate_limit: i64,
    #[serde(default)]
    pub dht_nodes: i64,
    #[serde(default)]
    pub connection_status: String,
}
