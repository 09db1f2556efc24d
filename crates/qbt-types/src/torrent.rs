//! Torrent records and related enums.

use serde::{Deserialize, Serialize};

/// A torrent record as returned by the list endpoint and by incremental
/// sync payloads.
///
/// Every field is optional because sync deltas carry only the fields that
/// changed since the last cursor. A record from the list endpoint is simply
/// the fully-populated case. [`Torrent::merge_from`] overlays a partial
/// record onto an existing one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Torrent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dlspeed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upspeed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_seeds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_leechs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TorrentState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq_dl: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f_l_piece_prio: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub super_seeding: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_start: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_on: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_on: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dl_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub up_limit: Option<i64>,
}

macro_rules! overlay {
    ($dst:expr, $src:expr, $($field:ident),+ $(,)?) => {
        $(
            if $src.$field.is_some() {
                $dst.$field = $src.$field.clone();
            }
        )+
    };
}

impl Torrent {
    /// Overlays `patch` onto `self`: fields present in the patch replace the
    /// current value, absent fields are left untouched.
    pub fn merge_from(&mut self, patch: &Torrent) {
        overlay!(
            self, patch, hash, name, size, progress, dlspeed, upspeed, priority, num_seeds,
            num_leechs, ratio, eta, state, seq_dl, f_l_piece_prio, category, tags, super_seeding,
            force_start, save_path, added_on, completion_on, completed, dl_limit, up_limit,
        );
    }
}

/// Torrent lifecycle state as reported by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TorrentState {
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "missingFiles")]
    MissingFiles,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "pausedUP")]
    PausedUpload,
    #[serde(rename = "queuedUP")]
    QueuedUpload,
    #[serde(rename = "stalledUP")]
    StalledUpload,
    #[serde(rename = "checkingUP")]
    CheckingUpload,
    #[serde(rename = "forcedUP")]
    ForcedUpload,
    #[serde(rename = "allocating")]
    Allocating,
    #[serde(rename = "downloading")]
    Downloading,
    #[serde(rename = "metaDL")]
    FetchingMetadata,
    #[serde(rename = "pausedDL")]
    PausedDownload,
    #[serde(rename = "queuedDL")]
    QueuedDownload,
    #[serde(rename = "stalledDL")]
    StalledDownload,
    #[serde(rename = "checkingDL")]
    CheckingDownload,
    #[serde(rename = "forcedDL")]
    ForcedDownload,
    #[serde(rename = "checkingResumeData")]
    CheckingResumeData,
    #[serde(rename = "moving")]
    Moving,
    #[serde(other)]
    Unknown,
}

/// Status filter accepted by the torrent list endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TorrentFilter {
    All,
    Downloading,
    Seeding,
    Completed,
    Paused,
    Active,
    Inactive,
    Resumed,
    Stalled,
    StalledUploading,
    StalledDownloading,
    Errored,
}

impl TorrentFilter {
    /// The literal query-parameter value for this filter.
    pub fn as_str(self) -> &'static str {
        match self {
            TorrentFilter::All => "all",
            TorrentFilter::Downloading => "downloading",
            TorrentFilter::Seeding => "seeding",
            TorrentFilter::Completed => "completed",
            TorrentFilter::Paused => "paused",
            TorrentFilter::Active => "active",
            TorrentFilter::Inactive => "inactive",
            TorrentFilter::Resumed => "resumed",
            TorrentFilter::Stalled => "stalled",
            TorrentFilter::StalledUploading => "stalled_uploading",
            TorrentFilter::StalledDownloading => "stalled_downloading",
            TorrentFilter::Errored => "errored",
        }
    }
}

/// Detailed per-torrent metadata from the properties endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TorrentProperties {
    #[serde(default)]
    pub save_path: String,
    #[serde(default)]
    pub creation_date: i64,
    #[serde(default)]
    pub piece_size: i64,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub total_wasted: i64,
    #[serde(default)]
    pub total_uploaded: i64,
    #[serde(default)]
    pub total_downloaded: i64,
    #[serde(default)]
    pub up_limit: i64,
    #[serde(default)]
    pub dl_limit: i64,
    #[serde(default)]
    pub time_elapsed: i64,
    #[serde(default)]
    pub seeding_time: i64,
    #[serde(default)]
    pub nb_connections: i64,
    #[serde(default)]
    pub share_ratio: f64,
    #[serde(default)]
    pub addition_date: i64,
    #[serde(default)]
    pub completion_date: i64,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub dl_speed: i64,
    #[serde(default)]
    pub up_speed: i64,
    #[serde(default)]
    pub total_size: i64,
    #[serde(default)]
    pub pieces_num: i64,
    #[serde(default)]
    pub pieces_have: i64,
}

/// One tracker entry from the trackers endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tracker {
    pub url: String,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub tier: i64,
    #[serde(default)]
    pub num_peers: i64,
    #[serde(default)]
    pub num_seeds: i64,
    #[serde(default)]
    pub num_leeches: i64,
    #[serde(default)]
    pub msg: String,
}

/// One file inside a torrent, from the files endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TorrentContent {
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub priority: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_seed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub piece_range: Option<Vec<i64>>,
    #[serde(default)]
    pub availability: f64,
}
