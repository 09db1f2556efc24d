//! Caller-side mirror for the incremental sync protocol.
//!
//! The sync endpoint is stateless from the client's point of view: each
//! fetch returns a [`MainData`] partial snapshot plus the cursor for the
//! next fetch. [`SyncMirror`] owns the reconstructed full state and applies
//! snapshots with the documented merge semantics:
//!
//! - torrents merge by key: new hashes insert, known hashes get a
//!   field-level overlay, removal lists delete;
//! - categories and tags replace by diff (`*_added` / `*_removed`);
//! - an absent collection means "unchanged", a present-but-empty one means
//!   "became empty".
//!
//! Merging successive snapshots converges to the same state as one full
//! snapshot taken after the same changes, so callers may skip fetches.

use std::collections::{BTreeSet, HashMap};

use qbt_types::{Category, MainData, ServerState, Torrent};

use crate::error::{Error, Result};

/// Reconstructed full server state, fed by successive sync snapshots.
#[derive(Clone, Debug, Default)]
pub struct SyncMirror {
    rid: u64,
    synced: bool,
    torrents: HashMap<String, Torrent>,
    categories: HashMap<String, Category>,
    tags: BTreeSet<String>,
    server_state: ServerState,
}

impl SyncMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor to supply to the next fetch. 0 until the first snapshot has
    /// been applied, which makes the first fetch request a full update.
    pub fn rid(&self) -> u64 {
        self.rid
    }

    /// True once a full update has been applied.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn torrents(&self) -> &HashMap<String, Torrent> {
        &self.torrents
    }

    pub fn categories(&self) -> &HashMap<String, Category> {
        &self.categories
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn server_state(&self) -> &ServerState {
        &self.server_state
    }

    /// Applies one partial snapshot.
    ///
    /// A full update replaces the mirror wholesale; a delta overlays it.
    /// Fails with `ProtocolViolation` if a full update carries removal
    /// lists, and with `InvalidArgument` if a delta arrives before any
    /// full update. The mirror is left untouched on error.
    pub fn apply(&mut self, data: &MainData) -> Result<()> {
        if data.full_update {
            if data.has_removals() {
                return Err(Error::violation(
                    "full update must not carry removal lists",
                ));
            }
            self.reset_from(data);
        } else {
            if !self.synced {
                return Err(Error::invalid(
                    "cannot apply a delta to an unsynchronized mirror; fetch cursor 0 first",
                ));
            }
            self.overlay_from(data);
        }
        self.rid = data.rid;
        self.synced = true;
        Ok(())
    }

    fn reset_from(&mut self, data: &MainData) {
        self.torrents = data.torrents.clone().unwrap_or_default();
        self.categories = data.categories_added.clone().unwrap_or_default();
        self.tags = data
            .tags_added
            .as_ref()
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default();
        self.server_state = data.server_state.clone().unwrap_or_default();
        // Changed-category entries are folded in even on a full update;
        // servers are free to split the set across both maps.
        if let Some(changed) = &data.categories_changed {
            for (name, category) in changed {
                self.categories.insert(name.clone(), category.clone());
            }
        }
    }

    fn overlay_from(&mut self, data: &MainData) {
        if let Some(torrents) = &data.torrents {
            for (hash, patch) in torrents {
                self.torrents
                    .entry(hash.clone())
                    .and_modify(|existing| existing.merge_from(patch))
                    .or_insert_with(|| patch.clone());
            }
        }
        if let Some(removed) = &data.torrents_removed {
            for hash in removed {
                self.torrents.remove(hash);
            }
        }
        if let Some(added) = &data.categories_added {
            for (name, category) in added {
                self.categories.insert(name.clone(), category.clone());
            }
        }
        if let Some(changed) = &data.categories_changed {
            for (name, category) in changed {
                self.categories.insert(name.clone(), category.clone());
            }
        }
        if let Some(removed) = &data.categories_removed {
            for name in removed {
                self.categories.remove(name);
            }
        }
        if let Some(added) = &data.tags_added {
            for tag in added {
                self.tags.insert(tag.clone());
            }
        }
        if let Some(removed) = &data.tags_removed {
            for tag in removed {
                self.tags.remove(tag);
            }
        }
        if let Some(state) = &data.server_state {
            self.server_state.merge_from(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbt_types::TorrentState;

    const HASH: &str = "8c212779b4abde7c6bc608063a0d008b7e40ce32";

    fn category(name: &str) -> Category {
        Category {
            name: name.to_string(),
            save_path: format!("/data/{name}"),
        }
    }

    fn full_snapshot() -> MainData {
        MainData {
            rid: 1,
            full_update: true,
            torrents: Some(HashMap::from([(
                HASH.to_string(),
                Torrent {
                    name: Some("debian".into()),
                    progress: Some(0.5),
                    state: Some(TorrentState::Downloading),
                    ..Torrent::default()
                },
            )])),
            categories_added: Some(HashMap::from([("linux".to_string(), category("linux"))])),
            tags_added: Some(vec!["iso".into()]),
            server_state: Some(ServerState {
                dl_info_speed: Some(1000),
                ..ServerState::default()
            }),
            ..MainData::default()
        }
    }

    #[test]
    fn full_update_resets_the_mirror() {
        let mut mirror = SyncMirror::new();
        mirror.apply(&full_snapshot()).unwrap();

        assert!(mirror.is_synced());
        assert_eq!(mirror.rid(), 1);
        assert_eq!(mirror.torrents().len(), 1);
        assert!(mirror.categories().contains_key("linux"));
        assert!(mirror.tags().contains("iso"));
        assert_eq!(mirror.server_state().dl_info_speed, Some(1000));
    }

    #[test]
    fn delta_before_full_update_is_rejected() {
        let mut mirror = SyncMirror::new();
        let delta = MainData {
            rid: 2,
            ..MainData::default()
        };
        assert!(matches!(
            mirror.apply(&delta),
            Err(Error::InvalidArgument(_))
        ));
        assert!(!mirror.is_synced());
        assert_eq!(mirror.rid(), 0);
    }

    #[test]
    fn full_update_with_removals_is_a_protocol_violation() {
        let mut mirror = SyncMirror::new();
        let mut data = full_snapshot();
        data.torrents_removed = Some(vec![HASH.to_string()]);
        assert!(matches!(
            mirror.apply(&data),
            Err(Error::ProtocolViolation(_))
        ));
        assert!(!mirror.is_synced());
    }

    #[test]
    fn delta_overlays_torrent_fields() {
        let mut mirror = SyncMirror::new();
        mirror.apply(&full_snapshot()).unwrap();

        let delta = MainData {
            rid: 2,
            torrents: Some(HashMap::from([(
                HASH.to_string(),
                Torrent {
                    progress: Some(1.0),
                    state: Some(TorrentState::Uploading),
                    ..Torrent::default()
                },
            )])),
            ..MainData::default()
        };
        mirror.apply(&delta).unwrap();

        let torrent = &mirror.torrents()[HASH];
        assert_eq!(torrent.name.as_deref(), Some("debian"));
        assert_eq!(torrent.progress, Some(1.0));
        assert_eq!(torrent.state, Some(TorrentState::Uploading));
        assert_eq!(mirror.rid(), 2);
    }

    #[test]
    fn absent_collections_leave_state_untouched() {
        let mut mirror = SyncMirror::new();
        mirror.apply(&full_snapshot()).unwrap();

        let delta = MainData {
            rid: 2,
            ..MainData::default()
        };
        mirror.apply(&delta).unwrap();

        assert_eq!(mirror.torrents().len(), 1);
        assert!(mirror.categories().contains_key("linux"));
        assert!(mirror.tags().contains("iso"));
    }

    #[test]
    fn categories_and_tags_replace_by_diff() {
        let mut mirror = SyncMirror::new();
        mirror.apply(&full_snapshot()).unwrap();

        let delta = MainData {
            rid: 2,
            categories_added: Some(HashMap::from([("movies".to_string(), category("movies"))])),
            categories_removed: Some(vec!["linux".into()]),
            tags_added: Some(vec!["new".into()]),
            tags_removed: Some(vec!["iso".into()]),
            ..MainData::default()
        };
        mirror.apply(&delta).unwrap();

        assert!(mirror.categories().contains_key("movies"));
        assert!(!mirror.categories().contains_key("linux"));
        assert!(mirror.tags().contains("new"));
        assert!(!mirror.tags().contains("iso"));
    }

    #[test]
    fn category_save_path_change_applies() {
        let mut mirror = SyncMirror::new();
        mirror.apply(&full_snapshot()).unwrap();

        let delta = MainData {
            rid: 2,
            categories_changed: Some(HashMap::from([(
                "linux".to_string(),
                Category {
                    name: "linux".into(),
                    save_path: "/mnt/new".into(),
                },
            )])),
            ..MainData::default()
        };
        mirror.apply(&delta).unwrap();
        assert_eq!(mirror.categories()["linux"].save_path, "/mnt/new");
    }

    // Convergence: two successive deltas end in the same state as one full
    // snapshot taken after both changes.
    #[test]
    fn successive_deltas_converge_to_coalesced_full_state() {
        let mut stepwise = SyncMirror::new();
        stepwise.apply(&full_snapshot()).unwrap();
        // Change 1: category "a" added.
        stepwise
            .apply(&MainData {
                rid: 2,
                categories_added: Some(HashMap::from([("a".to_string(), category("a"))])),
                ..MainData::default()
            })
            .unwrap();
        // Change 2: the torrent is deleted.
        stepwise
            .apply(&MainData {
                rid: 3,
                torrents_removed: Some(vec![HASH.to_string()]),
                ..MainData::default()
            })
            .unwrap();

        let mut direct = SyncMirror::new();
        direct
            .apply(&MainData {
                rid: 3,
                full_update: true,
                torrents: Some(HashMap::new()),
                categories_added: Some(HashMap::from([
                    ("linux".to_string(), category("linux")),
                    ("a".to_string(), category("a")),
                ])),
                tags_added: Some(vec!["iso".into()]),
                server_state: Some(ServerState {
                    dl_info_speed: Some(1000),
                    ..ServerState::default()
                }),
                ..MainData::default()
            })
            .unwrap();

        assert_eq!(stepwise.rid(), direct.rid());
        assert_eq!(stepwise.torrents().len(), direct.torrents().len());
        assert_eq!(
            stepwise.categories().keys().collect::<BTreeSet<_>>(),
            direct.categories().keys().collect::<BTreeSet<_>>()
        );
        assert_eq!(stepwise.tags(), direct.tags());
    }

    #[test]
    fn present_empty_torrents_map_is_not_a_removal() {
        let mut mirror = SyncMirror::new();
        mirror.apply(&full_snapshot()).unwrap();

        // An empty changed-map means no torrent changed; merge-by-key
        // semantics leave the mirror as-is.
        let delta = MainData {
            rid: 2,
            torrents: Some(HashMap::new()),
            ..MainData::default()
        };
        mirror.apply(&delta).unwrap();
        assert_eq!(mirror.torrents().len(), 1);
    }

    #[test]
    fn stale_cursor_answered_with_full_update_resets() {
        let mut mirror = SyncMirror::new();
        mirror.apply(&full_snapshot()).unwrap();

        // Server restarted and answered our cursor with a fresh full state.
        let fresh = MainData {
            rid: 1,
            full_update: true,
            torrents: Some(HashMap::new()),
            ..MainData::default()
        };
        mirror.apply(&fresh).unwrap();
        assert!(mirror.torrents().is_empty());
        assert!(mirror.categories().is_empty());
        assert!(mirror.tags().is_empty());
    }
}
