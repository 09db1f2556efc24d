//! Generation-specific URL construction.
//!
//! [`UrlBuilder`] is a pure mapping from a logical operation plus typed
//! parameters to a concrete endpoint URL. Every method matches exhaustively
//! on the generation; an operation the resolved generation cannot perform
//! fails with [`Error::Unsupported`] carrying the minimum generation that
//! can, so callers detect unsupported calls before anything is sent.

use url::Url;

use qbt_types::TorrentFilter;

use crate::error::{Error, Result};
use crate::generation::ApiGeneration;
use crate::generation::ApiGeneration::{V1, V2};
use crate::hash::validate_hashes;

/// Separator used to join hash lists into a single query/form value.
pub const HASH_SEPARATOR: char = '|';

/// Typed parameters for the torrent list operation.
#[derive(Clone, Debug, Default)]
pub struct TorrentListParams {
    pub filter: Option<TorrentFilter>,
    pub category: Option<String>,
    /// Tag filter; only the versioned generation understands it.
    pub tag: Option<String>,
    /// Restrict the listing to these hashes; only the versioned generation
    /// accepts a hash-list query parameter.
    pub hashes: Option<Vec<String>>,
}

#[derive(Clone, Debug)]
pub struct UrlBuilder {
    base: Url,
    generation: ApiGeneration,
}

impl UrlBuilder {
    /// `base` must be the server root, with a trailing slash.
    pub fn new(base: Url, generation: ApiGeneration) -> Self {
        Self { base, generation }
    }

    pub fn generation(&self) -> ApiGeneration {
        self.generation
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|err| Error::invalid(format!("cannot build endpoint {path:?}: {err}")))
    }

    fn v2(&self, module: &str, action: &str) -> Result<Url> {
        self.join(&format!("api/v2/{module}/{action}"))
    }

    /// Fails unless the resolved generation is at least V2.
    fn v2_only(&self, module: &str, action: &str) -> Result<Url> {
        match self.generation {
            V1 => Err(Error::requires(V2)),
            V2 => self.v2(module, action),
        }
    }

    pub fn login(&self) -> Result<Url> {
        match self.generation {
            V1 => self.join("login"),
            V2 => self.v2("auth", "login"),
        }
    }

    pub fn logout(&self) -> Result<Url> {
        match self.generation {
            V1 => self.join("logout"),
            V2 => self.v2("auth", "logout"),
        }
    }

    pub fn app_version(&self) -> Result<Url> {
        match self.generation {
            V1 => self.join("version/qbittorrent"),
            V2 => self.v2("app", "version"),
        }
    }

    pub fn api_version(&self) -> Result<Url> {
        match self.generation {
            V1 => self.join("version/api"),
            V2 => self.v2("app", "webapiVersion"),
        }
    }

    pub fn preferences(&self) -> Result<Url> {
        match self.generation {
            V1 => self.join("query/preferences"),
            V2 => self.v2("app", "preferences"),
        }
    }

    pub fn set_preferences(&self) -> Result<Url> {
        match self.generation {
            V1 => self.join("command/setPreferences"),
            V2 => self.v2("app", "setPreferences"),
        }
    }

    pub fn torrents(&self, params: &TorrentListParams) -> Result<Url> {
        let mut url = match self.generation {
            V1 => {
                if params.tag.is_some() || params.hashes.is_some() {
                    return Err(Error::requires(V2));
                }
                self.join("query/torrents")?
            }
            V2 => self.v2("torrents", "info")?,
        };
        {
            let mut query = url.query_pairs_mut();
            if let Some(filter) = params.filter {
                query.append_pair("filter", filter.as_str());
            }
            if let Some(category) = &params.category {
                query.append_pair("category", category);
            }
            if let Some(tag) = &params.tag {
                query.append_pair("tag", tag);
            }
            if let Some(hashes) = &params.hashes {
                validate_hashes(hashes)?;
                query.append_pair("hashes", &join_hashes(hashes));
            }
        }
        // The pair serializer leaves an empty query behind when nothing
        // was appended.
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    pub fn properties(&self, hash: &str) -> Result<Url> {
        match self.generation {
            V1 => self.join(&format!("query/propertiesGeneral/{hash}")),
            V2 => {
                let mut url = self.v2("torrents", "properties")?;
                url.query_pairs_mut().append_pair("hash", hash);
                Ok(url)
            }
        }
    }

    pub fn trackers(&self, hash: &str) -> Result<Url> {
        match self.generation {
            V1 => self.join(&format!("query/propertiesTrackers/{hash}")),
            V2 => {
                let mut url = self.v2("torrents", "trackers")?;
                url.query_pairs_mut().append_pair("hash", hash);
                Ok(url)
            }
        }
    }

    pub fn files(&self, hash: &str) -> Result<Url> {
        match self.generation {
            V1 => self.join(&format!("query/propertiesFiles/{hash}")),
            V2 => {
                let mut url = self.v2("torrents", "files")?;
                url.query_pairs_mut().append_pair("hash", hash);
                Ok(url)
            }
        }
    }

    pub fn pause(&self) -> Result<Url> {
        match self.generation {
            V1 => self.join("command/pause"),
            V2 => self.v2("torrents", "pause"),
        }
    }

    pub fn resume(&self) -> Result<Url> {
        match self.generation {
            V1 => self.join("command/resume"),
            V2 => self.v2("torrents", "resume"),
        }
    }

    pub fn recheck(&self) -> Result<Url> {
        match self.generation {
            V1 => self.join("command/recheck"),
            V2 => self.v2("torrents", "recheck"),
        }
    }

    pub fn delete(&self, delete_files: bool) -> Result<Url> {
        match self.generation {
            V1 if delete_files => self.join("command/deletePerm"),
            V1 => self.join("command/delete"),
            V2 => self.v2("torrents", "delete"),
        }
    }

    pub fn add_torrents(&self, from_files: bool) -> Result<Url> {
        match self.generation {
            V1 if from_files => self.join("command/upload"),
            V1 => self.join("command/download"),
            V2 => self.v2("torrents", "add"),
        }
    }

    pub fn set_category(&self) -> Result<Url> {
        match self.generation {
            V1 => self.join("command/setCategory"),
            V2 => self.v2("torrents", "setCategory"),
        }
    }

    pub fn create_category(&self) -> Result<Url> {
        match self.generation {
            V1 => self.join("command/addCategory"),
            V2 => self.v2("torrents", "createCategory"),
        }
    }

    pub fn remove_categories(&self) -> Result<Url> {
        match self.generation {
            V1 => self.join("command/removeCategories"),
            V2 => self.v2("torrents", "removeCategories"),
        }
    }

    pub fn categories(&self) -> Result<Url> {
        self.v2_only("torrents", "categories")
    }

    pub fn add_tags(&self) -> Result<Url> {
        self.v2_only("torrents", "addTags")
    }

    pub fn remove_tags(&self) -> Result<Url> {
        self.v2_only("torrents", "removeTags")
    }

    pub fn create_tags(&self) -> Result<Url> {
        self.v2_only("torrents", "createTags")
    }

    pub fn delete_tags(&self) -> Result<Url> {
        self.v2_only("torrents", "deleteTags")
    }

    pub fn tags(&self) -> Result<Url> {
        self.v2_only("torrents", "tags")
    }

    pub fn add_trackers(&self) -> Result<Url> {
        match self.generation {
            V1 => self.join("command/addTrackers"),
            V2 => self.v2("torrents", "addTrackers"),
        }
    }

    pub fn set_download_limit(&self) -> Result<Url> {
        match self.generation {
            V1 => self.join("command/setTorrentsDlLimit"),
            V2 => self.v2("torrents", "setDownloadLimit"),
        }
    }

    pub fn set_upload_limit(&self) -> Result<Url> {
        match self.generation {
            V1 => self.join("command/setTorrentsUpLimit"),
            V2 => self.v2("torrents", "setUploadLimit"),
        }
    }

    pub fn set_share_limits(&self) -> Result<Url> {
        self.v2_only("torrents", "setShareLimits")
    }

    pub fn toggle_sequential_download(&self) -> Result<Url> {
        match self.generation {
            V1 => self.join("command/toggleSequentialDownload"),
            V2 => self.v2("torrents", "toggleSequentialDownload"),
        }
    }

    pub fn set_force_start(&self) -> Result<Url> {
        self.v2_only("torrents", "setForceStart")
    }

    pub fn transfer_info(&self) -> Result<Url> {
        self.v2_only("transfer", "info")
    }

    pub fn speed_limits_mode(&self) -> Result<Url> {
        self.v2_only("transfer", "speedLimitsMode")
    }

    pub fn toggle_speed_limits_mode(&self) -> Result<Url> {
        self.v2_only("transfer", "toggleSpeedLimitsMode")
    }

    pub fn sync_maindata(&self, rid: u64) -> Result<Url> {
        let mut url = match self.generation {
            V1 => self.join("sync/maindata")?,
            V2 => self.v2("sync", "maindata")?,
        };
        url.query_pairs_mut().append_pair("rid", &rid.to_string());
        Ok(url)
    }

    pub fn rss_items(&self, with_data: bool) -> Result<Url> {
        let mut url = self.v2_only("rss", "items")?;
        url.query_pairs_mut()
            .append_pair("withData", bool_str(with_data));
        Ok(url)
    }

    pub fn rss_add_folder(&self) -> Result<Url> {
        self.v2_only("rss", "addFolder")
    }

    pub fn rss_add_feed(&self) -> Result<Url> {
        self.v2_only("rss", "addFeed")
    }

    pub fn rss_remove_item(&self) -> Result<Url> {
        self.v2_only("rss", "removeItem")
    }

    pub fn rss_move_item(&self) -> Result<Url> {
        self.v2_only("rss", "moveItem")
    }

    pub fn rss_refresh_item(&self) -> Result<Url> {
        self.v2_only("rss", "refreshItem")
    }
}

/// Joins hashes with the wire separator, preserving the caller's casing.
pub(crate) fn join_hashes<S: AsRef<str>>(hashes: &[S]) -> String {
    let mut joined = String::new();
    for (idx, hash) in hashes.iter().enumerate() {
        if idx > 0 {
            joined.push(HASH_SEPARATOR);
        }
        joined.push_str(hash.as_ref());
    }
    joined
}

/// Form bodies carry booleans as literal strings, never native booleans.
pub(crate) fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH_A: &str = "8c212779b4abde7c6bc608063a0d008b7e40ce32";
    const HASH_B: &str = "f3b9ad3857aa3bf31c2b9e6d24c0ba2c0c9b4840";

    fn builder(generation: ApiGeneration) -> UrlBuilder {
        UrlBuilder::new(Url::parse("http://localhost:8080/").unwrap(), generation)
    }

    #[test]
    fn v1_uses_legacy_paths() {
        let urls = builder(ApiGeneration::V1);
        assert_eq!(urls.login().unwrap().path(), "/login");
        assert_eq!(urls.pause().unwrap().path(), "/command/pause");
        assert_eq!(
            urls.torrents(&TorrentListParams::default()).unwrap().path(),
            "/query/torrents"
        );
        assert_eq!(
            urls.properties(HASH_A).unwrap().path(),
            format!("/query/propertiesGeneral/{HASH_A}")
        );
    }

    #[test]
    fn v2_uses_versioned_paths() {
        let urls = builder(ApiGeneration::V2);
        assert_eq!(urls.login().unwrap().path(), "/api/v2/auth/login");
        assert_eq!(urls.pause().unwrap().path(), "/api/v2/torrents/pause");
        let url = urls.properties(HASH_A).unwrap();
        assert_eq!(url.path(), "/api/v2/torrents/properties");
        assert_eq!(url.query(), Some(format!("hash={HASH_A}").as_str()));
    }

    #[test]
    fn base_path_prefix_is_preserved() {
        let urls = UrlBuilder::new(
            Url::parse("http://host/qbt/").unwrap(),
            ApiGeneration::V2,
        );
        assert_eq!(urls.login().unwrap().path(), "/qbt/api/v2/auth/login");
    }

    #[test]
    fn v2_only_operations_name_the_required_generation() {
        let urls = builder(ApiGeneration::V1);
        for result in [
            urls.tags(),
            urls.categories(),
            urls.transfer_info(),
            urls.rss_items(true),
            urls.set_share_limits(),
            urls.set_force_start(),
        ] {
            match result {
                Err(Error::Unsupported { required }) => assert_eq!(required, ApiGeneration::V2),
                other => panic!("expected unsupported, got {other:?}"),
            }
        }
    }

    #[test]
    fn torrent_list_query_parameters() {
        let urls = builder(ApiGeneration::V2);
        let params = TorrentListParams {
            filter: Some(TorrentFilter::Downloading),
            category: Some("linux".into()),
            tag: Some("iso".into()),
            hashes: Some(vec![HASH_A.into(), HASH_B.into()]),
        };
        let url = urls.torrents(&params).unwrap();
        let query = url.query().unwrap();
        assert!(query.contains("filter=downloading"));
        assert!(query.contains("category=linux"));
        assert!(query.contains("tag=iso"));
        assert!(query.contains(&format!("hashes={HASH_A}%7C{HASH_B}")));
    }

    #[test]
    fn v1_rejects_tag_and_hash_filters() {
        let urls = builder(ApiGeneration::V1);
        let params = TorrentListParams {
            tag: Some("iso".into()),
            ..TorrentListParams::default()
        };
        assert!(matches!(
            urls.torrents(&params),
            Err(Error::Unsupported { required: ApiGeneration::V2 })
        ));
    }

    #[test]
    fn sync_url_carries_cursor() {
        let urls = builder(ApiGeneration::V2);
        let url = urls.sync_maindata(42).unwrap();
        assert_eq!(url.path(), "/api/v2/sync/maindata");
        assert_eq!(url.query(), Some("rid=42"));

        let urls = builder(ApiGeneration::V1);
        let url = urls.sync_maindata(0).unwrap();
        assert_eq!(url.path(), "/sync/maindata");
        assert_eq!(url.query(), Some("rid=0"));
    }

    #[test]
    fn rss_items_encodes_with_data_flag() {
        let urls = builder(ApiGeneration::V2);
        let url = urls.rss_items(false).unwrap();
        assert_eq!(url.query(), Some("withData=false"));
    }

    #[test]
    fn join_hashes_uses_pipe_separator() {
        assert_eq!(join_hashes(&[HASH_A]), HASH_A);
        assert_eq!(join_hashes(&[HASH_A, HASH_B]), format!("{HASH_A}|{HASH_B}"));
    }
}
