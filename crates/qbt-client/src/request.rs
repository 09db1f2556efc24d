//! Generation-specific request construction.
//!
//! [`RequestBuilder`] turns a mutating operation plus typed parameters into
//! a [`PreparedRequest`]: the endpoint URL and an already-encoded body. All
//! cardinality and capability checks happen here, before the transport ever
//! sees the request. The body model is transport-free so every encoding
//! rule is unit-testable without a socket.

use url::Url;

use crate::endpoint::{UrlBuilder, bool_str, join_hashes};
use crate::error::{Error, Result};
use crate::generation::ApiGeneration;
use crate::hash::{validate_hash, validate_hashes};

/// An encoded request body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    Empty,
    /// `application/x-www-form-urlencoded` fields, in insertion order.
    Form(Vec<(&'static str, String)>),
    /// Multipart fields and file parts, in insertion order.
    Multipart(Vec<Part>),
}

impl Body {
    /// Looks up a form or multipart text field by name (test helper and
    /// debugging aid).
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            Body::Empty => None,
            Body::Form(fields) => fields
                .iter()
                .find(|(field, _)| *field == name)
                .map(|(_, value)| value.as_str()),
            Body::Multipart(parts) => parts
                .iter()
                .find(|part| part.name == name && part.filename.is_none())
                .and_then(|part| std::str::from_utf8(&part.data).ok()),
        }
    }
}

/// One multipart part: either a text field or an attached file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Part {
    pub name: &'static str,
    pub filename: Option<String>,
    pub content_type: Option<&'static str>,
    pub data: Vec<u8>,
}

impl Part {
    fn text(name: &'static str, value: impl Into<String>) -> Self {
        Part {
            name,
            filename: None,
            content_type: None,
            data: value.into().into_bytes(),
        }
    }

    fn file(name: &'static str, filename: impl Into<String>, data: Vec<u8>) -> Self {
        Part {
            name,
            filename: Some(filename.into()),
            content_type: Some("application/x-bittorrent"),
            data,
        }
    }
}

/// A fully-built outgoing request, ready for the transport.
#[derive(Clone, Debug)]
pub struct PreparedRequest {
    pub url: Url,
    pub body: Body,
}

/// A torrent file to attach to an add operation.
#[derive(Clone, Debug)]
pub struct TorrentUpload {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Metadata accompanying an add-torrents operation. `None` fields are
/// omitted from the body entirely, never sent blank.
#[derive(Clone, Debug, Default)]
pub struct AddTorrentOptions {
    pub save_path: Option<String>,
    pub category: Option<String>,
    /// Tags to assign on add; only the versioned generation accepts them.
    pub tags: Option<Vec<String>>,
    pub paused: Option<bool>,
    pub skip_checking: Option<bool>,
    pub sequential_download: Option<bool>,
    pub first_last_piece_prio: Option<bool>,
    pub root_folder: Option<bool>,
    pub up_limit: Option<i64>,
    pub dl_limit: Option<i64>,
    pub rename: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RequestBuilder {
    urls: UrlBuilder,
}

impl RequestBuilder {
    pub fn new(urls: UrlBuilder) -> Self {
        Self { urls }
    }

    pub fn urls(&self) -> &UrlBuilder {
        &self.urls
    }

    fn generation(&self) -> ApiGeneration {
        self.urls.generation()
    }

    /// Encodes a hash set according to the generation's cardinality rule:
    /// the legacy generation addresses exactly one torrent per call, the
    /// versioned generation joins any non-empty set with the separator.
    fn hash_field<S: AsRef<str>>(&self, operation: &str, hashes: &[S]) -> Result<(&'static str, String)> {
        validate_hashes(hashes)?;
        match self.generation() {
            ApiGeneration::V1 => {
                if hashes.len() > 1 {
                    return Err(Error::invalid(format!(
                        "legacy API {operation} addresses a single torrent per call, got {}",
                        hashes.len()
                    )));
                }
                Ok(("hash", hashes[0].as_ref().to_string()))
            }
            ApiGeneration::V2 => Ok(("hashes", join_hashes(hashes))),
        }
    }

    pub fn login(&self, username: &str, password: &str) -> Result<PreparedRequest> {
        Ok(PreparedRequest {
            url: self.urls.login()?,
            body: Body::Form(vec![
                ("username", username.to_string()),
                ("password", password.to_string()),
            ]),
        })
    }

    pub fn logout(&self) -> Result<PreparedRequest> {
        Ok(PreparedRequest {
            url: self.urls.logout()?,
            body: Body::Empty,
        })
    }

    pub fn pause<S: AsRef<str>>(&self, hashes: &[S]) -> Result<PreparedRequest> {
        let field = self.hash_field("pause", hashes)?;
        Ok(PreparedRequest {
            url: self.urls.pause()?,
            body: Body::Form(vec![field]),
        })
    }

    pub fn resume<S: AsRef<str>>(&self, hashes: &[S]) -> Result<PreparedRequest> {
        let field = self.hash_field("resume", hashes)?;
        Ok(PreparedRequest {
            url: self.urls.resume()?,
            body: Body::Form(vec![field]),
        })
    }

    pub fn recheck<S: AsRef<str>>(&self, hashes: &[S]) -> Result<PreparedRequest> {
        let field = self.hash_field("recheck", hashes)?;
        Ok(PreparedRequest {
            url: self.urls.recheck()?,
            body: Body::Form(vec![field]),
        })
    }

    pub fn delete<S: AsRef<str>>(&self, hashes: &[S], delete_files: bool) -> Result<PreparedRequest> {
        let field = self.hash_field("delete", hashes)?;
        let mut fields = vec![field];
        // The legacy generation encodes the choice in the path instead.
        if self.generation() == ApiGeneration::V2 {
            fields.push(("deleteFiles", bool_str(delete_files).to_string()));
        }
        Ok(PreparedRequest {
            url: self.urls.delete(delete_files)?,
            body: Body::Form(fields),
        })
    }

    pub fn add_torrent_urls<S: AsRef<str>>(
        &self,
        urls: &[S],
        options: &AddTorrentOptions,
    ) -> Result<PreparedRequest> {
        validate_link_list("torrent URL", urls)?;
        let mut parts = vec![Part::text(
            "urls",
            urls.iter()
                .map(|u| u.as_ref())
                .collect::<Vec<_>>()
                .join("\n"),
        )];
        self.push_add_options(&mut parts, options)?;
        Ok(PreparedRequest {
            url: self.urls.add_torrents(false)?,
            body: Body::Multipart(parts),
        })
    }

    pub fn add_torrent_files(
        &self,
        files: &[TorrentUpload],
        options: &AddTorrentOptions,
    ) -> Result<PreparedRequest> {
        if files.is_empty() {
            return Err(Error::invalid("at least one torrent file is required"));
        }
        let mut parts = Vec::with_capacity(files.len());
        for file in files {
            if file.filename.trim().is_empty() {
                return Err(Error::invalid("torrent file name must not be blank"));
            }
            parts.push(Part::file(
                "torrents",
                file.filename.clone(),
                file.data.clone(),
            ));
        }
        self.push_add_options(&mut parts, options)?;
        Ok(PreparedRequest {
            url: self.urls.add_torrents(true)?,
            body: Body::Multipart(parts),
        })
    }

    fn push_add_options(&self, parts: &mut Vec<Part>, options: &AddTorrentOptions) -> Result<()> {
        if let Some(save_path) = &options.save_path {
            parts.push(Part::text("savepath", save_path.clone()));
        }
        if let Some(category) = &options.category {
            parts.push(Part::text("category", category.clone()));
        }
        if let Some(tags) = &options.tags {
            if self.generation() == ApiGeneration::V1 {
                return Err(Error::requires(ApiGeneration::V2));
            }
            validate_name_list("tag", tags)?;
            parts.push(Part::text("tags", join_names(tags, ',')));
        }
        if let Some(paused) = options.paused {
            parts.push(Part::text("paused", bool_str(paused)));
        }
        if let Some(skip) = options.skip_checking {
            parts.push(Part::text("skip_checking", bool_str(skip)));
        }
        if let Some(sequential) = options.sequential_download {
            parts.push(Part::text("sequentialDownload", bool_str(sequential)));
        }
        if let Some(flp) = options.first_last_piece_prio {
            parts.push(Part::text("firstLastPiecePrio", bool_str(flp)));
        }
        if let Some(root_folder) = options.root_folder {
            parts.push(Part::text("root_folder", bool_str(root_folder)));
        }
        if let Some(limit) = options.up_limit {
            parts.push(Part::text("upLimit", limit.to_string()));
        }
        if let Some(limit) = options.dl_limit {
            parts.push(Part::text("dlLimit", limit.to_string()));
        }
        if let Some(rename) = &options.rename {
            parts.push(Part::text("rename", rename.clone()));
        }
        Ok(())
    }

    pub fn set_category<S: AsRef<str>>(&self, hashes: &[S], category: &str) -> Result<PreparedRequest> {
        validate_hashes(hashes)?;
        Ok(PreparedRequest {
            url: self.urls.set_category()?,
            body: Body::Form(vec![
                ("hashes", join_hashes(hashes)),
                ("category", category.to_string()),
            ]),
        })
    }

    pub fn create_category(&self, name: &str, save_path: Option<&str>) -> Result<PreparedRequest> {
        if name.trim().is_empty() {
            return Err(Error::invalid("category name must not be blank"));
        }
        let mut fields = vec![("category", name.to_string())];
        if let Some(save_path) = save_path {
            if self.generation() == ApiGeneration::V1 {
                return Err(Error::requires(ApiGeneration::V2));
            }
            fields.push(("savePath", save_path.to_string()));
        }
        Ok(PreparedRequest {
            url: self.urls.create_category()?,
            body: Body::Form(fields),
        })
    }

    pub fn remove_categories<S: AsRef<str>>(&self, names: &[S]) -> Result<PreparedRequest> {
        validate_name_list("category", names)?;
        Ok(PreparedRequest {
            url: self.urls.remove_categories()?,
            body: Body::Form(vec![("categories", join_names(names, '\n'))]),
        })
    }

    pub fn add_tags<S: AsRef<str>, T: AsRef<str>>(
        &self,
        hashes: &[S],
        tags: &[T],
    ) -> Result<PreparedRequest> {
        validate_hashes(hashes)?;
        validate_name_list("tag", tags)?;
        Ok(PreparedRequest {
            url: self.urls.add_tags()?,
            body: Body::Form(vec![
                ("hashes", join_hashes(hashes)),
                ("tags", join_names(tags, ',')),
            ]),
        })
    }

    pub fn remove_tags<S: AsRef<str>, T: AsRef<str>>(
        &self,
        hashes: &[S],
        tags: &[T],
    ) -> Result<PreparedRequest> {
        validate_hashes(hashes)?;
        validate_name_list("tag", tags)?;
        Ok(PreparedRequest {
            url: self.urls.remove_tags()?,
            body: Body::Form(vec![
                ("hashes", join_hashes(hashes)),
                ("tags", join_names(tags, ',')),
            ]),
        })
    }

    pub fn create_tags<S: AsRef<str>>(&self, tags: &[S]) -> Result<PreparedRequest> {
        validate_name_list("tag", tags)?;
        Ok(PreparedRequest {
            url: self.urls.create_tags()?,
            body: Body::Form(vec![("tags", join_names(tags, ','))]),
        })
    }

    pub fn delete_tags<S: AsRef<str>>(&self, tags: &[S]) -> Result<PreparedRequest> {
        validate_name_list("tag", tags)?;
        Ok(PreparedRequest {
            url: self.urls.delete_tags()?,
            body: Body::Form(vec![("tags", join_names(tags, ','))]),
        })
    }

    pub fn add_trackers<S: AsRef<str>>(&self, hash: &str, urls: &[S]) -> Result<PreparedRequest> {
        validate_hash(hash)?;
        validate_link_list("tracker URL", urls)?;
        Ok(PreparedRequest {
            url: self.urls.add_trackers()?,
            body: Body::Form(vec![
                ("hash", hash.to_string()),
                ("urls", join_names(urls, '\n')),
            ]),
        })
    }

    pub fn set_download_limit<S: AsRef<str>>(
        &self,
        hashes: &[S],
        bytes_per_second: i64,
    ) -> Result<PreparedRequest> {
        validate_hashes(hashes)?;
        Ok(PreparedRequest {
            url: self.urls.set_download_limit()?,
            body: Body::Form(vec![
                ("hashes", join_hashes(hashes)),
                ("limit", bytes_per_second.to_string()),
            ]),
        })
    }

    pub fn set_upload_limit<S: AsRef<str>>(
        &self,
        hashes: &[S],
        bytes_per_second: i64,
    ) -> Result<PreparedRequest> {
        validate_hashes(hashes)?;
        Ok(PreparedRequest {
            url: self.urls.set_upload_limit()?,
            body: Body::Form(vec![
                ("hashes", join_hashes(hashes)),
                ("limit", bytes_per_second.to_string()),
            ]),
        })
    }

    pub fn set_share_limits<S: AsRef<str>>(
        &self,
        hashes: &[S],
        ratio_limit: f64,
        seeding_time_limit: i64,
    ) -> Result<PreparedRequest> {
        validate_hashes(hashes)?;
        Ok(PreparedRequest {
            url: self.urls.set_share_limits()?,
            body: Body::Form(vec![
                ("hashes", join_hashes(hashes)),
                ("ratioLimit", ratio_limit.to_string()),
                ("seedingTimeLimit", seeding_time_limit.to_string()),
            ]),
        })
    }

    pub fn toggle_sequential_download<S: AsRef<str>>(&self, hashes: &[S]) -> Result<PreparedRequest> {
        validate_hashes(hashes)?;
        Ok(PreparedRequest {
            url: self.urls.toggle_sequential_download()?,
            body: Body::Form(vec![("hashes", join_hashes(hashes))]),
        })
    }

    pub fn set_force_start<S: AsRef<str>>(&self, hashes: &[S], value: bool) -> Result<PreparedRequest> {
        validate_hashes(hashes)?;
        Ok(PreparedRequest {
            url: self.urls.set_force_start()?,
            body: Body::Form(vec![
                ("hashes", join_hashes(hashes)),
                ("value", bool_str(value).to_string()),
            ]),
        })
    }

    pub fn set_preferences(&self, prefs: &serde_json::Value) -> Result<PreparedRequest> {
        if !prefs.is_object() {
            return Err(Error::invalid("preferences payload must be a JSON object"));
        }
        Ok(PreparedRequest {
            url: self.urls.set_preferences()?,
            body: Body::Form(vec![("json", prefs.to_string())]),
        })
    }

    pub fn toggle_speed_limits_mode(&self) -> Result<PreparedRequest> {
        Ok(PreparedRequest {
            url: self.urls.toggle_speed_limits_mode()?,
            body: Body::Empty,
        })
    }

    pub fn rss_add_folder(&self, path: &str) -> Result<PreparedRequest> {
        validate_rss_path(path)?;
        Ok(PreparedRequest {
            url: self.urls.rss_add_folder()?,
            body: Body::Form(vec![("path", path.to_string())]),
        })
    }

    pub fn rss_add_feed(&self, feed_url: &str, path: Option<&str>) -> Result<PreparedRequest> {
        if feed_url.trim().is_empty() {
            return Err(Error::invalid("feed URL must not be blank"));
        }
        let mut fields = vec![("url", feed_url.to_string())];
        if let Some(path) = path {
            validate_rss_path(path)?;
            fields.push(("path", path.to_string()));
        }
        Ok(PreparedRequest {
            url: self.urls.rss_add_feed()?,
            body: Body::Form(fields),
        })
    }

    pub fn rss_remove_item(&self, path: &str) -> Result<PreparedRequest> {
        validate_rss_path(path)?;
        Ok(PreparedRequest {
            url: self.urls.rss_remove_item()?,
            body: Body::Form(vec![("path", path.to_string())]),
        })
    }

    pub fn rss_move_item(&self, from: &str, to: &str) -> Result<PreparedRequest> {
        validate_rss_path(from)?;
        validate_rss_path(to)?;
        Ok(PreparedRequest {
            url: self.urls.rss_move_item()?,
            body: Body::Form(vec![
                ("itemPath", from.to_string()),
                ("destPath", to.to_string()),
            ]),
        })
    }

    pub fn rss_refresh_item(&self, path: &str) -> Result<PreparedRequest> {
        validate_rss_path(path)?;
        Ok(PreparedRequest {
            url: self.urls.rss_refresh_item()?,
            body: Body::Form(vec![("itemPath", path.to_string())]),
        })
    }
}

fn validate_rss_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(Error::invalid("RSS item path must not be blank"));
    }
    Ok(())
}

/// Rejects empty collections and blank elements before a request exists.
fn validate_name_list<S: AsRef<str>>(kind: &str, names: &[S]) -> Result<()> {
    if names.is_empty() {
        return Err(Error::invalid(format!("at least one {kind} is required")));
    }
    for name in names {
        if name.as_ref().trim().is_empty() {
            return Err(Error::invalid(format!("{kind} must not be blank")));
        }
    }
    Ok(())
}

fn validate_link_list<S: AsRef<str>>(kind: &str, links: &[S]) -> Result<()> {
    validate_name_list(kind, links)
}

fn join_names<S: AsRef<str>>(names: &[S], separator: char) -> String {
    let mut joined = String::new();
    for (idx, name) in names.iter().enumerate() {
        if idx > 0 {
            joined.push(separator);
        }
        joined.push_str(name.as_ref());
    }
    joined
}
