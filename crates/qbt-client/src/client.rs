//! The async client: generation resolution, session handling, and the
//! operation surface.
//!
//! A [`Client`] is one logical connection to a server. The wire generation
//! is resolved lazily on first use with a single legacy-version query and
//! published through a once-cell scoped to the client instance: concurrent
//! first callers share one resolution round-trip and all observe the same
//! value for the client's lifetime. The session cookie established by
//! `login` lives in the HTTP transport's cookie store.
//!
//! No operation retries. Mutating calls are idempotent on the server side,
//! so callers that want retries can layer them on top.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, trace};
use url::Url;

use qbt_types::{
    Category, MainData, Torrent, TorrentContent, TorrentProperties, Tracker, TransferInfo,
};

use crate::context::RequestContext;
use crate::endpoint::{TorrentListParams, UrlBuilder};
use crate::error::{Error, Result};
use crate::generation::ApiGeneration;
use crate::hash::validate_hash;
use crate::request::{
    AddTorrentOptions, Body, PreparedRequest, RequestBuilder, TorrentUpload,
};
use crate::rss::{RssFolder, parse_items};
use crate::sync::SyncMirror;

/// Login credentials for the cookie-based session.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Generation plus the builders derived from it, published exactly once.
#[derive(Debug)]
struct ResolvedApi {
    generation: ApiGeneration,
    requests: RequestBuilder,
}

/// Builder for [`Client`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    base_url: Option<Url>,
    credentials: Option<Credentials>,
    connect_timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Server root URL. A missing trailing slash is added so endpoint
    /// paths append instead of replacing the final path segment.
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// TCP connect timeout for the underlying transport. Per-operation
    /// deadlines belong on the [`RequestContext`] instead.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Client> {
        let mut base = self
            .base_url
            .ok_or_else(|| Error::invalid("base URL is required"))?;
        if base.cannot_be_a_base() {
            return Err(Error::invalid(format!("URL {base} cannot serve as a base")));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut http = reqwest::Client::builder().cookie_store(true);
        if let Some(timeout) = self.connect_timeout {
            http = http.connect_timeout(timeout);
        }
        let http = http.build()?;

        Ok(Client {
            http,
            base,
            credentials: self.credentials,
            api: OnceCell::new(),
        })
    }
}

/// Async client for the torrent-management Web API.
///
/// Cheap to share behind an `Arc`; all methods take `&self` and may be
/// called concurrently.
#[derive(Debug)]
pub struct Client {
    http: reqwest::Client,
    base: Url,
    credentials: Option<Credentials>,
    api: OnceCell<ResolvedApi>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// The wire generation this client speaks, resolving it on first call.
    pub async fn generation(&self, ctx: &RequestContext) -> Result<ApiGeneration> {
        Ok(self.api(ctx).await?.generation)
    }

    async fn api(&self, ctx: &RequestContext) -> Result<&ResolvedApi> {
        self.api
            .get_or_try_init(|| async {
                let generation = self.probe_generation(ctx).await?;
                debug!(%generation, "resolved wire generation");
                let urls = UrlBuilder::new(self.base.clone(), generation);
                Ok(ResolvedApi {
                    generation,
                    requests: RequestBuilder::new(urls),
                })
            })
            .await
    }

    /// One legacy-version query decides the generation: an integer below
    /// the threshold means the legacy scheme, anything else (including a
    /// server that no longer serves the legacy path at all) means the
    /// versioned scheme.
    async fn probe_generation(&self, ctx: &RequestContext) -> Result<ApiGeneration> {
        let url = self
            .base
            .join("version/api")
            .map_err(|err| Error::invalid(format!("cannot build version probe: {err}")))?;
        trace!(%url, "probing legacy API version");
        let response = self.send(ctx, self.http.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND
            || response.status() == StatusCode::METHOD_NOT_ALLOWED
        {
            return Ok(ApiGeneration::V2);
        }
        let response = check_status(response).await?;
        let text = response.text().await?;
        match text.trim().parse::<i64>() {
            Ok(version) => Ok(ApiGeneration::from_legacy_version(version)),
            Err(_) => Ok(ApiGeneration::V2),
        }
    }

    // Transport helpers. Cancellation is checked before a request is
    // issued and enforced during the round-trip via the context.

    async fn send(
        &self,
        ctx: &RequestContext,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let response = ctx.run(request.send()).await??;
        Ok(response)
    }

    async fn get(&self, ctx: &RequestContext, url: Url) -> Result<reqwest::Response> {
        trace!(%url, "GET");
        let response = self.send(ctx, self.http.get(url)).await?;
        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, ctx: &RequestContext, url: Url) -> Result<T> {
        let response = self.get(ctx, url).await?;
        let text = ctx.run(response.text()).await??;
        decode_json(&text)
    }

    /// Variant for the per-resource reads where a 404 means "resource
    /// absent" rather than an error.
    async fn get_json_absent_ok<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        url: Url,
    ) -> Result<Option<T>> {
        trace!(%url, "GET");
        let response = self.send(ctx, self.http.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        let text = ctx.run(response.text()).await??;
        decode_json(&text).map(Some)
    }

    async fn get_text(&self, ctx: &RequestContext, url: Url) -> Result<String> {
        let response = self.get(ctx, url).await?;
        let text = ctx.run(response.text()).await??;
        Ok(text)
    }

    async fn post(&self, ctx: &RequestContext, prepared: PreparedRequest) -> Result<reqwest::Response> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        trace!(url = %prepared.url, "POST");
        let request = apply_body(self.http.post(prepared.url), prepared.body)?;
        let response = ctx.run(request.send()).await??;
        check_status(response).await
    }

    /// Issues a mutating request and discards the response body.
    async fn post_unit(&self, ctx: &RequestContext, prepared: PreparedRequest) -> Result<()> {
        let _ = self.post(ctx, prepared).await?;
        Ok(())
    }

    // Session.

    /// Logs in with the configured credentials, establishing the session
    /// cookie in the transport.
    pub async fn login(&self, ctx: &RequestContext) -> Result<()> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| Error::invalid("no credentials configured"))?;
        let api = self.api(ctx).await?;
        let prepared = api
            .requests
            .login(&credentials.username, &credentials.password)?;
        let response = self.post(ctx, prepared).await?;
        // Both generations answer a bad login with 200 and a body of
        // "Fails." while keeping the cookie unset.
        let status = response.status().as_u16();
        let text = ctx.run(response.text()).await??;
        if text.trim() == "Fails." {
            return Err(Error::ServerRejected {
                status,
                message: "invalid credentials".to_string(),
            });
        }
        debug!("session established");
        Ok(())
    }

    pub async fn logout(&self, ctx: &RequestContext) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.logout()?).await
    }

    // Application.

    pub async fn app_version(&self, ctx: &RequestContext) -> Result<String> {
        let api = self.api(ctx).await?;
        let text = self.get_text(ctx, api.requests.urls().app_version()?).await?;
        Ok(text.trim().to_string())
    }

    pub async fn api_version(&self, ctx: &RequestContext) -> Result<String> {
        let api = self.api(ctx).await?;
        let text = self.get_text(ctx, api.requests.urls().api_version()?).await?;
        Ok(text.trim().to_string())
    }

    /// Server preferences as an opaque JSON object.
    pub async fn preferences(&self, ctx: &RequestContext) -> Result<Value> {
        let api = self.api(ctx).await?;
        self.get_json(ctx, api.requests.urls().preferences()?).await
    }

    /// Applies a partial preferences object; unknown keys are the
    /// server's problem, not validated here.
    pub async fn set_preferences(&self, ctx: &RequestContext, prefs: &Value) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.set_preferences(prefs)?).await
    }

    // Torrents: reads.

    pub async fn torrents(
        &self,
        ctx: &RequestContext,
        params: &TorrentListParams,
    ) -> Result<Vec<Torrent>> {
        let api = self.api(ctx).await?;
        self.get_json(ctx, api.requests.urls().torrents(params)?).await
    }

    /// Detailed metadata for one torrent; `None` when the hash is unknown
    /// to the server.
    pub async fn properties(
        &self,
        ctx: &RequestContext,
        hash: &str,
    ) -> Result<Option<TorrentProperties>> {
        validate_hash(hash)?;
        let api = self.api(ctx).await?;
        self.get_json_absent_ok(ctx, api.requests.urls().properties(hash)?)
            .await
    }

    pub async fn trackers(&self, ctx: &RequestContext, hash: &str) -> Result<Option<Vec<Tracker>>> {
        validate_hash(hash)?;
        let api = self.api(ctx).await?;
        self.get_json_absent_ok(ctx, api.requests.urls().trackers(hash)?)
            .await
    }

    pub async fn files(
        &self,
        ctx: &RequestContext,
        hash: &str,
    ) -> Result<Option<Vec<TorrentContent>>> {
        validate_hash(hash)?;
        let api = self.api(ctx).await?;
        self.get_json_absent_ok(ctx, api.requests.urls().files(hash)?)
            .await
    }

    // Torrents: mutations. All of these either succeed as a whole or fail
    // as a whole; the server reports no per-target outcomes for bulk calls.

    pub async fn pause<S: AsRef<str>>(&self, ctx: &RequestContext, hashes: &[S]) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.pause(hashes)?).await
    }

    pub async fn resume<S: AsRef<str>>(&self, ctx: &RequestContext, hashes: &[S]) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.resume(hashes)?).await
    }

    pub async fn recheck<S: AsRef<str>>(&self, ctx: &RequestContext, hashes: &[S]) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.recheck(hashes)?).await
    }

    pub async fn delete<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        hashes: &[S],
        delete_files: bool,
    ) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.delete(hashes, delete_files)?)
            .await
    }

    pub async fn add_torrent_urls<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        urls: &[S],
        options: &AddTorrentOptions,
    ) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.add_torrent_urls(urls, options)?)
            .await
    }

    pub async fn add_torrent_files(
        &self,
        ctx: &RequestContext,
        files: &[TorrentUpload],
        options: &AddTorrentOptions,
    ) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.add_torrent_files(files, options)?)
            .await
    }

    pub async fn set_category<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        hashes: &[S],
        category: &str,
    ) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.set_category(hashes, category)?)
            .await
    }

    pub async fn create_category(
        &self,
        ctx: &RequestContext,
        name: &str,
        save_path: Option<&str>,
    ) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.create_category(name, save_path)?)
            .await
    }

    pub async fn remove_categories<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        names: &[S],
    ) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.remove_categories(names)?)
            .await
    }

    /// All categories known to the server, keyed by name.
    pub async fn categories(
        &self,
        ctx: &RequestContext,
    ) -> Result<std::collections::HashMap<String, Category>> {
        let api = self.api(ctx).await?;
        self.get_json(ctx, api.requests.urls().categories()?).await
    }

    pub async fn add_tags<S: AsRef<str>, T: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        hashes: &[S],
        tags: &[T],
    ) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.add_tags(hashes, tags)?).await
    }

    pub async fn remove_tags<S: AsRef<str>, T: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        hashes: &[S],
        tags: &[T],
    ) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.remove_tags(hashes, tags)?)
            .await
    }

    pub async fn create_tags<S: AsRef<str>>(&self, ctx: &RequestContext, tags: &[S]) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.create_tags(tags)?).await
    }

    pub async fn delete_tags<S: AsRef<str>>(&self, ctx: &RequestContext, tags: &[S]) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.delete_tags(tags)?).await
    }

    pub async fn tags(&self, ctx: &RequestContext) -> Result<Vec<String>> {
        let api = self.api(ctx).await?;
        self.get_json(ctx, api.requests.urls().tags()?).await
    }

    pub async fn add_trackers<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        hash: &str,
        urls: &[S],
    ) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.add_trackers(hash, urls)?)
            .await
    }

    pub async fn set_download_limit<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        hashes: &[S],
        bytes_per_second: i64,
    ) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.set_download_limit(hashes, bytes_per_second)?)
            .await
    }

    pub async fn set_upload_limit<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        hashes: &[S],
        bytes_per_second: i64,
    ) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.set_upload_limit(hashes, bytes_per_second)?)
            .await
    }

    pub async fn set_share_limits<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        hashes: &[S],
        ratio_limit: f64,
        seeding_time_limit: i64,
    ) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(
            ctx,
            api.requests
                .set_share_limits(hashes, ratio_limit, seeding_time_limit)?,
        )
        .await
    }

    pub async fn toggle_sequential_download<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        hashes: &[S],
    ) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.toggle_sequential_download(hashes)?)
            .await
    }

    pub async fn set_force_start<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        hashes: &[S],
        value: bool,
    ) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.set_force_start(hashes, value)?)
            .await
    }

    // Transfer.

    pub async fn transfer_info(&self, ctx: &RequestContext) -> Result<TransferInfo> {
        let api = self.api(ctx).await?;
        self.get_json(ctx, api.requests.urls().transfer_info()?).await
    }

    /// True when the alternative speed limits are active.
    pub async fn speed_limits_mode(&self, ctx: &RequestContext) -> Result<bool> {
        let api = self.api(ctx).await?;
        let text = self
            .get_text(ctx, api.requests.urls().speed_limits_mode()?)
            .await?;
        match text.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(Error::violation(format!(
                "unexpected speed-limits mode {other:?}"
            ))),
        }
    }

    pub async fn toggle_speed_limits_mode(&self, ctx: &RequestContext) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.toggle_speed_limits_mode()?)
            .await
    }

    // Sync.

    /// One delta fetch. Cursor 0 requests a full update; feed the returned
    /// `rid` to the next call. Apply the result to a [`SyncMirror`] to
    /// maintain a consistent full mirror.
    pub async fn sync_maindata(&self, ctx: &RequestContext, rid: u64) -> Result<MainData> {
        let api = self.api(ctx).await?;
        let data: MainData = self
            .get_json(ctx, api.requests.urls().sync_maindata(rid)?)
            .await?;
        if rid == 0 && !data.full_update {
            return Err(Error::violation(
                "cursor 0 must be answered with a full update",
            ));
        }
        Ok(data)
    }

    /// Convenience: fetches the next delta for `mirror` and applies it.
    pub async fn sync_step(&self, ctx: &RequestContext, mirror: &mut SyncMirror) -> Result<()> {
        let data = self.sync_maindata(ctx, mirror.rid()).await?;
        mirror.apply(&data)
    }

    // RSS.

    /// Fetches the flat feed listing and rebuilds the folder/feed tree.
    pub async fn rss_items(&self, ctx: &RequestContext, with_data: bool) -> Result<RssFolder> {
        let api = self.api(ctx).await?;
        let document: Value = self
            .get_json(ctx, api.requests.urls().rss_items(with_data)?)
            .await?;
        parse_items(&document)
    }

    pub async fn rss_add_folder(&self, ctx: &RequestContext, path: &str) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.rss_add_folder(path)?).await
    }

    pub async fn rss_add_feed(
        &self,
        ctx: &RequestContext,
        feed_url: &str,
        path: Option<&str>,
    ) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.rss_add_feed(feed_url, path)?)
            .await
    }

    pub async fn rss_remove_item(&self, ctx: &RequestContext, path: &str) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.rss_remove_item(path)?).await
    }

    pub async fn rss_move_item(&self, ctx: &RequestContext, from: &str, to: &str) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.rss_move_item(from, to)?)
            .await
    }

    pub async fn rss_refresh_item(&self, ctx: &RequestContext, path: &str) -> Result<()> {
        let api = self.api(ctx).await?;
        self.post_unit(ctx, api.requests.rss_refresh_item(path)?).await
    }
}

/// Maps non-success statuses to `ServerRejected`, carrying the body text
/// as the server's message.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(Error::ServerRejected {
        status: status.as_u16(),
        message,
    })
}

fn decode_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|err| Error::violation(format!("malformed response body: {err}")))
}

fn apply_body(request: reqwest::RequestBuilder, body: Body) -> Result<reqwest::RequestBuilder> {
    match body {
        Body::Empty => Ok(request),
        Body::Form(fields) => Ok(request.form(&fields)),
        Body::Multipart(parts) => {
            let mut form = reqwest::multipart::Form::new();
            for part in parts {
                let mut piece = reqwest::multipart::Part::bytes(part.data);
                if let Some(filename) = part.filename {
                    piece = piece.file_name(filename);
                }
                if let Some(content_type) = part.content_type {
                    piece = piece.mime_str(content_type)?;
                }
                form = form.part(part.name, piece);
            }
            Ok(request.multipart(form))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_client(base: &str) -> Client {
        Client::builder()
            .base_url(Url::parse(base).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_a_base_url() {
        assert!(matches!(
            Client::builder().build(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn builder_normalizes_trailing_slash() {
        let client = make_client("http://localhost:8080/prefix");
        assert_eq!(client.base.path(), "/prefix/");
        let client = make_client("http://localhost:8080/");
        assert_eq!(client.base.path(), "/");
    }

    // The publish-once semantics the client relies on: N concurrent first
    // callers share one underlying resolution and observe the same value.
    #[tokio::test]
    async fn concurrent_resolution_probes_once() {
        let cell: Arc<OnceCell<ApiGeneration>> = Arc::new(OnceCell::new());
        let probes = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cell = Arc::clone(&cell);
            let probes = Arc::clone(&probes);
            handles.push(tokio::spawn(async move {
                *cell
                    .get_or_try_init(|| async {
                        probes.fetch_add(1, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        Ok::<_, Error>(ApiGeneration::from_legacy_version(20))
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap());
        }
        assert_eq!(probes.load(Ordering::SeqCst), 1);
        assert!(seen.iter().all(|g| *g == ApiGeneration::V2));
    }

    #[tokio::test]
    async fn cancelled_context_prevents_any_send() {
        let client = make_client("http://localhost:1/");
        let token = crate::context::CancelToken::new();
        token.cancel();
        let ctx = RequestContext::background().with_cancel(token);

        // Port 1 would fail with a transport error if a connection were
        // ever attempted; cancellation must win before that.
        let result = client.app_version(&ctx).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
