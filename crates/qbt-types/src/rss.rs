//! RSS article records.

use serde::{Deserialize, Serialize};

/// One article inside an RSS feed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RssArticle {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "torrentURL", skip_serializing_if = "Option::is_none")]
    pub torrent_url: Option<String>,
    #[serde(rename = "isRead", default)]
    pub is_read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_tolerates_missing_optional_fields() {
        let article: RssArticle =
            serde_json::from_str(r#"{"id":"a1","title":"Release 24.04"}"#).unwrap();
        assert_eq!(article.id, "a1");
        assert!(article.link.is_none());
        assert!(!article.is_read);
    }

    #[test]
    fn article_reads_renamed_fields() {
        let article: RssArticle = serde_json::from_str(
            r#"{"id":"a2","title":"x","torrentURL":"magnet:?xt=urn:btih:aa","isRead":true}"#,
        )
        .unwrap();
        assert_eq!(article.torrent_url.as_deref(), Some("magnet:?xt=urn:btih:aa"));
        assert!(article.is_read);
    }
}
