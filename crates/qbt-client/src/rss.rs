//! RSS folder/feed tree reconstruction.
//!
//! The feed-listing endpoint answers with one flat JSON object whose keys
//! are backslash-separated paths and whose values are either a feed
//! definition (recognized by its `url` field) or a nested object of
//! children. [`parse_items`] rebuilds the folder tree from that document:
//! intermediate folders are materialized on demand and reused, sibling
//! order follows the source object's key order, and a path that is used
//! both as a leaf and as a folder prefix is rejected as malformed input.
//! The tree is rebuilt in full on every fetch; there is no incremental
//! form.

use serde_json::{Map, Value};

use qbt_types::RssArticle;

use crate::error::{Error, Result};

/// Separator between path segments in the flat listing keys.
pub const PATH_SEPARATOR: char = '\\';

/// One node of the feed tree: a closed set, matched exhaustively.
#[derive(Clone, Debug, PartialEq)]
pub enum RssNode {
    Feed(RssFeed),
    Folder(RssFolder),
}

/// A leaf feed with its metadata and articles, in source order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RssFeed {
    pub uid: Option<String>,
    pub url: String,
    pub title: Option<String>,
    pub last_build_date: Option<String>,
    pub articles: Vec<RssArticle>,
}

/// A folder exclusively owning an ordered list of named children.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RssFolder {
    children: Vec<(String, RssNode)>,
}

impl RssFolder {
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Children in declaration order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &RssNode)> {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn get(&self, name: &str) -> Option<&RssNode> {
        self.children
            .iter()
            .find(|(child, _)| child == name)
            .map(|(_, node)| node)
    }

    /// Returns the named child folder, materializing it if absent. Fails
    /// when the name is already taken by a feed.
    fn child_folder_mut(&mut self, name: &str) -> Result<&mut RssFolder> {
        let position = self.children.iter().position(|(child, _)| child == name);
        let idx = match position {
            Some(idx) => match self.children[idx].1 {
                RssNode::Folder(_) => idx,
                RssNode::Feed(_) => {
                    return Err(Error::violation(format!(
                        "path segment {name:?} is both a feed and a folder"
                    )));
                }
            },
            None => {
                self.children
                    .push((name.to_string(), RssNode::Folder(RssFolder::default())));
                self.children.len() - 1
            }
        };
        match &mut self.children[idx].1 {
            RssNode::Folder(folder) => Ok(folder),
            RssNode::Feed(_) => unreachable!("checked above"),
        }
    }

    fn insert_feed(&mut self, name: &str, feed: RssFeed) -> Result<()> {
        if self.children.iter().any(|(child, _)| child == name) {
            return Err(Error::violation(format!(
                "path segment {name:?} is both a feed and a folder"
            )));
        }
        self.children.push((name.to_string(), RssNode::Feed(feed)));
        Ok(())
    }
}

/// Rebuilds the folder/feed tree from the flat listing document.
pub fn parse_items(document: &Value) -> Result<RssFolder> {
    let object = document
        .as_object()
        .ok_or_else(|| Error::violation("feed listing is not a JSON object"))?;
    let mut root = RssFolder::default();
    insert_object(&mut root, object)?;
    Ok(root)
}

fn insert_object(folder: &mut RssFolder, object: &Map<String, Value>) -> Result<()> {
    for (key, value) in object {
        let child = value
            .as_object()
            .ok_or_else(|| Error::violation(format!("entry {key:?} is not an object")))?;

        let segments: Vec<&str> = key.split(PATH_SEPARATOR).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(Error::violation(format!("empty path segment in {key:?}")));
        }

        // Walk down to the parent of the terminal segment, creating
        // folders as needed and reusing ones seen earlier.
        let mut target = &mut *folder;
        for segment in &segments[..segments.len() - 1] {
            target = target.child_folder_mut(segment)?;
        }
        let terminal = segments[segments.len() - 1];

        if is_feed_definition(child) {
            target.insert_feed(terminal, parse_feed(key, child)?)?;
        } else {
            let subfolder = target.child_folder_mut(terminal)?;
            insert_object(subfolder, child)?;
        }
    }
    Ok(())
}

/// A leaf definition carries its feed URL; folder objects only map child
/// names to further objects.
fn is_feed_definition(object: &Map<String, Value>) -> bool {
    object.get("url").is_some_and(Value::is_string)
}

fn parse_feed(key: &str, object: &Map<String, Value>) -> Result<RssFeed> {
    let url = object
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::violation(format!("feed {key:?} has no url")))?
        .to_string();
    let articles = match object.get("articles") {
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|err| Error::violation(format!("feed {key:?} has malformed articles: {err}")))?,
        None => Vec::new(),
    };
    Ok(RssFeed {
        uid: object
            .get("uid")
            .and_then(Value::as_str)
            .map(str::to_string),
        url,
        title: object
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string),
        last_build_date: object
            .get("lastBuildDate")
            .and_then(Value::as_str)
            .map(str::to_string),
        articles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed(url: &str) -> Value {
        json!({ "uid": "u1", "url": url, "title": "t" })
    }

    #[test]
    fn flat_keys_build_nested_folders() {
        let document = json!({
            "Ubuntu": feed("https://ubuntu.example/rss"),
            "Folder\\Rutracker": feed("https://rutracker.example/rss"),
        });
        let root = parse_items(&document).unwrap();

        assert_eq!(root.len(), 2);
        let names: Vec<&str> = root.children().map(|(name, _)| name).collect();
        assert_eq!(names, ["Ubuntu", "Folder"]);

        match root.get("Ubuntu").unwrap() {
            RssNode::Feed(feed) => assert_eq!(feed.url, "https://ubuntu.example/rss"),
            RssNode::Folder(_) => panic!("Ubuntu should be a feed"),
        }
        match root.get("Folder").unwrap() {
            RssNode::Folder(folder) => {
                assert_eq!(folder.len(), 1);
                assert!(matches!(folder.get("Rutracker"), Some(RssNode::Feed(_))));
            }
            RssNode::Feed(_) => panic!("Folder should be a folder"),
        }
    }

    #[test]
    fn sibling_order_matches_declaration_order() {
        let document = json!({
            "b": feed("https://b/rss"),
            "a": feed("https://a/rss"),
            "c": feed("https://c/rss"),
        });
        let root = parse_items(&document).unwrap();
        let names: Vec<&str> = root.children().map(|(name, _)| name).collect();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[test]
    fn folders_are_reused_across_keys() {
        let document = json!({
            "Linux\\Ubuntu": feed("https://u/rss"),
            "Linux\\Debian": feed("https://d/rss"),
        });
        let root = parse_items(&document).unwrap();
        assert_eq!(root.len(), 1);
        match root.get("Linux").unwrap() {
            RssNode::Folder(folder) => assert_eq!(folder.len(), 2),
            RssNode::Feed(_) => panic!("Linux should be a folder"),
        }
    }

    #[test]
    fn nested_object_form_builds_the_same_tree() {
        let document = json!({
            "Linux": {
                "Ubuntu": feed("https://u/rss"),
                "Deep\\Debian": feed("https://d/rss"),
            }
        });
        let root = parse_items(&document).unwrap();
        let RssNode::Folder(linux) = root.get("Linux").unwrap() else {
            panic!("Linux should be a folder");
        };
        assert!(matches!(linux.get("Ubuntu"), Some(RssNode::Feed(_))));
        let RssNode::Folder(deep) = linux.get("Deep").unwrap() else {
            panic!("Deep should be a folder");
        };
        assert!(matches!(deep.get("Debian"), Some(RssNode::Feed(_))));
    }

    #[test]
    fn leaf_then_folder_prefix_is_a_protocol_violation() {
        let document = json!({
            "X": feed("https://x/rss"),
            "X\\Y": feed("https://y/rss"),
        });
        assert!(matches!(
            parse_items(&document),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn folder_prefix_then_leaf_is_a_protocol_violation() {
        let document = json!({
            "X\\Y": feed("https://y/rss"),
            "X": feed("https://x/rss"),
        });
        assert!(matches!(
            parse_items(&document),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn feed_articles_are_parsed_in_order() {
        let document = json!({
            "Ubuntu": {
                "uid": "u1",
                "url": "https://u/rss",
                "lastBuildDate": "Tue, 01 Jul 2025 00:00:00 GMT",
                "articles": [
                    { "id": "a1", "title": "first" },
                    { "id": "a2", "title": "second", "isRead": true },
                ],
            }
        });
        let root = parse_items(&document).unwrap();
        let RssNode::Feed(feed) = root.get("Ubuntu").unwrap() else {
            panic!("expected feed");
        };
        assert_eq!(feed.uid.as_deref(), Some("u1"));
        assert_eq!(
            feed.last_build_date.as_deref(),
            Some("Tue, 01 Jul 2025 00:00:00 GMT")
        );
        assert_eq!(feed.articles.len(), 2);
        assert_eq!(feed.articles[0].id, "a1");
        assert!(feed.articles[1].is_read);
    }

    #[test]
    fn malformed_shapes_are_rejected() {
        assert!(matches!(
            parse_items(&json!([])),
            Err(Error::ProtocolViolation(_))
        ));
        assert!(matches!(
            parse_items(&json!({ "Ubuntu": "not-an-object" })),
            Err(Error::ProtocolViolation(_))
        ));
        assert!(matches!(
            parse_items(&json!({ "A\\\\B": feed("https://x/rss") })),
            Err(Error::ProtocolViolation(_))
        ));
    }
}
