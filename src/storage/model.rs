//! Friend and post records
//!
//! Field names serialize the way the stored columns are named, so `created_at`
//! appears as `createdAt` in documents and dictionaries.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// A record that maps to one table (or collection).
pub trait Record: Serialize {
    /// Relational table name
    const TABLE: &'static str;
    /// Document collection name
    const COLLECTION: &'static str;

    /// Serialize to a plain key/value mapping.
    ///
    /// Underscore-prefixed keys (driver bookkeeping such as `_id`) are dropped.
    fn to_dict(&self) -> Result<Map<String, Value>> {
        let value = serde_json::to_value(self)?;
        let mut map = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        map.retain(|key, _| !key.starts_with('_'));
        Ok(map)
    }
}

/// One subscribed friend site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub link: String,
    pub avatar: String,
    /// Set when the site could not be crawled
    pub error: bool,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl Friend {
    pub fn new(
        name: impl Into<String>,
        link: impl Into<String>,
        avatar: impl Into<String>,
        error: bool,
        created_at: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            link: link.into(),
            avatar: avatar.into(),
            error,
            created_at: created_at.into(),
        }
    }
}

impl Record for Friend {
    const TABLE: &'static str = "friends";
    const COLLECTION: &'static str = "Friends";
}

/// One article fetched from a friend's feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub title: String,
    pub created: String,
    pub updated: String,
    pub link: String,
    pub author: String,
    pub avatar: String,
    /// Name of the parsing rule that produced the post
    pub rule: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl Post {
    /// Post with the given title and link; the remaining fields start empty
    pub fn new(title: impl Into<String>, link: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            created: String::new(),
            updated: String::new(),
            link: link.into(),
            author: author.into(),
            avatar: String::new(),
            rule: String::new(),
            created_at: String::new(),
        }
    }
}

impl Record for Post {
    const TABLE: &'static str = "posts";
    const COLLECTION: &'static str = "Posts";
}

/// Column that post listings are ordered by (descending).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortRule {
    Created,
    #[default]
    Updated,
}

impl SortRule {
    pub fn column(&self) -> &'static str {
        match self {
            SortRule::Created => "created",
            SortRule::Updated => "updated",
        }
    }
}

impl FromStr for SortRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "created" => Ok(SortRule::Created),
            "updated" => Ok(SortRule::Updated),
            _ => Err(Error::InvalidSortRule(s.to_string())),
        }
    }
}

impl std::fmt::Display for SortRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// Window over the sorted post list.
///
/// `start == end == 0` selects everything; otherwise rows `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostQuery {
    pub start: usize,
    pub end: usize,
    pub sort: SortRule,
}

impl PostQuery {
    pub fn all(sort: SortRule) -> Self {
        Self { start: 0, end: 0, sort }
    }

    pub fn range(start: usize, end: usize, sort: SortRule) -> Self {
        Self { start, end, sort }
    }

    /// `(limit, offset)`, or `None` for the whole list
    pub fn window(&self) -> Result<Option<(usize, usize)>> {
        if self.start == 0 && self.end == 0 {
            return Ok(None);
        }
        if self.start > self.end {
            return Err(Error::InvalidRange { start: self.start, end: self.end });
        }
        Ok(Some((self.end - self.start, self.start)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friend_to_dict() {
        let friend = Friend::new("Alice", "https://alice.example/", "https://alice.example/a.png", false, "2024-01-01 08:00:00");
        let dict = friend.to_dict().unwrap();

        let mut keys: Vec<&str> = dict.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["avatar", "createdAt", "error", "link", "name"]);
        assert_eq!(dict["error"], Value::Bool(false));
    }

    #[test]
    fn test_post_to_dict_includes_id_when_stored() {
        let mut post = Post::new("Hello", "https://alice.example/hello/", "Alice");
        post.id = Some(7);
        let dict = post.to_dict().unwrap();
        assert_eq!(dict["id"], Value::from(7));
        assert_eq!(dict["createdAt"], Value::from(""));
        assert_eq!(dict.len(), 9);
    }

    #[test]
    fn test_document_bookkeeping_is_ignored() {
        let json = r#"{"_id":"65a0","name":"Bob","link":"https://bob.example/","avatar":"","error":true,"createdAt":"2024-02-02"}"#;
        let friend: Friend = serde_json::from_str(json).unwrap();
        assert_eq!(friend.id, None);
        assert!(friend.error);
        assert!(!friend.to_dict().unwrap().contains_key("_id"));
    }

    #[test]
    fn test_sort_rule_parse() {
        assert_eq!("created".parse::<SortRule>().unwrap(), SortRule::Created);
        assert_eq!("Updated".parse::<SortRule>().unwrap(), SortRule::Updated);
        assert!(matches!("title; DROP TABLE posts".parse::<SortRule>(), Err(Error::InvalidSortRule(_))));
    }

    #[test]
    fn test_post_query_window() {
        assert_eq!(PostQuery::all(SortRule::Updated).window().unwrap(), None);
        assert_eq!(PostQuery::range(10, 30, SortRule::Created).window().unwrap(), Some((20, 10)));
        assert_eq!(PostQuery::range(0, 5, SortRule::Created).window().unwrap(), Some((5, 0)));
        assert!(matches!(
            PostQuery::range(5, 2, SortRule::Created).window(),
            Err(Error::InvalidRange { start: 5, end: 2 })
        ));
    }
}
