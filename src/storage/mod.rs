//! Storage Layer - friend and post persistence
//!
//! Relational backends (SQLite, MySQL) share one schema:
//! - friends(id, name, link, avatar, error, createdAt)
//! - posts(id, title, created, updated, link, author, avatar, rule, createdAt)
//!
//! MongoDB stores the same records in the `Friends` and `Posts` collections of
//! the `fcircle` database and has no schema step.

pub mod document;
pub mod engine;
pub mod model;
pub mod mysql;
pub mod path;
pub mod schema;
pub mod session;
pub mod sqlite;

pub use document::{
    DocumentEngine, DocumentFactory, DocumentSession, get_document_engine, get_document_session,
};
pub use engine::{Engine, EngineFactory, create_all_tables, get_engine, get_session};
pub use model::{Friend, Post, PostQuery, Record, SortRule};
pub use path::{PathResolver, PathSource, ResolvedPath};
pub use schema::{Dialect, SchemaReport};
pub use session::Session;

use crate::Result;
use crate::config::ConfigResolver;
use async_trait::async_trait;
use chrono::{Days, Local};

/// Record operations over friends and posts, whatever the backend.
#[async_trait]
pub trait FriendCircleStore: Send + Sync {
    async fn insert_friend(&self, friend: &Friend) -> Result<()>;

    async fn insert_post(&self, post: &Post) -> Result<()>;

    /// Insert every friend; returns the number inserted
    async fn bulk_insert_friends(&self, friends: &[Friend]) -> Result<usize>;

    async fn bulk_insert_posts(&self, posts: &[Post]) -> Result<usize>;

    /// Delete the stored posts matching each post's `(link, author)`
    async fn delete_posts(&self, posts: &[Post]) -> Result<u64>;

    async fn truncate_friends(&self) -> Result<()>;

    async fn list_friends(&self) -> Result<Vec<Friend>>;

    async fn list_posts(&self, query: &PostQuery) -> Result<Vec<Post>>;

    /// Posts whose link contains `link`, newest first
    async fn posts_with_link_like(&self, link: &str, limit: Option<usize>, sort: SortRule) -> Result<Vec<Post>>;

    async fn friend_with_link_like(&self, domain: &str) -> Result<Option<Friend>>;

    async fn latest_created_at(&self) -> Result<Option<String>>;

    /// Delete posts last updated more than `days` days ago
    async fn delete_outdated_posts(&self, days: usize) -> Result<u64>;
}

/// Open a store for whichever backend the settings select.
pub async fn open_store(resolver: &ConfigResolver) -> Result<Box<dyn FriendCircleStore>> {
    if resolver.backend()?.is_relational() {
        let session = EngineFactory::new(resolver.clone()).get_session().await?;
        Ok(Box::new(session))
    } else {
        let session = DocumentFactory::new(resolver.clone()).get_session().await?;
        Ok(Box::new(session))
    }
}

/// `LIKE` pattern matching `value` anywhere, with wildcards escaped by `\`
pub(crate) fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// `YYYY-MM-DD` date `days` days before today (local time).
///
/// `None` when that date is before the earliest representable one; no post
/// can be older than it.
pub(crate) fn outdated_cutoff(days: usize) -> Option<String> {
    let days = u64::try_from(days).ok()?;
    let cutoff = Local::now().date_naive().checked_sub_days(Days::new(days))?;
    Some(cutoff.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, Platform, Settings};
    use tempfile::TempDir;

    #[test]
    fn test_like_pattern() {
        assert_eq!(like_pattern("alice.example"), "%alice.example%");
        assert_eq!(like_pattern("100%_off\\"), "%100\\%\\_off\\\\%");
    }

    #[test]
    fn test_outdated_cutoff() {
        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        assert_eq!(outdated_cutoff(0).unwrap(), today);
        assert!(outdated_cutoff(60).unwrap() < today);
        assert_eq!(outdated_cutoff(60).unwrap().len(), 10);
    }

    #[test]
    fn test_outdated_cutoff_out_of_range() {
        assert_eq!(outdated_cutoff(usize::MAX), None);
    }

    #[tokio::test]
    async fn test_open_store_on_sqlite() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            base_path: Some(dir.path().to_path_buf()),
            ..Settings::default()
        };
        let resolver = ConfigResolver::new(settings, Environment::default(), Platform::Unix);

        let store = open_store(&resolver).await.unwrap();
        store
            .insert_post(&Post::new("Hello", "https://alice.example/hello/", "Alice"))
            .await
            .unwrap();
        assert_eq!(store.list_posts(&PostQuery::default()).await.unwrap().len(), 1);
        assert!(dir.path().join("data.db").exists());
    }
}
