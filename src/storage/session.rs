//! Relational session bound to the shared engine

use super::engine::{Engine, EngineBackend};
use super::model::{Friend, Post, PostQuery, SortRule};
use super::{FriendCircleStore, outdated_cutoff};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Unit of work against the relational engine.
///
/// Sessions are cheap to create and share the engine's connection or pool.
/// Each operation commits on its own; bulk operations run in one transaction.
#[derive(Clone)]
pub struct Session {
    engine: Arc<Engine>,
}

impl Session {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}

#[async_trait]
impl FriendCircleStore for Session {
    async fn insert_friend(&self, friend: &Friend) -> Result<()> {
        match self.engine.inner() {
            EngineBackend::Sqlite(db) => db.insert_friend(friend),
            EngineBackend::MySql(db) => db.insert_friend(friend).await,
        }
    }

    async fn insert_post(&self, post: &Post) -> Result<()> {
        match self.engine.inner() {
            EngineBackend::Sqlite(db) => db.insert_post(post),
            EngineBackend::MySql(db) => db.insert_post(post).await,
        }
    }

    async fn bulk_insert_friends(&self, friends: &[Friend]) -> Result<usize> {
        if friends.is_empty() {
            return Ok(0);
        }
        match self.engine.inner() {
            EngineBackend::Sqlite(db) => db.bulk_insert_friends(friends),
            EngineBackend::MySql(db) => db.bulk_insert_friends(friends).await,
        }
    }

    async fn bulk_insert_posts(&self, posts: &[Post]) -> Result<usize> {
        if posts.is_empty() {
            return Ok(0);
        }
        match self.engine.inner() {
            EngineBackend::Sqlite(db) => db.bulk_insert_posts(posts),
            EngineBackend::MySql(db) => db.bulk_insert_posts(posts).await,
        }
    }

    async fn delete_posts(&self, posts: &[Post]) -> Result<u64> {
        if posts.is_empty() {
            return Ok(0);
        }
        match self.engine.inner() {
            EngineBackend::Sqlite(db) => db.delete_posts(posts),
            EngineBackend::MySql(db) => db.delete_posts(posts).await,
        }
    }

    async fn truncate_friends(&self) -> Result<()> {
        match self.engine.inner() {
            EngineBackend::Sqlite(db) => db.truncate_friends(),
            EngineBackend::MySql(db) => db.truncate_friends().await,
        }
    }

    async fn list_friends(&self) -> Result<Vec<Friend>> {
        match self.engine.inner() {
            EngineBackend::Sqlite(db) => db.list_friends(),
            EngineBackend::MySql(db) => db.list_friends().await,
        }
    }

    async fn list_posts(&self, query: &PostQuery) -> Result<Vec<Post>> {
        match self.engine.inner() {
            EngineBackend::Sqlite(db) => db.list_posts(query),
            EngineBackend::MySql(db) => db.list_posts(query).await,
        }
    }

    async fn posts_with_link_like(&self, link: &str, limit: Option<usize>, sort: SortRule) -> Result<Vec<Post>> {
        match self.engine.inner() {
            EngineBackend::Sqlite(db) => db.posts_with_link_like(link, limit, sort),
            EngineBackend::MySql(db) => db.posts_with_link_like(link, limit, sort).await,
        }
    }

    async fn friend_with_link_like(&self, domain: &str) -> Result<Option<Friend>> {
        match self.engine.inner() {
            EngineBackend::Sqlite(db) => db.friend_with_link_like(domain),
            EngineBackend::MySql(db) => db.friend_with_link_like(domain).await,
        }
    }

    async fn latest_created_at(&self) -> Result<Option<String>> {
        match self.engine.inner() {
            EngineBackend::Sqlite(db) => db.latest_created_at(),
            EngineBackend::MySql(db) => db.latest_created_at().await,
        }
    }

    async fn delete_outdated_posts(&self, days: usize) -> Result<u64> {
        let Some(cutoff) = outdated_cutoff(days) else {
            return Ok(0);
        };
        tracing::debug!("Deleting posts updated before {}", cutoff);
        match self.engine.inner() {
            EngineBackend::Sqlite(db) => db.delete_outdated_posts(&cutoff),
            EngineBackend::MySql(db) => db.delete_outdated_posts(&cutoff).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema;
    use chrono::{Days, Local};

    async fn session() -> Session {
        let engine = Arc::new(Engine::sqlite_in_memory().unwrap());
        schema::create_all(&engine).await.unwrap();
        Session::new(engine)
    }

    fn days_ago(days: u64) -> String {
        let date = Local::now().date_naive() - Days::new(days);
        date.format("%Y-%m-%d").to_string()
    }

    fn post(title: &str, link: &str, updated: &str) -> Post {
        Post {
            updated: updated.to_string(),
            created: updated.to_string(),
            created_at: format!("{} 00:00:00", updated),
            ..Post::new(title, link, "Alice")
        }
    }

    #[tokio::test]
    async fn test_empty_bulk_operations_are_noops() {
        let session = session().await;
        assert_eq!(session.bulk_insert_friends(&[]).await.unwrap(), 0);
        assert_eq!(session.bulk_insert_posts(&[]).await.unwrap(), 0);
        assert_eq!(session.delete_posts(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_posts_flow() {
        let session = session().await;
        let posts = vec![
            post("Old", "https://alice.example/old/", &days_ago(90)),
            post("Recent", "https://alice.example/recent/", &days_ago(3)),
            post("Today", "https://bob.example/today/", &days_ago(0)),
        ];
        assert_eq!(session.bulk_insert_posts(&posts).await.unwrap(), 3);

        let all = session.list_posts(&PostQuery::all(SortRule::Updated)).await.unwrap();
        assert_eq!(all.iter().map(|p| p.title.as_str()).collect::<Vec<_>>(), ["Today", "Recent", "Old"]);

        let alice = session
            .posts_with_link_like("alice.example", Some(1), SortRule::Updated)
            .await
            .unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].title, "Recent");

        let latest = session.latest_created_at().await.unwrap();
        assert_eq!(latest, Some(format!("{} 00:00:00", days_ago(0))));

        assert_eq!(session.delete_outdated_posts(60).await.unwrap(), 1);
        assert_eq!(session.list_posts(&PostQuery::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_huge_age_deletes_nothing() {
        let session = session().await;
        session
            .insert_post(&post("Yesterday", "https://alice.example/yesterday/", &days_ago(1)))
            .await
            .unwrap();

        assert_eq!(session.delete_outdated_posts(usize::MAX).await.unwrap(), 0);
        assert_eq!(session.list_posts(&PostQuery::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_window_returns_no_posts() {
        let session = session().await;
        session
            .insert_post(&post("Today", "https://alice.example/today/", &days_ago(0)))
            .await
            .unwrap();

        let page = session.list_posts(&PostQuery::range(0, 0, SortRule::Updated)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert!(session.list_posts(&PostQuery::range(1, 1, SortRule::Updated)).await.unwrap().is_empty());
        assert!(
            session
                .posts_with_link_like("alice.example", Some(0), SortRule::Updated)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_invalid_range_is_rejected() {
        let session = session().await;
        let result = session.list_posts(&PostQuery::range(4, 1, SortRule::Created)).await;
        assert!(matches!(result, Err(crate::Error::InvalidRange { .. })));
    }

    #[tokio::test]
    async fn test_friends_flow() {
        let session = session().await;
        session
            .insert_friend(&Friend::new("Alice", "https://alice.example/", "", false, "2024-01-01"))
            .await
            .unwrap();
        session
            .insert_friend(&Friend::new("Bob", "https://bob.example/", "", true, "2024-01-01"))
            .await
            .unwrap();

        let bob = session.friend_with_link_like("bob.example").await.unwrap().unwrap();
        assert!(bob.error);
        assert!(session.friend_with_link_like("carol.example").await.unwrap().is_none());

        session.truncate_friends().await.unwrap();
        assert!(session.list_friends().await.unwrap().is_empty());
    }
}
