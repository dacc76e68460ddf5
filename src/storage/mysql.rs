//! MySQL storage implementation
//!
//! Uses a sqlx pool with a fixed recycle policy: no idle floor, idle
//! connections reaped after `IDLE_TIMEOUT`, and a liveness check before a
//! connection is handed out so callers never receive a stale one.

use super::like_pattern;
use super::model::{Friend, Post, PostQuery, SortRule};
use crate::Result;
use sqlx::Row;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use std::time::Duration;

/// Default maximum connections for the pool.
const MAX_CONNECTIONS: u32 = 5;
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

const FRIEND_COLUMNS: &str = "id, name, link, avatar, error, createdAt";
const POST_COLUMNS: &str = "id, title, created, updated, link, author, avatar, rule, createdAt";

const INSERT_FRIEND: &str =
    "INSERT INTO friends (name, link, avatar, error, createdAt) VALUES (?, ?, ?, ?, ?)";
const INSERT_POST: &str = r#"
    INSERT INTO posts (title, created, updated, link, author, avatar, rule, createdAt)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;
const DELETE_POST: &str = "DELETE FROM posts WHERE link = ? AND author = ?";

pub struct MySqlEngine {
    pool: MySqlPool,
}

impl MySqlEngine {
    /// Open the pool; fails fast if the server refuses the first connection
    pub async fn connect(url: &str) -> std::result::Result<Self, sqlx::Error> {
        let pool = MySqlPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .min_connections(0)
            .idle_timeout(IDLE_TIMEOUT)
            .max_lifetime(None::<Duration>)
            .test_before_acquire(true)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = ?",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    // ========== Friend Operations ==========

    pub async fn insert_friend(&self, friend: &Friend) -> Result<()> {
        bind_friend(sqlx::query(INSERT_FRIEND), friend)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn bulk_insert_friends(&self, friends: &[Friend]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for friend in friends {
            bind_friend(sqlx::query(INSERT_FRIEND), friend)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(friends.len())
    }

    pub async fn truncate_friends(&self) -> Result<()> {
        sqlx::query("TRUNCATE TABLE friends").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn list_friends(&self) -> Result<Vec<Friend>> {
        let rows = sqlx::query(&format!("SELECT {} FROM friends ORDER BY id", FRIEND_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        let friends = rows.iter().map(row_to_friend).collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(friends)
    }

    pub async fn friend_with_link_like(&self, domain: &str) -> Result<Option<Friend>> {
        let sql = format!(
            "SELECT {} FROM friends WHERE link LIKE ? ORDER BY id LIMIT 1",
            FRIEND_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(like_pattern(domain))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_friend).transpose()?)
    }

    // ========== Post Operations ==========

    pub async fn insert_post(&self, post: &Post) -> Result<()> {
        bind_post(sqlx::query(INSERT_POST), post)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn bulk_insert_posts(&self, posts: &[Post]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for post in posts {
            bind_post(sqlx::query(INSERT_POST), post)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(posts.len())
    }

    pub async fn delete_posts(&self, posts: &[Post]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for post in posts {
            removed += sqlx::query(DELETE_POST)
                .bind(post.link.as_str())
                .bind(post.author.as_str())
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    pub async fn list_posts(&self, query: &PostQuery) -> Result<Vec<Post>> {
        let mut sql = format!(
            "SELECT {} FROM posts ORDER BY {} DESC",
            POST_COLUMNS,
            query.sort.column()
        );
        let rows = match query.window()? {
            None => sqlx::query(&sql).fetch_all(&self.pool).await?,
            Some((limit, offset)) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                sqlx::query(&sql)
                    .bind(limit as i64)
                    .bind(offset as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        let posts = rows.iter().map(row_to_post).collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    pub async fn posts_with_link_like(&self, link: &str, limit: Option<usize>, sort: SortRule) -> Result<Vec<Post>> {
        let mut sql = format!(
            "SELECT {} FROM posts WHERE link LIKE ? ORDER BY {} DESC",
            POST_COLUMNS,
            sort.column()
        );
        if limit.is_some() {
            sql.push_str(" LIMIT ?");
        }
        let mut query = sqlx::query(&sql).bind(like_pattern(link));
        if let Some(limit) = limit {
            query = query.bind(limit as i64);
        }
        let rows = query.fetch_all(&self.pool).await?;
        let posts = rows.iter().map(row_to_post).collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    pub async fn latest_created_at(&self) -> Result<Option<String>> {
        let latest: Option<Option<String>> =
            sqlx::query_scalar("SELECT createdAt FROM posts ORDER BY createdAt DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(latest.flatten())
    }

    pub async fn delete_outdated_posts(&self, cutoff: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM posts WHERE DATE(updated) < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

type MySqlQuery<'q> = sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>;

fn bind_friend<'q>(query: MySqlQuery<'q>, friend: &'q Friend) -> MySqlQuery<'q> {
    query
        .bind(friend.name.as_str())
        .bind(friend.link.as_str())
        .bind(friend.avatar.as_str())
        .bind(friend.error)
        .bind(friend.created_at.as_str())
}

fn bind_post<'q>(query: MySqlQuery<'q>, post: &'q Post) -> MySqlQuery<'q> {
    query
        .bind(post.title.as_str())
        .bind(post.created.as_str())
        .bind(post.updated.as_str())
        .bind(post.link.as_str())
        .bind(post.author.as_str())
        .bind(post.avatar.as_str())
        .bind(post.rule.as_str())
        .bind(post.created_at.as_str())
}

fn row_to_friend(row: &MySqlRow) -> std::result::Result<Friend, sqlx::Error> {
    Ok(Friend {
        id: Some(i64::from(row.try_get::<i32, _>("id")?)),
        name: row.try_get("name")?,
        link: row.try_get("link")?,
        avatar: row.try_get("avatar")?,
        error: row.try_get("error")?,
        created_at: row.try_get("createdAt")?,
    })
}

fn row_to_post(row: &MySqlRow) -> std::result::Result<Post, sqlx::Error> {
    Ok(Post {
        id: Some(i64::from(row.try_get::<i32, _>("id")?)),
        title: row.try_get("title")?,
        created: row.try_get("created")?,
        updated: row.try_get("updated")?,
        link: row.try_get("link")?,
        author: row.try_get("author")?,
        avatar: row.try_get("avatar")?,
        rule: row.try_get("rule")?,
        created_at: row.try_get("createdAt")?,
    })
}
