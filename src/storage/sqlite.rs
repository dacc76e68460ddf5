//! SQLite storage implementation

use super::like_pattern;
use super::model::{Friend, Post, PostQuery, SortRule};
use crate::Result;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

const FRIEND_COLUMNS: &str = "id, name, link, avatar, error, createdAt";
const POST_COLUMNS: &str = "id, title, created, updated, link, author, avatar, rule, createdAt";

const INSERT_FRIEND: &str =
    "INSERT INTO friends (name, link, avatar, error, createdAt) VALUES (?1, ?2, ?3, ?4, ?5)";
const INSERT_POST: &str = r#"
    INSERT INTO posts (title, created, updated, link, author, avatar, rule, createdAt)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
"#;
const DELETE_POST: &str = "DELETE FROM posts WHERE link = ?1 AND author = ?2";

/// Single SQLite connection shared by all sessions.
///
/// Calls are synchronous and run on the calling task's thread while holding
/// the connection mutex; concurrent sessions queue on that lock. Each call is
/// a short local statement or one transaction, never held across an `.await`.
pub struct SqliteEngine {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteEngine {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Ok(Self { conn: Mutex::new(conn), path: Some(path.to_path_buf()) })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn: Mutex::new(conn), path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn().execute_batch(sql)?;
        Ok(())
    }

    // ========== Friend Operations ==========

    pub fn insert_friend(&self, friend: &Friend) -> Result<()> {
        self.conn().execute(
            INSERT_FRIEND,
            params![friend.name, friend.link, friend.avatar, friend.error, friend.created_at],
        )?;
        Ok(())
    }

    pub fn bulk_insert_friends(&self, friends: &[Friend]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(INSERT_FRIEND)?;
            for friend in friends {
                stmt.execute(params![
                    friend.name,
                    friend.link,
                    friend.avatar,
                    friend.error,
                    friend.created_at
                ])?;
            }
        }
        tx.commit()?;
        Ok(friends.len())
    }

    pub fn truncate_friends(&self) -> Result<()> {
        self.conn().execute("DELETE FROM friends", [])?;
        Ok(())
    }

    pub fn list_friends(&self) -> Result<Vec<Friend>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM friends ORDER BY id", FRIEND_COLUMNS))?;
        let friends = stmt
            .query_map([], row_to_friend)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(friends)
    }

    pub fn friend_with_link_like(&self, domain: &str) -> Result<Option<Friend>> {
        let sql = format!(
            "SELECT {} FROM friends WHERE link LIKE ?1 ESCAPE '\\' ORDER BY id LIMIT 1",
            FRIEND_COLUMNS
        );
        self.conn()
            .query_row(&sql, [like_pattern(domain)], row_to_friend)
            .optional()
            .map_err(Into::into)
    }

    // ========== Post Operations ==========

    pub fn insert_post(&self, post: &Post) -> Result<()> {
        self.conn().execute(INSERT_POST, &post_params(post)[..])?;
        Ok(())
    }

    pub fn bulk_insert_posts(&self, posts: &[Post]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(INSERT_POST)?;
            for post in posts {
                stmt.execute(&post_params(post)[..])?;
            }
        }
        tx.commit()?;
        Ok(posts.len())
    }

    /// Delete posts matching each `(link, author)` pair
    pub fn delete_posts(&self, posts: &[Post]) -> Result<u64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare(DELETE_POST)?;
            for post in posts {
                removed += stmt.execute(params![post.link, post.author])? as u64;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    pub fn list_posts(&self, query: &PostQuery) -> Result<Vec<Post>> {
        let conn = self.conn();
        let mut sql = format!(
            "SELECT {} FROM posts ORDER BY {} DESC",
            POST_COLUMNS,
            query.sort.column()
        );
        let posts = match query.window()? {
            None => conn
                .prepare(&sql)?
                .query_map([], row_to_post)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            Some((limit, offset)) => {
                sql.push_str(" LIMIT ?1 OFFSET ?2");
                conn.prepare(&sql)?
                    .query_map(params![limit as i64, offset as i64], row_to_post)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(posts)
    }

    pub fn posts_with_link_like(&self, link: &str, limit: Option<usize>, sort: SortRule) -> Result<Vec<Post>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {} FROM posts WHERE link LIKE ?1 ESCAPE '\\' ORDER BY {} DESC LIMIT ?2",
            POST_COLUMNS,
            sort.column()
        );
        // sqlite treats a negative LIMIT as unbounded
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        let posts = conn
            .prepare(&sql)?
            .query_map(params![like_pattern(link), limit], row_to_post)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(posts)
    }

    pub fn latest_created_at(&self) -> Result<Option<String>> {
        let latest: Option<Option<String>> = self
            .conn()
            .query_row(
                "SELECT createdAt FROM posts ORDER BY createdAt DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(latest.flatten())
    }

    /// Delete posts last updated before `cutoff` (`YYYY-MM-DD`)
    pub fn delete_outdated_posts(&self, cutoff: &str) -> Result<u64> {
        let removed = self
            .conn()
            .execute("DELETE FROM posts WHERE date(updated) < date(?1)", [cutoff])?;
        Ok(removed as u64)
    }
}

fn post_params(post: &Post) -> [&dyn rusqlite::ToSql; 8] {
    [
        &post.title,
        &post.created,
        &post.updated,
        &post.link,
        &post.author,
        &post.avatar,
        &post.rule,
        &post.created_at,
    ]
}

fn row_to_friend(row: &rusqlite::Row) -> rusqlite::Result<Friend> {
    Ok(Friend {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        link: row.get(2)?,
        avatar: row.get(3)?,
        error: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_post(row: &rusqlite::Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: Some(row.get(0)?),
        title: row.get(1)?,
        created: row.get(2)?,
        updated: row.get(3)?,
        link: row.get(4)?,
        author: row.get(5)?,
        avatar: row.get(6)?,
        rule: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::{Dialect, TABLES};

    fn store() -> SqliteEngine {
        let engine = SqliteEngine::open_in_memory().unwrap();
        for table in TABLES {
            engine.execute_batch(&table.create_statement(Dialect::Sqlite)).unwrap();
        }
        engine
    }

    fn sample_post(title: &str, link: &str, updated: &str) -> Post {
        let mut post = Post::new(title, link, "Alice");
        post.created = updated.to_string();
        post.updated = updated.to_string();
        post.created_at = format!("{} 08:00:00", updated);
        post
    }

    #[test]
    fn test_friend_crud() {
        let store = store();
        store
            .insert_friend(&Friend::new("Alice", "https://alice.example/", "a.png", false, "2024-01-01"))
            .unwrap();
        store
            .bulk_insert_friends(&[
                Friend::new("Bob", "https://bob.example/", "b.png", true, "2024-01-01"),
                Friend::new("Carol", "https://carol.example/", "c.png", false, "2024-01-01"),
            ])
            .unwrap();

        let friends = store.list_friends().unwrap();
        assert_eq!(friends.len(), 3);
        assert_eq!(friends[0].id, Some(1));
        assert!(friends[1].error);

        let bob = store.friend_with_link_like("bob.example").unwrap().unwrap();
        assert_eq!(bob.name, "Bob");
        assert!(store.friend_with_link_like("dave").unwrap().is_none());

        store.truncate_friends().unwrap();
        assert!(store.list_friends().unwrap().is_empty());
    }

    #[test]
    fn test_list_posts_sorted_and_windowed() {
        let store = store();
        store
            .bulk_insert_posts(&[
                sample_post("one", "https://alice.example/1/", "2024-01-01"),
                sample_post("three", "https://alice.example/3/", "2024-03-01"),
                sample_post("two", "https://alice.example/2/", "2024-02-01"),
            ])
            .unwrap();

        let all = store.list_posts(&PostQuery::all(SortRule::Updated)).unwrap();
        let titles: Vec<&str> = all.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["three", "two", "one"]);

        let page = store.list_posts(&PostQuery::range(1, 2, SortRule::Updated)).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].title, "two");

        assert_eq!(store.latest_created_at().unwrap().as_deref(), Some("2024-03-01 08:00:00"));
    }

    #[test]
    fn test_delete_posts_by_link_and_author() {
        let store = store();
        let post = sample_post("one", "https://alice.example/1/", "2024-01-01");
        let mut other_author = post.clone();
        other_author.author = "Bob".to_string();
        store.bulk_insert_posts(&[post.clone(), other_author]).unwrap();

        assert_eq!(store.delete_posts(&[post]).unwrap(), 1);
        let remaining = store.list_posts(&PostQuery::default()).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].author, "Bob");
    }

    #[test]
    fn test_link_like_escapes_wildcards() {
        let store = store();
        store
            .bulk_insert_posts(&[
                sample_post("a", "https://alice.example/100%/", "2024-01-01"),
                sample_post("b", "https://alice.example/1000/", "2024-01-02"),
            ])
            .unwrap();

        let matched = store.posts_with_link_like("100%", None, SortRule::Updated).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].title, "a");

        let limited = store.posts_with_link_like("alice", Some(1), SortRule::Updated).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].title, "b");
    }

    #[test]
    fn test_delete_outdated_posts() {
        let store = store();
        store
            .bulk_insert_posts(&[
                sample_post("old", "https://alice.example/old/", "2023-06-01"),
                sample_post("new", "https://alice.example/new/", "2024-06-01"),
            ])
            .unwrap();

        assert_eq!(store.delete_outdated_posts("2024-01-01").unwrap(), 1);
        let remaining = store.list_posts(&PostQuery::default()).unwrap();
        assert_eq!(remaining[0].title, "new");
    }

    #[test]
    fn test_latest_created_at_empty() {
        assert_eq!(store().latest_created_at().unwrap(), None);
    }
}
