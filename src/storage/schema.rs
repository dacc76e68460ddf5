//! Database schema definitions
//!
//! Tables are declared once and rendered per SQL dialect. `create_all` checks
//! each table before creating it, and every statement is also guarded with
//! `IF NOT EXISTS`, so concurrent first runs are harmless.

use super::engine::Engine;
use super::model::{Friend, Post, Record};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    /// Bounded string (`VARCHAR(n)`)
    String(u32),
    Boolean,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Auto-incrementing integer primary key
    pub primary_key: bool,
}

impl Column {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind, primary_key: false }
    }

    pub const fn primary_key(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Integer, primary_key: true }
    }

    fn definition(&self, dialect: Dialect) -> String {
        if self.primary_key {
            return match dialect {
                Dialect::Sqlite => format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", self.name),
                Dialect::MySql => format!("{} INTEGER NOT NULL AUTO_INCREMENT", self.name),
            };
        }
        let ty = match (self.kind, dialect) {
            (ColumnKind::Integer, _) => "INTEGER".to_string(),
            (ColumnKind::String(len), _) => format!("VARCHAR({})", len),
            (ColumnKind::Boolean, Dialect::Sqlite) => "BOOLEAN".to_string(),
            (ColumnKind::Boolean, Dialect::MySql) => "BOOL".to_string(),
        };
        format!("{} {}", self.name, ty)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
}

impl Table {
    pub fn primary_key(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for the dialect
    pub fn create_statement(&self, dialect: Dialect) -> String {
        let mut lines: Vec<String> = self.columns.iter().map(|c| c.definition(dialect)).collect();
        if dialect == Dialect::MySql {
            if let Some(pk) = self.primary_key() {
                lines.push(format!("PRIMARY KEY ({})", pk.name));
            }
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.name,
            lines.join(",\n    ")
        )
    }
}

/// friends(id, name, link, avatar, error, createdAt)
pub const FRIENDS_TABLE: Table = Table {
    name: <Friend as Record>::TABLE,
    columns: &[
        Column::primary_key("id"),
        Column::new("name", ColumnKind::String(256)),
        Column::new("link", ColumnKind::String(1024)),
        Column::new("avatar", ColumnKind::String(1024)),
        Column::new("error", ColumnKind::Boolean),
        Column::new("createdAt", ColumnKind::String(1024)),
    ],
};

/// posts(id, title, created, updated, link, author, avatar, rule, createdAt)
pub const POSTS_TABLE: Table = Table {
    name: <Post as Record>::TABLE,
    columns: &[
        Column::primary_key("id"),
        Column::new("title", ColumnKind::String(256)),
        Column::new("created", ColumnKind::String(256)),
        Column::new("updated", ColumnKind::String(256)),
        Column::new("link", ColumnKind::String(1024)),
        Column::new("author", ColumnKind::String(256)),
        Column::new("avatar", ColumnKind::String(1024)),
        Column::new("rule", ColumnKind::String(256)),
        Column::new("createdAt", ColumnKind::String(1024)),
    ],
};

/// All registered tables, in creation order
pub const TABLES: &[Table] = &[FRIENDS_TABLE, POSTS_TABLE];

/// Outcome of `create_all`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    pub created: Vec<&'static str>,
    pub existing: Vec<&'static str>,
}

impl std::fmt::Display for SchemaReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Schema:")?;
        writeln!(f, "  Created: {}", self.created.join(", "))?;
        write!(f, "  Existing: {}", self.existing.join(", "))
    }
}

/// Create every missing table; tables that already exist are left untouched.
pub async fn create_all(engine: &Engine) -> Result<SchemaReport> {
    let mut report = SchemaReport::default();
    for table in TABLES {
        if engine.table_exists(table.name).await? {
            tracing::debug!("Table `{}` already exists", table.name);
            report.existing.push(table.name);
            continue;
        }

        engine
            .execute_ddl(&table.create_statement(engine.dialect()))
            .await
            .map_err(|e| Error::SchemaCreation {
                table: table.name.to_string(),
                message: e.to_string(),
            })?;
        tracing::debug!("Created table `{}`", table.name);
        report.created.push(table.name);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FriendCircleStore, Session};
    use std::sync::Arc;

    #[test]
    fn test_sqlite_statement() {
        let sql = FRIENDS_TABLE.create_statement(Dialect::Sqlite);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS friends ("));
        assert!(sql.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("name VARCHAR(256)"));
        assert!(sql.contains("error BOOLEAN"));
        assert!(!sql.contains("PRIMARY KEY (id)"));
    }

    #[test]
    fn test_mysql_statement() {
        let sql = POSTS_TABLE.create_statement(Dialect::MySql);
        assert!(sql.contains("id INTEGER NOT NULL AUTO_INCREMENT"));
        assert!(sql.contains("createdAt VARCHAR(1024)"));
        assert!(sql.trim_end().ends_with("PRIMARY KEY (id)\n)"));
    }

    #[tokio::test]
    async fn test_create_all_is_idempotent() {
        let engine = Engine::sqlite_in_memory().unwrap();

        let first = create_all(&engine).await.unwrap();
        assert_eq!(first.created, vec!["friends", "posts"]);
        assert!(first.existing.is_empty());

        let second = create_all(&engine).await.unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.existing, vec!["friends", "posts"]);
    }

    #[tokio::test]
    async fn test_create_all_keeps_existing_rows() {
        let engine = Arc::new(Engine::sqlite_in_memory().unwrap());
        create_all(&engine).await.unwrap();

        let session = Session::new(engine.clone());
        session
            .insert_friend(&Friend::new("Alice", "https://alice.example/", "", false, "2024-01-01"))
            .await
            .unwrap();

        create_all(&engine).await.unwrap();
        assert_eq!(session.list_friends().await.unwrap().len(), 1);
    }
}
