//! MongoDB document store
//!
//! Records live in the `Friends` and `Posts` collections of the `fcircle`
//! database. The driver connects lazily and pools internally, so building the
//! client never touches the network.

use super::engine::ConfigSource;
use super::model::{Friend, Post, PostQuery, Record, SortRule};
use super::{FriendCircleStore, outdated_cutoff};
use crate::config::{Backend, ConfigResolver, ConnectionDescriptor};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Document, doc};
use mongodb::options::{ClientOptions, FindOneOptions, FindOptions};
use mongodb::{Client, Collection, Database};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;

pub const DATABASE_NAME: &str = "fcircle";

pub struct DocumentEngine {
    client: Client,
    database: Database,
    descriptor: ConnectionDescriptor,
}

impl DocumentEngine {
    pub async fn connect(descriptor: ConnectionDescriptor) -> Result<Self> {
        if descriptor.backend != Backend::MongoDb {
            return Err(Error::Configuration(format!(
                "{} is not a document backend",
                descriptor.backend
            )));
        }
        let connection_error = |e: mongodb::error::Error| Error::Connection {
            backend: Backend::MongoDb,
            message: format!("MongoDB client failed ({}): {}", descriptor.redacted_url(), e),
        };
        let options = ClientOptions::parse(descriptor.url.as_str())
            .await
            .map_err(connection_error)?;
        let client = Client::with_options(options).map_err(connection_error)?;
        let database = client.database(DATABASE_NAME);
        Ok(Self { client, database, descriptor })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Typed handle to a collection of the `fcircle` database
    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.database.collection::<T>(name)
    }

    fn friends(&self) -> Collection<Friend> {
        self.collection(<Friend as Record>::COLLECTION)
    }

    fn posts(&self) -> Collection<Post> {
        self.collection(<Post as Record>::COLLECTION)
    }
}

impl std::fmt::Debug for DocumentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentEngine")
            .field("database", &DATABASE_NAME)
            .field("url", &self.descriptor.redacted_url())
            .finish()
    }
}

/// Lazily built, shared MongoDB client
pub struct DocumentFactory {
    source: ConfigSource,
    engine: OnceCell<Arc<DocumentEngine>>,
}

static GLOBAL: OnceLock<DocumentFactory> = OnceLock::new();

impl DocumentFactory {
    pub fn new(resolver: ConfigResolver) -> Self {
        Self { source: ConfigSource::Resolver(resolver), engine: OnceCell::new() }
    }

    pub fn from_env(settings_path: Option<PathBuf>) -> Self {
        Self { source: ConfigSource::Environment(settings_path), engine: OnceCell::new() }
    }

    /// The process-wide factory behind `get_document_engine` and `get_document_session`
    pub fn global() -> &'static DocumentFactory {
        GLOBAL.get_or_init(|| DocumentFactory::from_env(None))
    }

    pub async fn get_engine(&self) -> Result<Arc<DocumentEngine>> {
        self.engine.get_or_try_init(|| self.build()).await.cloned()
    }

    pub async fn get_session(&self) -> Result<DocumentSession> {
        Ok(DocumentSession::new(self.get_engine().await?))
    }

    pub async fn get_collection<T: Send + Sync>(&self, name: &str) -> Result<Collection<T>> {
        Ok(self.get_engine().await?.collection(name))
    }

    async fn build(&self) -> Result<Arc<DocumentEngine>> {
        let descriptor = self.source.resolver()?.resolve()?;
        let engine = DocumentEngine::connect(descriptor).await?;
        tracing::info!(
            "Opened MongoDB client for `{}` at {}",
            DATABASE_NAME,
            engine.descriptor().redacted_url()
        );
        Ok(Arc::new(engine))
    }
}

/// Client of the process-wide document factory
pub async fn get_document_engine() -> Result<Arc<DocumentEngine>> {
    DocumentFactory::global().get_engine().await
}

/// Session bound to the process-wide document client
pub async fn get_document_session() -> Result<DocumentSession> {
    DocumentFactory::global().get_session().await
}

#[derive(Debug, Clone)]
pub struct DocumentSession {
    engine: Arc<DocumentEngine>,
}

impl DocumentSession {
    pub fn new(engine: Arc<DocumentEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<DocumentEngine> {
        &self.engine
    }
}

fn sort_descending(field: &str) -> Document {
    let mut sort = Document::new();
    sort.insert(field, -1);
    sort
}

/// Sorted, windowed find options; `None` for a zero limit.
///
/// The server reads `limit: 0` as unlimited, so an empty window never reaches it.
fn find_options(sort: SortRule, limit: Option<usize>, skip: usize) -> Option<FindOptions> {
    if limit == Some(0) {
        return None;
    }
    let mut options = FindOptions::default();
    options.sort = Some(sort_descending(sort.column()));
    options.limit = limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX));
    if skip > 0 {
        options.skip = Some(skip as u64);
    }
    Some(options)
}

fn link_contains(fragment: &str) -> Document {
    doc! { "link": { "$regex": regex::escape(fragment) } }
}

#[async_trait]
impl FriendCircleStore for DocumentSession {
    async fn insert_friend(&self, friend: &Friend) -> Result<()> {
        self.engine.friends().insert_one(friend, None).await?;
        Ok(())
    }

    async fn insert_post(&self, post: &Post) -> Result<()> {
        self.engine.posts().insert_one(post, None).await?;
        Ok(())
    }

    async fn bulk_insert_friends(&self, friends: &[Friend]) -> Result<usize> {
        if friends.is_empty() {
            return Ok(0);
        }
        let result = self.engine.friends().insert_many(friends, None).await?;
        Ok(result.inserted_ids.len())
    }

    async fn bulk_insert_posts(&self, posts: &[Post]) -> Result<usize> {
        if posts.is_empty() {
            return Ok(0);
        }
        let result = self.engine.posts().insert_many(posts, None).await?;
        Ok(result.inserted_ids.len())
    }

    async fn delete_posts(&self, posts: &[Post]) -> Result<u64> {
        let collection = self.engine.posts();
        let mut removed = 0;
        for post in posts {
            let filter = doc! { "link": post.link.as_str(), "author": post.author.as_str() };
            removed += collection.delete_many(filter, None).await?.deleted_count;
        }
        Ok(removed)
    }

    async fn truncate_friends(&self) -> Result<()> {
        self.engine.friends().drop(None).await?;
        Ok(())
    }

    async fn list_friends(&self) -> Result<Vec<Friend>> {
        let cursor = self.engine.friends().find(None, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn list_posts(&self, query: &PostQuery) -> Result<Vec<Post>> {
        let options = match query.window()? {
            None => find_options(query.sort, None, 0),
            Some((limit, offset)) => find_options(query.sort, Some(limit), offset),
        };
        let Some(options) = options else {
            return Ok(Vec::new());
        };
        let cursor = self.engine.posts().find(None, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn posts_with_link_like(&self, link: &str, limit: Option<usize>, sort: SortRule) -> Result<Vec<Post>> {
        let Some(options) = find_options(sort, limit, 0) else {
            return Ok(Vec::new());
        };
        let cursor = self.engine.posts().find(link_contains(link), options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn friend_with_link_like(&self, domain: &str) -> Result<Option<Friend>> {
        Ok(self.engine.friends().find_one(link_contains(domain), None).await?)
    }

    async fn latest_created_at(&self) -> Result<Option<String>> {
        let mut options = FindOneOptions::default();
        options.sort = Some(sort_descending("createdAt"));
        let latest = self.engine.posts().find_one(None, options).await?;
        Ok(latest.map(|post| post.created_at))
    }

    async fn delete_outdated_posts(&self, days: usize) -> Result<u64> {
        let Some(cutoff) = outdated_cutoff(days) else {
            return Ok(0);
        };
        tracing::debug!("Deleting posts updated before {}", cutoff);
        let result = self
            .engine
            .posts()
            .delete_many(doc! { "updated": { "$lt": cutoff.as_str() } }, None)
            .await?;
        Ok(result.deleted_count)
    }
}
