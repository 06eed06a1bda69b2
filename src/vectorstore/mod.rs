//! The local vector store client (§6 "Outbound: Vector store") and the
//! cache-invalidation wiring named in §3/§5/P6.
//!
//! Three operations, as specified: `add_chunks`, `query`, `delete_by_filter`.
//! The concrete [`SqliteVectorStore`] persists chunks (and their embedding
//! vectors, as a little-endian `f32` BLOB) in `rusqlite`, matching the
//! blob-embedding storage convention already used by the teacher's former
//! conversation-memory store; similarity is plain in-process cosine
//! similarity over the decoded vectors, since the embedding model itself is
//! an excluded collaborator (§1) and no vector-index extension is assumed.
//!
//! [`CachedVectorStore`] wraps any [`VectorStore`] with the retrieval cache
//! (§4.5, §5): reads are keyed on `collection + query text + k + filter` and
//! tagged by collection id, so any write through the same wrapper atomically
//! invalidates every cached entry bound to that collection (P6).

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::cache::{hash_key, TtlLruCache};
use crate::error::Result;
use crate::types::Chunk;

/// One chunk to insert via `AddChunks`.
#[derive(Debug, Clone)]
pub struct ChunkInsert {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: std::collections::HashMap<String, String>,
}

/// Narrow interface for the vector-store collaborator (§9: "duck-typed tool
/// objects" become a narrow trait per tool kind).
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add_chunks(&self, collection: &str, chunks: Vec<ChunkInsert>) -> Result<()>;
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<Chunk>>;
    async fn delete_by_filter(&self, collection: &str, filter: &str) -> Result<()>;
}

/// `rusqlite`-backed [`VectorStore`]. One `chunks` table shared across
/// collections, partitioned by a `collection` column.
pub struct SqliteVectorStore {
    conn: Arc<tokio::sync::Mutex<Connection>>,
}

impl SqliteVectorStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(tokio::sync::Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(tokio::sync::Mutex::new(conn)),
        })
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chunks (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                chunk_ix INTEGER NOT NULL,
                text TEXT NOT NULL,
                vector BLOB NOT NULL,
                metadata TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );",
        )?;
        Ok(())
    }

    fn encode_vector(vector: &[f32]) -> Vec<u8> {
        vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn decode_vector(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    fn cosine(a: &[f32], b: &[f32]) -> f64 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            (dot / (norm_a * norm_b)) as f64
        }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    #[tracing::instrument(skip(self, chunks), fields(collection, n = chunks.len()))]
    async fn add_chunks(&self, collection: &str, chunks: Vec<ChunkInsert>) -> Result<()> {
        let conn = self.conn.lock().await;
        for (ix, chunk) in chunks.into_iter().enumerate() {
            let metadata = serde_json::to_string(&chunk.metadata).unwrap_or_default();
            conn.execute(
                "INSERT OR REPLACE INTO chunks (collection, id, doc_id, chunk_ix, text, vector, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    collection,
                    chunk.id,
                    chunk.id,
                    ix as i64,
                    chunk.text,
                    Self::encode_vector(&chunk.vector),
                    metadata,
                ],
            )?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, vector), fields(collection, k))]
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, doc_id, chunk_ix, text, vector, metadata FROM chunks WHERE collection = ?1",
        )?;
        let rows = stmt.query_map(params![collection], |row| {
            let id: String = row.get(0)?;
            let doc_id: String = row.get(1)?;
            let chunk_ix: i64 = row.get(2)?;
            let text: String = row.get(3)?;
            let vector_blob: Vec<u8> = row.get(4)?;
            let metadata_json: String = row.get(5)?;
            Ok((id, doc_id, chunk_ix, text, vector_blob, metadata_json))
        })?;

        let mut scored: Vec<Chunk> = Vec::new();
        for row in rows {
            let (_id, doc_id, chunk_ix, text, vector_blob, metadata_json) = row?;
            // The filter predicate is collaborator-defined (§6); here it is a
            // simple substring match against the chunk's metadata blob,
            // sufficient for the contract this spec guarantees (dedicated
            // query-language parsing is an excluded collaborator concern).
            if let Some(f) = filter {
                if !metadata_json.contains(f) {
                    continue;
                }
            }
            let decoded = Self::decode_vector(&vector_blob);
            let score = Self::cosine(vector, &decoded);
            let metadata: std::collections::HashMap<String, String> =
                serde_json::from_str(&metadata_json).unwrap_or_default();
            scored.push(Chunk {
                doc_id,
                chunk_ix: chunk_ix as u32,
                text,
                score,
                metadata,
            });
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    #[tracing::instrument(skip(self), fields(collection))]
    async fn delete_by_filter(&self, collection: &str, filter: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT id, metadata FROM chunks WHERE collection = ?1")?;
        let to_delete: Vec<String> = stmt
            .query_map(params![collection], |row| {
                let id: String = row.get(0)?;
                let metadata: String = row.get(1)?;
                Ok((id, metadata))
            })?
            .filter_map(|r| r.ok())
            .filter(|(_, metadata)| metadata.contains(filter))
            .map(|(id, _)| id)
            .collect();

        for id in to_delete {
            conn.execute(
                "DELETE FROM chunks WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )?;
        }
        Ok(())
    }
}

/// Decorates a [`VectorStore`] with the retrieval cache (§4.5). Every write
/// invalidates the collection's cached entries before returning, so no
/// subsequent `query_cached` call can observe a pre-mutation value (P6).
pub struct CachedVectorStore {
    inner: Arc<dyn VectorStore>,
    cache: TtlLruCache<String, Vec<Chunk>>,
}

impl CachedVectorStore {
    pub fn new(inner: Arc<dyn VectorStore>, ttl_seconds: i64, max_entries: usize) -> Self {
        Self {
            inner,
            cache: TtlLruCache::new(ttl_seconds, max_entries),
        }
    }

    pub async fn add_chunks(&self, collection: &str, chunks: Vec<ChunkInsert>) -> Result<()> {
        self.inner.add_chunks(collection, chunks).await?;
        self.cache.invalidate_tag(collection).await;
        Ok(())
    }

    pub async fn delete_by_filter(&self, collection: &str, filter: &str) -> Result<()> {
        self.inner.delete_by_filter(collection, filter).await?;
        self.cache.invalidate_tag(collection).await;
        Ok(())
    }

    /// Cache key: `collection + query text + k + filter` (§4.5). `query_text`
    /// is the original question, not the embedded vector — it is what the
    /// spec's cache key is defined over, and is stable across embedding-model
    /// nondeterminism.
    #[tracing::instrument(skip(self, vector), fields(collection, k))]
    pub async fn query_cached(
        &self,
        collection: &str,
        query_text: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<Chunk>> {
        let key = hash_key(&[
            collection,
            query_text,
            &k.to_string(),
            filter.unwrap_or(""),
        ]);
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }
        let result = self.inner.query(collection, vector, k, filter).await?;
        self.cache
            .put(key, result.clone(), Some(collection.to_string()))
            .await;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn insert(id: &str, vector: Vec<f32>) -> ChunkInsert {
        ChunkInsert {
            id: id.to_string(),
            vector,
            text: format!("text for {id}"),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn query_ranks_by_cosine_similarity() {
        let store = SqliteVectorStore::in_memory().unwrap();
        store
            .add_chunks(
                "docs",
                vec![insert("a", vec![1.0, 0.0]), insert("b", vec![0.0, 1.0])],
            )
            .await
            .unwrap();

        let results = store.query("docs", &[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(results[0].doc_id, "a");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn cache_invalidated_on_add_chunks_p6() {
        let inner: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::in_memory().unwrap());
        let cached = CachedVectorStore::new(inner, 3600, 100);

        cached
            .add_chunks("docs", vec![insert("a", vec![1.0, 0.0])])
            .await
            .unwrap();
        let first = cached
            .query_cached("docs", "q", &[1.0, 0.0], 5, None)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        // Mutate the collection; a cached pre-mutation value must not survive.
        cached
            .add_chunks("docs", vec![insert("b", vec![1.0, 0.0])])
            .await
            .unwrap();
        let second = cached
            .query_cached("docs", "q", &[1.0, 0.0], 5, None)
            .await
            .unwrap();
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn delete_by_filter_removes_matching_chunks() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let mut meta = HashMap::new();
        meta.insert("source".to_string(), "doc1".to_string());
        let mut insert_a = insert("a", vec![1.0, 0.0]);
        insert_a.metadata = meta;
        store.add_chunks("docs", vec![insert_a]).await.unwrap();

        store.delete_by_filter("docs", "doc1").await.unwrap();
        let results = store.query("docs", &[1.0, 0.0], 5, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn on_disk_store_persists_chunks_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunks.sqlite");

        {
            let store = SqliteVectorStore::open(&path).unwrap();
            store.add_chunks("docs", vec![insert("a", vec![1.0, 0.0])]).await.unwrap();
        }

        let reopened = SqliteVectorStore::open(&path).unwrap();
        let results = reopened.query("docs", &[1.0, 0.0], 5, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].doc_id, "a");
    }
}
