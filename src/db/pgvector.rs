//! PostgreSQL + pgvector-backed `VectorStore` (C3, optional backend).
//!
//! One table per collection (`vs_<collection>`), with the embedding stored
//! in a `vector(n)` column and cosine distance computed via pgvector's
//! `<=>` operator. Requires the `pgvector` Postgres extension to be
//! installed in the target database; this module does not install it.

use crate::db::vectorstore::{
    rank_results, CollectionInfo, CollectionStats, MetadataFilter, VectorStore,
};
use crate::types::{AppError, Chunk, PageRange, QualityBreakdown, Result, SearchResult};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;

/// PostgreSQL-backed vector store using the pgvector extension.
pub struct PgVectorStore {
    pool: PgPool,
}

fn table_name(collection: &str) -> Result<String> {
    if collection.is_empty()
        || !collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AppError::InvalidInput(format!(
            "invalid collection name '{}': must be alphanumeric/underscore",
            collection
        )));
    }
    Ok(format!("vs_{}", collection))
}

fn vector_literal(embedding: &[f32]) -> String {
    let joined = embedding
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("[{}]", joined)
}

impl PgVectorStore {
    /// Connect to `connection_string` and prepare the pool.
    pub async fn new(connection_string: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(connection_string)
            .await
            .map_err(|e| {
                AppError::PersistenceError(format!("failed to connect to pgvector: {e}"))
            })?;

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&pool)
            .await
            .map_err(|e| {
                AppError::PersistenceError(format!("failed to create vector extension: {e}"))
            })?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    fn provider_name(&self) -> &'static str {
        "pgvector"
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let table = table_name(name)?;

        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(format!("public.{}", table))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::PersistenceError(format!("collection lookup failed: {e}")))?;
        if exists {
            return Err(AppError::InvalidInput(format!(
                "Collection '{}' already exists",
                name
            )));
        }

        let ddl = format!(
            "CREATE TABLE {table} (
                document_id TEXT NOT NULL,
                chunk_index BIGINT NOT NULL,
                id TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding vector({dimensions}) NOT NULL,
                token_count BIGINT NOT NULL,
                char_count BIGINT NOT NULL,
                page_start INT,
                page_end INT,
                quality_score REAL NOT NULL,
                cleanliness REAL NOT NULL,
                readability REAL NOT NULL,
                length_fit REAL NOT NULL,
                has_keywords BOOLEAN NOT NULL,
                keywords JSONB NOT NULL,
                entities JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                metadata JSONB NOT NULL,
                PRIMARY KEY (document_id, chunk_index)
            )",
            table = table,
            dimensions = dimensions
        );
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::PersistenceError(format!("create table failed: {e}")))?;

        let index_ddl = format!(
            "CREATE INDEX ON {table} USING hnsw (embedding vector_cosine_ops)",
            table = table
        );
        sqlx::query(&index_ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::PersistenceError(format!("create index failed: {e}")))?;

        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let table = table_name(name)?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::PersistenceError(format!("drop table failed: {e}")))?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let rows = sqlx::query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_name LIKE 'vs\\_%' ESCAPE '\\'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::PersistenceError(format!("list collections failed: {e}")))?;

        let mut infos = Vec::with_capacity(rows.len());
        for row in rows {
            let table: String = row.get("table_name");
            let name = table.strip_prefix("vs_").unwrap_or(&table).to_string();
            let stats = self.collection_stats(&name).await?;
            infos.push(CollectionInfo {
                name,
                chunk_count: stats.chunk_count,
                dimensions: stats.dimensions,
            });
        }
        Ok(infos)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let table = table_name(name)?;
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(format!("public.{}", table))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::PersistenceError(format!("collection lookup failed: {e}")))?;
        Ok(exists)
    }

    async fn collection_stats(&self, name: &str) -> Result<CollectionStats> {
        let table = table_name(name)?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::PersistenceError(format!("count failed: {e}")))?;

        let dimensions: i32 = sqlx::query_scalar(
            "SELECT atttypmod FROM pg_attribute \
             WHERE attrelid = $1::regclass AND attname = 'embedding'",
        )
        .bind(format!("public.{}", table))
        .fetch_one(&self.pool)
        .await
        .unwrap_or(0);

        Ok(CollectionStats {
            name: name.to_string(),
            chunk_count: count as usize,
            dimensions: dimensions.max(0) as usize,
            index_size_bytes: None,
            distance_metric: "cosine".to_string(),
        })
    }

    async fn upsert_chunks(&self, collection: &str, chunks: &[Chunk]) -> Result<usize> {
        let table = table_name(collection)?;
        let stats = self.collection_stats(collection).await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::PersistenceError(format!("begin tx failed: {e}")))?;

        let mut upserted = 0usize;
        for chunk in chunks {
            let embedding = chunk.embedding.as_ref().ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "chunk {} has no embedding; cannot upsert",
                    chunk.id
                ))
            })?;
            if stats.dimensions != 0 && embedding.len() != stats.dimensions {
                return Err(AppError::InvalidInput(format!(
                    "embedding dimension {} does not match collection dimension {}",
                    embedding.len(),
                    stats.dimensions
                )));
            }

            let query = format!(
                "INSERT INTO {table} (document_id, chunk_index, id, content, embedding, \
                 token_count, char_count, page_start, page_end, quality_score, cleanliness, \
                 readability, length_fit, has_keywords, keywords, entities, created_at, metadata) \
                 VALUES ($1, $2, $3, $4, $5::vector, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
                 ON CONFLICT (document_id, chunk_index) DO UPDATE SET \
                 id = EXCLUDED.id, content = EXCLUDED.content, embedding = EXCLUDED.embedding, \
                 token_count = EXCLUDED.token_count, char_count = EXCLUDED.char_count, \
                 page_start = EXCLUDED.page_start, page_end = EXCLUDED.page_end, \
                 quality_score = EXCLUDED.quality_score, cleanliness = EXCLUDED.cleanliness, \
                 readability = EXCLUDED.readability, length_fit = EXCLUDED.length_fit, \
                 has_keywords = EXCLUDED.has_keywords, \
                 keywords = EXCLUDED.keywords, entities = EXCLUDED.entities, \
                 created_at = EXCLUDED.created_at, metadata = EXCLUDED.metadata"
            );

            sqlx::query(&query)
                .bind(&chunk.document_id)
                .bind(chunk.chunk_index as i64)
                .bind(&chunk.id)
                .bind(&chunk.content)
                .bind(vector_literal(embedding))
                .bind(chunk.token_count as i64)
                .bind(chunk.char_count as i64)
                .bind(chunk.page_range.map(|p| p.start as i32))
                .bind(chunk.page_range.map(|p| p.end as i32))
                .bind(chunk.quality_score)
                .bind(chunk.quality_breakdown.cleanliness)
                .bind(chunk.quality_breakdown.readability)
                .bind(chunk.quality_breakdown.length_fit)
                .bind(chunk.quality_breakdown.has_keywords)
                .bind(serde_json::to_value(&chunk.keywords).unwrap_or_default())
                .bind(serde_json::to_value(&chunk.entities).unwrap_or_default())
                .bind(chunk.created_at)
                .bind(serde_json::to_value(&chunk.metadata).unwrap_or_default())
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::PersistenceError(format!("upsert failed: {e}")))?;
            upserted += 1;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::PersistenceError(format!("commit failed: {e}")))?;
        Ok(upserted)
    }

    async fn delete_by_document(&self, collection: &str, document_id: &str) -> Result<usize> {
        let table = table_name(collection)?;
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE document_id = $1",
            table
        ))
        .bind(document_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::PersistenceError(format!("delete failed: {e}")))?;
        Ok(result.rows_affected() as usize)
    }

    async fn similarity_search(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
        threshold: f32,
        filters: &[MetadataFilter],
    ) -> Result<Vec<SearchResult>> {
        let table = table_name(collection)?;
        // pgvector's <=> operator is cosine *distance*; fetch a generous
        // candidate set and apply the exact threshold/tie-break rules in
        // `rank_results` so behavior matches every other backend bit-for-bit.
        let candidate_limit = (k.max(1) * 4).max(50);

        let mut query = format!(
            "SELECT *, embedding <=> $1::vector AS distance FROM {} ",
            table
        );
        for (i, _) in filters.iter().enumerate() {
            query.push_str(if i == 0 { "WHERE " } else { "AND " });
            query.push_str(&format!("metadata ->> ${} = ${} ", i * 2 + 2, i * 2 + 3));
        }
        query.push_str("ORDER BY distance ASC LIMIT $");
        query.push_str(&(filters.len() * 2 + 2).to_string());

        let mut q = sqlx::query(&query).bind(vector_literal(embedding));
        for (field, value) in filters {
            q = q.bind(field).bind(value);
        }
        q = q.bind(candidate_limit as i64);

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::PersistenceError(format!("search failed: {e}")))?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let distance: f64 = row.get("distance");
            let similarity = 1.0 - distance as f32;
            if similarity > threshold {
                let chunk = row_to_chunk(&row)?;
                results.push(SearchResult {
                    chunk,
                    score: similarity,
                    distance: distance as f32,
                });
            }
        }

        let mut ranked = rank_results(results);
        ranked.truncate(k);
        Ok(ranked)
    }

    async fn count_chunks(&self, collection: &str, filter: Option<&MetadataFilter>) -> Result<usize> {
        let table = table_name(collection)?;
        let count: i64 = if let Some((field, value)) = filter {
            sqlx::query_scalar(&format!(
                "SELECT COUNT(*) FROM {} WHERE metadata ->> $1 = $2",
                table
            ))
            .bind(field)
            .bind(value)
            .fetch_one(&self.pool)
            .await
        } else {
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&self.pool)
                .await
        }
        .map_err(|e| AppError::PersistenceError(format!("count failed: {e}")))?;
        Ok(count as usize)
    }

    async fn list_chunks_by_document(
        &self,
        collection: &str,
        document_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Chunk>> {
        let table = table_name(collection)?;
        let rows = sqlx::query(&format!(
            "SELECT * FROM {table} WHERE document_id = $1 ORDER BY chunk_index ASC OFFSET $2 LIMIT $3"
        ))
        .bind(document_id)
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::PersistenceError(format!("list chunks failed: {e}")))?;

        rows.iter().map(row_to_chunk).collect()
    }
}

fn row_to_chunk(row: &sqlx::postgres::PgRow) -> Result<Chunk> {
    let keywords: serde_json::Value = row.get("keywords");
    let entities: serde_json::Value = row.get("entities");
    let metadata: serde_json::Value = row.get("metadata");
    let page_start: Option<i32> = row.get("page_start");
    let page_end: Option<i32> = row.get("page_end");

    Ok(Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_index: row.get::<i64, _>("chunk_index") as usize,
        content: row.get("content"),
        embedding: None,
        token_count: row.get::<i64, _>("token_count") as usize,
        char_count: row.get::<i64, _>("char_count") as usize,
        page_range: match (page_start, page_end) {
            (Some(start), Some(end)) => Some(PageRange {
                start: start as u32,
                end: end as u32,
            }),
            _ => None,
        },
        quality_score: row.get("quality_score"),
        quality_breakdown: QualityBreakdown {
            cleanliness: row.get("cleanliness"),
            readability: row.get("readability"),
            length_fit: row.get("length_fit"),
            has_keywords: row.get("has_keywords"),
        },
        keywords: serde_json::from_value(keywords).unwrap_or_default(),
        entities: serde_json::from_value(entities).unwrap_or_default(),
        created_at: row.get("created_at"),
        metadata: serde_json::from_value::<HashMap<String, String>>(metadata).unwrap_or_default(),
    })
}
