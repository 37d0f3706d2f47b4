use crate::config::DatabaseConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Persisted metadata for one uploaded file
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FileRecord {
    /// Unique record ID, generated at insert time
    pub id: Uuid,
    /// Display name given by the uploader
    pub name: String,
    /// Client-declared category label ("image" selects image-typed remote
    /// deletion, anything else is treated as raw)
    pub category: String,
    /// Optional free-form description
    pub description: Option<String>,
    /// Tags parsed from a comma-delimited input, empty if absent
    pub tags: Vec<String>,
    /// Byte length as measured server-side (authoritative)
    pub original_size: i64,
    /// Client-claimed size, informational only
    pub reported_size: Option<i64>,
    /// Byte length after any local compression
    pub final_size: i64,
    /// Uploading user; sole access-control and partition key
    pub owner_email: String,
    /// Public URL returned by the object store
    pub remote_url: String,
    /// Opaque object key, needed to delete the remote object
    pub remote_key: String,
    /// When the record was created
    pub uploaded_at: DateTime<Utc>,
}

/// Fields of a record not yet assigned an ID or timestamp
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub original_size: i64,
    pub reported_size: Option<i64>,
    pub final_size: i64,
    pub owner_email: String,
    pub remote_url: String,
    pub remote_key: String,
}

/// Metadata persistence used by the upload and delete workflows
#[async_trait]
pub trait MetadataStorage: Send + Sync {
    /// Insert a file record, returning the generated ID
    async fn insert_file(&self, record: &NewFileRecord) -> Result<Uuid>;

    /// Get a record scoped by ID and owner. A record belonging to a
    /// different owner is not found.
    async fn get_file_for_owner(
        &self,
        file_id: Uuid,
        owner_email: &str,
    ) -> Result<Option<FileRecord>>;

    /// List all records for an owner, newest first
    async fn list_files_for_owner(&self, owner_email: &str) -> Result<Vec<FileRecord>>;

    /// Delete a single record by ID
    async fn delete_file(&self, file_id: Uuid) -> Result<()>;

    /// Bulk-delete records by ID, returning the number removed
    async fn delete_files_by_ids(&self, file_ids: &[Uuid]) -> Result<u64>;

    /// Check that the store can serve requests
    async fn ready(&self) -> Result<()>;
}

/// Metadata store for file records in PostgreSQL
pub struct MetadataStore {
    pool: PgPool,
}

impl MetadataStore {
    /// Create a new metadata store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl MetadataStorage for MetadataStore {
    #[instrument(skip(self, record), fields(owner = %record.owner_email, name = %record.name))]
    async fn insert_file(&self, record: &NewFileRecord) -> Result<Uuid> {
        let file_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO files (
                id, name, category, description, tags,
                original_size, reported_size, final_size,
                owner_email, remote_url, remote_key, uploaded_at
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8,
                $9, $10, $11, NOW()
            )
            "#,
        )
        .bind(file_id)
        .bind(&record.name)
        .bind(&record.category)
        .bind(&record.description)
        .bind(&record.tags)
        .bind(record.original_size)
        .bind(record.reported_size)
        .bind(record.final_size)
        .bind(&record.owner_email)
        .bind(&record.remote_url)
        .bind(&record.remote_key)
        .execute(&self.pool)
        .await
        .context("Failed to insert file record")?;

        debug!(file_id = %file_id, "File record inserted");
        metrics::counter!("upload.records.inserted").increment(1);

        Ok(file_id)
    }

    async fn get_file_for_owner(
        &self,
        file_id: Uuid,
        owner_email: &str,
    ) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT id, name, category, description, tags,
                   original_size, reported_size, final_size,
                   owner_email, remote_url, remote_key, uploaded_at
            FROM files
            WHERE id = $1 AND owner_email = $2
            "#,
        )
        .bind(file_id)
        .bind(owner_email)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query file record")?;

        Ok(record)
    }

    #[instrument(skip(self))]
    async fn list_files_for_owner(&self, owner_email: &str) -> Result<Vec<FileRecord>> {
        let records = sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT id, name, category, description, tags,
                   original_size, reported_size, final_size,
                   owner_email, remote_url, remote_key, uploaded_at
            FROM files
            WHERE owner_email = $1
            ORDER BY uploaded_at DESC
            "#,
        )
        .bind(owner_email)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list file records")?;

        Ok(records)
    }

    #[instrument(skip(self))]
    async fn delete_file(&self, file_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(file_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete file record")?;

        debug!(file_id = %file_id, "File record deleted");
        metrics::counter!("upload.records.deleted").increment(1);
        Ok(())
    }

    #[instrument(skip(self, file_ids), fields(count = file_ids.len()))]
    async fn delete_files_by_ids(&self, file_ids: &[Uuid]) -> Result<u64> {
        if file_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM files WHERE id = ANY($1)")
            .bind(file_ids)
            .execute(&self.pool)
            .await
            .context("Failed to bulk-delete file records")?;

        let deleted = result.rows_affected();

        info!(deleted = deleted, "File records bulk-deleted");
        metrics::counter!("upload.records.deleted").increment(deleted);

        Ok(deleted)
    }

    async fn ready(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database is not reachable")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_file_record_fields() {
        let record = NewFileRecord {
            name: "report.pdf".to_string(),
            category: "document".to_string(),
            description: None,
            tags: vec!["work".to_string(), "q3".to_string()],
            original_size: 1024,
            reported_size: Some(1000),
            final_size: 1024,
            owner_email: "a@x.com".to_string(),
            remote_url: "https://bucket.s3.us-east-1.amazonaws.com/k".to_string(),
            remote_key: "CloudFileStore/a@x.com/Documents/k.pdf".to_string(),
        };

        // Reported size is an annotation only; sizes are measured server-side
        assert_eq!(record.original_size, 1024);
        assert_eq!(record.reported_size, Some(1000));
        assert_eq!(record.final_size, record.original_size);
    }
}
