//! SQLite-backed [`DocumentStore`].
//!
//! Timestamps are stored as Unix seconds. Section batches are written with
//! multi-row `INSERT`s inside a single transaction.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::{new_id, DocumentStore};
use crate::models::{
    Document, DocumentSection, DocumentStatus, DocumentVersion, Flashcard, FlashcardDraft,
    NewDocumentSection, NewDocumentVersion,
};

/// Rows per multi-row INSERT; keeps bind counts well under SQLite's limit.
const INSERT_BATCH_ROWS: usize = 200;

pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let status: String = row.get("status");
    Ok(Document {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        status: DocumentStatus::parse(&status)?,
        current_version_id: row.get("current_version_id"),
        created_at: from_ts(row.get("created_at")),
        updated_at: from_ts(row.get("updated_at")),
    })
}

fn version_from_row(row: &SqliteRow) -> DocumentVersion {
    let page_count: i64 = row.get("page_count");
    let processed_at: Option<i64> = row.get("processed_at");
    DocumentVersion {
        id: row.get("id"),
        document_id: row.get("document_id"),
        storage_bucket: row.get("storage_bucket"),
        storage_path: row.get("storage_path"),
        page_count: page_count.max(0) as u32,
        raw_text: row.get("raw_text"),
        checksum: row.get("checksum"),
        created_at: from_ts(row.get("created_at")),
        processed_at: processed_at.map(from_ts),
    }
}

fn section_from_row(row: &SqliteRow) -> DocumentSection {
    DocumentSection {
        id: row.get("id"),
        version_id: row.get("version_id"),
        order_index: row.get("order_index"),
        heading: row.get("heading"),
        content: row.get("content"),
        content_hash: row.get("content_hash"),
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn create_document(&self, id: &str, user_id: &str, title: &str) -> Result<Document> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO documents (id, user_id, title, status, current_version_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(title)
        .bind(DocumentStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Document {
            id: id.to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            status: DocumentStatus::Pending,
            current_version_id: None,
            created_at: from_ts(now),
            updated_at: from_ts(now),
        })
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, user_id, title, status, current_version_id, created_at, updated_at FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(document_from_row).transpose()
    }

    async fn insert_version(&self, version: &NewDocumentVersion) -> Result<DocumentVersion> {
        let id = new_id();
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO document_versions (id, document_id, storage_bucket, storage_path,
                                           page_count, raw_text, checksum, created_at, processed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(&id)
        .bind(&version.document_id)
        .bind(&version.storage_bucket)
        .bind(&version.storage_path)
        .bind(version.page_count as i64)
        .bind(&version.raw_text)
        .bind(&version.checksum)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(DocumentVersion {
            id,
            document_id: version.document_id.clone(),
            storage_bucket: version.storage_bucket.clone(),
            storage_path: version.storage_path.clone(),
            page_count: version.page_count,
            raw_text: version.raw_text.clone(),
            checksum: version.checksum.clone(),
            created_at: from_ts(now),
            processed_at: None,
        })
    }

    async fn get_version(&self, id: &str) -> Result<Option<DocumentVersion>> {
        let row = sqlx::query(
            r#"
            SELECT id, document_id, storage_bucket, storage_path, page_count,
                   raw_text, checksum, created_at, processed_at
            FROM document_versions WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(version_from_row))
    }

    async fn insert_sections(
        &self,
        version_id: &str,
        sections: &[NewDocumentSection],
    ) -> Result<Vec<DocumentSection>> {
        let rows: Vec<DocumentSection> = sections
            .iter()
            .map(|s| DocumentSection {
                id: new_id(),
                version_id: version_id.to_string(),
                order_index: s.order_index,
                heading: s.heading.clone(),
                content: s.content.clone(),
                content_hash: s.content_hash.clone(),
            })
            .collect();

        let mut tx = self.pool.begin().await?;
        for batch in rows.chunks(INSERT_BATCH_ROWS) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO document_sections (id, version_id, order_index, heading, content, content_hash) ",
            );
            builder.push_values(batch, |mut b, s| {
                b.push_bind(&s.id)
                    .push_bind(&s.version_id)
                    .push_bind(s.order_index)
                    .push_bind(&s.heading)
                    .push_bind(&s.content)
                    .push_bind(&s.content_hash);
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        Ok(rows)
    }

    async fn list_sections(&self, version_id: &str) -> Result<Vec<DocumentSection>> {
        let rows = sqlx::query(
            r#"
            SELECT id, version_id, order_index, heading, content, content_hash
            FROM document_sections WHERE version_id = ?
            ORDER BY order_index ASC
            "#,
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(section_from_row).collect())
    }

    async fn mark_version_processed(&self, version_id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE document_versions SET processed_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp())
            .bind(version_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            bail!("version not found: {}", version_id);
        }
        Ok(())
    }

    async fn mark_document_ready(&self, document_id: &str, version_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE documents SET status = ?, current_version_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(DocumentStatus::Ready.as_str())
        .bind(version_id)
        .bind(Utc::now().timestamp())
        .bind(document_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("document not found: {}", document_id));
        }
        Ok(())
    }

    async fn insert_flashcards(
        &self,
        section_id: &str,
        cards: &[FlashcardDraft],
    ) -> Result<Vec<Flashcard>> {
        let rows: Vec<Flashcard> = cards
            .iter()
            .enumerate()
            .map(|(i, c)| Flashcard {
                id: new_id(),
                section_id: section_id.to_string(),
                order_index: i as i64,
                front: c.front.clone(),
                back: c.back.clone(),
            })
            .collect();
        if rows.is_empty() {
            return Ok(rows);
        }

        let mut tx = self.pool.begin().await?;
        for batch in rows.chunks(INSERT_BATCH_ROWS) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO flashcards (id, section_id, order_index, front, back) ",
            );
            builder.push_values(batch, |mut b, card| {
                b.push_bind(&card.id)
                    .push_bind(&card.section_id)
                    .push_bind(card.order_index)
                    .push_bind(&card.front)
                    .push_bind(&card.back);
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        Ok(rows)
    }

    async fn list_flashcards(&self, section_id: &str) -> Result<Vec<Flashcard>> {
        let rows = sqlx::query(
            "SELECT id, section_id, order_index, front, back FROM flashcards WHERE section_id = ? ORDER BY order_index ASC",
        )
        .bind(section_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Flashcard {
                id: row.get("id"),
                section_id: row.get("section_id"),
                order_index: row.get("order_index"),
                front: row.get("front"),
                back: row.get("back"),
            })
            .collect())
    }
}
