//! In-memory [`DocumentStore`] for tests and embedding.
//!
//! `HashMap`s behind `std::sync::RwLock`. Same contract as the SQLite store,
//! including "not found" errors from the finalize operations.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use super::{new_id, DocumentStore};
use crate::models::{
    Document, DocumentSection, DocumentStatus, DocumentVersion, Flashcard, FlashcardDraft,
    NewDocumentSection, NewDocumentVersion,
};

pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, Document>>,
    versions: RwLock<HashMap<String, DocumentVersion>>,
    sections: RwLock<Vec<DocumentSection>>,
    flashcards: RwLock<Vec<Flashcard>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            versions: RwLock::new(HashMap::new()),
            sections: RwLock::new(Vec::new()),
            flashcards: RwLock::new(Vec::new()),
        }
    }

    /// Number of versions stored for `document_id`.
    pub fn version_count(&self, document_id: &str) -> usize {
        self.versions
            .read()
            .unwrap()
            .values()
            .filter(|v| v.document_id == document_id)
            .count()
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create_document(&self, id: &str, user_id: &str, title: &str) -> Result<Document> {
        let mut docs = self.documents.write().unwrap();
        if docs.contains_key(id) {
            return Err(anyhow!("document already exists: {}", id));
        }
        let now = Utc::now();
        let doc = Document {
            id: id.to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            status: DocumentStatus::Pending,
            current_version_id: None,
            created_at: now,
            updated_at: now,
        };
        docs.insert(id.to_string(), doc.clone());
        Ok(doc)
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.documents.read().unwrap().get(id).cloned())
    }

    async fn insert_version(&self, version: &NewDocumentVersion) -> Result<DocumentVersion> {
        let row = DocumentVersion {
            id: new_id(),
            document_id: version.document_id.clone(),
            storage_bucket: version.storage_bucket.clone(),
            storage_path: version.storage_path.clone(),
            page_count: version.page_count,
            raw_text: version.raw_text.clone(),
            checksum: version.checksum.clone(),
            created_at: Utc::now(),
            processed_at: None,
        };
        self.versions
            .write()
            .unwrap()
            .insert(row.id.clone(), row.clone());
        Ok(row)
    }

    async fn get_version(&self, id: &str) -> Result<Option<DocumentVersion>> {
        Ok(self.versions.read().unwrap().get(id).cloned())
    }

    async fn insert_sections(
        &self,
        version_id: &str,
        sections: &[NewDocumentSection],
    ) -> Result<Vec<DocumentSection>> {
        if !self.versions.read().unwrap().contains_key(version_id) {
            return Err(anyhow!("version not found: {}", version_id));
        }
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
        self.sections.write().unwrap().extend(rows.iter().cloned());
        Ok(rows)
    }

    async fn list_sections(&self, version_id: &str) -> Result<Vec<DocumentSection>> {
        let mut rows: Vec<DocumentSection> = self
            .sections
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.version_id == version_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.order_index);
        Ok(rows)
    }

    async fn mark_version_processed(&self, version_id: &str) -> Result<()> {
        let mut versions = self.versions.write().unwrap();
        let version = versions
            .get_mut(version_id)
            .ok_or_else(|| anyhow!("version not found: {}", version_id))?;
        version.processed_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_document_ready(&self, document_id: &str, version_id: &str) -> Result<()> {
        let mut docs = self.documents.write().unwrap();
        let doc = docs
            .get_mut(document_id)
            .ok_or_else(|| anyhow!("document not found: {}", document_id))?;
        doc.status = DocumentStatus::Ready;
        doc.current_version_id = Some(version_id.to_string());
        doc.updated_at = Utc::now();
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
        self.flashcards.write().unwrap().extend(rows.iter().cloned());
        Ok(rows)
    }

    async fn list_flashcards(&self, section_id: &str) -> Result<Vec<Flashcard>> {
        let mut rows: Vec<Flashcard> = self
            .flashcards
            .read()
            .unwrap()
            .iter()
            .filter(|f| f.section_id == section_id)
            .cloned()
            .collect();
        rows.sort_by_key(|f| f.order_index);
        Ok(rows)
    }
}
