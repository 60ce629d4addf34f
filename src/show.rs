//! `deck show <id>`: a document, its current version, and its sections.

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::config::Config;
use crate::db;
use crate::models::{Document, DocumentSection, DocumentVersion};
use crate::store::{DocumentStore, SqliteDocumentStore};

#[derive(Debug, Serialize)]
pub struct SectionView {
    #[serde(flatten)]
    pub section: DocumentSection,
    pub flashcards: usize,
}

/// Everything `show` prints, also available as JSON.
#[derive(Debug, Serialize)]
pub struct DocumentView {
    pub document: Document,
    pub version: Option<DocumentVersion>,
    pub sections: Vec<SectionView>,
}

pub async fn load_view(store: &dyn DocumentStore, id: &str) -> Result<DocumentView> {
    let document = store
        .get_document(id)
        .await?
        .ok_or_else(|| anyhow!("document not found: {}", id))?;

    let version = match document.current_version_id {
        Some(ref vid) => store.get_version(vid).await?,
        None => None,
    };

    let mut sections = Vec::new();
    if let Some(ref v) = version {
        for section in store.list_sections(&v.id).await? {
            let flashcards = store.list_flashcards(&section.id).await?.len();
            sections.push(SectionView {
                section,
                flashcards,
            });
        }
    }

    Ok(DocumentView {
        document,
        version,
        sections,
    })
}

pub async fn run_show(config: &Config, id: &str, json: bool) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let store = SqliteDocumentStore::new(pool);
    let view = load_view(&store, id).await;
    store.pool().close().await;
    let view = view?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let doc = &view.document;
    println!("--- document ---");
    println!("id:       {}", doc.id);
    println!("title:    {}", doc.title);
    println!("user:     {}", doc.user_id);
    println!("status:   {}", doc.status.as_str());
    println!("updated:  {}", doc.updated_at.format("%Y-%m-%dT%H:%M:%SZ"));

    match view.version {
        Some(ref v) => {
            println!("--- version ---");
            println!("id:        {}", v.id);
            println!("pages:     {}", v.page_count);
            println!("checksum:  {}", v.checksum);
            if let (Some(b), Some(p)) = (&v.storage_bucket, &v.storage_path) {
                println!("object:    {}/{}", b, p);
            }
            println!(
                "processed: {}",
                v.processed_at
                    .map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
        }
        None => println!("(no processed version)"),
    }

    if !view.sections.is_empty() {
        println!("--- sections ({}) ---", view.sections.len());
        for s in &view.sections {
            println!(
                "[{}] {} ({} chars, {} flashcards)",
                s.section.order_index,
                s.section.heading,
                s.section.content.chars().count(),
                s.flashcards
            );
        }
    }

    Ok(())
}
