//! CLI entry points for `deck ingest` and `deck segment`.
//!
//! `ingest` accepts exactly one job source:
//!
//! | Flag | Source |
//! |------|--------|
//! | `<file>` | a local file, read through a filesystem blob store rooted at its directory |
//! | `--text` | inline text |
//! | `--bucket` + `--path` | an object in the configured blob store |
//! | `--job <json>` | a worker-queue payload ([`JobPayload`]) |
//!
//! The document row is created when missing. On failure the error is
//! classified, logged with its context, and the localized user message is
//! printed before exiting non-zero.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::error::{structure, ErrorContext};
use crate::extract::{extract_pdf_pages, is_pdf};
use crate::ingest::Ingestor;
use crate::migrate;
use crate::models::{IngestionJob, JobPayload, JobSource};
use crate::progress::ProgressMode;
use crate::segment::{build_sections, Segmenter};
use crate::storage::FsBlobStore;
use crate::store::{DocumentStore, SqliteDocumentStore};

/// Bucket name used when a local file is ingested through its directory.
const LOCAL_BUCKET: &str = ".";

/// Job-shaping options from the command line.
#[derive(Debug, Default)]
pub struct IngestArgs {
    pub file: Option<PathBuf>,
    pub text: Option<String>,
    pub bucket: Option<String>,
    pub path: Option<String>,
    pub job: Option<PathBuf>,
    pub document_id: Option<String>,
    pub user_id: String,
    pub title: Option<String>,
    pub email: Option<String>,
}

/// Turn CLI flags into a job. Returns the job and, for local files, the
/// directory the blob store must be rooted at.
pub fn build_job(args: &IngestArgs) -> Result<(IngestionJob, Option<PathBuf>)> {
    let sources = [
        args.file.is_some(),
        args.text.is_some(),
        args.bucket.is_some() || args.path.is_some(),
        args.job.is_some(),
    ]
    .iter()
    .filter(|s| **s)
    .count();
    if sources != 1 {
        bail!("Provide exactly one of <file>, --text, --bucket/--path, or --job");
    }

    if let Some(ref job_path) = args.job {
        let raw = std::fs::read_to_string(job_path)
            .with_context(|| format!("Failed to read job file: {}", job_path.display()))?;
        let payload: JobPayload =
            serde_json::from_str(&raw).with_context(|| "Failed to parse job payload")?;
        return Ok((IngestionJob::try_from(payload)?, None));
    }

    let document_id = args
        .document_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let (source, filename, root) = if let Some(ref file) = args.file {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Not a file path: {}", file.display()))?
            .to_string();
        let root = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let source = JobSource::Object {
            bucket: LOCAL_BUCKET.to_string(),
            path: name.clone(),
        };
        (source, name, Some(root))
    } else if let Some(ref text) = args.text {
        let name = format!("{}.txt", args.title.as_deref().unwrap_or("note"));
        (JobSource::Inline { text: text.clone() }, name, None)
    } else {
        let (bucket, path) = match (&args.bucket, &args.path) {
            (Some(b), Some(p)) => (b.clone(), p.clone()),
            _ => bail!("--bucket and --path must be given together"),
        };
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        (JobSource::Object { bucket, path }, name, None)
    };

    let title = args.title.clone().unwrap_or_else(|| {
        Path::new(&filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Untitled")
            .to_string()
    });

    Ok((
        IngestionJob {
            document_id,
            user_id: args.user_id.clone(),
            contact_email: args.email.clone(),
            title,
            filename,
            source,
            page_count: None,
            checksum: None,
        },
        root,
    ))
}

pub async fn run_ingest(config: &Config, args: &IngestArgs, progress: ProgressMode) -> Result<()> {
    let (job, local_root) = build_job(args)?;

    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;
    let store = Arc::new(SqliteDocumentStore::new(pool));

    if store.get_document(&job.document_id).await?.is_none() {
        store
            .create_document(&job.document_id, &job.user_id, &job.title)
            .await?;
    }

    let mut ingestor = Ingestor::from_config(config, store.clone())?;
    if let Some(root) = local_root {
        ingestor = ingestor.with_blob_store(Arc::new(FsBlobStore::new(root)));
    }

    let reporter = progress.reporter();
    let result = ingestor.run(&job, Some(reporter.as_ref())).await;
    store.pool().close().await;

    match result {
        Ok(outcome) => {
            println!("ingested document {}", outcome.document_id);
            println!("  version:    {}", outcome.version_id);
            println!("  sections:   {}", outcome.sections_count);
            println!("  flashcards: {}", outcome.flashcards_count);
            Ok(())
        }
        Err(e) => {
            let err = structure(
                e,
                ErrorContext::for_document(&job.user_id, &job.document_id),
                config.locale,
            );
            tracing::error!(
                document_id = %job.document_id,
                kind = %err.kind,
                retryable = err.retryable,
                error = %err.message,
                "ingestion failed"
            );
            eprintln!("{}", err.user_message);
            Err(err.into())
        }
    }
}

/// Dry run: segment a local file and print the sections without persisting.
pub fn run_segment(config: &Config, file: &Path, title: Option<&str>, json: bool) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let text = if is_pdf(filename, &bytes) {
        extract_pdf_pages(&bytes)?.join("\n\n")
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };

    let fallback = title.unwrap_or_else(|| {
        file.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Untitled")
    });
    let drafts = Segmenter::new(&config.segmentation).segment(&text, fallback);
    let sections = build_sections(&drafts, config.segmentation.heading_column_chars);

    if json {
        let out: Vec<serde_json::Value> = sections
            .iter()
            .map(|s| {
                serde_json::json!({
                    "order_index": s.order_index,
                    "heading": s.heading,
                    "chars": s.content.chars().count(),
                    "content_hash": s.content_hash,
                    "content": s.content,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{} sections", sections.len());
    for s in &sections {
        let preview: String = s
            .content
            .chars()
            .take(72)
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect();
        println!(
            "[{}] {} ({} chars)",
            s.order_index,
            s.heading,
            s.content.chars().count()
        );
        println!("    {}", preview);
    }
    Ok(())
}
