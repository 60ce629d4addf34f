//! Ingestion pipeline orchestration.
//!
//! Runs one job end to end: text acquisition → segmentation → version row →
//! section batch → (optional) flashcard generation → finalize → notify.
//!
//! Failure rules:
//!
//! - Acquisition, segmentation, version/section persistence and the
//!   finalize step are fatal. The document status is left untouched, so a
//!   document never points at a version without sections.
//! - Generation failures are per section: logged as structured errors and
//!   skipped.
//! - Finalize marks the version processed before pointing the document at
//!   it. If the second write fails, the version stays processed but
//!   unreferenced, and the document keeps its previous state.
//! - Notification is best-effort: failures are logged and swallowed, and a
//!   job without a contact address is not notified at all.
//!
//! Progress is reported after every stage (see [`IngestStage::fraction`]).

use anyhow::{bail, Context, Result};
use std::sync::Arc;

use crate::completion::{create_client, CompletionClient};
use crate::config::{Config, NotifyConfig, SegmentConfig};
use crate::error::{structure, ErrorContext, Locale};
use crate::extract::acquire_text;
use crate::generate::{CompletionSectionGenerator, SectionGenerator};
use crate::models::{DocumentSection, IngestOutcome, IngestionJob, NewDocumentVersion};
use crate::notify::{create_notifier, DeckReadyNotice, Notifier};
use crate::progress::{IngestProgress, IngestStage, ProgressReporter};
use crate::segment::{build_sections, Segmenter};
use crate::storage::{create_blob_store, BlobStore};
use crate::store::DocumentStore;

/// Pipeline with its collaborators. Cheap to share behind an `Arc`; one
/// call to [`Ingestor::run`] processes one job sequentially.
pub struct Ingestor {
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    notifier: Arc<dyn Notifier>,
    generator: Option<Arc<dyn SectionGenerator>>,
    segmenter: Segmenter,
    heading_chars: usize,
    notify: NotifyConfig,
    locale: Locale,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
        segmentation: &SegmentConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            notifier,
            generator: None,
            segmenter: Segmenter::new(segmentation),
            heading_chars: segmentation.heading_column_chars,
            notify: NotifyConfig::default(),
            locale: Locale::default(),
        }
    }

    /// Enable the per-section generation phase.
    pub fn with_generator(mut self, generator: Arc<dyn SectionGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = blobs;
        self
    }

    pub fn with_notify_config(mut self, notify: NotifyConfig) -> Self {
        self.notify = notify;
        self
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    /// Wire every collaborator from configuration.
    pub fn from_config(config: &Config, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let blobs: Arc<dyn BlobStore> = Arc::from(create_blob_store(&config.storage)?);
        let notifier: Arc<dyn Notifier> = Arc::from(create_notifier(&config.notify)?);

        let mut ingestor = Self::new(store, blobs, notifier, &config.segmentation)
            .with_notify_config(config.notify.clone())
            .with_locale(config.locale);

        if config.generation.enabled {
            let client: Arc<dyn CompletionClient> = Arc::new(create_client(
                &config.completion,
                &config.retry,
                config.locale,
            )?);
            ingestor = ingestor.with_generator(Arc::new(CompletionSectionGenerator::new(
                client,
                &config.completion,
                &config.generation,
            )));
        }
        Ok(ingestor)
    }

    pub async fn run(
        &self,
        job: &IngestionJob,
        progress: Option<&dyn ProgressReporter>,
    ) -> Result<IngestOutcome> {
        let report = |stage: IngestStage| {
            if let Some(p) = progress {
                p.report(IngestProgress::new(&job.document_id, stage));
            }
        };
        let context = ErrorContext::for_document(&job.user_id, &job.document_id);

        tracing::info!(
            document_id = %job.document_id,
            user_id = %job.user_id,
            filename = %job.filename,
            "ingestion started"
        );

        let acquired = acquire_text(job, self.blobs.as_ref())
            .await
            .with_context(|| format!("Failed to acquire text for {}", job.filename))?;
        report(IngestStage::Acquired);

        let drafts = self.segmenter.segment(&acquired.text, &job.title);
        if drafts.iter().all(|d| d.is_empty()) {
            bail!("Segmentation produced no sections for {}", job.filename);
        }
        let sections = build_sections(&drafts, self.heading_chars);
        report(IngestStage::Segmented);

        let (storage_bucket, storage_path) = job.storage_locator();
        let version = self
            .store
            .insert_version(&NewDocumentVersion {
                document_id: job.document_id.clone(),
                storage_bucket: storage_bucket.map(str::to_string),
                storage_path: storage_path.map(str::to_string),
                page_count: acquired.page_count,
                raw_text: acquired.text,
                checksum: acquired.checksum,
            })
            .await
            .context("Failed to insert document version")?;
        report(IngestStage::VersionStored);

        let stored = self
            .store
            .insert_sections(&version.id, &sections)
            .await
            .context("Failed to insert document sections")?;
        report(IngestStage::SectionsStored);

        let flashcards_count = match self.generator {
            Some(ref generator) => {
                self.generate_all(generator.as_ref(), &stored, &context)
                    .await
            }
            None => 0,
        };
        report(IngestStage::Generated);

        self.store
            .mark_version_processed(&version.id)
            .await
            .context("Failed to mark version processed")?;
        self.store
            .mark_document_ready(&job.document_id, &version.id)
            .await
            .context("Failed to mark document ready")?;
        report(IngestStage::Finalized);

        tracing::info!(
            document_id = %job.document_id,
            version_id = %version.id,
            sections = stored.len(),
            flashcards = flashcards_count,
            "ingestion finished"
        );

        self.notify_owner(job, stored.len(), flashcards_count, &context)
            .await;
        report(IngestStage::Notified);

        Ok(IngestOutcome {
            document_id: job.document_id.clone(),
            version_id: version.id,
            sections_count: stored.len(),
            flashcards_count,
        })
    }

    async fn generate_all(
        &self,
        generator: &dyn SectionGenerator,
        sections: &[DocumentSection],
        context: &ErrorContext,
    ) -> usize {
        let mut total = 0;
        for section in sections {
            let result = match generator.generate(section).await {
                Ok(cards) => self.store.insert_flashcards(&section.id, &cards).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(rows) => total += rows.len(),
                Err(e) => {
                    let err = structure(
                        e,
                        context
                            .clone()
                            .with("section_id", section.id.clone())
                            .with("phase", "generation"),
                        self.locale,
                    );
                    tracing::warn!(
                        document_id = context.document_id.as_deref().unwrap_or("-"),
                        section_id = %section.id,
                        kind = %err.kind,
                        error = %err.message,
                        "flashcard generation failed for section, skipping"
                    );
                }
            }
        }
        total
    }

    async fn notify_owner(
        &self,
        job: &IngestionJob,
        sections: usize,
        flashcards: usize,
        context: &ErrorContext,
    ) {
        let to = match job.contact_email.as_deref().map(str::trim) {
            Some(to) if !to.is_empty() => to,
            _ => {
                tracing::debug!(document_id = %job.document_id, "no contact address, not notifying");
                return;
            }
        };

        let notice = DeckReadyNotice::new(
            &self.notify,
            to,
            &job.document_id,
            &job.title,
            sections,
            flashcards,
        );
        if let Err(e) = self.notifier.notify_ready(&notice).await {
            let err = structure(e, context.clone().with("phase", "notify"), self.locale);
            tracing::warn!(
                document_id = %job.document_id,
                kind = %err.kind,
                error = %err.message,
                "ready notification failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentStatus, FlashcardDraft, JobSource};
    use crate::store::InMemoryDocumentStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct NoBlobs;

    #[async_trait]
    impl BlobStore for NoBlobs {
        async fn fetch(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
            bail!("no object {}/{}", bucket, path)
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        sent: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify_ready(&self, _notice: &DeckReadyNotice) -> Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("mail relay unreachable");
            }
            Ok(())
        }
    }

    /// Fails on the section whose heading matches `fail_on`.
    struct FakeGenerator {
        fail_on: String,
    }

    #[async_trait]
    impl SectionGenerator for FakeGenerator {
        async fn generate(&self, section: &DocumentSection) -> Result<Vec<FlashcardDraft>> {
            if section.heading.starts_with(&self.fail_on) {
                bail!("completion service returned 503");
            }
            Ok(vec![FlashcardDraft {
                front: format!("About {}?", section.heading),
                back: "Yes".to_string(),
            }])
        }
    }

    fn study_text() -> String {
        let para = "Mitochondria convert nutrients into usable energy for the cell. ".repeat(4);
        format!(
            "CHAPTER 1\n{}\n\nCHAPTER 2\n{}\n\nCHAPTER 3\n{}",
            para.trim(),
            para.trim(),
            para.trim()
        )
    }

    fn inline_job(contact: Option<&str>) -> IngestionJob {
        IngestionJob {
            document_id: "doc-1".to_string(),
            user_id: "user-1".to_string(),
            contact_email: contact.map(str::to_string),
            title: "Biology".to_string(),
            filename: "biology.txt".to_string(),
            source: JobSource::Inline { text: study_text() },
            page_count: None,
            checksum: None,
        }
    }

    async fn setup(
        notifier: Arc<CountingNotifier>,
    ) -> (Arc<InMemoryDocumentStore>, Ingestor) {
        let store = Arc::new(InMemoryDocumentStore::new());
        store
            .create_document("doc-1", "user-1", "Biology")
            .await
            .unwrap();
        let ingestor = Ingestor::new(
            store.clone(),
            Arc::new(NoBlobs),
            notifier,
            &SegmentConfig::with_bounds(50, 1000),
        );
        (store, ingestor)
    }

    #[tokio::test]
    async fn successful_run_flips_document_to_ready() {
        let notifier = Arc::new(CountingNotifier::default());
        let (store, ingestor) = setup(notifier.clone()).await;

        let outcome = ingestor
            .run(&inline_job(Some("ana@example.com")), None)
            .await
            .unwrap();
        assert_eq!(outcome.sections_count, 3);
        assert_eq!(outcome.flashcards_count, 0);

        let doc = store.get_document("doc-1").await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Ready);
        assert_eq!(doc.current_version_id.as_deref(), Some(outcome.version_id.as_str()));

        let version = store.get_version(&outcome.version_id).await.unwrap().unwrap();
        assert!(version.processed_at.is_some());
        assert_eq!(version.page_count, 0);
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_completes() {
        let (_, ingestor) = setup(Arc::new(CountingNotifier::default())).await;
        let seen = Mutex::new(Vec::new());
        let reporter =
            crate::progress::FnProgress(|e: IngestProgress| seen.lock().unwrap().push(e.fraction));

        ingestor
            .run(&inline_job(None), Some(&reporter as &dyn ProgressReporter))
            .await
            .unwrap();

        let fractions = seen.into_inner().unwrap();
        assert_eq!(fractions.len(), 7);
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(fractions.last().copied(), Some(1.0));
    }

    #[tokio::test]
    async fn notification_failure_is_swallowed() {
        let notifier = Arc::new(CountingNotifier {
            sent: AtomicUsize::new(0),
            fail: true,
        });
        let (store, ingestor) = setup(notifier.clone()).await;

        assert!(ingestor
            .run(&inline_job(Some("ana@example.com")), None)
            .await
            .is_ok());
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
        let doc = store.get_document("doc-1").await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Ready);
    }

    #[tokio::test]
    async fn missing_contact_skips_notification() {
        let notifier = Arc::new(CountingNotifier::default());
        let (_, ingestor) = setup(notifier.clone()).await;
        ingestor.run(&inline_job(Some("  ")), None).await.unwrap();
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn acquisition_failure_leaves_status_untouched() {
        let (store, ingestor) = setup(Arc::new(CountingNotifier::default())).await;
        let mut job = inline_job(None);
        job.source = JobSource::Object {
            bucket: "uploads".to_string(),
            path: "gone.pdf".to_string(),
        };

        assert!(ingestor.run(&job, None).await.is_err());
        let doc = store.get_document("doc-1").await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert_eq!(store.version_count("doc-1"), 0);
    }

    #[tokio::test]
    async fn title_page_only_document_is_ingested() {
        let (store, ingestor) = setup(Arc::new(CountingNotifier::default())).await;
        let mut job = inline_job(None);
        job.source = JobSource::Inline {
            text: "INTRODUCTION TO CELL BIOLOGY".to_string(),
        };

        let outcome = ingestor.run(&job, None).await.unwrap();
        assert_eq!(outcome.sections_count, 1);
        let sections = store.list_sections(&outcome.version_id).await.unwrap();
        assert_eq!(sections[0].heading, "INTRODUCTION TO CELL BIOLOGY");
        assert_eq!(sections[0].content, "INTRODUCTION TO CELL BIOLOGY");
        let doc = store.get_document("doc-1").await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Ready);
    }

    #[tokio::test]
    async fn finalize_failure_is_fatal() {
        let (store, ingestor) = setup(Arc::new(CountingNotifier::default())).await;
        let mut job = inline_job(None);
        job.document_id = "unknown-doc".to_string();

        assert!(ingestor.run(&job, None).await.is_err());
        // The version and its sections exist, but nothing points at them.
        assert_eq!(store.version_count("unknown-doc"), 1);
    }

    #[tokio::test]
    async fn generation_failures_are_per_section() {
        let (store, ingestor) = setup(Arc::new(CountingNotifier::default())).await;
        let ingestor = ingestor.with_generator(Arc::new(FakeGenerator {
            fail_on: "CHAPTER 2".to_string(),
        }));

        let outcome = ingestor.run(&inline_job(None), None).await.unwrap();
        assert_eq!(outcome.sections_count, 3);
        assert_eq!(outcome.flashcards_count, 2);

        let sections = store.list_sections(&outcome.version_id).await.unwrap();
        let cards = store.list_flashcards(&sections[0].id).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].front, "About CHAPTER 1?");
        assert!(store.list_flashcards(&sections[1].id).await.unwrap().is_empty());
    }
}
