//! Ingestion progress reporting.
//!
//! The pipeline reports a fraction in `[0, 1]` after each stage so callers
//! can drive a progress bar or a job-status column. The CLI emits progress
//! on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use serde::Serialize;

/// Pipeline stage just completed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Acquired,
    Segmented,
    VersionStored,
    SectionsStored,
    Generated,
    Finalized,
    Notified,
}

impl IngestStage {
    /// Completed fraction after this stage. Non-decreasing in pipeline order.
    pub fn fraction(&self) -> f32 {
        match self {
            IngestStage::Acquired => 0.1,
            IngestStage::Segmented => 0.2,
            IngestStage::VersionStored => 0.2,
            IngestStage::SectionsStored => 0.4,
            IngestStage::Generated => 0.7,
            IngestStage::Finalized => 0.95,
            IngestStage::Notified => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStage::Acquired => "acquired",
            IngestStage::Segmented => "segmented",
            IngestStage::VersionStored => "version_stored",
            IngestStage::SectionsStored => "sections_stored",
            IngestStage::Generated => "generated",
            IngestStage::Finalized => "finalized",
            IngestStage::Notified => "notified",
        }
    }
}

/// A single progress event.
#[derive(Clone, Debug, Serialize)]
pub struct IngestProgress {
    pub document_id: String,
    pub stage: IngestStage,
    pub fraction: f32,
}

impl IngestProgress {
    pub fn new(document_id: &str, stage: IngestStage) -> Self {
        Self {
            document_id: document_id.to_string(),
            stage,
            fraction: stage.fraction(),
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgress);
}

/// Human-friendly progress on stderr: "ingest 3f2a…  sections_stored   40%".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgress) {
        let line = format!(
            "ingest {}  {:<16} {:>3}%\n",
            event.document_id,
            event.stage.as_str(),
            (event.fraction * 100.0).round() as u32
        );
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgress) {
        let obj = serde_json::json!({
            "event": "progress",
            "document_id": event.document_id,
            "stage": event.stage,
            "fraction": event.fraction,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgress) {}
}

/// Adapts a closure, e.g. one that writes to a job-status table.
pub struct FnProgress<F>(pub F);

impl<F> ProgressReporter for FnProgress<F>
where
    F: Fn(IngestProgress) + Send + Sync,
{
    fn report(&self, event: IngestProgress) {
        (self.0)(event)
    }
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const ORDER: [IngestStage; 7] = [
        IngestStage::Acquired,
        IngestStage::Segmented,
        IngestStage::VersionStored,
        IngestStage::SectionsStored,
        IngestStage::Generated,
        IngestStage::Finalized,
        IngestStage::Notified,
    ];

    #[test]
    fn fractions_never_decrease_and_end_at_one() {
        let fractions: Vec<f32> = ORDER.iter().map(IngestStage::fraction).collect();
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(fractions.last().copied(), Some(1.0));
        assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));
    }

    #[test]
    fn closure_reporter_receives_events() {
        let seen = Mutex::new(Vec::new());
        let reporter = FnProgress(|e: IngestProgress| seen.lock().unwrap().push(e.fraction));
        reporter.report(IngestProgress::new("d", IngestStage::SectionsStored));
        assert_eq!(*seen.lock().unwrap(), vec![0.4]);
    }
}
