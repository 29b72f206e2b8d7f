//! Batch engine: many sheets, one template, bounded parallelism.
//!
//! Each sheet is decoded and evaluated on the blocking pool under a
//! per-sheet timeout. Sheet failures are recorded in the report; they never
//! abort the batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::error::{OmrError, PartialEvaluation, Stage};
use crate::evaluation::{evaluate, EvaluateOptions};
use crate::model::{Template, TestCatalog};
use crate::policy::StrictnessMode;
use crate::results::EvaluationResult;
use crate::sheet::{load_sheet, normalize_to_page, SheetImage};
use crate::statistics::{compute_batch_stats, BatchStats};
use crate::traits::VersionClassifier;

/// File extensions picked up when scanning a directory of sheets.
pub const SHEET_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Configuration for the batch engine.
#[derive(Debug, Clone)]
pub struct BatchEngineConfig {
    /// Maximum sheets evaluated concurrently.
    pub parallelism: usize,
    /// Wall-clock limit per sheet, decode included.
    pub sheet_timeout: Duration,
    pub mode: StrictnessMode,
    pub options: EvaluateOptions,
    /// Resize decoded sheets to the template page instead of failing on a
    /// size mismatch.
    pub resize: bool,
}

impl Default for BatchEngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            sheet_timeout: Duration::from_secs(10),
            mode: StrictnessMode::default(),
            options: EvaluateOptions::default(),
            resize: false,
        }
    }
}

/// Where a sheet's pixels come from.
#[derive(Debug, Clone)]
pub enum SheetSource {
    File(PathBuf),
    /// An already decoded grayscale image.
    Image(Arc<GrayImage>),
}

/// One sheet to evaluate.
#[derive(Debug, Clone)]
pub struct SheetInput {
    /// Identifier used in reports (the file stem for files).
    pub id: String,
    pub source: SheetSource,
}

impl SheetInput {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            id,
            source: SheetSource::File(path),
        }
    }

    pub fn image(id: impl Into<String>, image: GrayImage) -> Self {
        Self {
            id: id.into(),
            source: SheetSource::Image(Arc::new(image)),
        }
    }

    fn path(&self) -> Option<PathBuf> {
        match &self.source {
            SheetSource::File(p) => Some(p.clone()),
            SheetSource::Image(_) => None,
        }
    }
}

/// Collect every sheet image directly inside `dir`, sorted by file name.
pub fn collect_sheet_inputs(dir: &Path) -> Result<Vec<SheetInput>> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_sheet = path.is_file()
            && path.extension().is_some_and(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                SHEET_EXTENSIONS.contains(&ext.as_str())
            });
        if is_sheet {
            paths.push(path);
        } else {
            tracing::debug!("skipping non-sheet entry {}", path.display());
        }
    }
    paths.sort();
    Ok(paths.into_iter().map(SheetInput::file).collect())
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_sheet_start(&self, sheet_id: &str);
    fn on_sheet_complete(&self, sheet_id: &str, result: &EvaluationResult);
    fn on_sheet_error(&self, sheet_id: &str, error: &str);
    fn on_batch_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_sheet_start(&self, _: &str) {}
    fn on_sheet_complete(&self, _: &str, _: &EvaluationResult) {}
    fn on_sheet_error(&self, _: &str, _: &str) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// Outcome of one sheet in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetOutcome {
    pub sheet_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(flatten)]
    pub status: SheetStatus,
}

/// Whether a sheet produced a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SheetStatus {
    Evaluated {
        result: Box<EvaluationResult>,
    },
    Failed {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partial: Option<PartialEvaluation>,
    },
}

impl SheetOutcome {
    pub fn result(&self) -> Option<&EvaluationResult> {
        match &self.status {
            SheetStatus::Evaluated { result } => Some(&**result),
            SheetStatus::Failed { .. } => None,
        }
    }
}

/// A complete batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    pub mode: StrictnessMode,
    /// Per-sheet outcomes, sorted by sheet id.
    pub sheets: Vec<SheetOutcome>,
    /// Aggregate statistics.
    pub stats: BatchStats,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl BatchReport {
    /// Results of every successfully evaluated sheet.
    pub fn results(&self) -> impl Iterator<Item = &EvaluationResult> {
        self.sheets.iter().filter_map(SheetOutcome::result)
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: BatchReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }
}

/// Why a single sheet did not produce a result.
#[derive(Debug)]
struct SheetFailure {
    reason: String,
    partial: Option<PartialEvaluation>,
}

impl From<OmrError> for SheetFailure {
    fn from(err: OmrError) -> Self {
        let partial = match &err {
            OmrError::EvaluationFailed { partial, .. } => Some(partial.clone()),
            _ => None,
        };
        Self {
            reason: err.to_string(),
            partial,
        }
    }
}

impl From<anyhow::Error> for SheetFailure {
    fn from(err: anyhow::Error) -> Self {
        Self {
            reason: format!("{err:#}"),
            partial: None,
        }
    }
}

/// The batch engine.
pub struct BatchEngine {
    classifier: Arc<dyn VersionClassifier>,
    config: BatchEngineConfig,
}

impl BatchEngine {
    pub fn new(classifier: Arc<dyn VersionClassifier>, config: BatchEngineConfig) -> Self {
        Self { classifier, config }
    }

    /// Evaluate every sheet against the shared template and catalog.
    pub async fn run(
        &self,
        sheets: Vec<SheetInput>,
        template: Arc<Template>,
        catalog: Arc<TestCatalog>,
        progress: &dyn ProgressReporter,
    ) -> Result<BatchReport> {
        anyhow::ensure!(self.config.parallelism > 0, "parallelism must be at least 1");
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism));

        let mut futures = FuturesUnordered::new();

        for input in sheets {
            let semaphore = Arc::clone(&semaphore);
            let template = Arc::clone(&template);
            let catalog = Arc::clone(&catalog);
            let classifier = Arc::clone(&self.classifier);
            let config = self.config.clone();

            futures.push(async move {
                let sheet_id = input.id.clone();
                let path = input.path();
                let inner = async {
                    let Ok(permit) = semaphore.acquire_owned().await else {
                        return Err(SheetFailure {
                            reason: "semaphore closed".into(),
                            partial: None,
                        });
                    };
                    progress.on_sheet_start(&sheet_id);

                    let started = Instant::now();
                    let timeout = config.sheet_timeout;
                    // The permit is released when the worker finishes, not when
                    // the timeout gives up waiting on it.
                    let task = tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        evaluate_input(&input, &template, &catalog, classifier.as_ref(), &config)
                    });

                    match tokio::time::timeout(timeout, task).await {
                        Ok(Ok(outcome)) => outcome,
                        Ok(Err(join_err)) => Err(SheetFailure {
                            reason: format!("sheet worker failed: {join_err}"),
                            partial: None,
                        }),
                        Err(_) => Err(OmrError::failed(
                            format!("timed out after {}ms", timeout.as_millis()),
                            PartialEvaluation {
                                stage: Stage::Timeout,
                                bubbles_mapped: 0,
                                elapsed_ms: started.elapsed().as_millis() as u64,
                            },
                        )
                        .into()),
                    }
                };
                let outcome = inner.await;
                (sheet_id, path, outcome)
            });
        }

        let mut outcomes = Vec::new();
        let mut completed = 0usize;
        let mut failed = 0usize;
        let total = futures.len();

        while let Some((sheet_id, path, outcome)) = futures.next().await {
            let status = match outcome {
                Ok(result) => {
                    progress.on_sheet_complete(&sheet_id, &result);
                    completed += 1;
                    SheetStatus::Evaluated {
                        result: Box::new(result),
                    }
                }
                Err(failure) => {
                    tracing::error!("sheet {sheet_id} failed: {}", failure.reason);
                    progress.on_sheet_error(&sheet_id, &failure.reason);
                    failed += 1;
                    SheetStatus::Failed {
                        reason: failure.reason,
                        partial: failure.partial,
                    }
                }
            };
            outcomes.push(SheetOutcome {
                sheet_id,
                path,
                status,
            });
        }
        outcomes.sort_by(|a, b| a.sheet_id.cmp(&b.sheet_id));

        let elapsed = start.elapsed();
        progress.on_batch_complete(total, completed, failed, elapsed);

        let results: Vec<&EvaluationResult> =
            outcomes.iter().filter_map(SheetOutcome::result).collect();
        let stats = compute_batch_stats(&results, failed, &catalog);

        Ok(BatchReport {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            mode: self.config.mode,
            sheets: outcomes,
            stats,
            duration_ms: elapsed.as_millis() as u64,
        })
    }
}

/// Decode, classify, and evaluate one sheet. Runs on the blocking pool.
fn evaluate_input(
    input: &SheetInput,
    template: &Template,
    catalog: &TestCatalog,
    classifier: &dyn VersionClassifier,
    config: &BatchEngineConfig,
) -> Result<EvaluationResult, SheetFailure> {
    let decoded;
    let mut gray: &GrayImage = match &input.source {
        SheetSource::File(path) => {
            decoded = load_sheet(path)?;
            &decoded
        }
        SheetSource::Image(img) => img.as_ref(),
    };

    let resized;
    let page = template.page_dimensions;
    if config.resize && (gray.width(), gray.height()) != (page.width, page.height) {
        resized = normalize_to_page(gray, page);
        gray = &resized;
    }

    let view = SheetImage::from_gray(gray);
    let version = classifier.classify(&view);
    let test = catalog.resolve(version.as_deref()).ok_or_else(|| SheetFailure {
        reason: match &version {
            Some(v) => format!("no test definition for version '{v}'"),
            None => format!(
                "sheet version unknown and catalog has versions {:?}",
                catalog.versions()
            ),
        },
        partial: None,
    })?;

    Ok(evaluate(&view, template, test, config.mode, &config.options)?)
}
