//! The upload -> cleaning -> training workflow.
//!
//! [`Wizard`] owns every piece of state the three steps produce. Each step
//! operation takes the wizard by `&mut` for the duration of its request, so a
//! second submission cannot start while one is in flight. Step results are
//! merged in by the `complete_*` methods, which do no I/O.

use log::{debug, info, warn};
use serde_json::Value as JSValue;
use std::sync::Arc;
use std::thread::{self, ScopedJoinHandle};
use std::time::Duration;

use crate::model::*;
use crate::normalize;
use crate::progress::{run_with_progress, ProgressSink};

pub const DEFAULT_PROGRESS_PERIOD: Duration = Duration::from_millis(500);

/// The backend calls the wizard needs. Answers are returned undecoded and
/// normalized by the wizard.
pub trait AnalysisBackend: Sync {
    fn upload_dataset(&self, request: &UploadRequest) -> DashboardResult<JSValue>;
    fn clean_dataset(&self, dataset_id: &str) -> DashboardResult<JSValue>;
    fn train_model(&self, cleaned_id: &str) -> DashboardResult<JSValue>;
    fn fetch_distribution(&self, cleaned_id: &str) -> DashboardResult<JSValue>;
    fn fetch_trend(&self, cleaned_id: &str) -> DashboardResult<JSValue>;
    fn fetch_predictions(&self, cleaned_id: &str) -> DashboardResult<JSValue>;
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord)]
pub enum Step {
    Upload = 1,
    Cleaning = 2,
    Training = 3,
}

impl Step {
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn title(self) -> &'static str {
        match self {
            Step::Upload => "Carga de Dataset",
            Step::Cleaning => "Limpieza de Datos",
            Step::Training => "Entrenamiento del Modelo",
        }
    }
}

/// Everything the read-only results view shows.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct ResultsView {
    pub summary: CleaningSummary,
    pub distribution: Vec<DataPoint>,
    pub trend: Vec<DataPoint>,
    pub predictions: Vec<PartyPrediction>,
}

// Results can only be visible from the last step.
#[derive(PartialEq, Debug, Clone)]
enum Stage {
    Upload,
    Cleaning,
    Training,
    Results(ResultsView),
}

/// The message slot shown above the wizard.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Notice {
    Error(String),
    Warning(String),
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Error(m) | Notice::Warning(m) => m.as_str(),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Wizard {
    stage: Stage,
    uploaded: Option<UploadedFile>,
    selected_operations: Vec<String>,
    cleaning: Option<CleaningResult>,
    summary: CleaningSummary,
    training: Option<TrainingMetrics>,
    notice: Option<Notice>,
    progress_period: Duration,
}

impl Default for Wizard {
    fn default() -> Wizard {
        Wizard::new(DEFAULT_PROGRESS_PERIOD)
    }
}

impl Wizard {
    /// `progress_period` is how often the synthetic training progress advances.
    pub fn new(progress_period: Duration) -> Wizard {
        Wizard {
            stage: Stage::Upload,
            uploaded: None,
            selected_operations: Vec::new(),
            cleaning: None,
            summary: CleaningSummary::default(),
            training: None,
            notice: None,
            progress_period,
        }
    }

    // ******** Accessors *********

    pub fn current_step(&self) -> Step {
        match self.stage {
            Stage::Upload => Step::Upload,
            Stage::Cleaning => Step::Cleaning,
            Stage::Training | Stage::Results(_) => Step::Training,
        }
    }

    pub fn results_visible(&self) -> bool {
        matches!(self.stage, Stage::Results(_))
    }

    pub fn results(&self) -> Option<&ResultsView> {
        match &self.stage {
            Stage::Results(view) => Some(view),
            _ => None,
        }
    }

    pub fn uploaded_file(&self) -> Option<&UploadedFile> {
        self.uploaded.as_ref()
    }

    pub fn cleaning_result(&self) -> Option<&CleaningResult> {
        self.cleaning.as_ref()
    }

    pub fn summary(&self) -> &CleaningSummary {
        &self.summary
    }

    pub fn training_metrics(&self) -> Option<&TrainingMetrics> {
        self.training.as_ref()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn selected_operations(&self) -> &[String] {
        &self.selected_operations
    }

    // ******** Transitions *********

    /// Moves to the next step, or shows the results from the last one.
    /// Entering the results fetches the three charts once.
    pub fn advance<B: AnalysisBackend>(&mut self, backend: &B) -> DashboardResult<()> {
        match self.stage {
            Stage::Upload => {
                if self.uploaded.is_none() {
                    return Err(self.fail(DashboardError::validation(
                        "missing file: upload a CSV dataset first",
                    )));
                }
                self.enter(Stage::Cleaning);
            }
            Stage::Cleaning => {
                if self.cleaning.is_none() {
                    return Err(self.fail(DashboardError::validation(
                        "missing cleaning: apply the data cleaning first",
                    )));
                }
                self.enter(Stage::Training);
            }
            Stage::Training => {
                if self.training.is_none() {
                    return Err(self.fail(DashboardError::validation(
                        "missing training: wait for the model training to finish",
                    )));
                }
                self.notice = None;
                let view = self.load_results(backend);
                info!("wizard: showing results");
                self.stage = Stage::Results(view);
            }
            Stage::Results(_) => {
                debug!("wizard: results already visible");
            }
        }
        Ok(())
    }

    /// Goes back one step. Does nothing on the first step; leaving the
    /// results view lands on the cleaning step.
    pub fn retreat(&mut self) {
        let previous = match self.stage {
            Stage::Upload => return,
            Stage::Cleaning => Stage::Upload,
            Stage::Training | Stage::Results(_) => Stage::Cleaning,
        };
        self.enter(previous);
    }

    pub fn reset(&mut self) {
        info!("wizard: reset");
        *self = Wizard::new(self.progress_period);
    }

    fn enter(&mut self, stage: Stage) {
        self.notice = None;
        self.stage = stage;
        info!("wizard: step {}", self.current_step().number());
    }

    fn fail(&mut self, err: DashboardError) -> DashboardError {
        warn!("wizard: {}", err);
        self.notice = Some(Notice::Error(err.to_string()));
        err
    }

    fn require_step(&mut self, step: Step) -> DashboardResult<()> {
        if self.results_visible() || self.current_step() != step {
            return Err(self.fail(DashboardError::validation(format!(
                "{} is not the active step",
                step.title()
            ))));
        }
        Ok(())
    }

    // ******** Step merges *********

    pub fn complete_upload(&mut self, file: UploadedFile) {
        self.uploaded = Some(file);
    }

    pub fn complete_cleaning(&mut self, result: CleaningResult) {
        self.summary = CleaningSummary::from_result(&result);
        self.cleaning = Some(result);
    }

    pub fn complete_training(&mut self, metrics: TrainingMetrics) {
        self.training = Some(metrics);
    }

    // ******** Step operations *********

    pub fn upload<B: AnalysisBackend>(
        &mut self,
        backend: &B,
        request: &UploadRequest,
    ) -> DashboardResult<&UploadedFile> {
        self.require_step(Step::Upload)?;
        if !request.file_name.ends_with(".csv") {
            return Err(self.fail(DashboardError::validation(
                "Please select a valid CSV file",
            )));
        }
        self.notice = None;
        info!(
            "wizard: uploading {} ({} bytes)",
            request.file_name,
            request.contents.len()
        );
        let res = backend
            .upload_dataset(request)
            .and_then(|payload| normalize::uploaded_file(&payload, request));
        match res {
            Ok(file) => Ok(&*self.uploaded.insert(file)),
            Err(e) => {
                self.uploaded = None;
                Err(self.fail(e))
            }
        }
    }

    /// Adds or removes a cleaning operation. Returns whether it is now selected.
    pub fn toggle_operation(&mut self, name: &str) -> bool {
        if let Some(pos) = self.selected_operations.iter().position(|n| n == name) {
            self.selected_operations.remove(pos);
            false
        } else {
            self.selected_operations.push(name.to_string());
            true
        }
    }

    pub fn clean<B: AnalysisBackend>(&mut self, backend: &B) -> DashboardResult<&CleaningResult> {
        self.require_step(Step::Cleaning)?;
        let dataset_id = match self.uploaded.as_ref() {
            Some(f) => f.identifier.clone(),
            None => {
                return Err(self.fail(DashboardError::validation(
                    "No dataset selected for cleaning",
                )))
            }
        };
        self.notice = None;
        info!(
            "wizard: cleaning dataset {} with {:?}",
            dataset_id, self.selected_operations
        );
        match backend.clean_dataset(&dataset_id) {
            Ok(payload) => {
                let result = normalize::cleaning_result(&payload, &self.selected_operations);
                debug!("wizard: cleaning result {:?}", result);
                self.summary = CleaningSummary::from_result(&result);
                Ok(&*self.cleaning.insert(result))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Trains on the cleaned dataset, reporting synthetic progress to `sink`
    /// while the backend works.
    pub fn train<B: AnalysisBackend>(
        &mut self,
        backend: &B,
        sink: Arc<dyn ProgressSink>,
    ) -> DashboardResult<TrainingMetrics> {
        self.require_step(Step::Training)?;
        let cleaned_id = match self.cleaning.as_ref().and_then(|c| c.cleaned_dataset_id.clone()) {
            Some(id) => id,
            None => {
                return Err(self.fail(DashboardError::validation(
                    "No cleaned dataset selected for training",
                )))
            }
        };
        self.notice = None;
        info!("wizard: training on cleaned dataset {}", cleaned_id);
        let res = run_with_progress(self.progress_period, sink, || {
            backend.train_model(&cleaned_id)
        });
        match res {
            Ok(payload) => {
                let metrics = normalize::training_metrics(&payload);
                self.complete_training(metrics);
                Ok(metrics)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    // ******** Results *********

    fn load_results<B: AnalysisBackend>(&mut self, backend: &B) -> ResultsView {
        let summary = self.summary.clone();
        let cleaned_id = self
            .cleaning
            .as_ref()
            .and_then(|c| c.cleaned_dataset_id.clone());
        match cleaned_id {
            Some(id) => {
                let (distribution, trend, predictions) = fetch_charts(backend, &id);
                ResultsView {
                    summary,
                    distribution,
                    trend,
                    predictions,
                }
            }
            None => {
                warn!("wizard: no cleaned dataset id, skipping chart fetch");
                self.notice = Some(Notice::Warning(
                    "No cleaned dataset available: charts cannot be loaded. Check that the model was trained."
                        .to_string(),
                ));
                ResultsView {
                    summary,
                    ..ResultsView::default()
                }
            }
        }
    }
}

// The three requests run side by side; any of them failing leaves its chart empty.
fn fetch_charts<B: AnalysisBackend>(
    backend: &B,
    cleaned_id: &str,
) -> (Vec<DataPoint>, Vec<DataPoint>, Vec<PartyPrediction>) {
    info!("wizard: loading charts for cleaned dataset {}", cleaned_id);
    thread::scope(|s| {
        let distribution = s.spawn(|| backend.fetch_distribution(cleaned_id));
        let trend = s.spawn(|| backend.fetch_trend(cleaned_id));
        let predictions = s.spawn(|| backend.fetch_predictions(cleaned_id));
        (
            settle("distribution", distribution, normalize::data_points),
            settle("trend", trend, normalize::data_points),
            settle("predictions", predictions, normalize::predictions),
        )
    })
}

fn settle<T>(
    what: &str,
    handle: ScopedJoinHandle<'_, DashboardResult<JSValue>>,
    convert: fn(&JSValue) -> Vec<T>,
) -> Vec<T> {
    match handle.join() {
        Ok(Ok(payload)) => {
            let res = convert(&payload);
            if res.is_empty() {
                warn!("wizard: no {} data received", what);
            }
            res
        }
        Ok(Err(e)) => {
            warn!("wizard: could not load {}: {}", what, e);
            Vec::new()
        }
        Err(_) => {
            warn!("wizard: {} request panicked", what);
            Vec::new()
        }
    }
}
