// ********* Input data structures ***********

use serde::Serialize;
use snafu::Snafu;

/// A dataset file as it is handed to the upload step.
///
/// The caller reads the file and stamps the submission time; the wizard only
/// validates and forwards it.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub contents: Vec<u8>,
    /// RFC 3339 timestamp used when the backend does not report a creation date.
    pub submitted_at: String,
}

/// A named cleaning operation offered to the operator.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct CleaningOperation {
    pub name: &'static str,
    pub description: &'static str,
}

/// The cleaning operations the backend knows about.
pub const CLEANING_OPERATIONS: [CleaningOperation; 4] = [
    CleaningOperation {
        name: "Eliminar filas vacías",
        description: "Elimina registros que no tienen información en campos críticos",
    },
    CleaningOperation {
        name: "Corregir nombres geográficos",
        description: "Normaliza y corrige nombres de regiones, provincias y distritos",
    },
    CleaningOperation {
        name: "Eliminar duplicados",
        description: "Identifica y elimina registros duplicados basados en DNI",
    },
    CleaningOperation {
        name: "Normalizar variables numéricas",
        description: "Estandariza formatos numéricos y corrige valores inconsistentes",
    },
];

/// An entry of the original or cleaned dataset listings.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct DatasetEntry {
    pub id: String,
    pub name: String,
    pub created_at: Option<String>,
}

// ******** Step results *********

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct UploadedFile {
    pub identifier: String,
    pub display_name: String,
    pub size_label: String,
    pub uploaded_at: String,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct CleaningResult {
    /// May be missing when the backend answers without an id.
    pub cleaned_dataset_id: Option<String>,
    pub records_kept: u64,
    pub records_removed: u64,
    pub precision_percent: f64,
    pub completeness_percent: f64,
    pub applied_operations: Vec<String>,
}

/// Totals shown by the summary panel once cleaning is done.
#[derive(PartialEq, Debug, Clone, Default, Serialize)]
pub struct CleaningSummary {
    pub total_records: u64,
    pub records_kept: u64,
    pub records_removed: u64,
    pub precision_percent: f64,
    pub completeness_percent: f64,
}

impl CleaningSummary {
    pub fn from_result(result: &CleaningResult) -> CleaningSummary {
        CleaningSummary {
            total_records: result.records_kept.saturating_add(result.records_removed),
            records_kept: result.records_kept,
            records_removed: result.records_removed,
            precision_percent: result.precision_percent,
            completeness_percent: result.completeness_percent,
        }
    }

    /// Share of removed records, 0 for an empty dataset.
    pub fn removed_percent(&self) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            self.records_removed as f64 / self.total_records as f64 * 100.0
        }
    }
}

#[derive(PartialEq, Debug, Clone, Copy, Default, Serialize)]
pub struct TrainingMetrics {
    pub accuracy: f64,
    /// Raw score, not a fraction.
    pub f1_score: f64,
    pub precision: f64,
    pub recall: f64,
}

// ******** Chart data *********

/// Canonical point for the distribution and trend charts.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct DataPoint {
    pub label: String,
    pub value: f64,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct PartyPrediction {
    pub party: String,
    pub prediction: f64,
    pub confidence: f64,
    pub status: String,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct PartyResult {
    pub party_name: String,
    pub votes: u64,
    pub percentage: f64,
    pub color: String,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct RegionParticipation {
    pub region: String,
    pub party: Option<String>,
    pub percentage: f64,
    pub votes: u64,
    pub color: String,
}

/// Region participation keyed by region name, in backend order.
#[derive(PartialEq, Debug, Clone, Default, Serialize)]
pub struct RegionTable {
    entries: Vec<RegionParticipation>,
}

impl RegionTable {
    pub fn new(entries: Vec<RegionParticipation>) -> RegionTable {
        RegionTable { entries }
    }

    pub fn get(&self, region: &str) -> Option<&RegionParticipation> {
        self.entries.iter().find(|e| e.region == region)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.region.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegionParticipation> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(PartialEq, Debug, Clone, Copy, Default, Serialize)]
pub struct Kpis {
    pub total_voters: u64,
    pub votes_cast: u64,
    pub participation: f64,
}

/// Colors handed out by position when the backend does not send one.
pub const PALETTE: [&str; 8] = [
    "#2563EB", "#16A34A", "#DC2626", "#F59E0B", "#7C3AED", "#DB2777", "#0891B2", "#65A30D",
];

pub fn palette_color(position: usize) -> &'static str {
    PALETTE[position % PALETTE.len()]
}

// ******** Errors *********

/// Everything that can go wrong between the console and the backend.
#[derive(PartialEq, Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum DashboardError {
    /// A client-side precondition was not met. Recoverable by the operator.
    #[snafu(display("{message}"))]
    Validation { message: String },

    #[snafu(display(
        "Could not reach the backend. Check that it is running at {base_url}. Error: {detail}"
    ))]
    Transport { base_url: String, detail: String },

    /// Non-2xx answer, message taken verbatim from the backend when present.
    #[snafu(display("{message}"))]
    Backend { status: u16, message: String },

    #[snafu(display("Malformed response from {endpoint}: {detail}"))]
    MalformedResponse { endpoint: String, detail: String },
}

impl DashboardError {
    pub fn validation(message: impl Into<String>) -> DashboardError {
        DashboardError::Validation {
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DashboardError::Validation { .. })
    }
}

pub type DashboardResult<T> = Result<T, DashboardError>;
