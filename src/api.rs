//! HTTP gateway to the analytics backend.

use std::io::Read;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use dashboard_core::aggregator::LiveFeed;
use dashboard_core::wizard::AnalysisBackend;
use dashboard_core::*;
use log::{debug, info};
use serde_json::Value as JSValue;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_DOWNLOAD_BYTES: usize = 512 * 1024 * 1024;

// ********* Endpoints ***********

const ORIGINAL_DATASETS: &str = "/datasets/originales";
const CLEANED_DATASETS: &str = "/datasets/limpios";
const CLEAN_DATASET: &str = "/datasets/limpiar";
const TRAIN_MODEL: &str = "/ml/entrenar";
const PREDICTIONS: &str = "/ml/prediccion";
const DISTRIBUTION: &str = "/analisis/distribucion";
const TREND: &str = "/analisis/tendencia";
const KPIS: &str = "/votantes/kpis";
const PARTY_RESULTS: &str = "/voto-analisis/resultados-partido";
const REGION_PARTICIPATION: &str = "/voto-analisis/participacion-region";

const CLEANED_ID_PARAM: &str = "idLimpio";

/// The two stores a dataset can be downloaded from.
#[derive(Eq, PartialEq, Debug, Clone, Copy, ValueEnum)]
pub enum DatasetKind {
    Original,
    Cleaned,
}

impl DatasetKind {
    fn path_segment(self) -> &'static str {
        match self {
            DatasetKind::Original => "original",
            DatasetKind::Cleaned => "limpio",
        }
    }
}

pub struct HttpApi {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpApi {
    /// `timeout` bounds reads and writes; connecting has its own shorter limit.
    pub fn new(base_url: &str, timeout: Duration) -> HttpApi {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT.min(timeout))
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        HttpApi {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str, cleaned_id: Option<&str>) -> DashboardResult<JSValue> {
        let mut req = self.agent.get(&self.url(path)).set("Accept", "application/json");
        if let Some(id) = cleaned_id {
            req = req.query(CLEANED_ID_PARAM, id);
        }
        debug!("api: GET {}", req.url());
        self.finish(path, req.call())
    }

    fn post_empty(&self, path: &str, cleaned_id: Option<&str>) -> DashboardResult<JSValue> {
        let mut req = self.agent.post(&self.url(path)).set("Accept", "application/json");
        if let Some(id) = cleaned_id {
            req = req.query(CLEANED_ID_PARAM, id);
        }
        debug!("api: POST {}", req.url());
        self.finish(path, req.call())
    }

    fn delete(&self, path: &str) -> DashboardResult<JSValue> {
        let req = self.agent.delete(&self.url(path));
        debug!("api: DELETE {}", req.url());
        self.finish(path, req.call())
    }

    /// Turns the raw outcome of a call into JSON or a typed failure.
    /// An empty body is `null`.
    fn finish(
        &self,
        endpoint: &str,
        outcome: Result<ureq::Response, ureq::Error>,
    ) -> DashboardResult<JSValue> {
        let response = match outcome {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                return Err(status_error(code, response));
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(DashboardError::Transport {
                    base_url: self.base_url.clone(),
                    detail: err.to_string(),
                });
            }
        };
        let body = response
            .into_string()
            .map_err(|e| DashboardError::MalformedResponse {
                endpoint: endpoint.to_string(),
                detail: e.to_string(),
            })?;
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Ok(JSValue::Null);
        }
        debug!("api: {} answered {}", endpoint, trimmed);
        serde_json::from_str(trimmed).map_err(|e| DashboardError::MalformedResponse {
            endpoint: endpoint.to_string(),
            detail: e.to_string(),
        })
    }

    // ******** Dataset management *********

    pub fn list_datasets(&self) -> DashboardResult<Vec<DatasetEntry>> {
        self.get(ORIGINAL_DATASETS, None)
            .map(|js| normalize::datasets(&js))
    }

    pub fn delete_dataset(&self, dataset_id: &str) -> DashboardResult<()> {
        info!("api: deleting dataset {}", dataset_id);
        self.delete(&format!("{}/{}", ORIGINAL_DATASETS, dataset_id))
            .map(|_| ())
    }

    pub fn list_cleaned_datasets(&self) -> DashboardResult<Vec<DatasetEntry>> {
        self.get(CLEANED_DATASETS, None)
            .map(|js| normalize::datasets(&js))
    }

    pub fn delete_cleaned_dataset(&self, cleaned_id: &str) -> DashboardResult<()> {
        info!("api: deleting cleaned dataset {}", cleaned_id);
        self.delete(&format!("{}/{}", CLEANED_DATASETS, cleaned_id))
            .map(|_| ())
    }

    /// The raw file contents, as stored by the backend.
    pub fn download_dataset(&self, kind: DatasetKind, dataset_id: &str) -> DashboardResult<Vec<u8>> {
        let path = format!("/datasets/{}/{}/descargar", kind.path_segment(), dataset_id);
        info!("api: downloading {}", path);
        let response = match self.agent.get(&self.url(&path)).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => return Err(status_error(code, response)),
            Err(ureq::Error::Transport(err)) => {
                return Err(DashboardError::Transport {
                    base_url: self.base_url.clone(),
                    detail: err.to_string(),
                })
            }
        };
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_DOWNLOAD_BYTES as u64 + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| DashboardError::MalformedResponse {
                endpoint: path.clone(),
                detail: e.to_string(),
            })?;
        if bytes.len() > MAX_DOWNLOAD_BYTES {
            return Err(DashboardError::MalformedResponse {
                endpoint: path,
                detail: format!("file exceeded {} bytes", MAX_DOWNLOAD_BYTES),
            });
        }
        Ok(bytes)
    }
}

// The backend puts a readable explanation in `message` when it has one.
fn status_error(code: u16, response: ureq::Response) -> DashboardError {
    let status_text = response.status_text().to_string();
    let body = response.into_string().unwrap_or_default();
    let message = serde_json::from_str::<JSValue>(&body)
        .ok()
        .and_then(|js| {
            js.get("message")
                .and_then(|m| m.as_str())
                .filter(|m| !m.trim().is_empty())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| format!("Error {}: {}", code, status_text));
    DashboardError::Backend {
        status: code,
        message,
    }
}

/// A multipart form body carrying one file under the field `file`.
struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartForm {
    fn single_file(file_name: &str, contents: &[u8]) -> MultipartForm {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let boundary = format!("eldash-boundary-{:x}", nanos);
        let mut body = Vec::with_capacity(contents.len() + 256);
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                file_name.replace('"', "_")
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: text/csv\r\n\r\n");
        body.extend_from_slice(contents);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        MultipartForm { boundary, body }
    }

    fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

impl AnalysisBackend for HttpApi {
    fn upload_dataset(&self, request: &UploadRequest) -> DashboardResult<JSValue> {
        let form = MultipartForm::single_file(&request.file_name, &request.contents);
        let req = self
            .agent
            .post(&self.url(ORIGINAL_DATASETS))
            .set("Accept", "application/json")
            .set("Content-Type", &form.content_type());
        info!("api: POST {} ({} bytes)", req.url(), form.body.len());
        self.finish(ORIGINAL_DATASETS, req.send_bytes(&form.body))
    }

    fn clean_dataset(&self, dataset_id: &str) -> DashboardResult<JSValue> {
        self.post_empty(&format!("{}/{}", CLEAN_DATASET, dataset_id), None)
    }

    fn train_model(&self, cleaned_id: &str) -> DashboardResult<JSValue> {
        self.post_empty(TRAIN_MODEL, Some(cleaned_id))
    }

    fn fetch_distribution(&self, cleaned_id: &str) -> DashboardResult<JSValue> {
        self.get(DISTRIBUTION, Some(cleaned_id))
    }

    fn fetch_trend(&self, cleaned_id: &str) -> DashboardResult<JSValue> {
        self.get(TREND, Some(cleaned_id))
    }

    fn fetch_predictions(&self, cleaned_id: &str) -> DashboardResult<JSValue> {
        self.get(PREDICTIONS, Some(cleaned_id))
    }
}

impl LiveFeed for HttpApi {
    fn fetch_kpis(&self) -> DashboardResult<JSValue> {
        self.get(KPIS, None)
    }

    fn fetch_party_results(&self) -> DashboardResult<JSValue> {
        self.get(PARTY_RESULTS, None)
    }

    fn fetch_region_participation(&self) -> DashboardResult<JSValue> {
        self.get(REGION_PARTICIPATION, None)
    }
}
