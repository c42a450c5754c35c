//! Conversion of backend payloads into the canonical view models.
//!
//! The backend is not consistent about how it wraps collections: the same
//! endpoint may answer with a bare array, a `{"data": [...]}` envelope or an
//! object keyed by name. Everything here works on already-decoded
//! [`serde_json::Value`]s and never fails on a shape it recognizes; the only
//! errors come from responses missing a field that cannot be defaulted.

use log::{debug, warn};
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;

use crate::model::*;

/// Placeholder party names the backend uses for regions without data.
const NO_PARTY_LABELS: [&str; 2] = ["Sin datos", "Sin partido"];
const UNKNOWN_PARTY: &str = "Sin partido";

// The ways a collection may be wrapped.
#[derive(Debug, Clone, Copy)]
enum PayloadShape<'a> {
    Envelope(&'a [JSValue]),
    List(&'a [JSValue]),
    Keyed(&'a JSMap<String, JSValue>),
    Unrecognized,
}

// An envelope wins over a keyed object: `{"data": [...]}` is never read as a
// party called "data".
fn detect_shape(payload: &JSValue) -> PayloadShape<'_> {
    match payload {
        JSValue::Object(obj) => match obj.get("data") {
            Some(JSValue::Array(items)) => PayloadShape::Envelope(items),
            _ => PayloadShape::Keyed(obj),
        },
        JSValue::Array(items) => PayloadShape::List(items),
        _ => PayloadShape::Unrecognized,
    }
}

/// One element of a collection, with the key it was found under (keyed shape only).
struct Record<'a> {
    key: Option<&'a str>,
    fields: &'a JSMap<String, JSValue>,
}

fn records(payload: &JSValue) -> Vec<Record<'_>> {
    let shape = detect_shape(payload);
    debug!("records: detected {} shape", shape_name(&shape));
    match shape {
        PayloadShape::Envelope(items) | PayloadShape::List(items) => items
            .iter()
            .filter_map(|item| item.as_object())
            .map(|fields| Record { key: None, fields })
            .collect(),
        PayloadShape::Keyed(obj) => obj
            .iter()
            .filter_map(|(k, v)| {
                v.as_object().map(|fields| Record {
                    key: Some(k.as_str()),
                    fields,
                })
            })
            .collect(),
        PayloadShape::Unrecognized => Vec::new(),
    }
}

fn shape_name(shape: &PayloadShape<'_>) -> &'static str {
    match shape {
        PayloadShape::Envelope(_) => "envelope",
        PayloadShape::List(_) => "list",
        PayloadShape::Keyed(_) => "keyed",
        PayloadShape::Unrecognized => "unrecognized",
    }
}

// ******** Field readers *********

fn read_f64(fields: &JSMap<String, JSValue>, key: &str) -> Option<f64> {
    let x = match fields.get(key) {
        Some(JSValue::Number(n)) => n.as_f64(),
        Some(JSValue::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    x.filter(|x| x.is_finite())
}

fn read_count(fields: &JSMap<String, JSValue>, key: &str) -> Option<u64> {
    read_f64(fields, key).map(|x| if x > 0.0 { x.round() as u64 } else { 0 })
}

fn read_str<'a>(fields: &'a JSMap<String, JSValue>, key: &str) -> Option<&'a str> {
    match fields.get(key) {
        Some(JSValue::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// Identifiers come back either as numbers or as strings.
fn read_id(fields: &JSMap<String, JSValue>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match fields.get(*key) {
        Some(JSValue::Number(n)) => Some(n.to_string()),
        Some(JSValue::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

fn color_or_palette(fields: &JSMap<String, JSValue>, position: usize) -> String {
    read_str(fields, "color")
        .map(|c| c.to_string())
        .unwrap_or_else(|| palette_color(position).to_string())
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ******** Chart series *********

/// Distribution and trend series. Only `{label, value}` elements are kept.
pub fn data_points(payload: &JSValue) -> Vec<DataPoint> {
    let items = match payload {
        JSValue::Array(items) => items,
        _ => {
            if !payload.is_null() {
                warn!("data_points: expected an array, got {}", payload);
            }
            return Vec::new();
        }
    };
    items
        .iter()
        .filter_map(|item| {
            let fields = item.as_object()?;
            let label = read_str(fields, "label")?;
            let value = match fields.get("value") {
                Some(JSValue::Number(n)) => n.as_f64()?,
                _ => return None,
            };
            Some(DataPoint {
                label: label.to_string(),
                value,
            })
        })
        .collect()
}

/// Model predictions, strongest first. Entries without a party or with a
/// non-positive prediction are dropped.
pub fn predictions(payload: &JSValue) -> Vec<PartyPrediction> {
    let items = match payload {
        JSValue::Array(items) => items,
        _ => return Vec::new(),
    };
    let mut res: Vec<PartyPrediction> = items
        .iter()
        .filter_map(|item| {
            let fields = item.as_object()?;
            let party = read_str(fields, "partido")?;
            let prediction = round2(read_f64(fields, "prediccion")?);
            if prediction <= 0.0 {
                return None;
            }
            Some(PartyPrediction {
                party: party.to_string(),
                prediction,
                confidence: read_f64(fields, "confianza").unwrap_or(0.0),
                status: read_str(fields, "estado").unwrap_or_default().to_string(),
            })
        })
        .collect();
    res.sort_by(|a, b| b.prediction.total_cmp(&a.prediction));
    res
}

// ******** Live results *********

pub fn party_results(payload: &JSValue) -> Vec<PartyResult> {
    records(payload)
        .into_iter()
        .enumerate()
        .map(|(position, rec)| PartyResult {
            party_name: rec
                .key
                .or_else(|| read_str(rec.fields, "partido"))
                .unwrap_or(UNKNOWN_PARTY)
                .to_string(),
            votes: read_count(rec.fields, "votos").unwrap_or(0),
            percentage: read_f64(rec.fields, "porcentaje").unwrap_or(0.0),
            color: color_or_palette(rec.fields, position),
        })
        .collect()
}

pub fn region_participation(payload: &JSValue) -> RegionTable {
    let entries = records(payload)
        .into_iter()
        .enumerate()
        .map(|(position, rec)| {
            let region = rec
                .key
                .or_else(|| read_str(rec.fields, "label"))
                .or_else(|| read_str(rec.fields, "region"))
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("Región {}", position + 1));
            let party = read_str(rec.fields, "partido")
                .filter(|p| !NO_PARTY_LABELS.contains(p))
                .map(|p| p.to_string());
            RegionParticipation {
                region,
                party,
                percentage: read_f64(rec.fields, "porcentaje").unwrap_or(0.0),
                votes: read_count(rec.fields, "value")
                    .or_else(|| read_count(rec.fields, "votos"))
                    .unwrap_or(0),
                color: color_or_palette(rec.fields, position),
            }
        })
        .collect();
    RegionTable::new(entries)
}

pub fn kpis(payload: &JSValue) -> Kpis {
    match payload.as_object() {
        Some(fields) => Kpis {
            total_voters: read_count(fields, "totalVotantes").unwrap_or(0),
            votes_cast: read_count(fields, "votosEmitidos").unwrap_or(0),
            participation: read_f64(fields, "participacion").unwrap_or(0.0),
        },
        None => Kpis::default(),
    }
}

/// Dataset listings, as a bare array or an envelope.
pub fn datasets(payload: &JSValue) -> Vec<DatasetEntry> {
    let items = match detect_shape(payload) {
        PayloadShape::Envelope(items) | PayloadShape::List(items) => items,
        _ => return Vec::new(),
    };
    items
        .iter()
        .filter_map(|item| {
            let fields = item.as_object()?;
            let id = read_id(fields, &["id", "idDataset", "idLimpio"])?;
            Some(DatasetEntry {
                name: read_str(fields, "nombre")
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("dataset-{}", id)),
                created_at: read_str(fields, "fechaCreacion").map(|s| s.to_string()),
                id,
            })
        })
        .collect()
}

// ******** Step responses *********

fn size_label(num_bytes: usize) -> String {
    format!("{:.2} MB", num_bytes as f64 / 1024.0 / 1024.0)
}

pub fn uploaded_file(payload: &JSValue, request: &UploadRequest) -> DashboardResult<UploadedFile> {
    let empty = JSMap::new();
    let fields = payload.as_object().unwrap_or(&empty);
    let identifier = match read_id(fields, &["id", "idDataset"]) {
        Some(id) => id,
        None => {
            return Err(DashboardError::MalformedResponse {
                endpoint: "upload".to_string(),
                detail: "no dataset id in the response".to_string(),
            })
        }
    };
    Ok(UploadedFile {
        identifier,
        display_name: read_str(fields, "nombre")
            .unwrap_or(request.file_name.as_str())
            .to_string(),
        size_label: size_label(request.contents.len()),
        uploaded_at: read_str(fields, "fechaCreacion")
            .unwrap_or(request.submitted_at.as_str())
            .to_string(),
    })
}

pub fn cleaning_result(payload: &JSValue, operations: &[String]) -> CleaningResult {
    let empty = JSMap::new();
    let fields = payload.as_object().unwrap_or(&empty);
    CleaningResult {
        cleaned_dataset_id: read_id(fields, &["id", "idLimpio"]),
        records_kept: read_count(fields, "registrosLimpios").unwrap_or(0),
        records_removed: read_count(fields, "registrosEliminados").unwrap_or(0),
        precision_percent: read_f64(fields, "precision").unwrap_or(0.0),
        completeness_percent: read_f64(fields, "completitud").unwrap_or(0.0),
        applied_operations: operations.to_vec(),
    }
}

pub fn training_metrics(payload: &JSValue) -> TrainingMetrics {
    match payload.as_object() {
        Some(fields) => TrainingMetrics {
            accuracy: read_f64(fields, "accuracy").unwrap_or(0.0),
            f1_score: read_f64(fields, "f1Score").unwrap_or(0.0),
            precision: read_f64(fields, "precision").unwrap_or(0.0),
            recall: read_f64(fields, "recall").unwrap_or(0.0),
        },
        None => TrainingMetrics::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(parties: &[PartyResult]) -> Vec<(String, u64, f64)> {
        parties
            .iter()
            .map(|p| (p.party_name.clone(), p.votes, p.percentage))
            .collect()
    }

    #[test]
    fn party_results_agree_across_shapes() {
        let list = json!([
            {"partido": "Fuerza Popular", "votos": 1200, "porcentaje": 40.0},
            {"partido": "Peru Libre", "votos": 900, "porcentaje": 30.0},
            {"partido": "Accion Popular", "votos": 900, "porcentaje": 30.0}
        ]);
        let envelope = json!({ "data": list.clone() });
        let keyed = json!({
            "Fuerza Popular": {"votos": 1200, "porcentaje": 40.0},
            "Peru Libre": {"votos": 900, "porcentaje": 30.0},
            "Accion Popular": {"votos": 900, "porcentaje": 30.0}
        });

        let a = party_results(&list);
        let b = party_results(&envelope);
        let c = party_results(&keyed);
        assert_eq!(a.len(), 3);
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(names(&a)[0], ("Fuerza Popular".to_string(), 1200, 40.0));
    }

    #[test]
    fn party_colors_cycle_the_palette_unless_provided() {
        let payload = json!([
            {"partido": "A", "votos": 1},
            {"partido": "B", "votos": 2, "color": "#000000"},
            {"partido": "C", "votos": 3}
        ]);
        let res = party_results(&payload);
        assert_eq!(res[0].color, PALETTE[0]);
        assert_eq!(res[1].color, "#000000");
        assert_eq!(res[2].color, PALETTE[2]);
        // Same payload, same colors.
        assert_eq!(party_results(&payload), res);
    }

    #[test]
    fn party_results_default_missing_numbers() {
        let res = party_results(&json!([{"partido": "A"}, {"partido": "B", "votos": "15"}]));
        assert_eq!(res[0].votes, 0);
        assert_eq!(res[0].percentage, 0.0);
        assert_eq!(res[1].votes, 15);
    }

    #[test]
    fn party_results_of_scalars_are_empty() {
        assert!(party_results(&JSValue::Null).is_empty());
        assert!(party_results(&json!(12)).is_empty());
        assert!(party_results(&json!({"data": []})).is_empty());
    }

    #[test]
    fn data_points_of_empty_or_null_are_empty() {
        assert!(data_points(&json!([])).is_empty());
        assert!(data_points(&JSValue::Null).is_empty());
        assert!(data_points(&json!({"data": [{"label": "LIMA", "value": 3}]})).is_empty());
    }

    #[test]
    fn data_points_drop_malformed_elements() {
        let res = data_points(&json!([
            {"label": "LIMA", "value": 24},
            {"label": "CUSCO"},
            {"value": 4},
            "junk",
            {"label": "PIURA", "value": 0}
        ]));
        assert_eq!(
            res,
            vec![
                DataPoint {
                    label: "LIMA".to_string(),
                    value: 24.0
                },
                DataPoint {
                    label: "PIURA".to_string(),
                    value: 0.0
                }
            ]
        );
    }

    #[test]
    fn region_names_fall_back_to_region_then_position() {
        let table = region_participation(&json!({"data": [
            {"label": "Lima", "value": 500, "porcentaje": 71.5},
            {"region": "Cusco", "votos": 200},
            {"value": 10}
        ]}));
        let names: Vec<&str> = table.names().collect();
        assert_eq!(names, vec!["Lima", "Cusco", "Región 3"]);
        let lima = table.get("Lima").unwrap();
        assert_eq!(lima.votes, 500);
        assert_eq!(lima.percentage, 71.5);
        assert_eq!(lima.party, None);
        assert_eq!(table.get("Cusco").unwrap().votes, 200);
    }

    #[test]
    fn keyed_regions_use_their_key() {
        let table = region_participation(&json!({
            "Arequipa": {"partido": "A", "porcentaje": 60, "votos": 30, "color": "#111111"},
            "Tacna": {"partido": "Sin datos", "porcentaje": 10}
        }));
        let arequipa = table.get("Arequipa").unwrap();
        assert_eq!(arequipa.party.as_deref(), Some("A"));
        assert_eq!(arequipa.color, "#111111");
        let tacna = table.get("Tacna").unwrap();
        assert_eq!(tacna.party, None);
        assert_eq!(tacna.color, PALETTE[1]);
    }

    #[test]
    fn predictions_are_filtered_rounded_and_sorted() {
        let res = predictions(&json!([
            {"partido": "A", "prediccion": 12.346, "confianza": 80, "estado": "Alta"},
            {"partido": "B", "prediccion": 40.1},
            {"partido": "C", "prediccion": 0},
            {"prediccion": 10},
            {"partido": "D", "prediccion": null}
        ]));
        let parties: Vec<&str> = res.iter().map(|p| p.party.as_str()).collect();
        assert_eq!(parties, vec!["B", "A"]);
        assert_eq!(res[1].prediction, 12.35);
        assert_eq!(res[1].confidence, 80.0);
        assert_eq!(res[0].status, "");
    }

    #[test]
    fn kpis_default_to_zero() {
        assert_eq!(kpis(&JSValue::Null), Kpis::default());
        let k = kpis(&json!({"totalVotantes": 1000, "participacion": 63.2}));
        assert_eq!(k.total_voters, 1000);
        assert_eq!(k.votes_cast, 0);
        assert_eq!(k.participation, 63.2);
    }

    #[test]
    fn uploaded_file_prefers_backend_metadata() {
        let request = UploadRequest {
            file_name: "padron.csv".to_string(),
            contents: vec![0u8; 2 * 1024 * 1024],
            submitted_at: "2024-04-14T10:00:00Z".to_string(),
        };
        let f = uploaded_file(&json!({"id": 42}), &request).unwrap();
        assert_eq!(f.identifier, "42");
        assert_eq!(f.display_name, "padron.csv");
        assert_eq!(f.size_label, "2.00 MB");
        assert_eq!(f.uploaded_at, "2024-04-14T10:00:00Z");

        let f = uploaded_file(
            &json!({"idDataset": "9", "nombre": "padron_2024", "fechaCreacion": "2024-04-01"}),
            &request,
        )
        .unwrap();
        assert_eq!(f.identifier, "9");
        assert_eq!(f.display_name, "padron_2024");
        assert_eq!(f.uploaded_at, "2024-04-01");

        let err = uploaded_file(&json!({"nombre": "x"}), &request).unwrap_err();
        assert!(matches!(err, DashboardError::MalformedResponse { .. }));
    }

    #[test]
    fn cleaning_result_reads_id_and_metrics() {
        let ops = vec!["Eliminar duplicados".to_string()];
        let r = cleaning_result(
            &json!({"idLimpio": 7, "registrosLimpios": 900, "registrosEliminados": 100, "precision": 98}),
            &ops,
        );
        assert_eq!(r.cleaned_dataset_id.as_deref(), Some("7"));
        assert_eq!(r.records_kept, 900);
        assert_eq!(r.records_removed, 100);
        assert_eq!(r.completeness_percent, 0.0);
        assert_eq!(r.applied_operations, ops);
        assert_eq!(cleaning_result(&json!({}), &[]).cleaned_dataset_id, None);
    }

    #[test]
    fn datasets_accept_lists_and_envelopes() {
        let list = json!([{"id": 1, "nombre": "padron.csv", "fechaCreacion": "2024-04-01"}, {"nombre": "no id"}]);
        let res = datasets(&list);
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].id, "1");
        assert_eq!(datasets(&json!({ "data": list })), res);
        assert!(datasets(&json!({"x": 1})).is_empty());
    }
}
