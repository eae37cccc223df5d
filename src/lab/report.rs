//! Flattens the nested `requisicaoResultado` response into markdown blocks.
//!
//! Walk order: procedures → topographies → macro report, diagnoses,
//! cassette stains. Blocks are joined with a blank line. When the walk
//! finds nothing recognizable (or almost nothing), the raw procedures JSON
//! is appended so the model still sees the data.

use serde_json::{Map, Value};

use super::{status_line, LabError, LabReport};

/// Marker heading for the raw-JSON fallback block.
pub const FALLBACK_MARKER: &str = "--- DADOS BRUTOS (FALLBACK) ---";

/// Below this many blocks the report is considered too thin to stand alone.
const MIN_REPORT_BLOCKS: usize = 5;

/// Failure message when `dat` carries no usable `msg`.
const GENERIC_FAILURE: &str = "Resposta sem sucesso ou dados inválidos.";

/// Parse a raw response body and flatten it.
pub fn parse_lab_body(status: u16, body: &str) -> Result<LabReport, LabError> {
    let json: Value = serde_json::from_str(body).map_err(|_| LabError::NotJson {
        status,
        body: body.to_string(),
    })?;
    flatten_response(status, &json)
}

/// Flatten an already-parsed response.
pub fn flatten_response(status: u16, response: &Value) -> Result<LabReport, LabError> {
    let root = response
        .as_object()
        .ok_or(LabError::NotObject { status })?;
    let dat = root.get("dat");

    match dat.and_then(Value::as_object) {
        Some(dat) if is_success(dat) => Ok(flatten_success(status, dat)),
        _ => Err(LabError::Api {
            status,
            message: failure_message(dat),
        }),
    }
}

fn is_success(dat: &Map<String, Value>) -> bool {
    match dat.get("sucesso") {
        Some(Value::Number(n)) => n.as_f64() == Some(1.0),
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}

fn failure_message(dat: Option<&Value>) -> String {
    match dat {
        Some(Value::Object(obj)) => match obj.get("msg") {
            None | Some(Value::Null) => GENERIC_FAILURE.to_string(),
            Some(msg) => display_value(msg),
        },
        Some(other) if is_truthy(other) => display_value(other),
        _ => GENERIC_FAILURE.to_string(),
    }
}

fn flatten_success(status: u16, dat: &Map<String, Value>) -> LabReport {
    let mut report = ReportBuilder::new(status);
    let code = match dat.get("codRequisicao") {
        None | Some(Value::Null) => "N/A".to_string(),
        Some(v) => display_value(v),
    };
    report.push(format!("**Código da Requisição:** `{code}`"));

    let empty = Value::Array(Vec::new());
    let procedures = dat.get("procedimentos").unwrap_or(&empty);

    for procedure in as_objects(procedures) {
        if let Some(topographies) = procedure.get("topografias") {
            for topography in as_objects(topographies) {
                report.topography(topography);
            }
        }

        // Schema drift: details directly on the procedure.
        if !report.found_details {
            report.flat_procedure(procedure);
        }
    }

    let billed = match dat.get("procedimentosCobrados") {
        Some(Value::Array(items)) => items.clone(),
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            tracing::warn!(kind = value_kind(other), "procedimentosCobrados is not a list, ignoring");
            Vec::new()
        }
    };

    if !report.found_details || report.blocks.len() < MIN_REPORT_BLOCKS {
        tracing::info!(
            blocks = report.blocks.len(),
            found_details = report.found_details,
            "Lab report structure not recognized, appending raw procedures"
        );
        report.raw_fallback(procedures);
    }

    LabReport {
        text: report.finish(),
        billed,
    }
}

struct ReportBuilder {
    blocks: Vec<String>,
    found_details: bool,
}

impl ReportBuilder {
    fn new(status: u16) -> Self {
        Self {
            blocks: vec![status_line(status)],
            found_details: false,
        }
    }

    fn push(&mut self, block: String) {
        self.blocks.push(block);
    }

    fn topography(&mut self, topography: &Map<String, Value>) {
        self.found_details = true;
        self.push(format!("\n### Topografia: {}", field_text(topography, "nome")));
        self.push(format!("**Laudo Macro:** {}", field_text(topography, "laudoMacro")));

        if let Some(diagnoses) = topography.get("diagnosticos") {
            for diagnosis in as_objects(diagnoses) {
                self.diagnosis(diagnosis);
            }
        }

        if let Some(cassettes) = topography.get("cassetes") {
            for cassette in as_objects(cassettes) {
                let Some(stains) = cassette.get("coloracoes") else {
                    continue;
                };
                for stain in as_objects(stains) {
                    self.push(format!("*   **Coloração:** {}", field_text(stain, "nome")));
                }
            }
        }
    }

    fn diagnosis(&mut self, diagnosis: &Map<String, Value>) {
        self.push(format!("\n> **Diagnóstico:** {}", field_text(diagnosis, "titulo")));
        self.push(format!("> **Laudo Micro:** {}", field_text(diagnosis, "laudoMicro")));
    }

    fn flat_procedure(&mut self, procedure: &Map<String, Value>) {
        if procedure.contains_key("laudoMacro") {
            self.push(format!("\n**Laudo Macro:** {}", field_text(procedure, "laudoMacro")));
            self.found_details = true;
        }
        if let Some(diagnoses) = procedure.get("diagnosticos") {
            for diagnosis in as_objects(diagnoses) {
                self.diagnosis(diagnosis);
                self.found_details = true;
            }
        }
    }

    fn raw_fallback(&mut self, procedures: &Value) {
        let raw = serde_json::to_string_pretty(procedures).unwrap_or_else(|_| procedures.to_string());
        self.push(format!("\n\n{FALLBACK_MARKER}"));
        self.push(
            "A estrutura esperada não foi encontrada. Segue o JSON bruto para análise:".to_string(),
        );
        self.push(format!("```json\n{raw}\n```"));
    }

    fn finish(self) -> String {
        self.blocks.join("\n\n")
    }
}

/// Object elements of a JSON array; anything else yields nothing.
fn as_objects(value: &Value) -> impl Iterator<Item = &Map<String, Value>> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// Text of an optional field: strings verbatim, missing/null empty,
/// other JSON values in their compact form.
pub fn field_text(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(v) => display_value(v),
    }
}

/// Strings without quotes, everything else as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
