//! APLIS laboratory API: request envelope, transport and report flattening.
//!
//! `LabApi::fetch_report` returns either a flattened `LabReport` or a
//! `LabError`. Both sides carry the exact text shown on the page, so the
//! web layer never has to inspect strings to tell them apart.

pub mod client;
pub mod report;

pub use client::*;
pub use report::*;

use serde_json::Value;
use thiserror::Error;

/// Successful lab lookup, ready for prompting.
#[derive(Debug, Clone, PartialEq)]
pub struct LabReport {
    /// Markdown projection of the diagnostic tree.
    pub text: String,
    /// `dat.procedimentosCobrados`, verbatim.
    pub billed: Vec<Value>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LabError {
    #[error("lab API request failed: {0}")]
    Transport(String),

    #[error("lab API returned a non-JSON body (status {status})")]
    NotJson { status: u16, body: String },

    #[error("lab API returned JSON that is not an object (status {status})")]
    NotObject { status: u16 },

    #[error("lab API reported failure (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl LabError {
    /// Text displayed in the report section when the lookup fails.
    pub fn report_text(&self) -> String {
        match self {
            LabError::Transport(detail) => format!("Erro de requisição: {detail}"),
            LabError::NotJson { status, body } => format!(
                "{}\n\nResposta da API não está em formato JSON válido: {body}",
                status_line(*status)
            ),
            LabError::NotObject { status } => format!(
                "{}\n\nErro: Resposta da API inesperada (não é um objeto JSON).",
                status_line(*status)
            ),
            LabError::Api { status, message } => {
                format!("{}\n\nErro na API: {message}", status_line(*status))
            }
        }
    }
}

/// First block of every report derived from an HTTP response.
pub fn status_line(status: u16) -> String {
    format!("**Status Code:** `{status}`")
}

/// Lab API abstraction (allows mocking)
pub trait LabApi: Send + Sync {
    fn fetch_report(&self, requisition_code: &str) -> Result<LabReport, LabError>;
}
