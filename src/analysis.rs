//! One requisition lookup, end to end: fetch, prompt, generate, render.
//!
//! Runs on a blocking worker thread. Every failure is folded into the
//! text of the section it belongs to; nothing here returns an error.

use crate::core_state::AppState;
use crate::pipeline::{build_billing_prompt, format_billed_procedures, markdown_to_html};

/// Answer section text when the lab lookup failed.
pub const ANALYSIS_UNAVAILABLE: &str =
    "Não foi possível gerar a análise devido a erro na busca da API.";

/// Result of analysing one requisition.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// Lab lookup failed; the model was not called.
    FetchFailed { report_text: String },
    /// Three HTML fragments ready for the page.
    Rendered {
        report_html: String,
        answer_html: String,
        billed_html: String,
    },
}

/// Prefix of the answer shown when the model call fails.
pub fn model_failure_answer(error: &impl std::fmt::Display) -> String {
    format!("Erro ao gerar resposta da IA: {error}")
}

pub fn run_analysis(state: &AppState, requisition_code: &str) -> AnalysisOutcome {
    let report = match state.lab.fetch_report(requisition_code) {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!(code = requisition_code, error = %e, "Lab lookup failed");
            return AnalysisOutcome::FetchFailed {
                report_text: e.report_text(),
            };
        }
    };

    tracing::info!(
        code = requisition_code,
        report_chars = report.text.len(),
        billed = report.billed.len(),
        "Lab report fetched"
    );

    let prompt = build_billing_prompt(&report.text, &report.billed);
    let (answer, billed_listing) = match state.model.generate(&prompt) {
        Ok(answer) => (answer, format_billed_procedures(&report.billed)),
        Err(e) => {
            tracing::error!(code = requisition_code, error = %e, "Billing analysis failed");
            (model_failure_answer(&e), String::new())
        }
    };

    AnalysisOutcome::Rendered {
        report_html: markdown_to_html(&report.text, false),
        answer_html: markdown_to_html(&answer, true),
        billed_html: markdown_to_html(&billed_listing, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::lab::{LabError, LabReport, MockLabApi};
    use crate::pipeline::{MockModel, ModelError};

    const TABLE: &str =
        "| CodRequisicao | Código | Quantidade |\n| --- | --- | --- |\n| 123 | 40601110 | 1 |\n\nBiópsia única.";

    fn report() -> LabReport {
        LabReport {
            text: "**Status Code:** `200`\n\n### Topografia: Pele".into(),
            billed: vec![json!({"codigo": "40601110", "descricao": "Biópsia", "quantidade": 1, "valorTotal": 90})],
        }
    }

    #[test]
    fn successful_lookup_renders_three_fragments() {
        let model = Arc::new(MockModel::new(TABLE));
        let state = AppState::for_tests(MockLabApi::new(Ok(report())), model.clone());

        match run_analysis(&state, "123") {
            AnalysisOutcome::Rendered {
                report_html,
                answer_html,
                billed_html,
            } => {
                assert!(report_html.contains("<h3>Topografia: Pele</h3>"));
                assert!(answer_html.contains("<table>"));
                assert!(billed_html.contains("Procedimentos Cobrados (API)"));
                assert!(billed_html.contains("<code>40601110</code>"));
            }
            other => panic!("expected rendered outcome, got {other:?}"),
        }

        let prompt = model.last_prompt().unwrap();
        assert!(prompt.contains("### Topografia: Pele"));
        assert!(prompt.contains("\"codigo\": \"40601110\""));
    }

    #[test]
    fn fetch_failure_skips_model() {
        let model = Arc::new(MockModel::new(TABLE));
        let lab = MockLabApi::new(Err(LabError::Api {
            status: 200,
            message: "Requisição não encontrada".into(),
        }));
        let state = AppState::for_tests(lab, model.clone());

        let outcome = run_analysis(&state, "999");
        assert_eq!(
            outcome,
            AnalysisOutcome::FetchFailed {
                report_text: "**Status Code:** `200`\n\nErro na API: Requisição não encontrada"
                    .into()
            }
        );
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn model_failure_becomes_answer_text() {
        let model = Arc::new(MockModel::scripted(vec![Err(ModelError::Service {
            status: 400,
            body: "bad request".into(),
        })]));
        let state = AppState::for_tests(MockLabApi::new(Ok(report())), model.clone());

        match run_analysis(&state, "123") {
            AnalysisOutcome::Rendered {
                answer_html,
                billed_html,
                ..
            } => {
                assert!(answer_html.contains("Erro ao gerar resposta da IA: "));
                assert!(answer_html.contains("bad request"));
                assert!(billed_html.is_empty());
            }
            other => panic!("expected rendered outcome, got {other:?}"),
        }
        assert_eq!(model.calls(), 1);
    }

    #[test]
    fn failure_answer_prefix() {
        assert_eq!(
            model_failure_answer(&ModelError::NotConfigured),
            "Erro ao gerar resposta da IA: Vertex AI credentials are not configured"
        );
    }
}
