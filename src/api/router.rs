//! Single-page router: `GET /` renders, `POST /` redirects back to `GET`.

use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Router};
use serde::Deserialize;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::analysis::run_analysis;
use crate::api::error::ApiError;
use crate::api::page::{render_page, PageView};
use crate::core_state::AppState;

/// Query string on `GET /` and form body on `POST /`.
#[derive(Debug, Default, Deserialize)]
pub struct RequisitionParams {
    #[serde(default)]
    pub codrequisicao: String,
}

/// Build the application router.
///
/// Every response carries `Cache-Control: no-store`; each request runs in
/// a span tagged with a fresh request id.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index).post(submit))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "request",
                    request_id = %Uuid::new_v4(),
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(state)
}

/// GET /: empty form, or the analysis for `?codrequisicao=`.
async fn index(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RequisitionParams>,
) -> Result<Html<String>, ApiError> {
    let code = params.codrequisicao.trim().to_string();
    if code.is_empty() {
        return Ok(Html(render_page(&PageView::empty())));
    }

    tracing::info!(code = %code, "Analysing requisition");

    // Lab and model clients block; keep them off the async workers.
    let span = tracing::Span::current();
    let worker_code = code.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        span.in_scope(|| run_analysis(&state, &worker_code))
    })
    .await?;

    Ok(Html(render_page(&PageView::from_outcome(&code, outcome))))
}

/// POST /: redirect to `GET /?codrequisicao=<code>` so a reload does not resubmit.
async fn submit(Form(params): Form<RequisitionParams>) -> Result<Response, ApiError> {
    let code = params.codrequisicao.trim();
    if code.is_empty() {
        return Ok(Html(render_page(&PageView::missing_code())).into_response());
    }

    let location = format!(
        "/?{}",
        serde_urlencoded::to_string(&[("codrequisicao", code)])?
    );
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::api::page::MISSING_CODE_MESSAGE;
    use crate::analysis::ANALYSIS_UNAVAILABLE;
    use crate::lab::{LabError, LabReport, MockLabApi};
    use crate::pipeline::MockModel;

    const ANSWER: &str = "| CodRequisicao | Código | Quantidade |\n| --- | --- | --- |\n| 123 | 40601110 | 1 |";

    fn lab_ok() -> MockLabApi {
        MockLabApi::new(Ok(LabReport {
            text: "**Status Code:** `200`\n\n### Topografia: Pele".into(),
            billed: vec![json!({"codigo": "40601110", "descricao": "Biópsia", "quantidade": 1, "valorTotal": 90})],
        }))
    }

    fn test_app(lab: MockLabApi, model: Arc<MockModel>) -> Router {
        app_router(Arc::new(AppState::for_tests(lab, model)))
    }

    fn get_request(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn form_request(body: &str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn get_without_code_renders_empty_page() {
        let model = Arc::new(MockModel::new(ANSWER));
        let app = test_app(lab_ok(), model.clone());

        let response = app.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");

        let html = body_text(response).await;
        assert!(html.contains("<form method=\"post\""));
        assert!(!html.contains("<h2>"));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn post_with_code_redirects_to_get() {
        let app = test_app(lab_ok(), Arc::new(MockModel::new(ANSWER)));

        let response = app.oneshot(form_request("codrequisicao=00+12%2F3")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/?codrequisicao=00+12%2F3"
        );
    }

    #[tokio::test]
    async fn post_without_code_asks_for_input() {
        let model = Arc::new(MockModel::new(ANSWER));
        let app = test_app(lab_ok(), model.clone());

        let response = app.oneshot(form_request("codrequisicao=")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains(MISSING_CODE_MESSAGE));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn fetch_error_skips_model() {
        let model = Arc::new(MockModel::new(ANSWER));
        let lab = MockLabApi::new(Err(LabError::Transport("connection refused".into())));
        let app = test_app(lab, model.clone());

        let response = app.oneshot(get_request("/?codrequisicao=123")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let html = body_text(response).await;
        assert!(html.contains("Erro de requisição: connection refused"));
        assert!(html.contains(ANALYSIS_UNAVAILABLE));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn get_with_code_renders_analysis() {
        let model = Arc::new(MockModel::new(ANSWER));
        let app = test_app(lab_ok(), model.clone());

        let response = app.oneshot(get_request("/?codrequisicao=123")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");

        let html = body_text(response).await;
        assert!(html.contains("<table>"));
        assert!(html.contains("40601110</td>"));
        assert!(html.contains("<h3>Topografia: Pele</h3>"));
        assert!(html.contains("Procedimentos Cobrados (API)"));
        assert!(html.contains("value=\"123\""));
        assert_eq!(model.calls(), 1);
    }
}
