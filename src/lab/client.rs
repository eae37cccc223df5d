use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;

use super::report::parse_lab_body;
use super::{LabApi, LabError, LabReport};

/// Protocol version expected by `integracao.php`.
const APLIS_PROTOCOL_VERSION: u8 = 2;

/// Command that returns the full result of a requisition.
const RESULT_COMMAND: &str = "requisicaoResultado";

/// Request envelope for the APLIS integration endpoint.
#[derive(Debug, Serialize)]
pub struct LabRequest<'a> {
    ver: u8,
    cmd: &'a str,
    dat: LabRequestData<'a>,
}

#[derive(Debug, Serialize)]
struct LabRequestData<'a> {
    #[serde(rename = "codRequisicao")]
    cod_requisicao: &'a str,
}

impl<'a> LabRequest<'a> {
    pub fn for_requisition(requisition_code: &'a str) -> Self {
        Self {
            ver: APLIS_PROTOCOL_VERSION,
            cmd: RESULT_COMMAND,
            dat: LabRequestData {
                cod_requisicao: requisition_code,
            },
        }
    }
}

/// Blocking HTTP client for the APLIS lab API (basic auth, one POST per lookup).
pub struct AplisClient {
    url: String,
    username: String,
    password: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl AplisClient {
    pub fn new(
        url: &str,
        username: &str,
        password: &str,
        timeout_secs: u64,
    ) -> Result<Self, LabError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LabError::Transport(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            url: url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            client,
            timeout_secs,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> LabError {
        if e.is_timeout() {
            LabError::Transport(format!("request timed out after {}s", self.timeout_secs))
        } else if e.is_connect() {
            LabError::Transport(format!("cannot connect to {}: {e}", self.url))
        } else {
            LabError::Transport(e.to_string())
        }
    }
}

impl LabApi for AplisClient {
    fn fetch_report(&self, requisition_code: &str) -> Result<LabReport, LabError> {
        let body = LabRequest::for_requisition(requisition_code);

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        let text = response.text().map_err(|e| self.transport_error(e))?;

        tracing::debug!(
            code = requisition_code,
            status,
            body = %text,
            "Lab API raw response"
        );

        parse_lab_body(status, &text)
    }
}

/// Mock lab API for testing. Returns a configurable result.
pub struct MockLabApi {
    result: Result<LabReport, LabError>,
    calls: AtomicUsize,
}

impl MockLabApi {
    pub fn new(result: Result<LabReport, LabError>) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LabApi for MockLabApi {
    fn fetch_report(&self, _requisition_code: &str) -> Result<LabReport, LabError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}
