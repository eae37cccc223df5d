//! Shared application state, built once in `run()` and handed to axum.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::lab::{AplisClient, LabApi, LabError};
use crate::pipeline::{
    credential_file_candidates, resolve_credentials, AccessTokenSource, CredentialSource,
    GenerativeModel, LimiterError, ModelError, ModelService, RateLimiter,
    ServiceAccountKey, ServiceAccountTokenSource, StaticToken, UnconfiguredModel, VertexClient,
};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("lab client: {0}")]
    Lab(#[from] LabError),

    #[error("model client: {0}")]
    Model(#[from] ModelError),

    #[error("rate limiter: {0}")]
    Limiter(#[from] LimiterError),
}

/// Everything a request needs: the lab client and the gated model.
pub struct AppState {
    pub lab: Box<dyn LabApi>,
    pub model: ModelService,
}

impl AppState {
    pub fn new(lab: Box<dyn LabApi>, model: ModelService) -> Self {
        Self { lab, model }
    }

    /// Wire the production clients from configuration.
    ///
    /// Blocking HTTP clients are created here, so this must run outside
    /// any tokio runtime.
    pub fn from_config(config: &AppConfig) -> Result<Arc<Self>, StateError> {
        if config.lab_api_password.is_empty() {
            tracing::warn!("LAB_API_PASSWORD is not set; lab lookups will likely be rejected");
        }

        let lab = AplisClient::new(
            &config.lab_api_url,
            &config.lab_api_user,
            &config.lab_api_password,
            config.lab_api_timeout_secs,
        )?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let limiter = RateLimiter::new(config.model_max_calls, config.model_period, clock.clone())?;
        let model = build_model(config)?;

        tracing::info!(
            lab_url = %config.lab_api_url,
            max_calls = config.model_max_calls,
            period_secs = config.model_period.as_secs(),
            "Application state ready"
        );

        Ok(Arc::new(Self::new(
            Box::new(lab),
            ModelService::new(model, Arc::new(limiter), clock),
        )))
    }

    #[cfg(test)]
    pub fn for_tests(
        lab: impl LabApi + 'static,
        model: impl GenerativeModel + 'static,
    ) -> Self {
        let clock = Arc::new(crate::clock::ManualClock::new());
        let limiter = RateLimiter::new(10, std::time::Duration::from_secs(60), clock.clone())
            .unwrap_or_else(|e| panic!("test limiter: {e}"));
        Self::new(
            Box::new(lab),
            ModelService::new(Box::new(model), Arc::new(limiter), clock),
        )
    }
}

/// Resolve credentials and build the Vertex client, or a stand-in that
/// reports "not configured" on every call.
fn build_model(config: &AppConfig) -> Result<Box<dyn GenerativeModel>, StateError> {
    let candidates = credential_file_candidates(&config.credentials_file);
    let resolved = resolve_credentials(
        config.credentials_json.as_deref(),
        &std::env::temp_dir(),
        &candidates,
    );

    let (key, source): (Option<ServiceAccountKey>, Option<CredentialSource>) = match resolved {
        Ok((key, source)) => (Some(key), Some(source)),
        Err(e) => {
            tracing::warn!(error = %e, "No service-account credentials");
            (None, None)
        }
    };

    let project_id = config
        .vertex_project_id
        .clone()
        .or_else(|| key.as_ref().and_then(|k| k.project_id.clone()));

    let tokens: Box<dyn AccessTokenSource> = match (&config.vertex_access_token, key) {
        (Some(token), _) => Box::new(StaticToken(token.clone())),
        (None, Some(key)) => Box::new(
            ServiceAccountTokenSource::new(key, config.vertex_timeout_secs)
                .map_err(ModelError::from)?,
        ),
        (None, None) => return Ok(Box::new(UnconfiguredModel)),
    };

    let Some(project_id) = project_id else {
        tracing::warn!("VERTEX_PROJECT_ID is not set and the credentials carry no project_id");
        return Ok(Box::new(UnconfiguredModel));
    };

    let client = VertexClient::new(
        &project_id,
        &config.vertex_region,
        &config.vertex_model,
        tokens,
        config.vertex_timeout_secs,
    )?;

    tracing::info!(
        project = %project_id,
        region = %config.vertex_region,
        model = %config.vertex_model,
        source = %source.map(|s| s.to_string()).unwrap_or_else(|| "VERTEX_ACCESS_TOKEN".into()),
        "Vertex AI client initialized"
    );

    Ok(Box::new(client))
}
