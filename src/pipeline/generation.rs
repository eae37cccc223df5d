use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;

use super::limiter::RateLimiter;
use super::{GenerativeModel, ModelError};

/// Total model calls per prompt, first attempt included.
pub const MAX_ATTEMPTS: u32 = 4;

/// Backoff before retry `n` (1-based) is `BASE_BACKOFF * 2^(n-1)`: 15s, 30s, 60s.
pub const BASE_BACKOFF: Duration = Duration::from_secs(15);

/// Rate-limited, quota-aware front for a `GenerativeModel`.
///
/// Every attempt first takes a slot from the shared limiter. Quota
/// exhaustion is retried with exponential backoff; any other error
/// returns on the first failure.
pub struct ModelService {
    model: Box<dyn GenerativeModel>,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    base_backoff: Duration,
}

impl ModelService {
    pub fn new(
        model: Box<dyn GenerativeModel>,
        limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            model,
            limiter,
            clock,
            max_attempts: MAX_ATTEMPTS,
            base_backoff: BASE_BACKOFF,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let mut attempt = 0;
        loop {
            self.limiter.acquire();
            attempt += 1;

            match self.model.generate(prompt) {
                Ok(answer) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "Model call succeeded after retry");
                    }
                    return Ok(answer);
                }
                Err(e) if e.is_quota_exhausted() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "Model quota exhausted, retrying"
                    );
                    self.clock.sleep(delay);
                }
                Err(e) => {
                    tracing::error!(attempt, error = %e, "Model call failed");
                    return Err(e);
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::pipeline::vertex::MockModel;

    fn quota() -> Result<String, ModelError> {
        Err(ModelError::QuotaExhausted("RESOURCE_EXHAUSTED".into()))
    }

    fn service(model: Arc<MockModel>, clock: Arc<ManualClock>) -> ModelService {
        let limiter = RateLimiter::new(10, Duration::from_secs(60), clock.clone()).unwrap();
        ModelService::new(Box::new(model), Arc::new(limiter), clock)
    }

    #[test]
    fn quota_exhaustion_is_retried_with_backoff() {
        let clock = Arc::new(ManualClock::new());
        let model = Arc::new(MockModel::scripted(vec![
            quota(),
            quota(),
            quota(),
            Ok("| 1 | 40601110 | 1 |".into()),
        ]));
        let svc = service(model.clone(), clock.clone());

        let answer = svc.generate("prompt").unwrap();
        assert_eq!(answer, "| 1 | 40601110 | 1 |");
        assert_eq!(model.calls(), 4);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(15),
                Duration::from_secs(30),
                Duration::from_secs(60)
            ]
        );
        assert!(clock.elapsed() >= Duration::from_secs(105));
    }

    #[test]
    fn quota_exhaustion_propagates_after_last_attempt() {
        let clock = Arc::new(ManualClock::new());
        let model = Arc::new(MockModel::scripted(vec![quota()]));
        let svc = service(model.clone(), clock.clone());

        let err = svc.generate("prompt").unwrap_err();
        assert!(err.is_quota_exhausted());
        assert_eq!(model.calls(), 4);
        assert_eq!(clock.sleeps().len(), 3);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let clock = Arc::new(ManualClock::new());
        let model = Arc::new(MockModel::scripted(vec![Err(ModelError::Service {
            status: 500,
            body: "internal".into(),
        })]));
        let svc = service(model.clone(), clock.clone());

        let err = svc.generate("prompt").unwrap_err();
        assert!(matches!(err, ModelError::Service { status: 500, .. }));
        assert_eq!(model.calls(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn every_attempt_takes_a_limiter_slot() {
        let clock = Arc::new(ManualClock::new());
        let model = Arc::new(MockModel::scripted(vec![quota(), Ok("ok".into())]));
        let svc = service(model, clock);

        svc.generate("prompt").unwrap();
        assert_eq!(svc.limiter().in_flight(), 2);
    }

    #[test]
    fn limiter_wait_precedes_model_call() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::new(1, Duration::from_secs(10), clock.clone()).unwrap();
        let model = Arc::new(MockModel::new("ok"));
        let svc = ModelService::new(
            Box::new(model.clone()),
            Arc::new(limiter),
            clock.clone(),
        );

        svc.generate("a").unwrap();
        svc.generate("b").unwrap();
        assert_eq!(model.calls(), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(10)]);
    }
}
