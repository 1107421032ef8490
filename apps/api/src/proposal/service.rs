//! Proposal service — orchestrates the full generation pipeline.
//!
//! Flow per request: validate → cache lookup → resolve template → build
//! prompt → rate-limit admission → gateway call (with retry) → normalize →
//! cache store → return.
//!
//! Cache hits are free: they consume no rate-limit capacity and trigger no
//! gateway call. Template resolution and prompt building happen before
//! admission so configuration failures never consume capacity either; the
//! built prompt also gives the admission a real length to estimate from.
//!
//! Concurrent misses for one fingerprint may each call the gateway; the
//! last store wins. Admissions are not refunded on failure — the limiter
//! accounts for attempted work.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::llm_client::{Completion, GatewayError, LlmGateway, OpenAiModelConfig};
use crate::proposal::cache::{fingerprint, ResponseCache};
use crate::proposal::models::{ProposalRequest, ProposalResponse};
use crate::proposal::prompt_builder::{self, BuiltPrompt};
use crate::proposal::rate_limiter::RateLimiter;
use crate::proposal::templates::TemplateRegistry;

/// Transient gateway failures are retried up to this many attempts total.
const MAX_GATEWAY_ATTEMPTS: u32 = 3;
/// Unknown gateway failures get a single conservative retry.
const MAX_UNKNOWN_ATTEMPTS: u32 = 2;
const BACKOFF_BASE_MS: u64 = 500;

/// A generated proposal plus whether it was served from cache.
#[derive(Debug, Clone)]
pub struct GeneratedProposal {
    pub proposal: ProposalResponse,
    pub cached: bool,
}

/// Stateless orchestrator over the shared limiter and cache.
/// One instance serves all concurrent requests.
pub struct ProposalService {
    gateway: Arc<dyn LlmGateway>,
    registry: TemplateRegistry,
    limiter: RateLimiter,
    cache: ResponseCache,
    model: OpenAiModelConfig,
}

impl ProposalService {
    pub fn new(
        gateway: Arc<dyn LlmGateway>,
        registry: TemplateRegistry,
        limiter: RateLimiter,
        cache: ResponseCache,
        model: OpenAiModelConfig,
    ) -> Self {
        Self {
            gateway,
            registry,
            limiter,
            cache,
            model,
        }
    }

    pub async fn generate(&self, request: ProposalRequest) -> Result<GeneratedProposal, AppError> {
        validate(&request)?;

        let key = fingerprint(&request);

        if let Some(hit) = self.cache.lookup(&key).await {
            info!("cache hit for proposal request {key}");
            return Ok(GeneratedProposal {
                proposal: hit,
                cached: true,
            });
        }

        let template = self
            .registry
            .resolve(request.project_type)
            .ok_or_else(|| AppError::TemplateNotFound(request.project_type.label().to_string()))?;
        let prompt = prompt_builder::build(template, &request)?;

        let estimated_tokens = estimate_tokens(&prompt, self.model.max_tokens);
        self.limiter
            .admit(estimated_tokens)
            .await
            .map_err(|rejection| AppError::RateLimited {
                retry_after_secs: rejection.retry_after_secs,
            })?;

        let started = Instant::now();
        let completion = self.call_with_retry(&prompt, &key).await?;
        let processing_time = started.elapsed();

        let proposal =
            crate::proposal::normalizer::normalize(&request, &completion, processing_time);
        info!(
            "generated proposal {} for '{}' ({} tokens, {}ms)",
            proposal.id,
            request.job_title.trim(),
            completion.tokens_used,
            proposal.metadata.processing_time_ms
        );

        self.cache.store(&key, &proposal).await;

        Ok(GeneratedProposal {
            proposal,
            cached: false,
        })
    }

    /// Gateway call with the retry policy: transient errors retried with
    /// exponential backoff, unknown errors retried once, auth and invalid
    /// errors surfaced immediately.
    async fn call_with_retry(
        &self,
        prompt: &BuiltPrompt,
        key: &str,
    ) -> Result<Completion, AppError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self
                .gateway
                .complete(&prompt.system, &prompt.user, &self.model)
                .await
            {
                Ok(completion) => return Ok(completion),
                Err(GatewayError::Auth(msg)) => {
                    return Err(AppError::GatewayAuth(format!("request {key}: {msg}")));
                }
                Err(GatewayError::Invalid(msg)) => {
                    return Err(AppError::GatewayRejected(format!("request {key}: {msg}")));
                }
                Err(GatewayError::Transient(msg)) => {
                    if attempt >= MAX_GATEWAY_ATTEMPTS {
                        return Err(AppError::GatewayUnavailable(format!(
                            "request {key} failed after {attempt} attempts: {msg}"
                        )));
                    }
                    warn!("transient gateway error on attempt {attempt} for {key}: {msg}");
                    backoff(attempt).await;
                }
                Err(GatewayError::Unknown(msg)) => {
                    if attempt >= MAX_UNKNOWN_ATTEMPTS {
                        return Err(AppError::GatewayUnavailable(format!(
                            "request {key} failed after {attempt} attempts: {msg}"
                        )));
                    }
                    warn!("unknown gateway error on attempt {attempt} for {key}: {msg}");
                    backoff(attempt).await;
                }
            }
        }
    }
}

/// Rejects requests whose required fields are empty before any rate-limit
/// interaction.
fn validate(request: &ProposalRequest) -> Result<(), AppError> {
    if request.job_title.trim().is_empty() {
        return Err(AppError::InvalidInput("jobTitle cannot be empty".to_string()));
    }
    if request.requirements.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "requirements cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Token cost heuristic: one token per four prompt characters, plus the
/// configured completion budget. Documented in DESIGN.md — the provider
/// gives no ground truth ahead of the call.
fn estimate_tokens(prompt: &BuiltPrompt, max_tokens: u32) -> u32 {
    let prompt_chars = prompt.system.len() + prompt.user.len();
    u32::try_from(prompt_chars / 4)
        .unwrap_or(u32::MAX)
        .saturating_add(max_tokens)
}

/// Exponential backoff: 500ms, 1s, 2s, ...
async fn backoff(attempt: u32) {
    let delay = Duration::from_millis(BACKOFF_BASE_MS * (1 << (attempt - 1)));
    tokio::time::sleep(delay).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, RateLimitConfig};
    use crate::proposal::models::ProjectCategory;
    use crate::proposal::templates::{ProposalTemplate, TemplateRegistry};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    // ── Fake gateway ────────────────────────────────────────────────────────

    enum FakeBehaviour {
        Succeed,
        FailThenSucceed { failures: u32, kind: FailKind },
        AlwaysFail(FailKind),
    }

    #[derive(Clone, Copy)]
    enum FailKind {
        Transient,
        Auth,
        Invalid,
        Unknown,
    }

    struct FakeGateway {
        behaviour: FakeBehaviour,
        calls: AtomicU32,
    }

    impl FakeGateway {
        fn new(behaviour: FakeBehaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn error(kind: FailKind) -> GatewayError {
            match kind {
                FailKind::Transient => GatewayError::Transient("provider hiccup".to_string()),
                FailKind::Auth => GatewayError::Auth("bad key".to_string()),
                FailKind::Invalid => GatewayError::Invalid("policy rejection".to_string()),
                FailKind::Unknown => GatewayError::Unknown("weird".to_string()),
            }
        }
    }

    #[async_trait]
    impl LlmGateway for FakeGateway {
        async fn complete(
            &self,
            _system: &str,
            _user: &str,
            config: &OpenAiModelConfig,
        ) -> Result<Completion, GatewayError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                FakeBehaviour::Succeed => Ok(sample_completion(&config.model)),
                FakeBehaviour::FailThenSucceed { failures, kind } => {
                    if call < *failures {
                        Err(Self::error(*kind))
                    } else {
                        Ok(sample_completion(&config.model))
                    }
                }
                FakeBehaviour::AlwaysFail(kind) => Err(Self::error(*kind)),
            }
        }
    }

    fn sample_completion(model: &str) -> Completion {
        Completion {
            text: "# Landing Page Proposal\n\n- Responsive layout\n\nEstimated Budget: $2,000"
                .to_string(),
            tokens_used: 256,
            model: model.to_string(),
        }
    }

    // ── Builders ────────────────────────────────────────────────────────────

    fn model_config() -> OpenAiModelConfig {
        OpenAiModelConfig {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2000,
            temperature: 0.7,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }

    fn service_with(
        gateway: Arc<FakeGateway>,
        registry: TemplateRegistry,
        max_requests: u32,
    ) -> ProposalService {
        ProposalService::new(
            gateway,
            registry,
            RateLimiter::new(RateLimitConfig {
                enabled: true,
                max_requests_per_minute: max_requests,
                max_tokens_per_minute: 1_000_000,
            }),
            ResponseCache::new(CacheConfig {
                enabled: true,
                ttl_minutes: 60,
                max_entries: 100,
            }),
            model_config(),
        )
    }

    fn request() -> ProposalRequest {
        ProposalRequest {
            job_title: "Landing Page".to_string(),
            requirements: "Build a responsive landing page".to_string(),
            project_type: ProjectCategory::WebDevelopment,
            budget: None,
            timeline: None,
            additional_context: None,
            requirement_items: vec![],
        }
    }

    // ── Tests ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_end_to_end_generation_succeeds() {
        let gateway = FakeGateway::new(FakeBehaviour::Succeed);
        let service = service_with(
            Arc::clone(&gateway),
            TemplateRegistry::builtin().unwrap(),
            10,
        );

        let generated = service.generate(request()).await.unwrap();
        assert!(!generated.cached);
        assert!(!generated.proposal.content.is_empty());
        assert_eq!(generated.proposal.metadata.model, "gpt-4o-mini");
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_identical_request_served_from_cache_without_admission() {
        let gateway = FakeGateway::new(FakeBehaviour::Succeed);
        // max_requests = 1: if the second call consumed capacity it would fail.
        let service = service_with(
            Arc::clone(&gateway),
            TemplateRegistry::builtin().unwrap(),
            1,
        );

        let first = service.generate(request()).await.unwrap();
        let second = service.generate(request()).await.unwrap();

        assert!(second.cached);
        assert_eq!(first.proposal.id, second.proposal.id);
        assert_eq!(gateway.calls(), 1, "cache hit must not call the gateway");
    }

    #[tokio::test]
    async fn test_invalid_input_fails_before_any_admission() {
        let gateway = FakeGateway::new(FakeBehaviour::Succeed);
        let service = service_with(
            Arc::clone(&gateway),
            TemplateRegistry::builtin().unwrap(),
            1,
        );

        let mut bad = request();
        bad.job_title = "  ".to_string();
        let err = service.generate(bad).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(gateway.calls(), 0);

        let mut bad = request();
        bad.requirements = String::new();
        assert!(matches!(
            service.generate(bad).await.unwrap_err(),
            AppError::InvalidInput(_)
        ));

        // Capacity of one is still intact, so a valid request succeeds.
        assert!(service.generate(request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_requirements_rejected_even_with_requirement_items() {
        let gateway = FakeGateway::new(FakeBehaviour::Succeed);
        let service = service_with(
            Arc::clone(&gateway),
            TemplateRegistry::builtin().unwrap(),
            10,
        );

        let mut bad = request();
        bad.requirements = String::new();
        bad.requirement_items = vec!["SEO friendly".to_string()];

        let err = service.generate(bad).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_template_not_found_consumes_no_capacity_and_caches_nothing() {
        let gateway = FakeGateway::new(FakeBehaviour::Succeed);
        // Registry without a design template.
        let mut registry = TemplateRegistry::new();
        registry
            .register(ProposalTemplate {
                id: "web-development-v1".to_string(),
                name: "Web".to_string(),
                category: ProjectCategory::WebDevelopment,
                system_prompt: "sys".to_string(),
                user_template: "{job_title}: {requirements}".to_string(),
                variables: vec!["job_title".to_string(), "requirements".to_string()],
            })
            .unwrap();
        let service = service_with(Arc::clone(&gateway), registry, 1);

        let mut design = request();
        design.project_type = ProjectCategory::Design;

        let err = service.generate(design.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::TemplateNotFound(_)));
        assert_eq!(gateway.calls(), 0);

        // Nothing cached: the same request fails the same way again.
        assert!(matches!(
            service.generate(design).await.unwrap_err(),
            AppError::TemplateNotFound(_)
        ));

        // Capacity of one is still intact.
        assert!(service.generate(request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_rate_limited_request_carries_retry_hint() {
        let gateway = FakeGateway::new(FakeBehaviour::Succeed);
        let service = service_with(
            Arc::clone(&gateway),
            TemplateRegistry::builtin().unwrap(),
            1,
        );

        assert!(service.generate(request()).await.is_ok());

        let mut other = request();
        other.job_title = "Another Project".to_string();
        let err = service.generate(other).await.unwrap_err();
        match err {
            AppError::RateLimited { retry_after_secs } => {
                assert!(retry_after_secs >= 1 && retry_after_secs <= 60);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
        assert_eq!(gateway.calls(), 1, "rejected request must not reach the gateway");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retried_until_success() {
        let gateway = FakeGateway::new(FakeBehaviour::FailThenSucceed {
            failures: 2,
            kind: FailKind::Transient,
        });
        let service = service_with(
            Arc::clone(&gateway),
            TemplateRegistry::builtin().unwrap(),
            10,
        );

        let generated = service.generate(request()).await.unwrap();
        assert!(!generated.cached);
        assert_eq!(gateway.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_exhaust_retry_budget() {
        let gateway = FakeGateway::new(FakeBehaviour::AlwaysFail(FailKind::Transient));
        let service = service_with(
            Arc::clone(&gateway),
            TemplateRegistry::builtin().unwrap(),
            10,
        );

        let err = service.generate(request()).await.unwrap_err();
        assert!(matches!(err, AppError::GatewayUnavailable(_)));
        assert_eq!(gateway.calls(), MAX_GATEWAY_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_auth_and_invalid_errors_are_never_retried() {
        let cases: [(FailKind, fn(&AppError) -> bool); 2] = [
            (FailKind::Auth, |e| matches!(e, AppError::GatewayAuth(_))),
            (FailKind::Invalid, |e| matches!(e, AppError::GatewayRejected(_))),
        ];
        for (kind, check) in cases {
            let gateway = FakeGateway::new(FakeBehaviour::AlwaysFail(kind));
            let service = service_with(
                Arc::clone(&gateway),
                TemplateRegistry::builtin().unwrap(),
                10,
            );
            let err = service.generate(request()).await.unwrap_err();
            assert!(check(&err), "unexpected error {err:?}");
            assert_eq!(gateway.calls(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_errors_retried_exactly_once() {
        let gateway = FakeGateway::new(FakeBehaviour::AlwaysFail(FailKind::Unknown));
        let service = service_with(
            Arc::clone(&gateway),
            TemplateRegistry::builtin().unwrap(),
            10,
        );

        let err = service.generate(request()).await.unwrap_err();
        assert!(matches!(err, AppError::GatewayUnavailable(_)));
        assert_eq!(gateway.calls(), MAX_UNKNOWN_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_failed_generation_is_not_cached() {
        let gateway = FakeGateway::new(FakeBehaviour::FailThenSucceed {
            failures: 1,
            kind: FailKind::Auth,
        });
        let service = service_with(
            Arc::clone(&gateway),
            TemplateRegistry::builtin().unwrap(),
            10,
        );

        assert!(service.generate(request()).await.is_err());

        // Second attempt reaches the gateway again (no poisoned cache entry)
        // and now succeeds.
        let generated = service.generate(request()).await.unwrap();
        assert!(!generated.cached);
        assert_eq!(gateway.calls(), 2);
    }

    #[test]
    fn test_estimate_tokens_uses_quarter_character_heuristic() {
        let prompt = BuiltPrompt {
            system: "a".repeat(200),
            user: "b".repeat(200),
        };
        assert_eq!(estimate_tokens(&prompt, 2000), 100 + 2000);
    }

    #[test]
    fn test_estimate_tokens_saturates_instead_of_overflowing() {
        let prompt = BuiltPrompt {
            system: "a".repeat(200),
            user: String::new(),
        };
        assert_eq!(estimate_tokens(&prompt, u32::MAX), u32::MAX);
    }
}
