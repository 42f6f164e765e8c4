//! Provider verification.
//!
//! Replays each interaction's request against a live provider and matches
//! the actual response against the expectation. Interactions are verified
//! independently and concurrently; one failing or unreachable interaction
//! never prevents the others from being reported.

use crate::contract::{Contract, Interaction, Request, Response};
use crate::error::{ErrorCategory, PactResult};
use crate::matcher::{JsonPath, Matcher, Mismatch, MismatchKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Response returned by the live provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, names lowercased
    pub headers: BTreeMap<String, String>,
    /// Parsed body, if any
    pub body: Option<Value>,
}

impl ProviderResponse {
    /// Create a response with no headers and no body.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Add a header. The name is stored lowercased.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Issues an interaction's request against the live provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Send `request` and return what the provider answered.
    async fn call(&self, request: &Request) -> PactResult<ProviderResponse>;
}

/// Establishes a named provider state before an interaction is replayed.
#[async_trait]
pub trait StateSetup: Send + Sync {
    /// Put the provider into `state`.
    async fn setup(&self, state: &str) -> PactResult<()>;
}

/// State setup that does nothing; for providers without fixtures.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStateSetup;

#[async_trait]
impl StateSetup for NoStateSetup {
    async fn setup(&self, _state: &str) -> PactResult<()> {
        Ok(())
    }
}

/// Result of verifying one interaction. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    /// Description of the verified interaction
    pub interaction_description: String,
    /// Whether the provider satisfied the interaction
    pub passed: bool,
    /// Every mismatch found
    pub mismatches: Vec<Mismatch>,
}

impl VerificationOutcome {
    /// Outcome from a list of structural mismatches.
    #[must_use]
    pub fn from_mismatches(description: impl Into<String>, mismatches: Vec<Mismatch>) -> Self {
        Self {
            interaction_description: description.into(),
            passed: mismatches.is_empty(),
            mismatches,
        }
    }

    /// Failed outcome for an interaction whose run could not complete.
    #[must_use]
    pub fn run_fatal(description: impl Into<String>, kind: MismatchKind, detail: &str) -> Self {
        let expected = match kind {
            MismatchKind::StateSetupFailed => "provider state to be established",
            _ => "a response from the provider",
        };
        Self::from_mismatches(
            description,
            vec![Mismatch::new(
                JsonPath::root(),
                kind,
                expected,
                Some(Value::String(detail.to_string())),
            )],
        )
    }

    /// Whether this outcome records a run-fatal failure rather than mismatches.
    #[must_use]
    pub fn is_run_fatal(&self) -> bool {
        self.mismatches.iter().any(|mismatch| {
            matches!(
                mismatch.kind,
                MismatchKind::ProviderUnreachable
                    | MismatchKind::StateSetupFailed
                    | MismatchKind::VerificationAborted
            )
        })
    }
}

/// Outcomes of one verification run over a whole contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    /// Unique run identifier
    pub run_id: Uuid,
    /// Consumer name
    pub consumer: String,
    /// Provider name
    pub provider: String,
    /// One outcome per interaction, in contract order
    pub outcomes: Vec<VerificationOutcome>,
    /// When the run finished
    pub verified_at: DateTime<Utc>,
}

impl VerificationReport {
    /// Logical AND over all outcomes. Vacuously true for an empty contract.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.passed)
    }

    /// Outcomes that failed.
    pub fn failures(&self) -> impl Iterator<Item = &VerificationOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.passed)
    }

    /// Whether any failure was run-fatal (transport or state setup).
    #[must_use]
    pub fn has_run_fatal(&self) -> bool {
        self.outcomes.iter().any(VerificationOutcome::is_run_fatal)
    }

    /// Human readable summary listing every interaction and mismatch.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Verifying a pact between {} and {}\n",
            self.consumer, self.provider
        );
        for outcome in &self.outcomes {
            let status = if outcome.passed { "OK" } else { "FAILED" };
            let _ = writeln!(out, "  {} ... {status}", outcome.interaction_description);
            for mismatch in &outcome.mismatches {
                let _ = writeln!(out, "    - {mismatch}");
            }
        }
        let failed = self.failures().count();
        let _ = write!(
            out,
            "{} interactions, {failed} failed",
            self.outcomes.len()
        );
        out
    }
}

/// Verifier settings.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Timeout applied to each provider call and each state setup
    pub timeout: Duration,
    /// Maximum interactions verified at once; zero is treated as one
    pub max_concurrency: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_concurrency: 4,
        }
    }
}

impl VerifierConfig {
    /// Set the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the concurrency limit (at least 1).
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }
}

/// Replays interactions against a live provider.
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    config: VerifierConfig,
}

impl Verifier {
    /// Create a verifier.
    #[must_use]
    pub const fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    /// Verifier settings.
    #[must_use]
    pub const fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify one interaction without provider state setup.
    ///
    /// A transport error or timeout yields a failed outcome with a
    /// `provider unreachable` mismatch. A request the client refuses to
    /// build fails with `invalid request`, which is not run-fatal.
    #[instrument(skip_all, fields(interaction = %interaction.description))]
    pub async fn verify(
        &self,
        interaction: &Interaction,
        client: &dyn ProviderClient,
    ) -> VerificationOutcome {
        let call = tokio::time::timeout(self.config.timeout, client.call(&interaction.request));
        let response = match call.await {
            Ok(Ok(response)) => response,
            Ok(Err(err))
                if matches!(
                    err.category(),
                    ErrorCategory::Contract | ErrorCategory::Configuration
                ) =>
            {
                warn!(error = %err, "Recorded request cannot be sent");
                return VerificationOutcome::from_mismatches(
                    &interaction.description,
                    vec![Mismatch::new(
                        JsonPath::root().key("request"),
                        MismatchKind::InvalidRequest,
                        format!("{} {}", interaction.request.method, interaction.request.path),
                        Some(Value::String(err.to_string())),
                    )],
                );
            }
            Ok(Err(err)) => {
                warn!(error = %err, "Provider call failed");
                return VerificationOutcome::run_fatal(
                    &interaction.description,
                    MismatchKind::ProviderUnreachable,
                    &err.to_string(),
                );
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout_ms(), "Provider call timed out");
                return VerificationOutcome::run_fatal(
                    &interaction.description,
                    MismatchKind::ProviderUnreachable,
                    &format!("timed out after {}ms", self.timeout_ms()),
                );
            }
        };

        let mismatches = compare(&interaction.response, &response);
        debug!(mismatches = mismatches.len(), "Interaction compared");
        VerificationOutcome::from_mismatches(&interaction.description, mismatches)
    }

    /// Verify every interaction of `contract`.
    ///
    /// Each interaction first gets its provider state (if declared), then is
    /// replayed. Interactions run concurrently up to the configured limit and
    /// the report lists exactly one outcome per interaction, in contract order.
    #[instrument(skip_all, fields(contract = %contract.pair(), interactions = contract.interactions.len()))]
    pub async fn verify_all(
        &self,
        contract: &Contract,
        client: Arc<dyn ProviderClient>,
        state: Arc<dyn StateSetup>,
    ) -> VerificationReport {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, interaction) in contract.interactions.iter().cloned().enumerate() {
            let verifier = self.clone();
            let client = Arc::clone(&client);
            let state = Arc::clone(&state);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = verifier
                    .run_interaction(&interaction, client.as_ref(), state.as_ref())
                    .await;
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<VerificationOutcome>> = vec![None; contract.interactions.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(outcome);
                    }
                }
                Err(err) => error!(error = %err, "Verification task failed"),
            }
        }

        let outcomes: Vec<VerificationOutcome> = slots
            .into_iter()
            .zip(&contract.interactions)
            .map(|(slot, interaction)| {
                slot.unwrap_or_else(|| {
                    VerificationOutcome::run_fatal(
                        &interaction.description,
                        MismatchKind::VerificationAborted,
                        "verification task ended without a result",
                    )
                })
            })
            .collect();

        let report = VerificationReport {
            run_id: Uuid::new_v4(),
            consumer: contract.consumer.name.clone(),
            provider: contract.provider.name.clone(),
            outcomes,
            verified_at: Utc::now(),
        };
        info!(
            passed = report.passed(),
            failed = report.failures().count(),
            "Contract verified"
        );
        report
    }

    async fn run_interaction(
        &self,
        interaction: &Interaction,
        client: &dyn ProviderClient,
        state: &dyn StateSetup,
    ) -> VerificationOutcome {
        if let Some(provider_state) = &interaction.provider_state {
            let setup = tokio::time::timeout(self.config.timeout, state.setup(provider_state));
            let failure = match setup.await {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(_) => Some(format!("timed out after {}ms", self.timeout_ms())),
            };
            if let Some(detail) = failure {
                warn!(
                    interaction = %interaction.description,
                    state = %provider_state,
                    %detail,
                    "Provider state setup failed"
                );
                return VerificationOutcome::run_fatal(
                    &interaction.description,
                    MismatchKind::StateSetupFailed,
                    &detail,
                );
            }
        }
        self.verify(interaction, client).await
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Compare an actual provider response with the expected response.
///
/// Status is compared exactly. Only headers listed in the expectation are
/// checked, by case-insensitive name. The body uses matcher semantics when
/// the expectation contains a matcher and exact equality otherwise.
#[must_use]
pub fn compare(expected: &Response, actual: &ProviderResponse) -> Vec<Mismatch> {
    let root = JsonPath::root();
    let mut mismatches = Vec::new();

    if expected.status != actual.status {
        mismatches.push(Mismatch::new(
            root.key("status"),
            MismatchKind::StatusDiffers,
            expected.status.to_string(),
            Some(Value::from(actual.status)),
        ));
    }

    let headers = root.key("headers");
    for (name, template) in &expected.headers {
        let path = headers.key(name.as_str());
        match actual.header(name) {
            Some(value) => mismatches.extend(
                template
                    .matches_at(&Value::String(value.to_string()), &path)
                    .into_mismatches(),
            ),
            None => mismatches.push(Mismatch::new(
                path,
                MismatchKind::MissingHeader,
                template.describe(),
                None,
            )),
        }
    }

    if let Some(template) = &expected.body {
        let path = root.key("body");
        match &actual.body {
            Some(body) if template.has_matchers() => {
                mismatches.extend(template.matches_at(body, &path).into_mismatches());
            }
            Some(body) => mismatches.extend(
                Matcher::exact(template.example())
                    .matches_at(body, &path)
                    .into_mismatches(),
            ),
            None => mismatches.push(Mismatch::new(
                path,
                MismatchKind::MissingBody,
                template.describe(),
                None,
            )),
        }
    }

    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PactError;
    use crate::matcher::{Template, ValueKind};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticProvider(ProviderResponse);

    #[async_trait]
    impl ProviderClient for StaticProvider {
        async fn call(&self, _request: &Request) -> PactResult<ProviderResponse> {
            Ok(self.0.clone())
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl ProviderClient for SlowProvider {
        async fn call(&self, _request: &Request) -> PactResult<ProviderResponse> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ProviderResponse::new(200))
        }
    }

    struct CountingState(AtomicUsize);

    #[async_trait]
    impl StateSetup for CountingState {
        async fn setup(&self, state: &str) -> PactResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            if state == "broken" {
                return Err(PactError::state_setup(state, "no fixture"));
            }
            Ok(())
        }
    }

    fn json_response(status: u16, body: Value) -> ProviderResponse {
        ProviderResponse::new(status)
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_body(body)
    }

    #[test]
    fn test_compare_status_and_headers() {
        let expected = Response::new(200)
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_header("X-Trace", Template::from(Matcher::regex("[0-9a-f]+", "ab12")));
        let actual = ProviderResponse::new(201).with_header("content-type", "application/json; charset=utf-8");

        let mismatches = compare(&expected, &actual);
        let kinds: Vec<&MismatchKind> = mismatches.iter().map(|m| &m.kind).collect();
        assert_eq!(kinds, vec![&MismatchKind::StatusDiffers, &MismatchKind::MissingHeader]);
        assert_eq!(mismatches[1].path.to_string(), "$.headers.X-Trace");
    }

    #[test]
    fn test_compare_ignores_unlisted_headers() {
        let expected = Response::new(200);
        let actual = ProviderResponse::new(200).with_header("X-Powered-By", "Express");
        assert!(compare(&expected, &actual).is_empty());
    }

    #[test]
    fn test_compare_plain_body_is_exact() {
        let expected = Response::new(200).with_body(json!({"error": "Not found"}));

        let same = json_response(200, json!({"error": "Not found"}));
        assert!(compare(&expected, &same).is_empty());

        let extra = json_response(200, json!({"error": "Not found", "code": 1}));
        let mismatches = compare(&expected, &extra);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].kind, MismatchKind::ValueDiffers);
        assert_eq!(mismatches[0].path.to_string(), "$.body");
    }

    #[test]
    fn test_compare_missing_body() {
        let expected = Response::new(200).with_body(Template::object([(
            "id",
            Matcher::type_of(ValueKind::Number),
        )]));
        let mismatches = compare(&expected, &ProviderResponse::new(200));
        assert_eq!(mismatches[0].kind, MismatchKind::MissingBody);
    }

    #[tokio::test]
    async fn test_verify_timeout_is_unreachable() {
        let verifier =
            Verifier::new(VerifierConfig::default().with_timeout(Duration::from_millis(20)));
        let interaction = Interaction::new("slow", Request::get("/slow"), Response::new(200));

        let outcome = verifier.verify(&interaction, &SlowProvider).await;
        assert!(!outcome.passed);
        assert!(outcome.is_run_fatal());
        assert_eq!(outcome.mismatches[0].kind, MismatchKind::ProviderUnreachable);
    }

    #[tokio::test]
    async fn test_verify_all_reports_every_interaction() {
        let contract = Contract::new("web-app", "user-service")
            .with_interaction(
                Interaction::new("ok", Request::get("/a"), Response::new(200)).given("fine"),
            )
            .with_interaction(
                Interaction::new("state fails", Request::get("/b"), Response::new(200))
                    .given("broken"),
            )
            .with_interaction(Interaction::new("wrong status", Request::get("/c"), Response::new(404)));

        let state = Arc::new(CountingState(AtomicUsize::new(0)));
        let report = Verifier::default()
            .verify_all(
                &contract,
                Arc::new(StaticProvider(ProviderResponse::new(200))),
                state.clone(),
            )
            .await;

        assert_eq!(report.outcomes.len(), 3);
        assert!(report.outcomes[0].passed);
        assert_eq!(report.outcomes[1].mismatches[0].kind, MismatchKind::StateSetupFailed);
        assert_eq!(report.outcomes[2].mismatches[0].kind, MismatchKind::StatusDiffers);
        assert!(!report.passed());
        assert!(report.has_run_fatal());
        assert_eq!(state.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_contract_passes() {
        let report = Verifier::default()
            .verify_all(
                &Contract::new("a", "b"),
                Arc::new(StaticProvider(ProviderResponse::new(500))),
                Arc::new(NoStateSetup),
            )
            .await;
        assert!(report.outcomes.is_empty());
        assert!(report.passed());
    }

    #[test]
    fn test_summary_lists_mismatch_paths() {
        let report = VerificationReport {
            run_id: Uuid::nil(),
            consumer: "web-app".to_string(),
            provider: "user-service".to_string(),
            outcomes: vec![VerificationOutcome::from_mismatches(
                "a request for user 123",
                vec![Mismatch::new(
                    JsonPath::root().key("body").key("role"),
                    MismatchKind::MissingField,
                    "like \"admin\"",
                    None,
                )],
            )],
            verified_at: Utc::now(),
        };

        let summary = report.summary();
        assert!(summary.contains("a request for user 123 ... FAILED"));
        assert!(summary.contains("$.body.role: missing field"));
        assert!(summary.ends_with("1 interactions, 1 failed"));
    }

    struct RejectingClient;

    #[async_trait]
    impl ProviderClient for RejectingClient {
        async fn call(&self, request: &Request) -> PactResult<ProviderResponse> {
            Err(PactError::invalid_contract(format!(
                "unsupported method '{}'",
                request.method
            )))
        }
    }

    #[tokio::test]
    async fn test_unbuildable_request_is_not_run_fatal() {
        let interaction = Interaction::new("odd", Request::new("BR EW", "/x"), Response::new(200));
        let outcome = Verifier::default().verify(&interaction, &RejectingClient).await;

        assert!(!outcome.passed);
        assert!(!outcome.is_run_fatal());
        assert_eq!(outcome.mismatches[0].kind, MismatchKind::InvalidRequest);
        assert_eq!(outcome.mismatches[0].path.to_string(), "$.request");
    }

    #[tokio::test]
    async fn test_zero_concurrency_in_literal_config_still_runs() {
        let verifier = Verifier::new(VerifierConfig {
            timeout: Duration::from_millis(50),
            max_concurrency: 0,
        });
        let contract = Contract::new("web-app", "user-service")
            .with_interaction(Interaction::new("a", Request::get("/a"), Response::new(200)))
            .with_interaction(Interaction::new("b", Request::get("/b"), Response::new(200)));

        let report = tokio::time::timeout(
            Duration::from_secs(2),
            verifier.verify_all(
                &contract,
                Arc::new(StaticProvider(ProviderResponse::new(200))),
                Arc::new(NoStateSetup),
            ),
        )
        .await
        .unwrap();
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.passed());
    }

    #[test]
    fn test_config_clamps_concurrency() {
        let config = VerifierConfig::default().with_max_concurrency(0);
        assert_eq!(config.max_concurrency, 1);
    }
}
