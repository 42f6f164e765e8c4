//! Property-based tests for the contract model, matchers, resolver and gate.
//!
//! Tests validate:
//! - Property 1: Exact matching is reflexive
//! - Property 2: Plain objects tolerate extra keys
//! - Property 3: Missing keys are reported at their path
//! - Property 4: Type matching accepts any value of the same kind
//! - Property 5: Mismatches are accumulated, never short-circuited
//! - Property 6: Regex examples satisfy their own pattern
//! - Property 7: Explicit versions win and the suffix comes last
//! - Property 8: Deployable iff every relevant contract is verified
//! - Property 9: One outcome per interaction, in order
//! - Property 10: Contract documents preserve matchers
//! - Property 11: Exact matching rejects every other value
//! - Property 12: `like` objects tolerate extra keys
//! - Property 13: `like` objects report missing keys at their path

use async_trait::async_trait;
use cdct_pact::{
    CiContext, Clock, CompatibilityRecord, Contract, ContractId, ContractRevision, ContractStore,
    EntryStatus, Interaction, JsonPath, Matcher, MatrixEntry, MismatchKind, NoStateSetup,
    PactResult, ProviderClient, ProviderResponse, Request, Response, Template, VcsLookup,
    VerificationRecord, Verifier, VerifierConfig, VersionOverrides, VersionResolver,
};
use cdct_test_utils::{
    json_key_strategy, json_scalar_strategy, json_value_strategy, service_name_strategy,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{Value, json};
use std::sync::Arc;

// Strategy for generating flat JSON objects with at least one key
fn object_strategy() -> impl Strategy<Value = serde_json::Map<String, Value>> {
    prop::collection::btree_map(json_key_strategy(), json_scalar_strategy(), 1..6)
        .prop_map(|map| map.into_iter().collect())
}

struct NoVcs;

impl VcsLookup for NoVcs {
    fn short_hash(&self) -> Option<String> {
        None
    }
}

struct EpochClock;

impl Clock for EpochClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }
}

/// Answers every request with `{"index": <n>}` where `n` is the last path segment.
struct EchoProvider;

#[async_trait]
impl ProviderClient for EchoProvider {
    async fn call(&self, request: &Request) -> PactResult<ProviderResponse> {
        let index: i64 = request
            .path
            .rsplit('/')
            .next()
            .and_then(|segment| segment.parse().ok())
            .unwrap_or(-1);
        Ok(ProviderResponse::new(200).with_body(json!({"index": index})))
    }
}

fn matrix_entry(index: usize, verification: Option<(bool, i64)>) -> MatrixEntry {
    let revised_at = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
    let id = ContractId::new(format!("consumer-{index}"), "user-service", "1.0.0");
    let verification = verification.map(|(success, offset)| VerificationRecord {
        contract: id.clone(),
        provider_version: "v1".to_string(),
        provider_branch: "main".to_string(),
        success,
        verified_at: revised_at + Duration::minutes(offset),
    });
    MatrixEntry::new(ContractRevision { id, revised_at }, verification)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// **Property 1: Exact matching is reflexive**
    /// *For any* JSON value, an exact matcher built from it SHALL accept it.
    #[test]
    fn prop_exact_is_reflexive(value in json_value_strategy()) {
        prop_assert!(Matcher::exact(value.clone()).matches(&value).is_ok());
    }

    /// **Property 2: Plain objects tolerate extra keys**
    /// *For any* object used as a literal template, the same object with
    /// additional keys SHALL still match.
    #[test]
    fn prop_object_ignores_extra_keys(
        expected in object_strategy(),
        extra in object_strategy(),
    ) {
        let template = Template::from(Value::Object(expected.clone()));
        let mut actual = extra;
        actual.extend(expected);
        prop_assert!(template.matches(&Value::Object(actual)).is_ok());
    }

    /// **Property 3: Missing keys are reported at their path**
    /// *For any* object template, removing one key from the actual value
    /// SHALL produce exactly one `missing field` mismatch at that key.
    #[test]
    fn prop_missing_key_reported(
        expected in object_strategy(),
        pick in any::<prop::sample::Index>(),
    ) {
        let keys: Vec<String> = expected.keys().cloned().collect();
        let removed = pick.get(&keys).clone();
        let template = Template::from(Value::Object(expected.clone()));
        let mut actual = expected;
        actual.remove(&removed);

        let result = template.matches_at(&Value::Object(actual), &JsonPath::root().key("body"));
        prop_assert_eq!(result.mismatches().len(), 1);
        prop_assert_eq!(&result.mismatches()[0].kind, &MismatchKind::MissingField);
        prop_assert_eq!(result.mismatches()[0].path.to_string(), format!("$.body.{removed}"));
    }

    /// **Property 4: Type matching accepts any value of the same kind**
    /// *For any* pair of integers or strings, `like(a)` SHALL accept `b` and
    /// SHALL reject a value of another kind with `type differs`.
    #[test]
    fn prop_like_matches_by_kind(
        a in any::<i64>(),
        b in any::<i64>(),
        s in "[a-z]{0,10}",
        t in "[a-z]{0,10}",
    ) {
        prop_assert!(Matcher::like(a).matches(&json!(b)).is_ok());
        prop_assert!(Matcher::like(s.clone()).matches(&json!(t)).is_ok());

        let result = Matcher::like(a).matches(&json!(s));
        prop_assert_eq!(result.mismatches().len(), 1);
        let is_type_differs = matches!(result.mismatches()[0].kind, MismatchKind::TypeDiffers { .. });
        prop_assert!(is_type_differs);
    }

    /// **Property 5: Mismatches are accumulated**
    /// *For any* set of integer fields, a response with every field of the
    /// wrong type SHALL report one mismatch per field.
    #[test]
    fn prop_mismatches_accumulate(
        keys in prop::collection::btree_set(json_key_strategy(), 1..8),
    ) {
        let template = Template::object(keys.iter().map(|k| (k.clone(), Matcher::integer(1))));
        let actual = Value::Object(
            keys.iter().map(|k| (k.clone(), json!("not a number"))).collect(),
        );
        prop_assert_eq!(template.matches(&actual).mismatches().len(), keys.len());
    }

    /// **Property 6: Regex examples satisfy their own pattern**
    /// *For any* generated identifier, a regex matcher whose example is that
    /// identifier SHALL validate and accept it.
    #[test]
    fn prop_regex_example_matches(example in "[a-z]{1,8}@[a-z]{1,8}\\.com") {
        let matcher = Matcher::regex("[a-z]+@[a-z]+\\.com", example.clone());
        prop_assert!(matcher.validate().is_ok());
        prop_assert!(matcher.matches(&json!(example)).is_ok());
        let padded = format!(" {example}");
        prop_assert!(!matcher.matches(&json!(padded)).is_ok());
    }

    /// **Property 7: Explicit versions win and the suffix comes last**
    /// *For any* explicit version and CI commit, the resolved version SHALL be
    /// `<explicit>-<suffix>` and the branch SHALL appear in the tags.
    #[test]
    fn prop_version_precedence(
        name in service_name_strategy(),
        explicit in "[0-9]\\.[0-9]{1,2}\\.[0-9]{1,2}",
        sha in "[0-9a-f]{40}",
        suffix in "[a-z]{1,6}",
        branch in "(main|develop|feature/[a-z]{1,8})",
    ) {
        let resolver = VersionResolver::new(Arc::new(NoVcs), Arc::new(EpochClock));
        let ci = CiContext::from_lookup(|var| match var {
            "GITHUB_SHA" => Some(sha.clone()),
            "GITHUB_REF_NAME" => Some(branch.clone()),
            _ => None,
        });
        let overrides = VersionOverrides {
            version: Some(explicit.clone()),
            suffix: Some(suffix.clone()),
            ..VersionOverrides::default()
        };

        let resolved = resolver.resolve(&name, &overrides, &ci);
        prop_assert_eq!(resolved.version, format!("{explicit}-{suffix}"));
        prop_assert!(resolved.tags.contains(&branch));
        prop_assert_eq!(resolved.branch, branch);

        let from_ci = resolver.resolve(&name, &VersionOverrides::default(), &ci);
        prop_assert_eq!(from_ci.version, sha[..7].to_string());
    }

    /// **Property 8: Deployable iff every relevant contract is verified**
    /// *For any* matrix, the record SHALL be deployable exactly when every
    /// entry has a passing record no older than the contract revision, with
    /// one reason per blocking entry.
    #[test]
    fn prop_can_deploy_requires_all_verified(
        rows in prop::collection::vec(
            prop::option::of((any::<bool>(), -30i64..30)),
            0..8,
        ),
    ) {
        let matrix: Vec<MatrixEntry> = rows
            .iter()
            .enumerate()
            .map(|(index, row)| matrix_entry(index, *row))
            .collect();
        let expected_blocking = matrix
            .iter()
            .filter(|entry| entry.status() != EntryStatus::Verified)
            .count();
        let all_verified = rows
            .iter()
            .all(|row| matches!(row, Some((true, offset)) if *offset >= 0));

        let record = CompatibilityRecord::from_matrix("user-service", "v1", "test", matrix);
        prop_assert_eq!(record.deployable, all_verified);
        prop_assert_eq!(record.reasons.len(), expected_blocking);
    }

    /// **Property 9: One outcome per interaction, in order**
    /// *For any* interaction count and failing subset, `verify_all` SHALL
    /// return exactly one outcome per interaction in declaration order, failed
    /// exactly where the expectation disagrees with the provider.
    #[test]
    fn prop_verify_all_one_outcome_each(
        failing in prop::collection::vec(any::<bool>(), 1..12),
        concurrency in 1usize..5,
    ) {
        let contract = failing.iter().enumerate().fold(
            Contract::new("web-app", "user-service"),
            |contract, (index, fails)| {
                let expected = if *fails { -1 } else { i64::try_from(index).unwrap() };
                contract.with_interaction(Interaction::new(
                    format!("interaction {index}"),
                    Request::get(format!("/items/{index}")),
                    Response::new(200).with_body(Template::object([("index", Matcher::exact(expected))])),
                ))
            },
        );

        let verifier = Verifier::new(VerifierConfig::default().with_max_concurrency(concurrency));
        let report = tokio_test::block_on(verifier.verify_all(
            &contract,
            Arc::new(EchoProvider),
            Arc::new(NoStateSetup),
        ));

        prop_assert_eq!(report.outcomes.len(), failing.len());
        for (index, (outcome, fails)) in report.outcomes.iter().zip(&failing).enumerate() {
            prop_assert_eq!(&outcome.interaction_description, &format!("interaction {index}"));
            prop_assert_eq!(outcome.passed, !fails);
        }
    }

    /// **Property 10: Contract documents preserve matchers**
    /// *For any* participants and example values, a written document SHALL
    /// read back as the same contract.
    #[test]
    fn prop_document_preserves_matchers(
        consumer in service_name_strategy(),
        provider in service_name_strategy(),
        id in any::<i64>(),
        name in "[A-Za-z ]{1,16}",
    ) {
        let contract = Contract::new(consumer, provider).with_interaction(Interaction::new(
            "get item",
            Request::get("/items/1"),
            Response::new(200).with_body(Template::object([
                ("id", Matcher::integer(id)),
                ("name", Matcher::like(name)),
            ])),
        ));

        let document = ContractStore::to_document(&contract).unwrap();
        prop_assert_eq!(ContractStore::from_document(&document).unwrap(), contract);
    }

    /// **Property 11: Exact matching rejects every other value**
    /// *For any* two different JSON values, an exact matcher built from the
    /// first SHALL reject the second with one `value differs` mismatch.
    #[test]
    fn prop_exact_rejects_other_values(
        expected in json_value_strategy(),
        actual in json_value_strategy(),
    ) {
        prop_assume!(expected != actual);
        let result = Matcher::exact(expected).matches(&actual);
        prop_assert_eq!(result.mismatches().len(), 1);
        prop_assert_eq!(&result.mismatches()[0].kind, &MismatchKind::ValueDiffers);
        prop_assert_eq!(result.mismatches()[0].path.to_string(), "$");
    }

    /// **Property 12: `like` objects tolerate extra keys**
    /// *For any* object wrapped in `like`, an actual object holding values
    /// of the same kinds plus additional keys SHALL match.
    #[test]
    fn prop_like_object_ignores_extra_keys(
        expected in object_strategy(),
        extra in object_strategy(),
    ) {
        let matcher = Matcher::like(Value::Object(expected.clone()));
        let mut actual = extra;
        actual.extend(expected);
        prop_assert!(matcher.matches(&Value::Object(actual)).is_ok());
    }

    /// **Property 13: `like` objects report missing keys at their path**
    /// *For any* object wrapped in `like`, removing one key from the actual
    /// value SHALL produce exactly one `missing field` mismatch at that key.
    #[test]
    fn prop_like_object_missing_key_reported(
        expected in object_strategy(),
        pick in any::<prop::sample::Index>(),
    ) {
        let keys: Vec<String> = expected.keys().cloned().collect();
        let removed = pick.get(&keys).clone();
        let matcher = Matcher::like(Value::Object(expected.clone()));
        let mut actual = expected;
        actual.remove(&removed);

        let result = matcher.matches_at(&Value::Object(actual), &JsonPath::root().key("body"));
        prop_assert_eq!(result.mismatches().len(), 1);
        prop_assert_eq!(&result.mismatches()[0].kind, &MismatchKind::MissingField);
        prop_assert_eq!(result.mismatches()[0].path.to_string(), format!("$.body.{removed}"));
    }
}
