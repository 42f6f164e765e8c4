//! Shared proptest generators.

use proptest::prelude::*;
use serde_json::{Map, Value, json};

/// Generate participant names.
pub fn service_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("web-app".to_string()),
        Just("mobile-app".to_string()),
        Just("user-service".to_string()),
        Just("billing-service".to_string()),
        Just("search-service".to_string()),
    ]
}

/// Generate short commit identifiers.
pub fn short_sha_strategy() -> impl Strategy<Value = String> {
    "[0-9a-f]{7}"
}

/// Generate branch names.
pub fn branch_strategy() -> impl Strategy<Value = String> {
    "(main|develop|release/[0-9]+\\.[0-9]+|feature/[a-z]{1,10})"
}

/// Generate object keys.
pub fn json_key_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z0-9_]{0,10}"
}

/// Generate JSON scalars. Floats are left out since NaN has no JSON form.
pub fn json_scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 @.]{0,12}".prop_map(Value::from),
    ]
}

/// Generate arbitrary JSON values up to three levels deep.
pub fn json_value_strategy() -> impl Strategy<Value = Value> {
    json_scalar_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(json_key_strategy(), inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Generate user bodies shaped like the provider's `GET /users/{id}` answer.
pub fn user_body_strategy() -> impl Strategy<Value = Value> {
    (
        1i64..100_000,
        "[A-Z][a-z]{1,8} [A-Z][a-z]{1,10}",
        "[a-z]{1,8}@[a-z]{1,8}\\.(com|org|io)",
        any::<bool>(),
    )
        .prop_map(|(id, name, email, active)| {
            json!({"id": id, "name": name, "email": email, "active": active})
        })
}
