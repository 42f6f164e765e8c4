//! The users contract and the provider answers it is verified against.

use cdct_pact::{
    Contract, Interaction, Matcher, ProviderResponse, Request, Response, Template,
};
use serde_json::{Value, json};

/// Consumer of the users API.
pub const CONSUMER: &str = "cdct-consumer";

/// Provider of the users API.
pub const PROVIDER: &str = "cdct-provider";

/// Provider state for the existing user.
pub const USER_EXISTS: &str = "User with id 123 exists";

/// Provider state for the missing user.
pub const USER_MISSING: &str = "User with id 999 does not exist";

/// Description of the existing-user interaction.
pub const GET_USER: &str = "a request for user 123";

/// Description of the missing-user interaction.
pub const GET_MISSING_USER: &str = "a request for user 999";

/// Description of the interaction with deliberately wrong expectations.
pub const GET_USER_BAD: &str = "a request for user 123 (bad)";

const EMAIL_PATTERN: &str = r"[^@\s]+@[^@\s]+\.[^@\s]+";
const JSON_CONTENT_TYPE: &str = "application/json(;.*)?";

fn json_content_type() -> Matcher {
    Matcher::regex(JSON_CONTENT_TYPE, "application/json; charset=utf-8")
}

fn get(path: &str) -> Request {
    Request::get(path).with_header("Accept", "application/json")
}

/// Expected body for user 123.
#[must_use]
pub fn user_body() -> Template {
    Template::object([
        ("id", Matcher::integer(123)),
        ("name", Matcher::like("Jane Doe")),
        (
            "email",
            Matcher::regex(EMAIL_PATTERN, "jane.doe@example.com"),
        ),
        ("active", Matcher::boolean(true)),
    ])
}

/// Interaction for an existing user.
#[must_use]
pub fn get_user_interaction() -> Interaction {
    Interaction::new(
        GET_USER,
        get("/users/123"),
        Response::new(200)
            .with_header("Content-Type", json_content_type())
            .with_body(user_body()),
    )
    .given(USER_EXISTS)
}

/// Interaction for a missing user.
#[must_use]
pub fn get_missing_user_interaction() -> Interaction {
    Interaction::new(
        GET_MISSING_USER,
        get("/users/999"),
        Response::new(404)
            .with_header("Content-Type", json_content_type())
            .with_body(Template::object([("error", Matcher::like("Not found"))])),
    )
    .given(USER_MISSING)
}

/// Interaction expecting a string `active` flag and a `role` the provider
/// never returns.
#[must_use]
pub fn bad_user_interaction() -> Interaction {
    Interaction::new(
        GET_USER_BAD,
        get("/users/123"),
        Response::new(200).with_body(Template::object([
            ("id", Matcher::integer(123)),
            ("name", Matcher::like("Alice")),
            ("email", Matcher::regex(EMAIL_PATTERN, "alice@example.com")),
            ("active", Matcher::like("true")),
            ("role", Matcher::like("admin")),
        ])),
    )
    .given(USER_EXISTS)
}

/// The contract the consumer publishes.
#[must_use]
pub fn users_contract() -> Contract {
    Contract::new(CONSUMER, PROVIDER)
        .with_interaction(get_user_interaction())
        .with_interaction(get_missing_user_interaction())
}

/// The contract with wrong expectations, published under a suffixed version.
#[must_use]
pub fn bad_users_contract() -> Contract {
    Contract::new(CONSUMER, PROVIDER).with_interaction(bad_user_interaction())
}

/// What the provider stores for user 123.
#[must_use]
pub fn stored_user() -> Value {
    json!({
        "id": 123,
        "name": "Ada Lovelace",
        "email": "ada@example.com",
        "active": true
    })
}

/// Provider answer for an existing user.
#[must_use]
pub fn user_response(body: Value) -> ProviderResponse {
    ProviderResponse::new(200)
        .with_header("Content-Type", "application/json; charset=utf-8")
        .with_body(body)
}

/// Provider answer for a missing user.
#[must_use]
pub fn not_found_response() -> ProviderResponse {
    ProviderResponse::new(404)
        .with_header("Content-Type", "application/json; charset=utf-8")
        .with_body(json!({"error": "Not found"}))
}
