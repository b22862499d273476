//! Property-based test generators using proptest.
//!
//! Provides strategies for generating document contents and
//! sync schedules with lost messages.

use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for generating plain text content.
pub fn text_content_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 ,.!?\n]{0,48}").expect("Invalid regex")
}

/// Strategy for generating flat JSON objects.
///
/// Values are never `null`, which a merge patch reads as a removal.
pub fn json_object_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-e]").expect("Invalid regex"),
        prop_oneof![
            any::<i32>().prop_map(Value::from),
            prop::string::string_regex("[a-z]{0,8}")
                .expect("Invalid regex")
                .prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
        ],
        0..5,
    )
    .prop_map(|members| Value::Object(members.into_iter().collect::<Map<String, Value>>()))
}

/// One request/response cycle of a single client.
#[derive(Debug, Clone)]
pub struct SyncStep {
    /// Content the client edits its document to.
    pub content: String,
    /// Whether the client's message is lost.
    pub drop_request: bool,
    /// Whether the server's reply is lost.
    pub drop_response: bool,
}

/// Strategy for generating a cycle where each leg is lost with `loss` probability.
pub fn sync_step_strategy(loss: f64) -> impl Strategy<Value = SyncStep> {
    (
        text_content_strategy(),
        prop::bool::weighted(loss),
        prop::bool::weighted(loss),
    )
        .prop_map(|(content, drop_request, drop_response)| SyncStep {
            content,
            drop_request,
            drop_response,
        })
}

/// One client's turn to edit a shared document.
#[derive(Debug, Clone)]
pub struct TurnStep<C> {
    /// Index of the editing client.
    pub client: usize,
    /// Content the client edits its document to.
    pub content: C,
}

/// Strategy for generating text turns among `clients` clients.
pub fn text_turn_strategy(clients: usize) -> impl Strategy<Value = TurnStep<String>> {
    (0..clients, text_content_strategy()).prop_map(|(client, content)| TurnStep { client, content })
}

/// Strategy for generating JSON turns among `clients` clients.
pub fn json_turn_strategy(clients: usize) -> impl Strategy<Value = TurnStep<Value>> {
    (0..clients, json_object_strategy()).prop_map(|(client, content)| TurnStep { client, content })
}
