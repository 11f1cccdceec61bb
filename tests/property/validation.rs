// Test-specific lint overrides: property tests use unwrap freely.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::doc_markdown)]

//! Property-based tests for the mutation validator.
//!
//! Uses proptest to verify:
//! 1. Arbitrary text and arbitrary JSON payloads never panic the validator.
//! 2. Every well-formed create payload is accepted with its fields intact.
//! 3. Priority and category values outside their enums are rejected as
//!    `invalidPayload`; column values outside the enum as `invalidColumn`.
//! 4. Whatever the validator accepts, it accepts again after re-encoding.

use proptest::prelude::*;
use serde_json::{Value, json};
use taskboard_proto::protocol::{self, ErrorCode};
use taskboard_proto::task::{Category, Column, Priority, TaskDraft};
use taskboard_proto::validate::{self, ValidationError};

// --- Strategies ---

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 :]{0,12}".prop_map(Value::String),
        prop::sample::select(vec!["todo", "inProgress", "done", "High", "Bug", "1"])
            .prop_map(|s| Value::String(s.to_string())),
    ];
    leaf.prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(
                prop::sample::select(vec![
                    "id",
                    "title",
                    "description",
                    "priority",
                    "category",
                    "attachments",
                    "column",
                ]),
                inner,
                0..6,
            )
            .prop_map(|m| Value::Object(
                m.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
            )),
        ]
    })
}

fn arb_event() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        protocol::EVENT_CREATE,
        protocol::EVENT_UPDATE,
        protocol::EVENT_MOVE,
        protocol::EVENT_DELETE,
        "task:archive",
    ])
}

fn arb_draft() -> impl Strategy<Value = TaskDraft> {
    (
        prop::option::of("[A-Za-z][A-Za-z0-9 ]{0,30}"),
        prop::option::of(".{0,40}"),
        prop::option::of(prop::sample::select(Priority::ALL.to_vec())),
        prop::option::of(prop::sample::select(Category::ALL.to_vec())),
        prop::option::of(prop::collection::vec("data:[a-z/;,0-9]{0,20}", 0..3)),
    )
        .prop_map(|(title, description, priority, category, attachments)| TaskDraft {
            title,
            description,
            priority,
            category,
            attachments,
        })
}

proptest! {
    #[test]
    fn random_text_never_panics(text in ".{0,200}") {
        let _ = validate::parse_request(&text);
    }

    #[test]
    fn random_payloads_never_panic(event in arb_event(), data in arb_json()) {
        let _ = validate::validate(event, &data);
    }

    #[test]
    fn accepted_requests_survive_reencoding(event in arb_event(), data in arb_json()) {
        if let Ok(request) = validate::validate(event, &data) {
            let text = protocol::encode_client(&request).unwrap();
            prop_assert_eq!(validate::parse_request(&text).unwrap(), request);
        }
    }

    #[test]
    fn well_formed_drafts_are_accepted(draft in arb_draft()) {
        let data = serde_json::to_value(&draft).unwrap();
        prop_assert_eq!(validate::validate_create(&data).unwrap(), draft);
    }

    #[test]
    fn unknown_priority_is_invalid_payload(priority in "[A-Za-z]{1,10}") {
        prop_assume!(priority.parse::<Priority>().is_err());
        let err = validate::validate_create(&json!({ "priority": priority })).unwrap_err();
        prop_assert_eq!(err.code(), ErrorCode::InvalidPayload);
    }

    #[test]
    fn unknown_category_is_invalid_payload(category in "[A-Za-z]{1,10}") {
        prop_assume!(category.parse::<Category>().is_err());
        let err = validate::validate_update(&json!({ "id": "1", "category": category })).unwrap_err();
        prop_assert_eq!(err.code(), ErrorCode::InvalidPayload);
    }

    #[test]
    fn unknown_column_is_invalid_column(column in "[A-Za-z]{1,12}") {
        prop_assume!(column.parse::<Column>().is_err());
        let err = validate::validate_move(&json!({ "id": 1, "column": column })).unwrap_err();
        prop_assert!(matches!(err, ValidationError::InvalidColumn(_)));
        prop_assert_eq!(err.code(), ErrorCode::InvalidColumn);
    }

    #[test]
    fn integer_and_string_ids_agree(id in 0u64..1_000_000) {
        let from_int = validate::validate_delete(&json!({ "id": id })).unwrap();
        let from_str = validate::validate_delete(&json!({ "id": id.to_string() })).unwrap();
        prop_assert_eq!(from_int, from_str);
    }
}
