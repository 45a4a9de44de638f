//! Tests for the session's local read model: store upserts, the
//! relationship index and store/index divergence

#[path = "testutils/mod.rs"]
mod testutils;

use chartcache::{ResourceType, SessionError, StoreError};
use serde_json::json;
use testutils::chart_fixture::ChartFixture;
use testutils::sample_chart::{condition, observation};

#[tokio::test(start_paused = true)]
async fn test_added_condition_is_visible_for_its_patient() {
    let fixture = ChartFixture::new();
    fixture.session.set_current_patient("1").await;

    fixture
        .session
        .add_resource(
            ResourceType::Condition,
            condition("900", "1", "Type 2 diabetes"),
        )
        .unwrap();

    let conditions = fixture
        .session
        .get_patient_resources("1", Some(ResourceType::Condition));
    let ids: Vec<&str> = conditions.iter().map(|r| r.id()).collect();
    assert!(ids.contains(&"900"));
    assert!(ids.contains(&"123"));
}

#[tokio::test(start_paused = true)]
async fn test_adding_twice_keeps_one_entry_second_wins() {
    let fixture = ChartFixture::new();
    fixture.session.set_current_patient("1").await;

    fixture
        .session
        .add_resource(ResourceType::Condition, condition("123", "1", "first"))
        .unwrap();
    fixture
        .session
        .add_resource(ResourceType::Condition, condition("123", "1", "second"))
        .unwrap();

    let matching: Vec<_> = fixture
        .session
        .get_resources_by_type(ResourceType::Condition)
        .into_iter()
        .filter(|r| r.id() == "123")
        .collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].field("code"), Some(&json!({"text": "second"})));

    let indexed = fixture
        .session
        .get_patient_resources("1", Some(ResourceType::Condition));
    assert_eq!(indexed.iter().filter(|r| r.id() == "123").count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_removed_resource_is_omitted_without_error() {
    let fixture = ChartFixture::new();
    fixture.session.set_current_patient("1").await;

    let removed = fixture
        .session
        .remove_resource(ResourceType::Condition, "123");
    assert!(removed.is_some());

    let conditions = fixture
        .session
        .get_patient_resources("1", Some(ResourceType::Condition));
    assert_eq!(conditions.len(), 1);
    assert_eq!(conditions[0].id(), "124");

    let everything = fixture.session.get_patient_resources("1", None);
    assert!(everything.iter().all(|r| r.id() != "123"));
}

#[tokio::test(start_paused = true)]
async fn test_resources_for_other_subjects_are_stored_but_not_indexed() {
    let fixture = ChartFixture::new();
    fixture.session.set_current_patient("1").await;

    fixture
        .session
        .set_resources(
            ResourceType::Observation,
            vec![observation("x-1", "2", "2024-01-01")],
        )
        .unwrap();

    assert!(fixture
        .session
        .get_resource(ResourceType::Observation, "x-1")
        .is_some());
    assert!(fixture
        .session
        .get_patient_resources("2", Some(ResourceType::Observation))
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_mismatched_type_is_rejected() {
    let fixture = ChartFixture::new();

    let err = fixture
        .session
        .add_resource(ResourceType::Observation, condition("1", "1", "x"))
        .unwrap_err();

    assert!(matches!(
        err,
        SessionError::Store(StoreError::TypeMismatch {
            expected: ResourceType::Observation,
            actual: ResourceType::Condition,
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_partial_update_replaces_stored_copy() {
    let fixture = ChartFixture::new();
    fixture.session.set_current_patient("1").await;

    fixture
        .session
        .update_resource(
            ResourceType::Condition,
            "124",
            &json!({"clinicalStatus": "resolved", "note": null}),
        )
        .unwrap();

    let stored = fixture
        .session
        .get_resource(ResourceType::Condition, "124")
        .unwrap();
    assert_eq!(stored.status(), None);
    assert_eq!(stored.field("clinicalStatus"), Some(&json!("resolved")));
    assert_eq!(stored.subject_id(), Some("1"));
}
