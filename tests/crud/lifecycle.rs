//! Full record lifecycle, exercised identically against every backend.

use std::time::Duration;

use action_store::{ErrorCode, Request, ViolationCode};
use serde_json::json;

use crate::support::{all_backends, data};

#[test]
fn create_then_read_round_trips_on_every_backend() {
    for (label, test) in all_backends() {
        let created = test.service.process(&Request::create(
            "alarms",
            data(json!({ "name": "Door sensor", "severity": "high" })),
        ));
        assert!(created.success, "{}: {:?}", label, created.error);

        let record = created.data.as_object().unwrap();
        let id = record["id"].as_str().unwrap().to_string();
        assert!(!record["createdAt"].as_str().unwrap().is_empty(), "{}", label);
        assert_eq!(record["createdAt"], record["updatedAt"], "{}", label);

        let read = test.service.process(&Request::read("alarms", &id));
        assert!(read.success, "{}: {:?}", label, read.error);
        assert_eq!(read.data["name"], json!("Door sensor"), "{}", label);
        assert_eq!(read.data["severity"], json!("high"), "{}", label);
        assert_eq!(read.data["id"], json!(id), "{}", label);
    }
}

#[test]
fn sequential_updates_last_write_wins() {
    for (label, test) in all_backends() {
        let created = test
            .service
            .process(&Request::create("alarms", data(json!({ "name": "A" }))));
        let id = created.data["id"].as_str().unwrap().to_string();
        let created_at = created.data["createdAt"].as_str().unwrap().to_string();

        test.clock.advance(Duration::from_secs(5));
        let first = test.service.process(&Request::update(
            "alarms",
            &id,
            data(json!({ "status": "open" })),
        ));
        assert!(first.success, "{}: {:?}", label, first.error);

        test.clock.advance(Duration::from_secs(5));
        let second = test.service.process(&Request::update(
            "alarms",
            &id,
            data(json!({ "status": "closed" })),
        ));
        assert!(second.success, "{}: {:?}", label, second.error);

        let read = test.service.process(&Request::read("alarms", &id));
        assert_eq!(read.data["status"], json!("closed"), "{}", label);
        assert_eq!(read.data["name"], json!("A"), "{}", label);

        // RFC 3339 UTC strings compare chronologically as text.
        let updated_at = read.data["updatedAt"].as_str().unwrap();
        assert!(updated_at > created_at.as_str(), "{}", label);
        assert_eq!(read.data["createdAt"], json!(created_at), "{}", label);
    }
}

#[test]
fn delete_is_final_on_every_backend() {
    for (label, test) in all_backends() {
        let created = test
            .service
            .process(&Request::create("alarms", data(json!({ "name": "A" }))));
        let id = created.data["id"].as_str().unwrap().to_string();

        let deleted = test.service.process(&Request::delete("alarms", &id));
        assert!(deleted.success, "{}: {:?}", label, deleted.error);
        assert_eq!(deleted.data["deleted"], json!(true), "{}", label);

        let read = test.service.process(&Request::read("alarms", &id));
        assert_eq!(read.error.unwrap().code, ErrorCode::NotFound, "{}", label);

        let again = test.service.process(&Request::delete("alarms", &id));
        assert_eq!(again.error.unwrap().code, ErrorCode::NotFound, "{}", label);

        let list = test.service.process(&Request::list("alarms"));
        assert_eq!(list.data.as_array().unwrap().len(), 0, "{}", label);
    }
}

#[test]
fn unknown_fields_are_rejected() {
    let test = crate::support::localstorage_service();

    let response = test.service.process(&Request::create(
        "alarms",
        data(json!({ "name": "A", "color": "red" })),
    ));
    assert!(!response.success);

    let error = response.error.unwrap();
    assert_eq!(error.code, ErrorCode::ValidationFailed);
    assert!(error
        .violations
        .iter()
        .any(|v| v.code == ViolationCode::UnknownField && v.field == "color"));
}

#[test]
fn list_filters_are_exact_match_and_combined() {
    let test = crate::support::indexeddb_service();
    for (name, severity, status) in [
        ("A", "low", "open"),
        ("B", "high", "open"),
        ("C", "high", "closed"),
    ] {
        let created = test.service.process(&Request::create(
            "alarms",
            data(json!({ "name": name, "severity": severity, "status": status })),
        ));
        assert!(created.success, "{:?}", created.error);
    }

    let all = test.service.process(&Request::list("alarms"));
    assert_eq!(all.data.as_array().unwrap().len(), 3);

    let filtered = test.service.process(&Request::list_filtered(
        "alarms",
        data(json!({ "severity": "high", "status": "open" })),
    ));
    let records = filtered.data.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["name"], json!("B"));
}
