//! Cache behavior observed through the service: hit flags, write
//! invalidation, and TTL expiry against a real storage backend.

use std::time::Duration;

use action_store::{FileFormat, Request};
use serde_json::json;

use crate::support::{data, filesystem_service, localstorage_service};

#[test]
fn list_snapshot_is_cached_until_a_write_lands() {
    let test = filesystem_service(FileFormat::Json);
    test.service
        .process(&Request::create("alarms", data(json!({ "name": "A" }))));

    let cold = test.service.process(&Request::list("alarms"));
    assert!(cold.success, "{:?}", cold.error);
    assert!(!cold.meta.cache_hit);
    assert_eq!(cold.data.as_array().unwrap().len(), 1);

    let warm = test.service.process(&Request::list("alarms"));
    assert!(warm.meta.cache_hit);
    assert_eq!(warm.data, cold.data);

    // A create invalidates the snapshot; the next list sees the new record.
    test.service
        .process(&Request::create("alarms", data(json!({ "name": "B" }))));
    let after = test.service.process(&Request::list("alarms"));
    assert!(!after.meta.cache_hit);
    assert_eq!(after.data.as_array().unwrap().len(), 2);
}

#[test]
fn reads_never_serve_stale_data_after_update() {
    let test = localstorage_service();
    let created = test
        .service
        .process(&Request::create("alarms", data(json!({ "name": "A" }))));
    let id = created.data["id"].as_str().unwrap().to_string();

    // Prime both cache entries.
    test.service.process(&Request::read("alarms", &id));
    test.service.process(&Request::list("alarms"));

    test.service.process(&Request::update(
        "alarms",
        &id,
        data(json!({ "severity": "high" })),
    ));

    let read = test.service.process(&Request::read("alarms", &id));
    assert!(!read.meta.cache_hit);
    assert_eq!(read.data["severity"], json!("high"));

    let list = test.service.process(&Request::list("alarms"));
    assert!(!list.meta.cache_hit);
    assert_eq!(list.data[0]["severity"], json!("high"));
}

#[test]
fn record_cache_expires_after_ttl() {
    let test = localstorage_service();
    let created = test
        .service
        .process(&Request::create("alarms", data(json!({ "name": "A" }))));
    let id = created.data["id"].as_str().unwrap().to_string();

    let cold = test.service.process(&Request::read("alarms", &id));
    assert!(!cold.meta.cache_hit);

    let warm = test.service.process(&Request::read("alarms", &id));
    assert!(warm.meta.cache_hit);

    // The configured TTL is 300 seconds; just short of it still hits.
    test.clock.advance(Duration::from_secs(299));
    let still_warm = test.service.process(&Request::read("alarms", &id));
    assert!(still_warm.meta.cache_hit);

    test.clock.advance(Duration::from_secs(2));
    let expired = test.service.process(&Request::read("alarms", &id));
    assert!(!expired.meta.cache_hit);
    assert_eq!(expired.data, cold.data);
}

#[test]
fn filtered_list_is_identical_cold_and_cached() {
    let test = localstorage_service();
    test.service
        .process(&Request::create("alarms", data(json!({ "name": "A" }))));
    test.service.process(&Request::create(
        "alarms",
        data(json!({ "name": "B", "severity": "high" })),
    ));

    let filter = data(json!({ "severity": "high" }));
    let cold = test
        .service
        .process(&Request::list_filtered("alarms", filter.clone()));
    assert!(!cold.meta.cache_hit);

    let warm = test
        .service
        .process(&Request::list_filtered("alarms", filter));
    assert!(warm.meta.cache_hit);
    assert_eq!(warm.data, cold.data);
    assert_eq!(warm.data.as_array().unwrap().len(), 1);
}
