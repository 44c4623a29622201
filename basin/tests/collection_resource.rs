//! End-to-end coverage of the Collection Resource pipeline: the six
//! literal scenarios and the testable invariants, driven through the real
//! router against real `mlua` script compilation — no mocked storage, no
//! mocked runtime.

mod support;

use std::thread;
use std::time::Duration;

use http::StatusCode;
use serde_json::json;
use support::{write_descriptor, write_handler, TestApp};

fn setup(collection: &str) -> (tempfile::TempDir, ()) {
    let dir = tempfile::tempdir().unwrap();
    write_descriptor(dir.path(), collection);
    (dir, ())
}

#[tokio::test]
async fn validation_rejects_missing_title() {
    let (dir, _) = setup("todo");
    write_handler(
        dir.path(),
        "todo",
        "validate",
        "if not data.title then error('title', 'required') end",
    );
    let app = TestApp::new(dir.path());

    let response = app.post_json("/todo", &json!({"priority": 1}), None).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_slice(&app.get("/todo").await.body).unwrap_or(json!([]));
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn handler_mutation_persists() {
    let (dir, _) = setup("todo");
    write_handler(
        dir.path(),
        "todo",
        "post",
        "data.createdBy = 'system'\ndata.status = 'new'",
    );
    let app = TestApp::new(dir.path());

    let created = app
        .post_json("/todo", &json!({"title": "t"}), None)
        .await
        .assert_status(StatusCode::CREATED)
        .json::<serde_json::Value>();
    assert_eq!(created["createdBy"], "system");
    assert_eq!(created["status"], "new");

    let id = created["id"].as_str().unwrap();
    let fetched = app.get(&format!("/todo/{id}")).await.assert_status(StatusCode::OK).json::<serde_json::Value>();
    assert_eq!(fetched["createdBy"], "system");
    assert_eq!(fetched["status"], "new");
}

#[tokio::test]
async fn ownership_filter_injection() {
    let (dir, _) = setup("docs");
    write_handler(
        dir.path(),
        "docs",
        "get",
        "if not isRoot then query.userId = me.id end",
    );
    let app = TestApp::new(dir.path());

    let u1 = app.user_token("u1", "alice");
    let u2 = app.user_token("u2", "bob");

    app.post_json("/docs", &json!({"userId": "u1"}), Some(&u1))
        .await
        .assert_status(StatusCode::CREATED);

    let listed = app.get_authenticated("/docs", Some(&u2)).await.assert_status(StatusCode::OK).json::<Vec<serde_json::Value>>();
    assert!(listed.iter().all(|doc| doc["userId"] != "u1"));
}

#[tokio::test]
async fn cancel_short_circuits_storage() {
    let (dir, _) = setup("c");
    write_handler(dir.path(), "c", "validate", "cancel('nope', 403)");
    let app = TestApp::new(dir.path());

    app.post_json("/c", &json!({"x": 1}), None)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let remaining = app.get("/c").await.json::<Vec<serde_json::Value>>();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn hide_after_commit() {
    let (dir, _) = setup("c");
    write_handler(dir.path(), "c", "get", "hide('secret')");
    let app = TestApp::new(dir.path());

    let created = app
        .post_json("/c", &json!({"secret": "s", "name": "n"}), None)
        .await
        .json::<serde_json::Value>();
    let id = created["id"].as_str().unwrap();

    let fetched = app.get(&format!("/c/{id}")).await.json::<serde_json::Value>();
    assert!(fetched.get("secret").is_none());
    assert_eq!(fetched["name"], "n");
}

#[tokio::test]
async fn cancel_takes_precedence_over_later_mutations() {
    let (dir, _) = setup("c");
    write_handler(
        dir.path(),
        "c",
        "validate",
        "cancel('blocked', 400)",
    );
    write_handler(dir.path(), "c", "post", "data.shouldNeverAppear = true");
    let app = TestApp::new(dir.path());

    app.post_json("/c", &json!({"x": 1}), None).await.assert_status(StatusCode::BAD_REQUEST);
    assert!(app.get("/c").await.json::<Vec<serde_json::Value>>().is_empty());
}

#[tokio::test]
async fn root_with_skip_events_bypasses_every_handler() {
    let (dir, _) = setup("todo");
    write_handler(dir.path(), "todo", "validate", "error('title', 'required')");
    let app = TestApp::new(dir.path());
    let root = app.root_token();

    let created = app
        .post_json("/todo", &json!({"title": "x", "$skipEvents": true}), Some(&root))
        .await
        .assert_status(StatusCode::CREATED)
        .json::<serde_json::Value>();
    assert_eq!(created["title"], "x");
}

#[tokio::test]
async fn non_root_skip_events_request_still_runs_handlers() {
    let (dir, _) = setup("todo");
    write_handler(dir.path(), "todo", "validate", "error('title', 'required')");
    let app = TestApp::new(dir.path());
    let user = app.user_token("u1", "alice");

    app.post_json("/todo", &json!({"title": "x", "$skipEvents": true}), Some(&user))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_field_never_reaches_storage() {
    let (dir, _) = setup("todo");
    // `ownerId` isn't declared protected in the descriptor here; this test
    // exercises the handler-driven `protect()` path instead of the schema one.
    write_handler(dir.path(), "todo", "validate", "protect('ownerId')");
    let app = TestApp::new(dir.path());

    let created = app
        .post_json("/todo", &json!({"title": "x", "ownerId": "attacker"}), None)
        .await
        .json::<serde_json::Value>();
    assert!(created.get("ownerId").is_none());
}

#[tokio::test]
async fn query_equivalence_bare_field_and_ne_operator() {
    let (dir, _) = setup("c");
    let app = TestApp::new(dir.path());
    app.post_json("/c", &json!({"a": 1}), None).await;
    app.post_json("/c", &json!({"a": 2}), None).await;

    // With only two distinct values on hand, `a=2` and `a[$ne]=1` select
    // the same document — two surface forms of one filter.
    let bare = app.get("/c?a=2").await.json::<Vec<serde_json::Value>>();
    let explicit = app.get("/c?a%5B%24ne%5D=1").await.json::<Vec<serde_json::Value>>();
    assert_eq!(bare.len(), 1);
    assert_eq!(bare.len(), explicit.len());
    assert_eq!(bare[0]["a"], explicit[0]["a"]);
}

#[tokio::test]
async fn hot_reload_picks_up_an_edited_handler() {
    let (dir, _) = setup("c");
    write_handler(dir.path(), "c", "validate", "-- no-op");
    let app = TestApp::new(dir.path());

    app.post_json("/c", &json!({"x": 1}), None).await.assert_status(StatusCode::CREATED);

    thread::sleep(Duration::from_millis(1100));
    write_handler(dir.path(), "c", "validate", "error('x', 'now required differently')");

    app.post_json("/c", &json!({"x": 1}), None).await.assert_status(StatusCode::BAD_REQUEST);
}
