//! Coverage for `/_admin`: descriptor CRUD, handler upload/delete, rename,
//! and the cache-invalidation side effects each mutation causes.

mod support;

use http::StatusCode;
use serde_json::json;
use support::TestApp;

#[tokio::test]
async fn create_collection_then_list_it() {
    let dir = tempfile::tempdir().unwrap();
    let app = TestApp::new(dir.path());
    let root = app.root_token();

    app.post_json("/_admin/collections", &json!({"name": "todo", "properties": {}}), Some(&root))
        .await
        .assert_status(StatusCode::CREATED);

    let listed = app
        .get_authenticated("/_admin/collections", Some(&root))
        .await
        .json::<Vec<serde_json::Value>>();
    assert!(listed.iter().any(|d| d["name"] == "todo"));
}

#[tokio::test]
async fn uploaded_handler_runs_on_the_next_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = TestApp::new(dir.path());
    let root = app.root_token();

    app.post_json("/_admin/collections", &json!({"name": "todo", "properties": {}}), Some(&root))
        .await
        .assert_status(StatusCode::CREATED);

    app.put_json(
        "/_admin/collections/todo/handlers/validate",
        &json!({"source": "error('title', 'required')"}),
        Some(&root),
    )
    .await
    .assert_status(StatusCode::NO_CONTENT);

    app.post_json("/todo", &json!({}), None).await.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleting_a_collection_removes_its_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let app = TestApp::new(dir.path());
    let root = app.root_token();

    app.post_json("/_admin/collections", &json!({"name": "todo", "properties": {}}), Some(&root))
        .await
        .assert_status(StatusCode::CREATED);
    app.delete("/_admin/collections/todo", Some(&root)).await.assert_status(StatusCode::NO_CONTENT);
    app.get_authenticated("/_admin/collections/todo", Some(&root))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn renaming_a_collection_moves_its_documents() {
    let dir = tempfile::tempdir().unwrap();
    let app = TestApp::new(dir.path());
    let root = app.root_token();

    app.post_json("/_admin/collections", &json!({"name": "todo", "properties": {}}), Some(&root))
        .await
        .assert_status(StatusCode::CREATED);
    app.post_json("/todo", &json!({"title": "t"}), None).await.assert_status(StatusCode::CREATED);

    app.post_json("/_admin/collections/todo/rename", &json!({"name": "tasks"}), Some(&root))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let moved = app.get("/tasks").await.json::<Vec<serde_json::Value>>();
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0]["title"], "t");
}
