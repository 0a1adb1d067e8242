use super::*;
use serde_json::json;
use std::io::Write;
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn text_field_access() {
    let doc = Document::new("1", "Some body", json!({"contentType": "Tutorial"}));
    assert_eq!(doc.text("body").expect("body is text"), "Some body");

    let missing = doc.text("content");
    assert!(matches!(missing, Err(RagError::MalformedDocument { ref id, .. }) if id == "1"));

    let not_text = doc.text("metadata");
    assert!(matches!(not_text, Err(RagError::MalformedDocument { .. })));
}

#[test]
fn dotted_path_lookup() {
    let doc = Document::new(
        "1",
        "text",
        json!({"contentType": "Video", "nested": {"level": 2}}),
    );

    assert_eq!(doc.get_path("metadata.contentType"), Some(&json!("Video")));
    assert_eq!(doc.get_path("metadata.nested.level"), Some(&json!(2)));
    assert_eq!(doc.get_path("metadata.missing"), None);
    assert_eq!(doc.get_path("body.length"), None);
}

#[test]
fn with_text_keeps_other_fields() {
    let doc = Document::new("7", "original", json!({"contentType": "Article"}));
    let copy = doc.with_text("body", "replacement".to_string());

    assert_eq!(copy.id, "7");
    assert_eq!(copy.text("body").expect("body is text"), "replacement");
    assert_eq!(copy.fields.get("metadata"), doc.fields.get("metadata"));
    assert_eq!(doc.text("body").expect("body is text"), "original");
}

#[test]
fn load_jsonl_documents() {
    let mut file = NamedTempFile::new().expect("should create temp file");
    writeln!(
        file,
        r#"{{"id": "a", "body": "First", "metadata": {{"contentType": "Tutorial"}}}}"#
    )
    .expect("write line");
    writeln!(file).expect("write blank line");
    writeln!(file, r#"{{"body": "Second", "updated": "2024-05-20"}}"#).expect("write line");

    let docs = load_jsonl(file.path()).expect("should load corpus");
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].id, "a");
    assert_eq!(docs[0].get_path("metadata.contentType"), Some(&json!("Tutorial")));
    assert!(!docs[1].id.is_empty());
    assert_eq!(docs[1].fields.get("updated"), Some(&json!("2024-05-20")));
}

#[test]
fn load_jsonl_rejects_invalid_lines() {
    let mut file = NamedTempFile::new().expect("should create temp file");
    writeln!(file, "not json").expect("write line");

    let err = load_jsonl(file.path()).expect_err("invalid JSON must fail");
    assert!(err.to_string().contains("line 1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_rows_pages_through_dataset() {
    let server = MockServer::start().await;

    let first_page: Vec<_> = (0..100)
        .map(|i| json!({"row_idx": i, "row": {"body": format!("doc {i}"), "metadata": {}}}))
        .collect();
    let second_page: Vec<_> = (100..105)
        .map(|i| json!({"row_idx": i, "row": {"body": format!("doc {i}")}}))
        .collect();

    Mock::given(method("GET"))
        .and(path("/rows"))
        .and(query_param("offset", "0"))
        .and(query_param("length", "100"))
        .and(query_param("dataset", DEFAULT_DATASET))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rows": first_page})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rows"))
        .and(query_param("offset", "100"))
        .and(query_param("length", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rows": second_page})))
        .mount(&server)
        .await;

    let uri = server.uri();
    let docs = tokio::task::spawn_blocking(move || {
        fetch_dataset_rows(&uri, DEFAULT_DATASET, DEFAULT_SPLIT, 105)
    })
    .await
    .expect("task should not panic")
    .expect("should fetch rows");

    assert_eq!(docs.len(), 105);
    assert_eq!(docs[0].id, "0");
    assert_eq!(docs[104].id, "104");
    assert_eq!(docs[104].text("body").expect("body is text"), "doc 104");
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_rows_stops_on_short_dataset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rows"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rows": [{"row_idx": 0, "row": {"body": "only one"}}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rows"))
        .and(query_param("offset", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rows": []})))
        .mount(&server)
        .await;

    let uri = server.uri();
    let docs = tokio::task::spawn_blocking(move || {
        fetch_dataset_rows(&uri, DEFAULT_DATASET, DEFAULT_SPLIT, DEFAULT_ROW_LIMIT)
    })
    .await
    .expect("task should not panic")
    .expect("should fetch rows");

    assert_eq!(docs.len(), 1);
}
