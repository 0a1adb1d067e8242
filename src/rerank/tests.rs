use super::*;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn candidates() -> Vec<String> {
    vec![
        "Vector indexes speed up similarity search.".to_string(),
        "Bananas are yellow.".to_string(),
        "Create a vector index with the Atlas UI.".to_string(),
    ]
}

#[tokio::test(flavor = "multi_thread")]
async fn reorders_by_score() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rerank"))
        .and(body_json(json!({
            "query": "how do I create a vector index",
            "texts": candidates(),
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"index": 2, "score": 0.97},
            {"index": 0, "score": 0.61},
            {"index": 1, "score": 0.02}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let reranker = HttpReranker::new(&server.uri(), DEFAULT_RERANK_MODEL)
        .expect("should create reranker");
    let ranked = tokio::task::spawn_blocking(move || {
        reranker.rerank("how do I create a vector index", &candidates(), 2)
    })
    .await
    .expect("task should not panic")
    .expect("should rerank");

    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].index, 2);
    assert_eq!(ranked[0].text, "Create a vector index with the Atlas UI.");
    assert_eq!(ranked[1].index, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rerank"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let reranker = HttpReranker::new(&server.uri(), DEFAULT_RERANK_MODEL)
        .expect("should create reranker");
    let result = tokio::task::spawn_blocking(move || reranker.rerank("query", &candidates(), 3))
        .await
        .expect("task should not panic");

    assert!(result.is_err());
}

#[test]
fn empty_candidates_skip_the_request() {
    // Nothing listens on this port; an empty input must not hit the network
    let reranker =
        HttpReranker::new("http://127.0.0.1:9", DEFAULT_RERANK_MODEL).expect("should create");
    let ranked = reranker.rerank("query", &[], 5).expect("should succeed");
    assert!(ranked.is_empty());
}

#[test]
fn invalid_and_duplicate_indices_are_dropped() {
    let scores = vec![
        RerankScore {
            index: 7,
            score: 0.99,
        },
        RerankScore {
            index: 1,
            score: 0.5,
        },
        RerankScore {
            index: 1,
            score: 0.9,
        },
        RerankScore {
            index: 0,
            score: 0.7,
        },
    ];

    let ranked = select_top(&candidates(), scores, 10);
    let indices: Vec<usize> = ranked.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1]);
    assert!(ranked.iter().all(|r| candidates().contains(&r.text)));
}

#[test]
fn invalid_url_is_rejected() {
    assert!(HttpReranker::new("not a url", DEFAULT_RERANK_MODEL).is_err());
}
