//! Integration tests for the collab store.

use hbp_client::{ClientConfig, Collab, CollabQuery, CollabStore};
use hbp_paging::{ErrorKind, Method, MockHttpClient};
use serde_json::json;
use std::sync::Arc;

fn store(mock: &Arc<MockHttpClient>) -> CollabStore<MockHttpClient> {
    CollabStore::new(
        Arc::clone(mock),
        &ClientConfig::new().with_collab_url("https://collab/"),
    )
}

#[tokio::test]
async fn get_is_shared_and_cached() {
    let mock = Arc::new(MockHttpClient::new());
    mock.respond_json(
        "GET https://collab/collab/7/",
        json!({"id": 7, "title": "Brain", "content": "atlas", "deleted": false}),
    );
    let store = store(&mock);

    let (a, b) = tokio::join!(store.get("7"), store.get("7"));
    let collab = a.unwrap();
    assert_eq!(collab, b.unwrap());
    assert_eq!(collab.title, "Brain");
    assert_eq!(mock.request_count(), 1);

    store.get("7").await.unwrap();
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn get_by_label_caches_under_both_keys() {
    let mock = Arc::new(MockHttpClient::new());
    mock.respond_json("GET https://collab/r/brain/", json!({"id": 7, "title": "Brain"}));
    let store = store(&mock);

    let collab = store.get_by_label("brain").await.unwrap();
    assert_eq!(collab.id, Some(7));
    assert_eq!(store.get("7").await.unwrap(), collab);
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn empty_id_is_rejected() {
    let mock = Arc::new(MockHttpClient::new());
    let store = store(&mock);

    let error = store.get("").await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::MissingParameter);
    assert_eq!(mock.request_count(), 0);
}

#[tokio::test]
async fn list_pages_through_collabs() {
    let mock = Arc::new(MockHttpClient::new());
    mock.respond_json(
        "GET https://collab/collab/?search=brain&page_size=2",
        json!({
            "results": [{"id": 1, "title": "a"}, {"id": 2, "title": "b"}],
            "next": "https://collab/collab/?search=brain&page_size=2&page=2",
            "count": 3
        }),
    );
    mock.respond_json(
        "GET https://collab/collab/?search=brain&page_size=2&page=2",
        json!({"results": [{"id": 3, "title": "c"}], "next": null, "count": 3}),
    );
    let store = store(&mock);

    let query = CollabQuery::new().with_search("brain").with_page_size(2);
    let collabs = store.list(&query).await.unwrap();
    assert_eq!(collabs.count(), 3);
    assert!(collabs.has_next());

    collabs.next().await.unwrap();
    let titles: Vec<String> = collabs.with_results(|c| c.iter().map(|c| c.title.clone()).collect());
    assert_eq!(titles, vec!["a", "b", "c"]);
    assert!(!collabs.has_next());
}

#[tokio::test]
async fn mine_lists_the_user_collabs() {
    let mock = Arc::new(MockHttpClient::new());
    mock.respond_json(
        "GET https://collab/mycollabs/",
        json!({"results": [{"id": 4, "title": "mine"}]}),
    );
    let store = store(&mock);

    let collabs = store.mine(None).await.unwrap();
    assert_eq!(collabs.len(), 1);
    assert_eq!(collabs.results()[0].title, "mine");
}

#[tokio::test]
async fn create_save_delete() {
    let mock = Arc::new(MockHttpClient::new());
    mock.respond_json(
        "POST https://collab/collab/",
        json!({"id": 9, "title": "Brain", "content": "atlas"}),
    );
    mock.respond_json(
        "PUT https://collab/collab/9/",
        json!({"id": 9, "title": "Brain v2", "content": "atlas"}),
    );
    mock.respond_json("DELETE https://collab/collab/9/", json!({}));
    let store = store(&mock);

    let mut collab = store.create(&Collab::new("Brain", "atlas")).await.unwrap();
    assert_eq!(collab.id, Some(9));
    assert_eq!(
        mock.requests()[0].body,
        Some(json!({"title": "Brain", "content": "atlas"}))
    );

    collab.title = "Brain v2".into();
    let saved = store.save(&collab).await.unwrap();
    assert_eq!(saved.title, "Brain v2");
    let put = &mock.requests()[1];
    assert_eq!(put.method, Method::Put);
    assert_eq!(
        put.body,
        Some(json!({"id": 9, "title": "Brain v2", "content": "atlas", "deleted": false}))
    );

    // Served from the cache filled by save.
    assert_eq!(store.get("9").await.unwrap().title, "Brain v2");
    assert_eq!(mock.request_count(), 2);

    store.delete(&saved).await.unwrap();
    // Evicted: the next get goes to the server, which has nothing registered.
    let error = store.get("9").await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::NotFound);
    assert_eq!(mock.request_count(), 4);
}

#[tokio::test]
async fn save_needs_an_id() {
    let mock = Arc::new(MockHttpClient::new());
    let store = store(&mock);

    let unsaved = Collab::new("Brain", "atlas");
    assert_eq!(
        store.save(&unsaved).await.unwrap_err().kind,
        ErrorKind::MissingParameter
    );
    assert_eq!(
        store.delete(&unsaved).await.unwrap_err().kind,
        ErrorKind::MissingParameter
    );
    assert_eq!(mock.request_count(), 0);
}
