//! Integration tests for the paginated cursor.

use hbp_paging::{
    ErrorKind, HbpError, HttpRequest, HttpResponse, LoadState, MockHttpClient, ResultSet,
    ResultSetOptions,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::future::{poll_fn, Future};
use std::sync::Arc;
use std::task::Poll;

const FIRST: &str = "https://svc/items/";
const SECOND: &str = "https://svc/items/?page=2";
const THIRD: &str = "https://svc/items/?page=3";

fn three_pages() -> Arc<MockHttpClient> {
    let mock = Arc::new(MockHttpClient::new());
    mock.respond_json(
        format!("GET {FIRST}"),
        json!({"results": [1, 2], "next": SECOND, "previous": null, "count": 6}),
    );
    mock.respond_json(
        format!("GET {SECOND}"),
        json!({"results": [3, 4], "next": THIRD, "previous": FIRST}),
    );
    mock.respond_json(
        format!("GET {THIRD}"),
        json!({"results": [5, 6], "next": null, "previous": SECOND, "count": 6}),
    );
    mock
}

fn values(set: &ResultSet<MockHttpClient>) -> Vec<Value> {
    set.results()
}

#[tokio::test]
async fn next_appends_the_following_page() {
    let mock = Arc::new(MockHttpClient::new());
    mock.respond_json(
        format!("GET {FIRST}"),
        json!({"results": [1, 2], "next": "u2", "previous": null, "count": 5}),
    );
    mock.respond_json("GET u2", json!({"results": [3, 4], "next": null, "previous": "u1"}));

    let set = ResultSet::<_, Value>::paginated(
        mock.clone(),
        HttpRequest::get(FIRST),
        ResultSetOptions::default(),
    )
    .await
    .unwrap();
    assert!(set.has_next());
    assert!(!set.has_previous());
    assert_eq!(set.count(), 5);

    set.next().await.unwrap();
    assert_eq!(values(&set), vec![json!(1), json!(2), json!(3), json!(4)]);
    assert!(!set.has_next());
    // No count in the second page.
    assert_eq!(set.count(), 5);
    assert_eq!(set.state(), LoadState::Ready);
}

#[tokio::test]
async fn initial_failure_leaves_an_empty_cursor_in_error() {
    let mock = Arc::new(MockHttpClient::new());
    mock.respond(
        format!("GET {FIRST}"),
        HttpResponse::json(500, &json!({"message": "database unavailable"})),
    );

    let set = ResultSet::<_, Value>::new(mock, HttpRequest::get(FIRST), ResultSetOptions::default());
    let error = set.ready().await.unwrap_err();

    assert_eq!(error.code, 500);
    assert_eq!(set.error().unwrap().code, 500);
    assert_eq!(set.state(), LoadState::Error);
    assert!(set.is_empty());
    assert!(!set.is_loaded());
}

#[tokio::test]
async fn lazy_cursor_sends_nothing_until_used() {
    let mock = three_pages();
    let set = ResultSet::<_, Value>::new(mock.clone(), HttpRequest::get(FIRST), ResultSetOptions::default());
    assert_eq!(mock.request_count(), 0);
    assert_eq!(set.state(), LoadState::Loading);

    set.ready().await.unwrap();
    set.ready().await.unwrap();
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn next_before_ready_loads_first_page_first() {
    let mock = three_pages();
    let set = ResultSet::<_, Value>::new(mock.clone(), HttpRequest::get(FIRST), ResultSetOptions::default());

    set.next().await.unwrap();
    assert_eq!(values(&set), vec![json!(1), json!(2), json!(3), json!(4)]);
    assert_eq!(
        mock.signatures(),
        vec![format!("GET {FIRST}"), format!("GET {SECOND}")]
    );
}

#[tokio::test]
async fn concurrent_operations_run_in_call_order() {
    let mock = three_pages();
    let set = ResultSet::<_, Value>::new(mock.clone(), HttpRequest::get(FIRST), ResultSetOptions::default());

    let (a, b) = tokio::join!(set.next(), set.next());
    a.unwrap();
    b.unwrap();

    assert_eq!(
        values(&set),
        (1..=6).map(Value::from).collect::<Vec<_>>()
    );
    assert_eq!(
        mock.signatures(),
        vec![
            format!("GET {FIRST}"),
            format!("GET {SECOND}"),
            format!("GET {THIRD}"),
        ]
    );
    assert!(!set.has_next());
    assert_eq!(set.pending_operations(), 0);
}

#[tokio::test]
async fn end_of_list_sends_no_request() {
    let mock = Arc::new(MockHttpClient::new());
    mock.respond_json(format!("GET {FIRST}"), json!({"results": [1]}));
    let set = ResultSet::<_, Value>::paginated(mock.clone(), HttpRequest::get(FIRST), ResultSetOptions::default())
        .await
        .unwrap();

    let next = set.next().await.unwrap_err();
    let previous = set.previous().await.unwrap_err();
    assert!(next.is_end_of_list());
    assert_eq!(previous.kind, ErrorKind::EndOfList);
    assert_eq!(mock.request_count(), 1);
    // Not recorded as a failure.
    assert!(set.error().is_none());
    assert_eq!(set.state(), LoadState::Ready);
}

#[tokio::test]
async fn previous_prepends_the_preceding_page() {
    let mock = three_pages();
    let set = ResultSet::<_, Value>::paginated(mock.clone(), HttpRequest::get(THIRD), ResultSetOptions::default())
        .await
        .unwrap();
    assert!(!set.has_next());
    assert!(set.has_previous());

    set.previous().await.unwrap();
    set.previous().await.unwrap();
    assert_eq!(values(&set), (1..=6).map(Value::from).collect::<Vec<_>>());
    assert!(!set.has_previous());
    assert!(set.previous().await.unwrap_err().is_end_of_list());
}

#[tokio::test]
async fn failed_page_is_retried_identically() {
    let mock = Arc::new(MockHttpClient::new());
    mock.respond_json(
        format!("GET {FIRST}"),
        json!({"results": [1, 2], "next": SECOND}),
    );
    mock.respond(format!("GET {SECOND}"), HttpResponse::json(503, &json!({})));
    mock.respond_json(format!("GET {SECOND}"), json!({"results": [3], "next": null}));

    let seen: Arc<Mutex<Vec<HbpError>>> = Arc::default();
    let hook_seen = Arc::clone(&seen);
    let options = ResultSetOptions::new().with_error_hook(move |e| hook_seen.lock().push(e.clone()));
    let set = ResultSet::<_, Value>::paginated(mock.clone(), HttpRequest::get(FIRST), options)
        .await
        .unwrap();

    let error = set.next().await.unwrap_err();
    assert_eq!(error.code, 503);
    assert_eq!(set.error(), Some(error.clone()));
    assert_eq!(set.state(), LoadState::Error);
    assert_eq!(values(&set), vec![json!(1), json!(2)]);
    assert!(set.has_next());
    assert_eq!(*seen.lock(), vec![error]);

    set.next().await.unwrap();
    assert_eq!(values(&set), vec![json!(1), json!(2), json!(3)]);
    assert!(set.error().is_none());
    assert_eq!(
        mock.signatures(),
        vec![
            format!("GET {FIRST}"),
            format!("GET {SECOND}"),
            format!("GET {SECOND}"),
        ]
    );

    // End of list reaches neither the hook nor the recorded error.
    assert!(set.next().await.unwrap_err().is_end_of_list());
    assert!(set.error().is_none());
    assert_eq!(seen.lock().len(), 1);
}

#[tokio::test]
async fn failed_first_page_is_retried_by_next() {
    let first = format!("GET {FIRST}");
    let mock_failing = Arc::new(MockHttpClient::new());
    mock_failing.fail(first.clone(), "connection reset");
    mock_failing.respond_json(
        first.clone(),
        json!({"results": [1, 2], "next": SECOND, "count": 6}),
    );
    mock_failing.respond_json(
        format!("GET {SECOND}"),
        json!({"results": [3, 4], "next": null}),
    );

    let set = ResultSet::<_, Value>::new(mock_failing.clone(), HttpRequest::get(FIRST), ResultSetOptions::default());
    let error = set.ready().await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::ClientError);
    assert_eq!(error.code, 0);

    set.next().await.unwrap();
    assert_eq!(values(&set), (1..=4).map(Value::from).collect::<Vec<_>>());
    assert_eq!(set.count(), 6);
    assert_eq!(mock_failing.request_count(), 3);
}

#[tokio::test]
async fn custom_envelope_keys() {
    let mock = Arc::new(MockHttpClient::new());
    mock.respond_json(
        "GET https://id/user",
        json!({"result": [{"id": "1"}], "nextPage": "https://id/user?page=1"}),
    );
    mock.respond_json(
        "GET https://id/user?page=1",
        json!({"result": [{"id": "2"}], "nextPage": null}),
    );

    let options = ResultSetOptions::new()
        .with_result_key("result")
        .with_next_key("nextPage");
    let set = ResultSet::<_, Value>::paginated(mock, HttpRequest::get("https://id/user"), options)
        .await
        .unwrap();
    set.next().await.unwrap();
    assert_eq!(set.results(), vec![json!({"id": "1"}), json!({"id": "2"})]);
}

#[tokio::test]
async fn bad_envelope_keeps_previous_items() {
    let mock = Arc::new(MockHttpClient::new());
    mock.respond_json(format!("GET {FIRST}"), json!({"results": [1], "next": SECOND}));
    mock.respond_json(format!("GET {SECOND}"), json!({"results": "oops", "next": THIRD}));

    let set = ResultSet::<_, Value>::paginated(mock, HttpRequest::get(FIRST), ResultSetOptions::default())
        .await
        .unwrap();
    let error = set.next().await.unwrap_err();
    assert_eq!(error.kind, ErrorKind::InvalidEnvelope);
    assert_eq!(values(&set), vec![json!(1)]);
    assert_eq!(set.next_url().as_deref(), Some(SECOND));
}

#[tokio::test]
async fn dropped_operation_releases_its_turn() {
    let mock = three_pages();
    let set = ResultSet::<_, Value>::new(mock.clone(), HttpRequest::get(FIRST), ResultSetOptions::default());

    let abandoned = set.next();
    drop(abandoned);
    set.ready().await.unwrap();
    assert_eq!(values(&set), vec![json!(1), json!(2)]);
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn abandoned_next_restores_the_state() {
    let mock = three_pages();
    let set = ResultSet::<_, Value>::paginated(
        mock.clone(),
        HttpRequest::get(FIRST),
        ResultSetOptions::default(),
    )
    .await
    .unwrap();

    {
        let mut next = Box::pin(set.next());
        let first = poll_fn(|cx| Poll::Ready(next.as_mut().poll(cx))).await;
        assert!(first.is_pending());
        assert_eq!(set.state(), LoadState::Loading);
    }

    assert_eq!(mock.request_count(), 2);
    assert_eq!(set.state(), LoadState::Ready);
    assert_eq!(set.len(), 2);
    assert!(set.has_next());
    assert!(set.error().is_none());

    set.next().await.unwrap();
    assert_eq!(values(&set), vec![json!(1), json!(2), json!(3), json!(4)]);
}
