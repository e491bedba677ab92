use std::collections::HashMap;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::json;

use civic_snapshot::domain::CollectionName;
use civic_snapshot::error::SnapshotError;
use civic_snapshot::http::{FeedClient, FeedResponse};
use civic_snapshot::loader::{StoreOutcome, store};
use civic_snapshot::store::{Credentials, Repository, Session};

const URL: &str = "https://example.test/a.json";

#[derive(Default)]
struct MockFeed {
    responses: HashMap<String, (u16, String)>,
    calls: Mutex<usize>,
}

impl MockFeed {
    fn with(url: &str, status: u16, body: &str) -> Self {
        let mut responses = HashMap::new();
        responses.insert(url.to_string(), (status, body.to_string()));
        Self {
            responses,
            calls: Mutex::new(0),
        }
    }
}

impl FeedClient for MockFeed {
    fn get(&self, url: &str) -> Result<FeedResponse, SnapshotError> {
        *self.calls.lock().unwrap() += 1;
        let (status, body) = self
            .responses
            .get(url)
            .cloned()
            .ok_or_else(|| SnapshotError::FeedHttp(format!("connection refused: {url}")))?;
        Ok(FeedResponse {
            status,
            body: body.into_bytes(),
        })
    }
}

fn session() -> (tempfile::TempDir, Session) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("repo")).unwrap();
    let repo = Repository::new(root);
    let credentials = Credentials {
        username: "ns".to_string(),
        password: "pw".to_string(),
    };
    repo.init(&credentials).unwrap();
    let session = repo.connect(&credentials).unwrap();
    (temp, session)
}

fn collection() -> CollectionName {
    "ns.a".parse().unwrap()
}

#[test]
fn stores_body_as_single_document() {
    let (_temp, session) = session();
    let feed = MockFeed::with(URL, 200, r#"{"x":1}"#);

    let outcome = store(&session, &feed, URL, &collection()).unwrap();

    assert_eq!(outcome, StoreOutcome::Stored { documents: 1 });
    assert_eq!(session.find(&collection()).unwrap(), vec![json!({"x": 1})]);
}

#[test]
fn replaces_previous_contents() {
    let (_temp, session) = session();
    session.create_collection(&collection()).unwrap();
    session
        .insert_many(&collection(), vec![json!("old"), json!("older")])
        .unwrap();
    let feed = MockFeed::with(URL, 200, r#"[{"id":7},{"id":8}]"#);

    store(&session, &feed, URL, &collection()).unwrap();

    assert_eq!(
        session.find(&collection()).unwrap(),
        vec![json!([{"id": 7}, {"id": 8}])]
    );
}

#[test]
fn storing_twice_matches_storing_once() {
    let (_temp, session) = session();
    let feed = MockFeed::with(URL, 200, r#"{"x":1}"#);

    store(&session, &feed, URL, &collection()).unwrap();
    let once = session.find(&collection()).unwrap();
    store(&session, &feed, URL, &collection()).unwrap();
    let twice = session.find(&collection()).unwrap();

    assert_eq!(once, twice);
    assert_eq!(*feed.calls.lock().unwrap(), 2);
}

#[test]
fn non_200_leaves_missing_collection_absent() {
    let (_temp, session) = session();
    let feed = MockFeed::with(URL, 500, r#"{"error":"boom"}"#);

    let outcome = store(&session, &feed, URL, &collection()).unwrap();

    assert_eq!(outcome, StoreOutcome::SkippedNonSuccess { status: 500 });
    assert!(!session.collection_exists(&collection()));
}

#[test]
fn non_200_keeps_existing_snapshot() {
    let (_temp, session) = session();
    session.create_collection(&collection()).unwrap();
    session
        .insert_many(&collection(), vec![json!({"kept": true})])
        .unwrap();

    for status in [201, 301, 404, 503] {
        let feed = MockFeed::with(URL, status, "[]");
        let outcome = store(&session, &feed, URL, &collection()).unwrap();
        assert_eq!(outcome, StoreOutcome::SkippedNonSuccess { status });
        assert_eq!(
            session.find(&collection()).unwrap(),
            vec![json!({"kept": true})]
        );
    }
}

#[test]
fn malformed_body_fails_without_dropping() {
    let (_temp, session) = session();
    session.create_collection(&collection()).unwrap();
    session
        .insert_many(&collection(), vec![json!({"kept": true})])
        .unwrap();
    let feed = MockFeed::with(URL, 200, "<html>maintenance</html>");

    let result = store(&session, &feed, URL, &collection());

    assert_matches!(
        result,
        Err(SnapshotError::MalformedPayload { collection: name, .. }) if name == "ns.a"
    );
    assert_eq!(
        session.find(&collection()).unwrap(),
        vec![json!({"kept": true})]
    );
}

#[test]
fn transport_errors_propagate() {
    let (_temp, session) = session();
    let feed = MockFeed::default();

    assert_matches!(
        store(&session, &feed, URL, &collection()),
        Err(SnapshotError::FeedHttp(_))
    );
    assert!(!session.collection_exists(&collection()));
}
