use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::json;

use civic_snapshot::domain::CollectionName;
use civic_snapshot::error::SnapshotError;
use civic_snapshot::store::{Credentials, Repository};

fn credentials(username: &str, password: &str) -> Credentials {
    Credentials {
        username: username.to_string(),
        password: password.to_string(),
    }
}

fn repository() -> (tempfile::TempDir, Repository) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("repo")).unwrap();
    (temp, Repository::new(root))
}

#[test]
fn connect_requires_existing_repository() {
    let (_temp, repo) = repository();
    assert_matches!(
        repo.connect(&credentials("ns", "pw")),
        Err(SnapshotError::StoreUnreachable(_))
    );
}

#[test]
fn connect_rejects_bad_credentials() {
    let (_temp, repo) = repository();
    repo.init(&credentials("ns", "pw")).unwrap();

    assert_matches!(
        repo.connect(&credentials("ns", "wrong")),
        Err(SnapshotError::AuthenticationFailed(user)) if user == "ns"
    );
    assert_matches!(
        repo.connect(&credentials("other", "pw")),
        Err(SnapshotError::AuthenticationFailed(_))
    );
    assert!(repo.connect(&credentials("ns", "pw")).is_ok());
}

#[test]
fn drop_create_insert_cycle() {
    let (_temp, repo) = repository();
    let creds = credentials("ns", "pw");
    repo.init(&creds).unwrap();
    let session = repo.connect(&creds).unwrap();
    let name: CollectionName = "ns.a".parse().unwrap();

    assert!(!session.drop_collection(&name).unwrap());
    session.create_collection(&name).unwrap();
    assert!(session.find(&name).unwrap().is_empty());
    assert_matches!(
        session.create_collection(&name),
        Err(SnapshotError::CollectionExists(_))
    );

    let inserted = session
        .insert_many(&name, vec![json!({"x": 1}), json!({"x": 2})])
        .unwrap();
    assert_eq!(inserted, 2);
    assert_eq!(session.find(&name).unwrap(), vec![json!({"x": 1}), json!({"x": 2})]);

    assert!(session.drop_collection(&name).unwrap());
    assert!(!session.collection_exists(&name));
    assert_matches!(session.find(&name), Err(SnapshotError::CollectionNotFound(_)));
    session.logout();
}

#[test]
fn writes_are_limited_to_own_namespace() {
    let (_temp, repo) = repository();
    let creds = credentials("ns", "pw");
    repo.init(&creds).unwrap();
    let session = repo.connect(&creds).unwrap();
    let foreign: CollectionName = "other.a".parse().unwrap();

    assert_matches!(
        session.create_collection(&foreign),
        Err(SnapshotError::PermissionDenied { user, collection })
            if user == "ns" && collection == "other.a"
    );
    assert_matches!(
        session.drop_collection(&foreign),
        Err(SnapshotError::PermissionDenied { .. })
    );
    assert_matches!(
        session.insert_many(&foreign, vec![json!(1)]),
        Err(SnapshotError::PermissionDenied { .. })
    );
}

#[test]
fn list_collections_is_sorted() {
    let (_temp, repo) = repository();
    let creds = credentials("ns", "pw");
    repo.init(&creds).unwrap();
    let session = repo.connect(&creds).unwrap();
    for name in ["ns.b", "ns.a", "ns.c"] {
        session
            .create_collection(&name.parse::<CollectionName>().unwrap())
            .unwrap();
    }

    let names = session
        .list_collections()
        .unwrap()
        .into_iter()
        .map(|name| name.to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["ns.a", "ns.b", "ns.c"]);
}

#[test]
fn init_keeps_existing_accounts() {
    let (_temp, repo) = repository();
    repo.init(&credentials("first", "one")).unwrap();
    repo.init(&credentials("second", "two")).unwrap();

    assert!(repo.connect(&credentials("first", "one")).is_ok());
    assert!(repo.connect(&credentials("second", "two")).is_ok());
}

#[test]
fn corrupt_accounts_file_is_reported() {
    let (_temp, repo) = repository();
    repo.init(&credentials("ns", "pw")).unwrap();
    std::fs::write(repo.root().join("accounts.json").as_std_path(), b"[1,2").unwrap();

    assert_matches!(
        repo.connect(&credentials("ns", "pw")),
        Err(SnapshotError::StoreCorrupt { .. })
    );
}
