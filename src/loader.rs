use serde::Serialize;
use serde_json::Value;

use crate::domain::CollectionName;
use crate::error::SnapshotError;
use crate::http::{FeedClient, redact_url};
use crate::store::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StoreOutcome {
    Stored { documents: usize },
    SkippedNonSuccess { status: u16 },
}

/// Fetches `url` and replaces `collection` with a single document holding the
/// response body. Anything but a 200 leaves the collection untouched.
pub fn store<C: FeedClient + ?Sized>(
    session: &Session,
    client: &C,
    url: &str,
    collection: &CollectionName,
) -> Result<StoreOutcome, SnapshotError> {
    let response = client.get(url)?;
    if !response.is_ok() {
        tracing::debug!(
            url = %redact_url(url),
            status = response.status,
            collection = %collection,
            "non-200 response, keeping previous snapshot"
        );
        return Ok(StoreOutcome::SkippedNonSuccess {
            status: response.status,
        });
    }

    // Parse before touching the collection so a bad body cannot wipe it.
    let body: Value =
        serde_json::from_slice(&response.body).map_err(|err| SnapshotError::MalformedPayload {
            collection: collection.to_string(),
            message: err.to_string(),
        })?;

    session.drop_collection(collection)?;
    session.create_collection(collection)?;
    let documents = session.insert_many(collection, vec![body])?;
    Ok(StoreOutcome::Stored { documents })
}
