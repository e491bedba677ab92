use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::config::ResolvedConfig;
use crate::domain::{CollectionName, DATASETS, DatasetDescriptor};
use crate::error::SnapshotError;
use crate::http::{FeedClient, redact_url};
use crate::loader::{self, StoreOutcome};
use crate::provenance::{self, ProvDocument};
use crate::store::{Repository, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteResult {
    #[serde(flatten)]
    pub window: RunWindow,
    pub items: Vec<DatasetResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetResult {
    pub collection: String,
    pub label: String,
    pub source: String,
    #[serde(flatten)]
    pub outcome: StoreOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub collections: Vec<CollectionEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionEntry {
    pub name: String,
    pub documents: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitResult {
    pub root: String,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// The snapshot pipeline: fetch every dataset into the repository, then
/// describe the run as a PROV document.
#[derive(Clone)]
pub struct App<C: FeedClient> {
    repository: Repository,
    config: ResolvedConfig,
    client: C,
}

impl<C: FeedClient> App<C> {
    pub fn new(config: ResolvedConfig, client: C) -> Self {
        let repository = Repository::new(config.repository.root.clone());
        Self {
            repository,
            config,
            client,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn connect(&self) -> Result<Session, SnapshotError> {
        self.repository.connect(&self.config.repository.credentials)
    }

    /// Source URL for each dataset with its provider credential filled in.
    pub fn dataset_urls(
        &self,
    ) -> Result<Vec<(&'static DatasetDescriptor, CollectionName, String)>, SnapshotError> {
        DATASETS
            .iter()
            .map(|dataset| {
                let credential = self.config.credential(dataset.provider)?;
                Ok((dataset, dataset.collection_name()?, dataset.url(credential)))
            })
            .collect()
    }

    /// Fetches and stores all datasets in order. A non-200 response skips that
    /// dataset and moves on; every other failure aborts the run. `trial` is
    /// accepted for compatibility and has no effect.
    pub fn execute(
        &self,
        trial: bool,
        sink: &dyn ProgressSink,
    ) -> Result<ExecuteResult, SnapshotError> {
        let start = Utc::now();
        if trial {
            tracing::debug!("trial flag set; it does not change the run");
        }

        let session = self.connect()?;
        let targets = self.dataset_urls()?;

        let mut items = Vec::with_capacity(targets.len());
        for (dataset, collection, url) in targets {
            sink.event(ProgressEvent {
                message: format!("phase=Fetch; {} from {}", collection, redact_url(&url)),
                elapsed: None,
            });
            let started = Instant::now();
            let outcome = loader::store(&session, &self.client, &url, &collection)?;
            match outcome {
                StoreOutcome::Stored { .. } => sink.event(ProgressEvent {
                    message: format!("phase=Store; replaced {collection}"),
                    elapsed: Some(started.elapsed()),
                }),
                StoreOutcome::SkippedNonSuccess { status } => {
                    tracing::warn!(
                        collection = %collection,
                        status,
                        "feed did not return 200; collection left unchanged"
                    );
                    sink.event(ProgressEvent {
                        message: format!("phase=Store; skipped {collection} (status {status})"),
                        elapsed: Some(started.elapsed()),
                    });
                }
            }
            items.push(DatasetResult {
                collection: collection.to_string(),
                label: dataset.label.to_string(),
                source: redact_url(&url),
                outcome,
            });
        }

        session.logout();
        let end = Utc::now();

        Ok(ExecuteResult {
            window: RunWindow { start, end },
            items,
        })
    }

    /// Fills `document` with the retrieval record for the built-in datasets.
    /// Opens and closes its own session; nothing is shared with `execute`.
    pub fn provenance(
        &self,
        mut document: ProvDocument,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        sink: &dyn ProgressSink,
    ) -> Result<ProvDocument, SnapshotError> {
        let session = self.connect()?;
        sink.event(ProgressEvent {
            message: "phase=Provenance; recording retrieval activities".to_string(),
            elapsed: None,
        });
        provenance::record_retrieval(&mut document, &DATASETS, start, end)?;
        session.logout();
        Ok(document)
    }

    pub fn init(&self, sink: &dyn ProgressSink) -> Result<InitResult, SnapshotError> {
        sink.event(ProgressEvent {
            message: format!("phase=Store; initializing {}", self.repository.root()),
            elapsed: None,
        });
        let credentials = &self.config.repository.credentials;
        self.repository.init(credentials)?;
        Ok(InitResult {
            root: self.repository.root().to_string(),
            username: credentials.username.clone(),
        })
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, SnapshotError> {
        sink.event(ProgressEvent {
            message: "phase=Resolve; scanning repository".to_string(),
            elapsed: None,
        });
        let session = self.connect()?;
        let collections = session
            .list_collections()?
            .into_iter()
            .map(|name| {
                let documents = session.find(&name)?.len();
                Ok(CollectionEntry {
                    name: name.to_string(),
                    documents,
                })
            })
            .collect::<Result<Vec<_>, SnapshotError>>()?;
        session.logout();
        Ok(ListResult { collections })
    }

    pub fn show(
        &self,
        collection: &CollectionName,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<Value>, SnapshotError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; reading {collection}"),
            elapsed: None,
        });
        let session = self.connect()?;
        let documents = session.find(collection)?;
        session.logout();
        Ok(documents)
    }
}
