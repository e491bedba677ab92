use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;

/// Account namespace that owns every collection this tool writes.
pub const CONTRIBUTOR: &str = "asafer_vivyee";

/// Name of the fetch algorithm as it appears in provenance records.
pub const ALGORITHM_NAME: &str = "fetch_data";

static COLLECTION_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionName(String);

impl CollectionName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First dotted segment; the account that may write the collection.
    pub fn namespace(&self) -> &str {
        self.0.split_once('.').map(|(ns, _)| ns).unwrap_or(&self.0)
    }

    /// Everything after the namespace.
    pub fn local_name(&self) -> &str {
        self.0.split_once('.').map(|(_, rest)| rest).unwrap_or("")
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CollectionName {
    type Err = SnapshotError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let segments = normalized.split('.').collect::<Vec<_>>();
        let is_valid = segments.len() >= 2
            && segments
                .iter()
                .all(|segment| COLLECTION_SEGMENT.is_match(segment));
        if !is_valid {
            return Err(SnapshotError::InvalidCollection(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for CollectionName {
    type Error = SnapshotError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CollectionName> for String {
    fn from(value: CollectionName) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialField {
    Key,
    Token,
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialField::Key => write!(f, "key"),
            CredentialField::Token => write!(f, "token"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    CityOfBoston,
    Cdc,
    Mbta,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::CityOfBoston, Provider::Cdc, Provider::Mbta];

    /// Key under `services` in the credential config.
    pub fn service_name(self) -> &'static str {
        match self {
            Provider::CityOfBoston => "cityofbostondataportal",
            Provider::Cdc => "cdcdataportal",
            Provider::Mbta => "mbtadeveloperportal",
        }
    }

    pub fn credential_field(self) -> CredentialField {
        match self {
            Provider::CityOfBoston | Provider::Cdc => CredentialField::Token,
            Provider::Mbta => CredentialField::Key,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Provider::CityOfBoston => "bdp",
            Provider::Cdc => "cdc",
            Provider::Mbta => "mbta",
        }
    }

    pub fn namespace_uri(self) -> &'static str {
        match self {
            Provider::CityOfBoston => "https://data.cityofboston.gov/resource/",
            Provider::Cdc => "https://chronicdata.cdc.gov/resource/",
            Provider::Mbta => "http://realtime.mbta.com/developer/api/v2/",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DatasetDescriptor {
    pub collection: &'static str,
    pub provider: Provider,
    /// Resource identifier on the provider's side, e.g. a Socrata view id.
    pub resource: &'static str,
    pub label: &'static str,
    /// Source URL with a `{credential}` placeholder.
    pub url_template: &'static str,
}

impl DatasetDescriptor {
    pub fn collection_name(&self) -> Result<CollectionName, SnapshotError> {
        self.collection.parse()
    }

    pub fn url(&self, credential: &str) -> String {
        self.url_template
            .replace("{credential}", &urlencoding::encode(credential))
    }
}

pub static DATASETS: [DatasetDescriptor; 5] = [
    DatasetDescriptor {
        collection: "asafer_vivyee.orchards",
        provider: Provider::CityOfBoston,
        resource: "8tmm-wjbw",
        label: "Urban Orchard Locations",
        url_template: "https://data.cityofboston.gov/resource/8tmm-wjbw.json?$$app_token={credential}",
    },
    DatasetDescriptor {
        collection: "asafer_vivyee.corner_stores",
        provider: Provider::CityOfBoston,
        resource: "ybm6-m5qd",
        label: "Healthy Corner Store Locations",
        url_template: "https://data.cityofboston.gov/resource/ybm6-m5qd.json?$$app_token={credential}",
    },
    DatasetDescriptor {
        collection: "asafer_vivyee.obesity",
        provider: Provider::Cdc,
        resource: "a2ye-t2pa",
        label: "Obesity Among Adults",
        url_template: "https://chronicdata.cdc.gov/resource/a2ye-t2pa.json?$$app_token={credential}",
    },
    DatasetDescriptor {
        collection: "asafer_vivyee.nutrition_prog",
        provider: Provider::CityOfBoston,
        resource: "ahjc-pw5e",
        label: "Community Culinary and Nutrition Programs",
        url_template: "https://data.cityofboston.gov/resource/ahjc-pw5e.json?$$app_token={credential}",
    },
    DatasetDescriptor {
        collection: "asafer_vivyee.mbta_routes",
        provider: Provider::Mbta,
        resource: "routes",
        label: "MBTA Routes",
        url_template: "http://realtime.mbta.com/developer/api/v2/routes?api_key={credential}&format=json",
    },
];

#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmInfo {
    pub contributor: String,
    pub name: String,
    pub reads: Vec<String>,
    pub writes: Vec<String>,
}

pub fn algorithm_info() -> AlgorithmInfo {
    AlgorithmInfo {
        contributor: CONTRIBUTOR.to_string(),
        name: ALGORITHM_NAME.to_string(),
        reads: Vec::new(),
        writes: DATASETS
            .iter()
            .map(|dataset| dataset.collection.to_string())
            .collect(),
    }
}
