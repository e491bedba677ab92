//! W3C PROV document model with PROV-N and PROV-JSON serialization, and the
//! retrieval record written for each snapshot run.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{Map, Value, json};

use crate::domain::{ALGORITHM_NAME, CONTRIBUTOR, DatasetDescriptor, Provider};
use crate::error::SnapshotError;

static PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    prefix: String,
    local: String,
}

impl QualifiedName {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn local(&self) -> &str {
        &self.local
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.prefix, self.local)
    }
}

impl FromStr for QualifiedName {
    type Err = SnapshotError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let Some((prefix, local)) = value.split_once(':') else {
            return Err(SnapshotError::InvalidQualifiedName(value.to_string()));
        };
        if !PREFIX.is_match(prefix) || local.is_empty() || local.contains(char::is_whitespace) {
            return Err(SnapshotError::InvalidQualifiedName(value.to_string()));
        }
        Ok(Self {
            prefix: prefix.to_string(),
            local: local.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Literal(String),
    QualifiedName(QualifiedName),
}

impl AttributeValue {
    fn to_provn(&self) -> String {
        match self {
            AttributeValue::Literal(value) => format!("\"{}\"", escape(value)),
            AttributeValue::QualifiedName(name) => format!("'{name}'"),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            AttributeValue::Literal(value) => Value::String(value.clone()),
            AttributeValue::QualifiedName(name) => json!({
                "$": name.to_string(),
                "type": "prov:QUALIFIED_NAME",
            }),
        }
    }
}

/// Attribute list as written by callers, e.g.
/// `[("prov:label", Literal("Routes")), ("prov:type", QualifiedName(..))]`.
pub type Attributes = Vec<(QualifiedName, AttributeValue)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Entity,
    Agent,
    Activity,
    Usage,
    Generation,
    Derivation,
    Attribution,
    Association,
}

impl RecordKind {
    /// PROV-N keyword, also used as the PROV-JSON bundle key.
    pub fn keyword(self) -> &'static str {
        match self {
            RecordKind::Entity => "entity",
            RecordKind::Agent => "agent",
            RecordKind::Activity => "activity",
            RecordKind::Usage => "used",
            RecordKind::Generation => "wasGeneratedBy",
            RecordKind::Derivation => "wasDerivedFrom",
            RecordKind::Attribution => "wasAttributedTo",
            RecordKind::Association => "wasAssociatedWith",
        }
    }

    const SERIALIZATION_ORDER: [RecordKind; 8] = [
        RecordKind::Entity,
        RecordKind::Agent,
        RecordKind::Activity,
        RecordKind::Usage,
        RecordKind::Generation,
        RecordKind::Derivation,
        RecordKind::Attribution,
        RecordKind::Association,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Entity {
        id: QualifiedName,
        attributes: Attributes,
    },
    Agent {
        id: QualifiedName,
        attributes: Attributes,
    },
    Activity {
        id: QualifiedName,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        attributes: Attributes,
    },
    Usage {
        activity: QualifiedName,
        entity: QualifiedName,
        time: Option<DateTime<Utc>>,
        attributes: Attributes,
    },
    Generation {
        entity: QualifiedName,
        activity: QualifiedName,
        time: Option<DateTime<Utc>>,
    },
    Derivation {
        generated: QualifiedName,
        used: QualifiedName,
        activity: Option<QualifiedName>,
    },
    Attribution {
        entity: QualifiedName,
        agent: QualifiedName,
    },
    Association {
        activity: QualifiedName,
        agent: QualifiedName,
    },
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Entity { .. } => RecordKind::Entity,
            Record::Agent { .. } => RecordKind::Agent,
            Record::Activity { .. } => RecordKind::Activity,
            Record::Usage { .. } => RecordKind::Usage,
            Record::Generation { .. } => RecordKind::Generation,
            Record::Derivation { .. } => RecordKind::Derivation,
            Record::Attribution { .. } => RecordKind::Attribution,
            Record::Association { .. } => RecordKind::Association,
        }
    }

    fn to_provn(&self) -> String {
        match self {
            Record::Entity { id, attributes } => {
                format!("entity({id}{})", provn_attributes(attributes))
            }
            Record::Agent { id, attributes } => {
                format!("agent({id}{})", provn_attributes(attributes))
            }
            Record::Activity {
                id,
                start,
                end,
                attributes,
            } => format!(
                "activity({id}, {}, {}{})",
                provn_time(start),
                provn_time(end),
                provn_attributes(attributes)
            ),
            Record::Usage {
                activity,
                entity,
                time,
                attributes,
            } => format!(
                "used({activity}, {entity}, {}{})",
                provn_time(time),
                provn_attributes(attributes)
            ),
            Record::Generation {
                entity,
                activity,
                time,
            } => format!("wasGeneratedBy({entity}, {activity}, {})", provn_time(time)),
            Record::Derivation {
                generated,
                used,
                activity,
            } => format!(
                "wasDerivedFrom({generated}, {used}, {}, -, -)",
                activity
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "-".to_string())
            ),
            Record::Attribution { entity, agent } => format!("wasAttributedTo({entity}, {agent})"),
            Record::Association { activity, agent } => {
                format!("wasAssociatedWith({activity}, {agent}, -)")
            }
        }
    }

    fn json_body(&self) -> Map<String, Value> {
        let mut body = Map::new();
        match self {
            Record::Entity { attributes, .. } | Record::Agent { attributes, .. } => {
                extend_json_attributes(&mut body, attributes);
            }
            Record::Activity {
                start,
                end,
                attributes,
                ..
            } => {
                insert_time(&mut body, "prov:startTime", start);
                insert_time(&mut body, "prov:endTime", end);
                extend_json_attributes(&mut body, attributes);
            }
            Record::Usage {
                activity,
                entity,
                time,
                attributes,
            } => {
                body.insert("prov:activity".into(), activity.to_string().into());
                body.insert("prov:entity".into(), entity.to_string().into());
                insert_time(&mut body, "prov:time", time);
                extend_json_attributes(&mut body, attributes);
            }
            Record::Generation {
                entity,
                activity,
                time,
            } => {
                body.insert("prov:entity".into(), entity.to_string().into());
                body.insert("prov:activity".into(), activity.to_string().into());
                insert_time(&mut body, "prov:time", time);
            }
            Record::Derivation {
                generated,
                used,
                activity,
            } => {
                body.insert("prov:generatedEntity".into(), generated.to_string().into());
                body.insert("prov:usedEntity".into(), used.to_string().into());
                if let Some(activity) = activity {
                    body.insert("prov:activity".into(), activity.to_string().into());
                }
            }
            Record::Attribution { entity, agent } => {
                body.insert("prov:entity".into(), entity.to_string().into());
                body.insert("prov:agent".into(), agent.to_string().into());
            }
            Record::Association { activity, agent } => {
                body.insert("prov:activity".into(), activity.to_string().into());
                body.insert("prov:agent".into(), agent.to_string().into());
            }
        }
        body
    }

    fn element_id(&self) -> Option<&QualifiedName> {
        match self {
            Record::Entity { id, .. } | Record::Agent { id, .. } | Record::Activity { id, .. } => {
                Some(id)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub prefix: String,
    pub uri: String,
}

/// A PROV document. Identifiers and attribute keys are checked against the
/// declared namespaces when records are added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProvDocument {
    namespaces: Vec<Namespace>,
    records: Vec<Record>,
}

impl ProvDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a prefix; redeclaring replaces the URI.
    pub fn add_namespace(&mut self, prefix: &str, uri: &str) {
        match self.namespaces.iter_mut().find(|ns| ns.prefix == prefix) {
            Some(existing) => existing.uri = uri.to_string(),
            None => self.namespaces.push(Namespace {
                prefix: prefix.to_string(),
                uri: uri.to_string(),
            }),
        }
    }

    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn count(&self, kind: RecordKind) -> usize {
        self.records
            .iter()
            .filter(|record| record.kind() == kind)
            .count()
    }

    /// Parses `value` and checks that its prefix is declared.
    pub fn qualified_name(&self, value: &str) -> Result<QualifiedName, SnapshotError> {
        let name: QualifiedName = value.parse()?;
        let builtin = matches!(name.prefix(), "prov" | "xsd");
        if !builtin && !self.namespaces.iter().any(|ns| ns.prefix == name.prefix()) {
            return Err(SnapshotError::UnknownPrefix(name.prefix().to_string()));
        }
        Ok(name)
    }

    pub fn literal(
        &self,
        key: &str,
        value: &str,
    ) -> Result<(QualifiedName, AttributeValue), SnapshotError> {
        Ok((
            self.qualified_name(key)?,
            AttributeValue::Literal(value.to_string()),
        ))
    }

    pub fn qname_attribute(
        &self,
        key: &str,
        value: &str,
    ) -> Result<(QualifiedName, AttributeValue), SnapshotError> {
        Ok((
            self.qualified_name(key)?,
            AttributeValue::QualifiedName(self.qualified_name(value)?),
        ))
    }

    pub fn entity(
        &mut self,
        id: &str,
        attributes: Attributes,
    ) -> Result<QualifiedName, SnapshotError> {
        let id = self.qualified_name(id)?;
        self.records.push(Record::Entity {
            id: id.clone(),
            attributes,
        });
        Ok(id)
    }

    pub fn agent(
        &mut self,
        id: &str,
        attributes: Attributes,
    ) -> Result<QualifiedName, SnapshotError> {
        let id = self.qualified_name(id)?;
        self.records.push(Record::Agent {
            id: id.clone(),
            attributes,
        });
        Ok(id)
    }

    pub fn activity(
        &mut self,
        id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<QualifiedName, SnapshotError> {
        let id = self.qualified_name(id)?;
        self.records.push(Record::Activity {
            id: id.clone(),
            start,
            end,
            attributes: Vec::new(),
        });
        Ok(id)
    }

    pub fn used(
        &mut self,
        activity: &QualifiedName,
        entity: &QualifiedName,
        time: Option<DateTime<Utc>>,
        attributes: Attributes,
    ) {
        self.records.push(Record::Usage {
            activity: activity.clone(),
            entity: entity.clone(),
            time,
            attributes,
        });
    }

    pub fn was_generated_by(
        &mut self,
        entity: &QualifiedName,
        activity: &QualifiedName,
        time: Option<DateTime<Utc>>,
    ) {
        self.records.push(Record::Generation {
            entity: entity.clone(),
            activity: activity.clone(),
            time,
        });
    }

    pub fn was_derived_from(
        &mut self,
        generated: &QualifiedName,
        used: &QualifiedName,
        activity: Option<&QualifiedName>,
    ) {
        self.records.push(Record::Derivation {
            generated: generated.clone(),
            used: used.clone(),
            activity: activity.cloned(),
        });
    }

    pub fn was_attributed_to(&mut self, entity: &QualifiedName, agent: &QualifiedName) {
        self.records.push(Record::Attribution {
            entity: entity.clone(),
            agent: agent.clone(),
        });
    }

    pub fn was_associated_with(&mut self, activity: &QualifiedName, agent: &QualifiedName) {
        self.records.push(Record::Association {
            activity: activity.clone(),
            agent: agent.clone(),
        });
    }

    /// PROV-N notation, records in insertion order.
    pub fn to_provn(&self) -> String {
        let mut out = String::from("document\n");
        for ns in &self.namespaces {
            out.push_str(&format!("  prefix {} <{}>\n", ns.prefix, ns.uri));
        }
        if !self.namespaces.is_empty() && !self.records.is_empty() {
            out.push('\n');
        }
        for record in &self.records {
            out.push_str("  ");
            out.push_str(&record.to_provn());
            out.push('\n');
        }
        out.push_str("endDocument");
        out
    }

    /// PROV-JSON. Relations get sequential blank-node ids (`_:id1`, ...).
    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        if !self.namespaces.is_empty() {
            let prefixes = self
                .namespaces
                .iter()
                .map(|ns| (ns.prefix.clone(), Value::String(ns.uri.clone())))
                .collect::<Map<_, _>>();
            root.insert("prefix".to_string(), Value::Object(prefixes));
        }

        let mut blank = 0usize;
        for kind in RecordKind::SERIALIZATION_ORDER {
            let mut bundle = Map::new();
            for record in self.records.iter().filter(|record| record.kind() == kind) {
                let key = match record.element_id() {
                    Some(id) => id.to_string(),
                    None => {
                        blank += 1;
                        format!("_:id{blank}")
                    }
                };
                bundle.insert(key, Value::Object(record.json_body()));
            }
            if !bundle.is_empty() {
                root.insert(kind.keyword().to_string(), Value::Object(bundle));
            }
        }
        Value::Object(root)
    }
}

fn provn_attributes(attributes: &Attributes) -> String {
    if attributes.is_empty() {
        return String::new();
    }
    let items = attributes
        .iter()
        .map(|(key, value)| format!("{key}={}", value.to_provn()))
        .collect::<Vec<_>>();
    format!(", [{}]", items.join(", "))
}

fn provn_time(time: &Option<DateTime<Utc>>) -> String {
    time.map(format_time).unwrap_or_else(|| "-".to_string())
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn insert_time(body: &mut Map<String, Value>, key: &str, time: &Option<DateTime<Utc>>) {
    if let Some(time) = time {
        body.insert(key.to_string(), Value::String(format_time(*time)));
    }
}

fn extend_json_attributes(body: &mut Map<String, Value>, attributes: &Attributes) {
    for (key, value) in attributes {
        body.insert(key.to_string(), value.to_json());
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Writes the retrieval record for one run into `document`: the agent, one
/// resource, activity and dataset per descriptor, and the relations linking
/// them. Does not depend on whether the fetches succeeded.
pub fn record_retrieval(
    document: &mut ProvDocument,
    datasets: &[DatasetDescriptor],
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<(), SnapshotError> {
    document.add_namespace("alg", "http://datamechanics.io/algorithm/");
    document.add_namespace("dat", "http://datamechanics.io/data/");
    document.add_namespace("ont", "http://datamechanics.io/ontology#");
    document.add_namespace("log", "http://datamechanics.io/log/");
    for provider in Provider::ALL {
        document.add_namespace(provider.prefix(), provider.namespace_uri());
    }

    let agent_attributes = vec![
        document.qname_attribute("prov:type", "prov:SoftwareAgent")?,
        document.literal("ont:Extension", "rs")?,
    ];
    let agent = document.agent(
        &format!("alg:{CONTRIBUTOR}#{ALGORITHM_NAME}"),
        agent_attributes,
    )?;

    for dataset in datasets {
        let collection = dataset.collection_name()?;

        let resource_attributes = vec![
            document.literal("prov:label", dataset.label)?,
            document.qname_attribute("prov:type", "ont:DataResource")?,
            document.literal("ont:Extension", "json")?,
        ];
        let resource = document.entity(
            &format!("{}:{}", dataset.provider.prefix(), dataset.resource),
            resource_attributes,
        )?;

        let activity =
            document.activity(&format!("log:uuid{}", uuid::Uuid::new_v4()), start, end)?;
        document.was_associated_with(&activity, &agent);
        let usage_attributes = vec![document.qname_attribute("prov:type", "ont:Retrieval")?];
        document.used(&activity, &resource, start, usage_attributes);

        let dataset_attributes = vec![
            document.literal("prov:label", dataset.label)?,
            document.qname_attribute("prov:type", "ont:DataSet")?,
        ];
        let generated = document.entity(
            &format!("dat:{}#{}", collection.namespace(), collection.local_name()),
            dataset_attributes,
        )?;
        document.was_attributed_to(&generated, &agent);
        document.was_generated_by(&generated, &activity, end);
        document.was_derived_from(&generated, &resource, Some(&activity));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_name_requires_prefix() {
        assert!("ont:DataSet".parse::<QualifiedName>().is_ok());
        assert!("no-prefix".parse::<QualifiedName>().is_err());
        assert!(":local".parse::<QualifiedName>().is_err());
        assert!("dat:".parse::<QualifiedName>().is_err());
    }

    #[test]
    fn literal_values_are_escaped() {
        let value = AttributeValue::Literal("say \"hi\"".to_string());
        assert_eq!(value.to_provn(), "\"say \\\"hi\\\"\"");
    }
}
