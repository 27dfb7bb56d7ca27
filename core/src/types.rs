//! Domain records returned by the Mozenda API.
//!
//! # Design
//! The service owns every entity; the client only reshapes responses. Each
//! typed record models the fields callers commonly need and keeps every leaf
//! value of the response element in `raw`, so fields the service adds later
//! are still reachable without a crate update.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{ApiError, Result};
use crate::xml::Element;

pub type AgentId = u64;
pub type CollectionId = u64;
pub type FieldId = u64;
pub type ItemId = u64;
pub type ViewId = u64;

/// Job identifiers are opaque strings issued by the service.
pub type JobId = String;

/// Ordered name/value pairs, in the order the service sent them. A name may
/// repeat when the service sends several values for one field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    entries: Vec<(String, String)>,
}

/// A collection or view item: field name to value.
pub type Item = Record;

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing an existing entry in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Append an entry, keeping any earlier value under the same name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value under `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

/// Serializes as a map. A repeated name becomes one key holding every value
/// as a sequence, placed where the name first appeared.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.keys() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        let mut map = serializer.serialize_map(Some(names.len()))?;
        for name in names {
            let values: Vec<&str> = self.get_all(name).collect();
            match values.as_slice() {
                [value] => map.serialize_entry(name, value)?,
                _ => map.serialize_entry(name, &values)?,
            }
        }
        map.end()
    }
}

/// A scraping agent definition.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Agent {
    pub agent_id: AgentId,
    pub name: String,
    pub description: Option<String>,
    pub status: Option<String>,
    /// Result collection; present on `Agent.Get` responses.
    pub collection_id: Option<CollectionId>,
    /// Leaf values of the `Settings` element, when the service sends one.
    pub settings: Record,
    pub raw: Record,
}

impl Agent {
    pub(crate) fn from_element(el: &Element) -> Result<Self> {
        Ok(Self {
            agent_id: required_id(el, "AgentID")?,
            name: el.child_text("Name").unwrap_or_default().to_string(),
            description: optional_text(el, "Description"),
            status: optional_text(el, "Status"),
            collection_id: optional_id(el, "CollectionID")?,
            settings: el.child("Settings").map(Element::to_record).unwrap_or_default(),
            raw: el.to_record(),
        })
    }
}

/// A dataset agents deposit results into.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Collection {
    pub collection_id: CollectionId,
    pub name: String,
    pub description: Option<String>,
    /// Fields listed inline under `FieldList`, if the response includes them.
    pub fields: Vec<Field>,
    pub raw: Record,
}

impl Collection {
    pub(crate) fn from_element(el: &Element) -> Result<Self> {
        let fields = match el.child("FieldList") {
            Some(list) => list
                .children("Field")
                .map(Field::from_element)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            collection_id: required_id(el, "CollectionID")?,
            name: el.child_text("Name").unwrap_or_default().to_string(),
            description: optional_text(el, "Description"),
            fields,
            raw: el.to_record(),
        })
    }
}

/// A column of a collection.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Field {
    pub field_id: Option<FieldId>,
    pub name: String,
    pub format: Option<String>,
    pub description: Option<String>,
    pub raw: Record,
}

impl Field {
    pub(crate) fn from_element(el: &Element) -> Result<Self> {
        Ok(Self {
            field_id: optional_id(el, "FieldID")?,
            name: el.child_text("Name").unwrap_or_default().to_string(),
            format: optional_text(el, "Format"),
            description: optional_text(el, "Description"),
            raw: el.to_record(),
        })
    }
}

/// One execution of an agent (or a publish run).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Job {
    pub job_id: JobId,
    pub status: Option<String>,
    pub created: Option<String>,
    pub started: Option<String>,
    pub ended: Option<String>,
    pub raw: Record,
}

impl Job {
    pub(crate) fn from_element(el: &Element) -> Result<Self> {
        let job_id = el
            .child_text("JobID")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::Deserialization("Job element has no JobID".to_string()))?;
        Ok(Self {
            job_id: job_id.to_string(),
            status: optional_text(el, "Status"),
            created: optional_text(el, "Created"),
            started: optional_text(el, "Started"),
            ended: optional_text(el, "Ended"),
            raw: el.to_record(),
        })
    }

    pub fn is_done(&self) -> bool {
        self.status.as_deref() == Some("Done")
    }
}

/// A projection of a collection.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct View {
    pub view_id: ViewId,
    pub name: Option<String>,
    pub fields: Vec<String>,
    pub raw: Record,
}

impl View {
    pub(crate) fn from_element(el: &Element) -> Result<Self> {
        let fields = match el.child("FieldList") {
            Some(list) => list
                .children("Field")
                .map(|f| f.child_text("Name").unwrap_or(f.text.as_str()).to_string())
                .collect(),
            None => el
                .child_text("Fields")
                .map(split_list)
                .unwrap_or_default(),
        };
        Ok(Self {
            view_id: required_id(el, "ViewID")?,
            name: optional_text(el, "Name"),
            fields,
            raw: el.to_record(),
        })
    }
}

/// An agent and the collections that feed its combined collection.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CombinedCollections {
    pub agent_id: AgentId,
    pub source_collections: Vec<CollectionId>,
}

impl CombinedCollections {
    pub(crate) fn from_element(el: &Element) -> Result<Self> {
        let source_collections = split_list(el.child_text("SourcesCollections").unwrap_or_default())
            .iter()
            .map(|id| parse_id("SourcesCollections", id))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            agent_id: required_id(el, "AgentID")?,
            source_collections,
        })
    }
}

/// Which jobs a job listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Active,
    Archived,
    All,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Active => "Active",
            JobState::Archived => "Archived",
            JobState::All => "All",
        }
    }
}

/// Optional filters for `Agent.GetJobs` and `Job.GetList`. Dates are
/// `YYYY-MM-DD` strings, passed through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub created: Option<String>,
    pub started: Option<String>,
    pub ended: Option<String>,
    pub state: Option<JobState>,
}

fn optional_text(el: &Element, name: &str) -> Option<String> {
    el.child_text(name)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn optional_id(el: &Element, name: &'static str) -> Result<Option<u64>> {
    match el.child_text(name).filter(|text| !text.is_empty()) {
        Some(text) => parse_id(name, text).map(Some),
        None => Ok(None),
    }
}

fn required_id(el: &Element, name: &'static str) -> Result<u64> {
    optional_id(el, name)?
        .ok_or_else(|| ApiError::Deserialization(format!("{} element has no {name}", el.name)))
}

pub(crate) fn parse_id(name: &str, text: &str) -> Result<u64> {
    text.trim()
        .parse()
        .map_err(|e| ApiError::Deserialization(format!("{name} {text:?}: {e}")))
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
