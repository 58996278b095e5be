//! Schema probing for upstream JSON documents.
//!
//! The upstream API has served the same logical payload under several
//! layouts. Instead of ad-hoc dictionary walking, each known layout is a
//! [`Probe`]: a name plus a JSON pointer to where the payload lives. Probes
//! are tried in order and the first one that resolves to an acceptable
//! value and decodes into the target type wins. Supporting a new layout is
//! a one-line addition to a probe table.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::FetchError;

/// One known layout: where the payload sits inside the response document.
#[derive(Debug, Clone, Copy)]
pub struct Probe {
    pub name: &'static str,
    /// RFC 6901 pointer; `""` is the document root.
    pub pointer: &'static str,
}

/// Layouts observed for the ranking list endpoint, most common first.
pub const RANKING_LIST_PROBES: &[Probe] = &[
    Probe { name: "data", pointer: "/data" },
    Probe { name: "data.list", pointer: "/data/list" },
    Probe { name: "data.archives", pointer: "/data/archives" },
    Probe { name: "list", pointer: "/list" },
    Probe { name: "result", pointer: "/result" },
    Probe { name: "data.result", pointer: "/data/result" },
];

/// Layouts observed for the item detail endpoint.
pub const DETAIL_PROBES: &[Probe] = &[
    Probe { name: "data", pointer: "/data" },
    Probe { name: "root", pointer: "" },
];

/// A successful decode, tagged with the layout that produced it.
#[derive(Debug)]
pub struct Decoded<T> {
    pub variant: &'static str,
    pub value: T,
}

/// Try each probe in order; return the first structured decode.
///
/// `accept` gates a candidate before decoding (e.g. "must be an array").
pub fn decode_first<T, F>(doc: &Value, probes: &[Probe], accept: F) -> Result<Decoded<T>, FetchError>
where
    T: DeserializeOwned,
    F: Fn(&Value) -> bool,
{
    for probe in probes {
        let Some(candidate) = doc.pointer(probe.pointer) else {
            continue;
        };
        if !accept(candidate) {
            continue;
        }
        if let Ok(value) = T::deserialize(candidate) {
            return Ok(Decoded {
                variant: probe.name,
                value,
            });
        }
    }

    Err(FetchError::NoSchemaMatched {
        tried: probes.iter().map(|p| p.name).collect(),
    })
}

/// Locate the ranking entry array. Entries stay raw so one malformed entry
/// cannot reject the whole page.
pub fn decode_ranking_list(doc: &Value) -> Result<Decoded<Vec<Value>>, FetchError> {
    decode_first(doc, RANKING_LIST_PROBES, Value::is_array)
}

/// Locate the detail record: the first root carrying a `stat` object.
pub fn decode_detail(doc: &Value) -> Result<Decoded<VideoRecord>, FetchError> {
    decode_first(doc, DETAIL_PROBES, |v| {
        v.get("stat").map(Value::is_object).unwrap_or(false)
    })
}

// ============ Record shape ============

/// Tolerant view of one video record. Ranking entries and detail roots share it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoRecord {
    pub bvid: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub owner: Option<Owner>,
    pub pic: Option<String>,
    pub duration: Option<DurationField>,
    pub tags: Option<TagsField>,
    pub tag: Option<String>,
    pub play: Option<Count>,
    pub stat: Option<Stat>,
    pub tid: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Owner {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Stat {
    pub view: Option<Count>,
}

/// Counters arrive as numbers, numeric strings, or placeholders like `"--"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Count {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Count {
    pub fn value(&self) -> i64 {
        match self {
            Count::Int(n) => (*n).max(0),
            Count::Float(f) if f.is_finite() && *f > 0.0 => *f as i64,
            Count::Float(_) => 0,
            Count::Text(s) => s.trim().parse::<i64>().map(|n| n.max(0)).unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DurationField {
    Seconds(i64),
    Text(String),
}

impl DurationField {
    pub fn seconds(&self) -> i64 {
        match self {
            DurationField::Seconds(n) => (*n).max(0),
            DurationField::Text(s) => crate::fetch::parse_duration(s),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagsField {
    List(Vec<TagEntry>),
    Text(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagEntry {
    Named { tag_name: String },
    Plain(String),
}

impl VideoRecord {
    pub fn author_name(&self) -> Option<String> {
        self.author
            .clone()
            .filter(|a| !a.is_empty())
            .or_else(|| self.owner.as_ref().and_then(|o| o.name.clone()))
    }

    pub fn view_count(&self) -> i64 {
        self.play
            .as_ref()
            .or_else(|| self.stat.as_ref().and_then(|s| s.view.as_ref()))
            .map(Count::value)
            .unwrap_or(0)
    }

    pub fn duration_secs(&self) -> i64 {
        self.duration.as_ref().map(DurationField::seconds).unwrap_or(0)
    }

    pub fn tag_list(&self) -> Vec<String> {
        let mut tags: Vec<String> = match &self.tags {
            Some(TagsField::List(entries)) => entries
                .iter()
                .map(|e| match e {
                    TagEntry::Named { tag_name } => tag_name.clone(),
                    TagEntry::Plain(s) => s.clone(),
                })
                .collect(),
            Some(TagsField::Text(s)) => vec![s.clone()],
            None => self.tag.iter().cloned().collect(),
        };
        tags.retain(|t| !t.trim().is_empty());
        tags
    }
}
