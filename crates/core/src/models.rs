use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Immutable description of one query. Built only through
/// [`crate::query::build_descriptor`], so equal logical input always yields an
/// equal descriptor and the facet map is always ordered by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QueryDescriptor {
    term: String,
    facets: BTreeMap<String, String>,
    page: u32,
    page_size: u32,
}

impl QueryDescriptor {
    pub(crate) fn from_parts(
        term: String,
        facets: BTreeMap<String, String>,
        page: u32,
        page_size: u32,
    ) -> Self {
        Self {
            term,
            facets,
            page,
            page_size,
        }
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn facets(&self) -> &BTreeMap<String, String> {
        &self.facets
    }

    pub fn facet(&self, name: &str) -> Option<&str> {
        self.facets.get(name).map(String::as_str)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Zero-based index of the first record on this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// "It's your car" delivered-vehicle posts.
    #[serde(rename = "iyc")]
    Delivery,
    Job,
    Post,
    Location,
    #[serde(other)]
    Other,
}

impl ContentKind {
    pub fn parse(value: &str) -> Self {
        match value {
            "iyc" => Self::Delivery,
            "job" | "jobs" => Self::Job,
            "post" | "posts" | "news" => Self::Post,
            "location" | "locations" => Self::Location,
            _ => Self::Other,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Delivery => "It's Your Car",
            Self::Job => "Career",
            Self::Post => "News",
            Self::Location => "Location",
            Self::Other => "Content",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacetTag {
    pub label: String,
    pub value: String,
}

impl FacetTag {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultRecord {
    pub id: String,
    pub kind: ContentKind,
    pub title: String,
    pub summary: String,
    pub image_url: Option<String>,
    pub target_url: String,
    pub facet_tags: Vec<FacetTag>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum HitCount {
    Exact(u64),
    Estimated(u64),
}

impl HitCount {
    pub fn value(self) -> u64 {
        match self {
            Self::Exact(count) | Self::Estimated(count) => count,
        }
    }

    pub fn is_estimate(self) -> bool {
        matches!(self, Self::Estimated(_))
    }

    /// Raises the count to at least `floor`, keeping the exact/estimate label.
    pub fn at_least(self, floor: u64) -> Self {
        match self {
            Self::Exact(count) => Self::Exact(count.max(floor)),
            Self::Estimated(count) => Self::Estimated(count.max(floor)),
        }
    }
}

impl Default for HitCount {
    fn default() -> Self {
        Self::Exact(0)
    }
}

impl fmt::Display for HitCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(count) => write!(f, "{count}"),
            Self::Estimated(count) => write!(f, "about {count}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultPage {
    pub records: Vec<ResultRecord>,
    pub total_hits: HitCount,
    pub descriptor: QueryDescriptor,
}

impl ResultPage {
    pub fn empty(descriptor: QueryDescriptor) -> Self {
        Self {
            records: Vec::new(),
            total_hits: HitCount::Exact(0),
            descriptor,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One selectable value of a facet, with the number of records carrying it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacetOption {
    pub value: String,
    pub label: String,
    pub count: u64,
}
