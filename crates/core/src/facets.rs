use crate::cache::ResultCache;
use crate::models::FacetOption;
use crate::traits::{RecordSource, SortOrder, TableQuery};
use crate::SearchError;
use serde_json::Value;
use std::collections::BTreeMap;

/// How option rows are read from the facet's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacetShape {
    /// Rows of a lookup table, each counted by its related records.
    /// `count_embed` is the select expression producing `counted_relation`.
    Lookup {
        value_column: String,
        label_column: String,
        counted_relation: String,
        count_embed: String,
    },
    /// Distinct values of one column, counted by occurrence.
    Distinct { column: String },
}

/// Where the selectable values of a facet come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetSource {
    pub table: String,
    pub shape: FacetShape,
    /// Equality filters applied to every read.
    pub filters: Vec<(String, String)>,
}

impl FacetSource {
    /// Lookup rows counted with an embedded `relation(count)`.
    pub fn lookup(
        table: impl Into<String>,
        value_column: impl Into<String>,
        label_column: impl Into<String>,
        counted_relation: impl Into<String>,
    ) -> Self {
        let counted_relation = counted_relation.into();
        Self {
            table: table.into(),
            shape: FacetShape::Lookup {
                value_column: value_column.into(),
                label_column: label_column.into(),
                count_embed: format!("{counted_relation}(count)"),
                counted_relation,
            },
            filters: Vec::new(),
        }
    }

    pub fn distinct(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            shape: FacetShape::Distinct {
                column: column.into(),
            },
            filters: Vec::new(),
        }
    }

    /// Replaces the count expression of a lookup, e.g. with an `!inner` embed
    /// whose rows are counted by length.
    pub fn with_count_embed(mut self, embed: impl Into<String>) -> Self {
        if let FacetShape::Lookup { count_embed, .. } = &mut self.shape {
            *count_embed = embed.into();
        }
        self
    }

    pub fn with_filter(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn delivery_locations() -> Self {
        Self::lookup("quirk_locations", "id", "title", "iyc")
    }

    pub fn delivery_towns() -> Self {
        Self::lookup("maine_cities", "id", "name", "iyc")
    }

    pub fn post_locations() -> Self {
        Self::lookup("quirk_locations", "id", "title", "posts")
    }

    pub fn post_categories() -> Self {
        Self::lookup("categories", "id", "name", "post_categories")
            .with_count_embed("post_categories!inner(posts!inner(id))")
    }

    /// Locations counted by their active job postings.
    pub fn job_locations() -> Self {
        Self::lookup("quirk_locations", "id", "title", "job_locations")
            .with_count_embed("job_locations!inner(jobs!inner(id))")
            .with_filter("job_locations.jobs.is_active", "true")
    }

    pub fn job_departments() -> Self {
        Self::distinct("jobs", "department").with_filter("is_active", "true")
    }

    pub fn job_cities() -> Self {
        Self::distinct("jobs", "city").with_filter("is_active", "true")
    }

    fn cache_key(&self) -> String {
        let target = match &self.shape {
            FacetShape::Lookup {
                counted_relation, ..
            } => counted_relation,
            FacetShape::Distinct { column } => column,
        };
        let mut key = format!("showroom:facets:{}:{target}", self.table);
        for (column, value) in &self.filters {
            key.push_str(&format!(":{column}={value}"));
        }
        key
    }

    fn query(&self) -> TableQuery {
        let mut query = match &self.shape {
            FacetShape::Lookup {
                value_column,
                label_column,
                count_embed,
                ..
            } => {
                let mut query = TableQuery::new(
                    &self.table,
                    format!("{value_column},{label_column},{count_embed}"),
                );
                query.order = Some(SortOrder {
                    column: label_column.clone(),
                    ascending: true,
                });
                query
            }
            FacetShape::Distinct { column } => TableQuery::new(&self.table, column),
        };
        query.filters = self.filters.clone();
        query
    }

    /// Options with a zero count are dropped; the rest are sorted by label.
    pub fn options_from_rows(&self, rows: &[Value]) -> Vec<FacetOption> {
        let mut options = match &self.shape {
            FacetShape::Lookup {
                value_column,
                label_column,
                counted_relation,
                ..
            } => rows
                .iter()
                .filter_map(|row| {
                    Some(FacetOption {
                        value: scalar(row.get(value_column)?)?,
                        label: scalar(row.get(label_column)?)?,
                        count: relation_count(row.get(counted_relation)),
                    })
                })
                .collect::<Vec<_>>(),
            FacetShape::Distinct { column } => {
                let mut counts = BTreeMap::<String, u64>::new();
                for value in rows.iter().filter_map(|row| row.get(column).and_then(scalar)) {
                    *counts.entry(value).or_default() += 1;
                }
                counts
                    .into_iter()
                    .map(|(value, count)| FacetOption {
                        label: value.clone(),
                        value,
                        count,
                    })
                    .collect()
            }
        };

        options.retain(|option| option.count > 0);
        options.sort_by(|left, right| left.label.cmp(&right.label));
        options
    }
}

/// Lists the selectable values of a facet, memoized with the cache's default TTL.
pub async fn load_facet_options<R>(
    source: &R,
    facet: &FacetSource,
    cache: &ResultCache,
) -> Result<Vec<FacetOption>, SearchError>
where
    R: RecordSource + Sync,
{
    cache
        .get_or_fetch(&facet.cache_key(), None, || async {
            let rows = source.query(&facet.query()).await?;
            Ok::<_, SearchError>(facet.options_from_rows(&rows.rows))
        })
        .await
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Embedded counts arrive as `[{"count": n}]`; a plain embedded row list is
/// counted by length.
fn relation_count(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Array(rows)) => match rows.as_slice() {
            [single] if single.get("count").is_some() => {
                single.get("count").and_then(Value::as_u64).unwrap_or(0)
            }
            rows => rows.len() as u64,
        },
        Some(Value::Number(count)) => count.as_u64().unwrap_or(0),
        _ => 0,
    }
}
