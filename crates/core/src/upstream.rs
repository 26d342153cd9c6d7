use crate::models::{HitCount, QueryDescriptor};
use crate::traits::{
    IndexSearchRequest, RecordSource, SearchIndex, SortOrder, TableQuery, TextMatch,
};
use crate::SearchError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Raw page of hits for one descriptor, before normalization.
#[derive(Debug, Clone, Default)]
pub struct UpstreamPage {
    pub hits: Vec<Value>,
    pub total: HitCount,
}

/// What the gateway queries. `source` names the index or table and selects
/// the normalizer applied to the hits.
#[async_trait]
pub trait Upstream: Send + Sync {
    fn source(&self) -> &str;

    async fn fetch(&self, descriptor: &QueryDescriptor) -> Result<UpstreamPage, SearchError>;
}

#[async_trait]
impl<T> Upstream for Box<T>
where
    T: Upstream + ?Sized,
{
    fn source(&self) -> &str {
        (**self).source()
    }

    async fn fetch(&self, descriptor: &QueryDescriptor) -> Result<UpstreamPage, SearchError> {
        (**self).fetch(descriptor).await
    }
}

/// Conjunction of `attribute = "value"` clauses, one per active facet, in
/// facet-name order. Facets without an attribute mapping use their own name.
pub fn filter_expression(
    facets: &BTreeMap<String, String>,
    attributes: &HashMap<String, String>,
) -> Option<String> {
    if facets.is_empty() {
        return None;
    }

    let clauses = facets
        .iter()
        .map(|(name, value)| {
            let attribute = attributes.get(name).map_or(name.as_str(), String::as_str);
            let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
            format!("{attribute} = \"{escaped}\"")
        })
        .collect::<Vec<_>>();

    Some(clauses.join(" AND "))
}

/// Queries one index of the hosted search collaborator.
pub struct IndexUpstream<S> {
    index: S,
    index_name: String,
    facet_attributes: HashMap<String, String>,
    highlight_fields: Vec<String>,
    retrieve_fields: Vec<String>,
}

impl<S> IndexUpstream<S>
where
    S: SearchIndex + Send + Sync,
{
    pub fn new(index: S, index_name: impl Into<String>) -> Self {
        Self {
            index,
            index_name: index_name.into(),
            facet_attributes: HashMap::new(),
            highlight_fields: Vec::new(),
            retrieve_fields: Vec::new(),
        }
    }

    /// Delivered-vehicle index: filterable by dealership location.
    pub fn deliveries(index: S) -> Self {
        Self::new(index, crate::normalize::DELIVERIES)
            .with_facet("location", "quirk_location.id")
            .with_highlights(["title", "excerpt"])
            .with_retrieve([
                "id",
                "title",
                "slug",
                "excerpt",
                "featured_image_url",
                "published_at",
                "quirk_location",
                "location",
            ])
    }

    /// Cross-content index: filterable by content type.
    pub fn unified(index: S) -> Self {
        Self::new(index, crate::normalize::UNIFIED)
            .with_facet("type", "type")
            .with_highlights(["title", "description"])
            .with_retrieve([
                "id",
                "type",
                "title",
                "description",
                "featured_image_url",
                "url",
                "location",
                "additional_data",
            ])
    }

    pub fn with_facet(mut self, facet: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.facet_attributes.insert(facet.into(), attribute.into());
        self
    }

    pub fn with_highlights<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.highlight_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_retrieve<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.retrieve_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn request_for(&self, descriptor: &QueryDescriptor) -> IndexSearchRequest {
        IndexSearchRequest {
            term: descriptor.term().to_string(),
            limit: descriptor.page_size(),
            offset: descriptor.offset(),
            filter: filter_expression(descriptor.facets(), &self.facet_attributes),
            highlight_fields: self.highlight_fields.clone(),
            retrieve_fields: self.retrieve_fields.clone(),
        }
    }
}

#[async_trait]
impl<S> Upstream for IndexUpstream<S>
where
    S: SearchIndex + Send + Sync,
{
    fn source(&self) -> &str {
        &self.index_name
    }

    async fn fetch(&self, descriptor: &QueryDescriptor) -> Result<UpstreamPage, SearchError> {
        let request = self.request_for(descriptor);
        let response = self.index.search(&self.index_name, &request).await?;
        Ok(UpstreamPage {
            hits: response.hits,
            total: response.total_hits,
        })
    }
}

/// To-many relation added to the select list for a facet. When the facet is
/// active the embed becomes `!inner`, so the filter on it restricts the parent rows.
#[derive(Debug, Clone)]
struct Embed {
    /// `alias:table`, or a bare table name.
    name: String,
    columns: String,
    /// Facet name and the key column it is matched against.
    facet: (String, String),
}

impl Embed {
    fn alias(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(alias, _)| alias)
    }

    fn render(&self, inner: bool) -> String {
        let join = if inner { "!inner" } else { "" };
        format!("{}{join}({})", self.name, self.columns)
    }
}

/// Queries one table of the hosted relational store, newest first.
pub struct TableUpstream<R> {
    source: R,
    table: String,
    select: String,
    fixed_filters: Vec<(String, String)>,
    facet_columns: HashMap<String, String>,
    embeds: Vec<Embed>,
    text_columns: Vec<String>,
    order: Option<SortOrder>,
}

impl<R> TableUpstream<R>
where
    R: RecordSource + Send + Sync,
{
    pub fn new(source: R, table: impl Into<String>, select: impl Into<String>) -> Self {
        Self {
            source,
            table: table.into(),
            select: select.into(),
            fixed_filters: Vec::new(),
            facet_columns: HashMap::new(),
            embeds: Vec::new(),
            text_columns: Vec::new(),
            order: None,
        }
    }

    /// Admin list of delivered-vehicle posts.
    pub fn deliveries(source: R) -> Self {
        Self::new(
            source,
            crate::normalize::DELIVERIES,
            "*,quirk_location:quirk_locations(title),location:maine_cities(name)",
        )
        .with_facet("location", "quirk_location_id")
        .with_facet("town", "location_id")
        .with_text_columns(["title", "content"])
        .newest_first("published_at")
    }

    /// Admin list of news posts, filterable by location and category.
    pub fn posts(source: R) -> Self {
        Self::new(
            source,
            crate::normalize::POSTS,
            "*,quirk_location:quirk_locations(id,title)",
        )
        .with_facet("location", "quirk_location_id")
        .with_embedded_facet(
            "category",
            "categories:post_categories",
            "category:categories(id,name,slug)",
            "category_id",
        )
        .with_text_columns(["title", "excerpt", "content"])
        .newest_first("published_at")
    }

    /// Active job postings, filterable by department, city and location.
    pub fn jobs(source: R) -> Self {
        Self::new(source, crate::normalize::JOBS, "*")
            .with_fixed_filter("is_active", "true")
            .with_facet("department", "department")
            .with_facet("city", "city")
            .with_embedded_facet(
                "location",
                "locations:job_locations",
                "quirk_location:quirk_locations(id,title)",
                "quirk_location_id",
            )
            .with_text_columns(["title", "description"])
            .newest_first("created_at")
    }

    /// Equality filter applied to every query.
    pub fn with_fixed_filter(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.fixed_filters.push((column.into(), value.into()));
        self
    }

    pub fn with_facet(mut self, facet: impl Into<String>, column: impl Into<String>) -> Self {
        self.facet_columns.insert(facet.into(), column.into());
        self
    }

    /// Facet matched against `key_column` of an embedded to-many relation.
    pub fn with_embedded_facet(
        mut self,
        facet: impl Into<String>,
        name: impl Into<String>,
        columns: impl Into<String>,
        key_column: impl Into<String>,
    ) -> Self {
        self.embeds.push(Embed {
            name: name.into(),
            columns: columns.into(),
            facet: (facet.into(), key_column.into()),
        });
        self
    }

    pub fn with_text_columns<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.text_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn newest_first(mut self, column: impl Into<String>) -> Self {
        self.order = Some(SortOrder {
            column: column.into(),
            ascending: false,
        });
        self
    }

    pub fn query_for(&self, descriptor: &QueryDescriptor) -> TableQuery {
        let start = descriptor.offset();
        let end = start + u64::from(descriptor.page_size()) - 1;

        let mut select = self.select.clone();
        let mut filters = self.fixed_filters.clone();
        for embed in &self.embeds {
            let (facet, key) = &embed.facet;
            let active = descriptor.facet(facet);
            select.push(',');
            select.push_str(&embed.render(active.is_some()));
            if let Some(value) = active {
                filters.push((format!("{}.{key}", embed.alias()), value.to_string()));
            }
        }

        for (name, value) in descriptor.facets() {
            let embedded = self.embeds.iter().any(|embed| &embed.facet.0 == name);
            if !embedded {
                let column = self.facet_columns.get(name).unwrap_or(name);
                filters.push((column.clone(), value.clone()));
            }
        }

        let mut query = TableQuery::new(&self.table, select);
        query.filters = filters;
        if !descriptor.term().is_empty() && !self.text_columns.is_empty() {
            query.text = Some(TextMatch {
                columns: self.text_columns.clone(),
                term: descriptor.term().to_string(),
            });
        }
        query.order = self.order.clone();
        query.range = Some((start, end));
        query.count = true;
        query
    }
}

#[async_trait]
impl<R> Upstream for TableUpstream<R>
where
    R: RecordSource + Send + Sync,
{
    fn source(&self) -> &str {
        &self.table
    }

    async fn fetch(&self, descriptor: &QueryDescriptor) -> Result<UpstreamPage, SearchError> {
        let query = self.query_for(descriptor);
        let rows = self.source.query(&query).await?;
        let total = rows
            .total
            .unwrap_or(HitCount::Estimated(rows.rows.len() as u64));
        Ok(UpstreamPage {
            hits: rows.rows,
            total,
        })
    }
}
