//! Pure mappings from upstream row/hit shapes onto [`ResultRecord`].
//!
//! Each source (search index or table) has one normalizer. Hits that lack an
//! identifier or a title cannot be rendered and map to `None`.

use crate::models::{ContentKind, FacetTag, ResultRecord};
use crate::SearchError;
use serde_json::Value;
use std::collections::HashMap;

pub type Normalizer = fn(&Value) -> Option<ResultRecord>;

pub const DELIVERIES: &str = "iyc";
pub const JOBS: &str = "jobs";
pub const POSTS: &str = "posts";
pub const LOCATIONS: &str = "quirk_locations";
pub const UNIFIED: &str = "unified";

#[derive(Clone)]
pub struct NormalizerRegistry {
    normalizers: HashMap<String, Normalizer>,
}

impl Default for NormalizerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(DELIVERIES, normalize_delivery);
        registry.register(JOBS, normalize_job);
        registry.register(POSTS, normalize_post);
        registry.register(LOCATIONS, normalize_location);
        registry.register(UNIFIED, normalize_unified);
        registry
    }
}

impl NormalizerRegistry {
    pub fn empty() -> Self {
        Self {
            normalizers: HashMap::new(),
        }
    }

    pub fn register(&mut self, source: impl Into<String>, normalizer: Normalizer) {
        self.normalizers.insert(source.into(), normalizer);
    }

    pub fn get(&self, source: &str) -> Option<Normalizer> {
        self.normalizers.get(source).copied()
    }

    pub fn resolve(&self, source: &str) -> Result<Normalizer, SearchError> {
        self.get(source).ok_or_else(|| {
            SearchError::InvalidArgument(format!("no normalizer registered for source {source}"))
        })
    }
}

pub fn normalize_delivery(hit: &Value) -> Option<ResultRecord> {
    let id = text(hit, "/id")?;
    let title = text(hit, "/title")?;
    let slug = text(hit, "/slug").unwrap_or_else(|| id.clone());

    Some(ResultRecord {
        kind: ContentKind::Delivery,
        summary: text(hit, "/excerpt").unwrap_or_default(),
        image_url: text(hit, "/featured_image_url"),
        target_url: format!("/its-your-car/{slug}"),
        facet_tags: tags(
            hit,
            &[
                ("Location", "/quirk_location/title"),
                ("Town", "/location/name"),
            ],
        ),
        id,
        title,
    })
}

pub fn normalize_job(hit: &Value) -> Option<ResultRecord> {
    let id = text(hit, "/id")?;
    let title = text(hit, "/title")?;

    Some(ResultRecord {
        kind: ContentKind::Job,
        summary: text(hit, "/description").unwrap_or_default(),
        image_url: None,
        target_url: format!("/careers/{id}"),
        facet_tags: tags(
            hit,
            &[
                ("Department", "/department"),
                ("Employment type", "/employment_type"),
                ("City", "/city"),
            ],
        )
        .into_iter()
        .chain(list_tags(hit, "Location", "/locations", "/quirk_location/title"))
        .collect(),
        id,
        title,
    })
}

pub fn normalize_post(hit: &Value) -> Option<ResultRecord> {
    let id = text(hit, "/id")?;
    let title = text(hit, "/title")?;
    let slug = text(hit, "/slug").unwrap_or_else(|| id.clone());

    Some(ResultRecord {
        kind: ContentKind::Post,
        summary: text(hit, "/excerpt").unwrap_or_default(),
        image_url: text(hit, "/featured_image_url"),
        target_url: format!("/posts/{slug}"),
        facet_tags: tags(hit, &[("Location", "/quirk_location/title")])
            .into_iter()
            .chain(list_tags(hit, "Category", "/categories", "/category/name"))
            .collect(),
        id,
        title,
    })
}

pub fn normalize_location(hit: &Value) -> Option<ResultRecord> {
    let id = text(hit, "/id")?;
    let title = text(hit, "/title")?;
    let slug = text(hit, "/slug").unwrap_or_else(|| id.clone());
    let summary = [text(hit, "/city"), text(hit, "/state")]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");

    Some(ResultRecord {
        kind: ContentKind::Location,
        summary,
        image_url: text(hit, "/location_featured_image"),
        target_url: format!("/locations/{slug}"),
        facet_tags: tags(hit, &[("City", "/city")]),
        id,
        title,
    })
}

/// Hits from the cross-content index already carry their type and URL.
pub fn normalize_unified(hit: &Value) -> Option<ResultRecord> {
    let id = text(hit, "/id")?;
    let title = text(hit, "/title")?;
    let kind = text(hit, "/type")
        .map(|kind| ContentKind::parse(&kind))
        .unwrap_or(ContentKind::Other);
    let target_url = text(hit, "/url").unwrap_or_default();

    let mut facet_tags = tags(
        hit,
        &[
            ("Location", "/quirk_location/title"),
            ("Location", "/location/title"),
        ],
    );
    facet_tags.dedup();
    facet_tags.extend(tags(
        hit,
        &[
            ("Department", "/additional_data/department"),
            ("Employment type", "/additional_data/employment_type"),
        ],
    ));

    Some(ResultRecord {
        kind,
        summary: text(hit, "/description").unwrap_or_default(),
        image_url: text(hit, "/featured_image_url"),
        target_url,
        facet_tags,
        id,
        title,
    })
}

/// Non-empty string at `pointer`; numeric ids are rendered as strings.
fn text(hit: &Value, pointer: &str) -> Option<String> {
    match hit.pointer(pointer)? {
        Value::String(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn tags(hit: &Value, fields: &[(&str, &str)]) -> Vec<FacetTag> {
    fields
        .iter()
        .filter_map(|(label, pointer)| text(hit, pointer).map(|value| FacetTag::new(*label, value)))
        .collect()
}

/// One tag per entry of the embedded list at `list`, read at `item`.
fn list_tags(hit: &Value, label: &str, list: &str, item: &str) -> Vec<FacetTag> {
    hit.pointer(list)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| text(entry, item))
                .map(|value| FacetTag::new(label, value))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delivery_rows_link_to_post_and_carry_location_tags() {
        let hit = json!({
            "id": "a1",
            "title": "Congratulations Sam!",
            "slug": "congratulations-sam",
            "excerpt": "Sam picked up a new Civic.",
            "featured_image_url": "https://cdn.example.com/sam.jpg",
            "quirk_location": {"title": "Quirk Honda Bangor"},
            "location": {"name": "Brewer"}
        });

        let record = normalize_delivery(&hit).expect("delivery should normalize");
        assert_eq!(record.kind, ContentKind::Delivery);
        assert_eq!(record.target_url, "/its-your-car/congratulations-sam");
        assert_eq!(record.summary, "Sam picked up a new Civic.");
        assert_eq!(
            record.facet_tags,
            vec![
                FacetTag::new("Location", "Quirk Honda Bangor"),
                FacetTag::new("Town", "Brewer"),
            ]
        );
    }

    #[test]
    fn hits_without_title_are_dropped() {
        assert!(normalize_post(&json!({"id": "p1", "title": "  "})).is_none());
        assert!(normalize_job(&json!({"title": "Sales Associate"})).is_none());
    }

    #[test]
    fn numeric_ids_become_strings() {
        let record = normalize_job(&json!({
            "id": 42,
            "title": "Service Technician",
            "department": "Service",
            "city": "Bangor"
        }))
        .expect("job should normalize");

        assert_eq!(record.id, "42");
        assert_eq!(record.target_url, "/careers/42");
        assert_eq!(record.facet_tags.len(), 2);
    }

    #[test]
    fn post_categories_become_tags() {
        let record = normalize_post(&json!({
            "id": "p9",
            "title": "Spring service special",
            "slug": "spring-service",
            "quirk_location": {"id": "3", "title": "Quirk Toyota"},
            "categories": [
                {"category": {"id": "1", "name": "Service", "slug": "service"}},
                {"category": null}
            ]
        }))
        .expect("post should normalize");

        assert_eq!(
            record.facet_tags,
            vec![
                FacetTag::new("Location", "Quirk Toyota"),
                FacetTag::new("Category", "Service"),
            ]
        );
    }

    #[test]
    fn job_locations_become_tags() {
        let record = normalize_job(&json!({
            "id": 5,
            "title": "Porter",
            "department": "Service",
            "locations": [
                {"quirk_location": {"id": "3", "title": "Quirk Toyota"}},
                {"quirk_location": {"id": "4", "title": "Quirk Honda"}}
            ]
        }))
        .expect("job should normalize");

        assert_eq!(
            record.facet_tags,
            vec![
                FacetTag::new("Department", "Service"),
                FacetTag::new("Location", "Quirk Toyota"),
                FacetTag::new("Location", "Quirk Honda"),
            ]
        );
    }

    #[test]
    fn unified_hits_keep_their_type_and_url() {
        let record = normalize_unified(&json!({
            "id": "job-7",
            "type": "job",
            "title": "Finance Manager",
            "description": "Join our finance team",
            "url": "/careers/7",
            "additional_data": {"department": "Finance"}
        }))
        .expect("unified hit should normalize");

        assert_eq!(record.kind, ContentKind::Job);
        assert_eq!(record.target_url, "/careers/7");
        assert_eq!(record.facet_tags, vec![FacetTag::new("Department", "Finance")]);
    }

    #[test]
    fn location_summary_joins_city_and_state() {
        let record = normalize_location(&json!({
            "id": "l1",
            "title": "Quirk Chevrolet",
            "slug": "quirk-chevrolet",
            "city": "Bangor",
            "state": "ME"
        }))
        .expect("location should normalize");

        assert_eq!(record.summary, "Bangor, ME");
        assert_eq!(record.target_url, "/locations/quirk-chevrolet");
    }

    #[test]
    fn registry_rejects_unknown_sources() {
        let registry = NormalizerRegistry::default();
        assert!(registry.get(DELIVERIES).is_some());
        assert!(matches!(
            registry.resolve("inventory"),
            Err(SearchError::InvalidArgument(_))
        ));
    }
}
