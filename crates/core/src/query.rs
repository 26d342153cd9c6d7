use crate::models::QueryDescriptor;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Selector value meaning "no restriction on this facet".
pub const ALL_SENTINEL: &str = "all";

const CACHE_KEY_PREFIX: &str = "showroom:search";

pub fn is_unset(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case(ALL_SENTINEL)
}

/// Builds the descriptor for one set of user selections.
///
/// The term is trimmed, unset facets (empty or the "all" sentinel) are left
/// out, and `page`/`page_size` are floored at 1. Selection order does not
/// matter: the facet map is ordered by name, and a repeated facet name keeps
/// its last value.
pub fn build_descriptor<I, K, V>(
    raw_term: &str,
    selections: I,
    page: u32,
    page_size: u32,
) -> QueryDescriptor
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut facets = BTreeMap::new();
    for (name, value) in selections {
        let name = name.as_ref().trim();
        if name.is_empty() {
            continue;
        }
        let value = value.as_ref();
        if is_unset(value) {
            facets.remove(name);
        } else {
            facets.insert(name.to_string(), value.trim().to_string());
        }
    }

    QueryDescriptor::from_parts(
        raw_term.trim().to_string(),
        facets,
        page.max(1),
        page_size.max(1),
    )
}

/// Stable cache key for a descriptor issued against `scope` (an index or
/// table name). Fields are length-prefixed before hashing so that no two
/// distinct descriptors share an encoding.
pub fn cache_key(scope: &str, descriptor: &QueryDescriptor) -> String {
    let mut hasher = Sha256::new();
    write_field(&mut hasher, descriptor.term());
    hasher.update((descriptor.facets().len() as u64).to_be_bytes());
    for (name, value) in descriptor.facets() {
        write_field(&mut hasher, name);
        write_field(&mut hasher, value);
    }
    hasher.update(descriptor.page().to_be_bytes());
    hasher.update(descriptor.page_size().to_be_bytes());

    format!("{CACHE_KEY_PREFIX}:{scope}:{:x}", hasher.finalize())
}

fn write_field(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value.as_bytes());
}
