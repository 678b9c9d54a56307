use std::collections::BTreeMap;

use crate::error::ApiError;
use crate::models::Tag;
use crate::store::Store;

/// Tags keyed by category; categories and the tags within each sorted by name.
pub fn grouped_tags(store: &dyn Store) -> Result<BTreeMap<String, Vec<Tag>>, ApiError> {
    let mut groups: BTreeMap<String, Vec<Tag>> = BTreeMap::new();
    for tag in store.list_tags()? {
        groups.entry(tag.category.clone()).or_default().push(tag);
    }
    for tags in groups.values_mut() {
        tags.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    }
    Ok(groups)
}
