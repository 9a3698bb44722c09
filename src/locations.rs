//! Delivery location hierarchy: governorate -> city -> area -> neighborhood.
//!
//! Each level lives in its own relation keyed to its parent. The full tree
//! is loaded level by level, each query restricted to the ids returned by
//! the level above, and stitched together client-side.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::remote::{value_str, Query, RemoteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationLevel {
    Governorate,
    City,
    Area,
    Neighborhood,
}

impl LocationLevel {
    pub const ALL: [LocationLevel; 4] = [
        LocationLevel::Governorate,
        LocationLevel::City,
        LocationLevel::Area,
        LocationLevel::Neighborhood,
    ];

    pub fn table(self) -> &'static str {
        match self {
            LocationLevel::Governorate => "governorates",
            LocationLevel::City => "cities",
            LocationLevel::Area => "areas",
            LocationLevel::Neighborhood => "neighborhoods",
        }
    }

    /// Foreign-key column pointing at the parent level.
    pub fn parent_column(self) -> Option<&'static str> {
        match self {
            LocationLevel::Governorate => None,
            LocationLevel::City => Some("governorate_id"),
            LocationLevel::Area => Some("city_id"),
            LocationLevel::Neighborhood => Some("area_id"),
        }
    }

    pub fn child(self) -> Option<LocationLevel> {
        match self {
            LocationLevel::Governorate => Some(LocationLevel::City),
            LocationLevel::City => Some(LocationLevel::Area),
            LocationLevel::Area => Some(LocationLevel::Neighborhood),
            LocationLevel::Neighborhood => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationNode {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_ar: Option<String>,
    pub level: LocationLevel,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<LocationNode>,
}

impl LocationNode {
    /// Arabic name when present, otherwise the default name.
    pub fn display_name(&self) -> &str {
        self.name_ar.as_deref().unwrap_or(&self.name)
    }
}

struct RawLocation {
    node: LocationNode,
    parent_id: Option<String>,
}

fn parse_rows(level: LocationLevel, rows: &[Value]) -> Vec<RawLocation> {
    rows.iter()
        .filter_map(|row| {
            let id = value_str(row, &["id"])?;
            let name = value_str(row, &["name", "name_en"]).unwrap_or_else(|| id.clone());
            let parent_id = level.parent_column().and_then(|col| value_str(row, &[col]));
            Some(RawLocation {
                node: LocationNode {
                    id,
                    name,
                    name_ar: value_str(row, &["name_ar"]),
                    level,
                    children: Vec::new(),
                },
                parent_id,
            })
        })
        .collect()
}

fn sort_nodes(nodes: &mut [LocationNode]) {
    nodes.sort_by(|a, b| a.display_name().cmp(b.display_name()));
}

/// One level on demand, e.g. the cities of a chosen governorate.
pub async fn load_children(
    store: &dyn RemoteStore,
    level: LocationLevel,
    parent_id: Option<&str>,
) -> Result<Vec<LocationNode>> {
    let mut query = Query::new();
    if let (Some(column), Some(parent)) = (level.parent_column(), parent_id) {
        query = query.eq(column, parent);
    }
    let rows = store.select(level.table(), &query).await?;
    let mut nodes: Vec<LocationNode> = parse_rows(level, &rows)
        .into_iter()
        .map(|raw| raw.node)
        .collect();
    sort_nodes(&mut nodes);
    Ok(nodes)
}

/// Load and assemble the full hierarchy.
pub async fn load_location_tree(store: &dyn RemoteStore) -> Result<Vec<LocationNode>> {
    let mut levels: Vec<Vec<RawLocation>> = Vec::with_capacity(LocationLevel::ALL.len());

    for level in LocationLevel::ALL {
        let parent_ids: Option<Vec<String>> = levels
            .last()
            .map(|parents| parents.iter().map(|p| p.node.id.clone()).collect());
        let query = match (level.parent_column(), parent_ids) {
            (Some(column), Some(ids)) => {
                if ids.is_empty() {
                    levels.push(Vec::new());
                    continue;
                }
                Query::new().in_list(column, ids)
            }
            _ => Query::new(),
        };
        let rows = store.select(level.table(), &query).await?;
        debug!(level = ?level, rows = rows.len(), "loaded location level");
        levels.push(parse_rows(level, &rows));
    }

    // Fold bottom-up: attach each level's nodes to their parents.
    let mut below: Vec<RawLocation> = Vec::new();
    while let Some(mut current) = levels.pop() {
        let mut by_parent: HashMap<String, Vec<LocationNode>> = HashMap::new();
        for child in below.drain(..) {
            match child.parent_id {
                Some(pid) => by_parent.entry(pid).or_default().push(child.node),
                None => debug!(id = %child.node.id, "dropping location without parent"),
            }
        }
        for raw in current.iter_mut() {
            if let Some(mut children) = by_parent.remove(&raw.node.id) {
                sort_nodes(&mut children);
                raw.node.children = children;
            }
        }
        for (pid, orphans) in by_parent {
            debug!(parent = %pid, count = orphans.len(), "dropping orphaned locations");
        }
        below = current;
    }

    let mut roots: Vec<LocationNode> = below.into_iter().map(|raw| raw.node).collect();
    sort_nodes(&mut roots);
    Ok(roots)
}

/// Path from the governorate down to the node with `id`, if present.
pub fn find_path<'a>(tree: &'a [LocationNode], id: &str) -> Option<Vec<&'a LocationNode>> {
    for node in tree {
        if node.id == id {
            return Some(vec![node]);
        }
        if let Some(mut rest) = find_path(&node.children, id) {
            rest.insert(0, node);
            return Some(rest);
        }
    }
    None
}

/// `"Cairo › Nasr City › 7th District"` style breadcrumb.
pub fn breadcrumb(path: &[&LocationNode]) -> String {
    path.iter()
        .map(|n| n.display_name())
        .collect::<Vec<_>>()
        .join(" › ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::MemoryStore;
    use serde_json::json;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.seed(
            "governorates",
            vec![
                json!({ "id": "g-giza", "name": "Giza", "name_ar": "الجيزة" }),
                json!({ "id": "g-cairo", "name": "Cairo", "name_ar": "القاهرة" }),
            ],
        );
        store.seed(
            "cities",
            vec![
                json!({ "id": "c-nasr", "name": "Nasr City", "governorate_id": "g-cairo" }),
                json!({ "id": "c-maadi", "name": "Maadi", "governorate_id": "g-cairo" }),
                json!({ "id": "c-dokki", "name": "Dokki", "governorate_id": "g-giza" }),
                json!({ "id": "c-lost", "name": "Nowhere", "governorate_id": "g-gone" }),
            ],
        );
        store.seed(
            "areas",
            vec![json!({ "id": "a-7", "name": "7th District", "city_id": "c-nasr" })],
        );
        store.seed(
            "neighborhoods",
            vec![
                json!({ "id": "n-2", "name": "Block B", "area_id": "a-7" }),
                json!({ "id": "n-1", "name": "Block A", "area_id": "a-7" }),
            ],
        );
        store
    }

    #[tokio::test]
    async fn tree_is_assembled_and_sorted() {
        let store = seeded();
        let tree = load_location_tree(&store).await.unwrap();

        // Sorted by Arabic display name: الجيزة before القاهرة.
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].id, "g-giza");
        assert_eq!(tree[1].id, "g-cairo");
        let cairo_cities: Vec<_> = tree[1].children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(cairo_cities, vec!["Maadi", "Nasr City"]);

        let nasr = &tree[1].children[1];
        assert_eq!(nasr.children[0].id, "a-7");
        let blocks: Vec<_> = nasr.children[0].children.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(blocks, vec!["n-1", "n-2"]);
        assert_eq!(nasr.children[0].children[0].level, LocationLevel::Neighborhood);
    }

    #[tokio::test]
    async fn orphans_are_dropped() {
        let store = seeded();
        let tree = load_location_tree(&store).await.unwrap();
        assert!(find_path(&tree, "c-lost").is_none());
    }

    #[tokio::test]
    async fn empty_level_short_circuits_descendants() {
        let store = seeded();
        store.seed("governorates", vec![]);
        let tree = load_location_tree(&store).await.unwrap();
        assert!(tree.is_empty());
    }

    #[tokio::test]
    async fn read_failure_propagates() {
        let store = seeded();
        store.set_fail_reads(true);
        assert!(load_location_tree(&store).await.is_err());
    }

    #[tokio::test]
    async fn children_load_on_demand() {
        let store = seeded();
        let cities = load_children(&store, LocationLevel::City, Some("g-giza"))
            .await
            .unwrap();
        assert_eq!(cities.len(), 1);
        assert_eq!(cities[0].name, "Dokki");

        let govs = load_children(&store, LocationLevel::Governorate, None)
            .await
            .unwrap();
        assert_eq!(govs.len(), 2);
    }

    #[tokio::test]
    async fn breadcrumb_walks_from_the_root() {
        let store = seeded();
        let tree = load_location_tree(&store).await.unwrap();
        let path = find_path(&tree, "n-2").unwrap();
        assert_eq!(breadcrumb(&path), "القاهرة › Nasr City › 7th District › Block B");
    }
}
