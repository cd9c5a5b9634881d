//! In-memory object store shared by the sample store-side handlers.

use std::collections::{BTreeMap, BTreeSet};

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::messages::{current_date_time, DataObject, ObjectChange, ObjectChangeType, Resource};

const CHANGE_CAPACITY: usize = 256;
const SCHEME: &str = "eml://";

/// Path segments of an `eml://` URI; the root (`/`, `eml:///`) has none.
pub fn split_uri(uri: &str) -> Vec<&str> {
    let path = uri.strip_prefix(SCHEME).unwrap_or(uri);
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// Canonical `eml:///a/b` form used as the store key.
pub fn canonical_uri(uri: &str) -> String {
    join(&split_uri(uri))
}

fn join(segments: &[&str]) -> String {
    format!("{SCHEME}/{}", segments.join("/"))
}

pub struct MemoryStore {
    objects: DashMap<String, DataObject>,
    changes: broadcast::Sender<ObjectChange>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            objects: DashMap::new(),
            changes,
        }
    }

    /// Inserts or replaces an object and announces the change.
    pub fn put(&self, mut object: DataObject) -> DataObject {
        let uri = canonical_uri(&object.resource.uri);
        let now = current_date_time();
        object.resource.uri = uri.clone();
        object.resource.last_changed = now;
        self.objects.insert(uri, object.clone());
        self.announce(ObjectChangeType::Upsert, now, object.clone());
        object
    }

    pub fn get(&self, uri: &str) -> Option<DataObject> {
        self.objects.get(&canonical_uri(uri)).map(|o| o.clone())
    }

    pub fn delete(&self, uri: &str) -> Option<DataObject> {
        let (_, object) = self.objects.remove(&canonical_uri(uri))?;
        self.announce(ObjectChangeType::Delete, current_date_time(), object.clone());
        Some(object)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ObjectChange> {
        self.changes.subscribe()
    }

    fn announce(&self, change_type: ObjectChangeType, change_time: i64, data_object: DataObject) {
        // No receivers simply means nobody is watching.
        let _ = self.changes.send(ObjectChange {
            change_type,
            change_time,
            data_object,
        });
    }

    /// Direct children of `uri`, ordered by URI. Intermediate path segments
    /// without a stored object appear as folders. `None` when `uri` is neither
    /// the root, a stored object, nor the parent of one.
    pub fn children(&self, uri: &str) -> Option<Vec<Resource>> {
        let parent = split_uri(uri);
        let depth = parent.len();

        // child segment -> number of distinct grandchildren
        let mut grandchildren: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut exists = depth == 0;
        for entry in self.objects.iter() {
            let path = split_uri(entry.key());
            if path.len() < depth || path[..depth] != parent[..] {
                continue;
            }
            if path.len() == depth {
                exists = true;
                continue;
            }
            exists = true;
            let slot = grandchildren.entry(path[depth].to_string()).or_default();
            if let Some(next) = path.get(depth + 1) {
                slot.insert(next.to_string());
            }
        }
        if !exists {
            return None;
        }

        let resources = grandchildren
            .into_iter()
            .map(|(segment, below)| {
                let mut path = parent.clone();
                path.push(&segment);
                let child_uri = join(&path);
                let has_children = below.len() as i32;
                match self.objects.get(&child_uri) {
                    Some(object) => Resource {
                        has_children,
                        ..object.resource.clone()
                    },
                    None => folder(child_uri, &segment, has_children),
                }
            })
            .collect();
        Some(resources)
    }

    /// A few WITSML wells and wellbores for demos and the CLI.
    pub fn seed_sample_wells(&self) {
        for well in 1..=3 {
            let well_uri = format!("eml:///witsml1411/well({well})");
            self.put(sample_object(&well_uri, &format!("Well {well:02}"), "well"));
            for wellbore in 1..=2 {
                let uri = format!("{well_uri}/wellbore({well}{wellbore})");
                self.put(sample_object(&uri, &format!("Wellbore {well}-{wellbore}"), "wellbore"));
            }
        }
        tracing::info!(objects = self.len(), "seeded sample wells");
    }
}

fn folder(uri: String, segment: &str, has_children: i32) -> Resource {
    Resource {
        uri,
        name: segment.to_string(),
        content_type: String::new(),
        resource_type: "Folder".to_string(),
        has_children,
        uuid: None,
        last_changed: 0,
        custom_data: BTreeMap::new(),
    }
}

/// A small XML data object for tests and seeding.
pub fn sample_object(uri: &str, name: &str, object_type: &str) -> DataObject {
    let uuid = uuid::Uuid::new_v4().to_string();
    let xml = format!(r#"<{object_type} uid="{uuid}"><name>{name}</name></{object_type}>"#);
    DataObject {
        resource: Resource {
            uri: uri.to_string(),
            name: name.to_string(),
            content_type: format!("application/x-witsml+xml;version=1.4.1.1;type={object_type}"),
            resource_type: "DataObject".to_string(),
            has_children: 0,
            uuid: Some(uuid),
            last_changed: 0,
            custom_data: BTreeMap::new(),
        },
        content_encoding: String::new(),
        data: xml.into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uris_are_canonicalized() {
        assert!(split_uri("/").is_empty());
        assert!(split_uri("eml:///").is_empty());
        assert_eq!(split_uri("eml:///a/b"), vec!["a", "b"]);
        assert_eq!(canonical_uri("a//b/"), "eml:///a/b");
    }

    #[test]
    fn children_include_folders_and_counts() {
        let store = MemoryStore::new();
        store.put(sample_object("eml:///witsml/well(1)", "Well 1", "well"));
        store.put(sample_object("eml:///witsml/well(1)/wellbore(1)", "WB 1", "wellbore"));
        store.put(sample_object("eml:///witsml/well(1)/wellbore(2)", "WB 2", "wellbore"));

        let root = store.children("/").unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].resource_type, "Folder");
        assert_eq!(root[0].uri, "eml:///witsml");
        assert_eq!(root[0].has_children, 1);

        let wells = store.children("eml:///witsml").unwrap();
        assert_eq!(wells.len(), 1);
        assert_eq!(wells[0].name, "Well 1");
        assert_eq!(wells[0].has_children, 2);

        let wellbores = store.children("eml:///witsml/well(1)").unwrap();
        assert_eq!(wellbores.len(), 2);
        assert!(store.children("eml:///witsml/well(1)/wellbore(1)").unwrap().is_empty());
        assert!(store.children("eml:///nowhere").is_none());
    }

    #[test]
    fn empty_store_has_an_empty_root() {
        assert_eq!(MemoryStore::new().children("/"), Some(Vec::new()));
    }

    #[tokio::test]
    async fn changes_are_broadcast() {
        let store = MemoryStore::new();
        let mut changes = store.subscribe();

        let stored = store.put(sample_object("/w/1", "W", "well"));
        assert_eq!(stored.resource.uri, "eml:///w/1");
        assert!(stored.resource.last_changed > 0);
        let change = changes.recv().await.unwrap();
        assert_eq!(change.change_type, ObjectChangeType::Upsert);

        assert!(store.delete("eml:///w/1").is_some());
        assert!(store.delete("eml:///w/1").is_none());
        let change = changes.recv().await.unwrap();
        assert_eq!(change.change_type, ObjectChangeType::Delete);
        assert!(store.is_empty());
    }
}
