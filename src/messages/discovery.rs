//! Discovery protocol bodies (protocol 3).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResources {
    pub uri: String,
}

/// A node in the store's resource tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub uri: String,
    pub name: String,
    pub content_type: String,
    pub resource_type: String,
    /// Child count, or -1 when unknown.
    pub has_children: i32,
    pub uuid: Option<String>,
    pub last_changed: i64,
    pub custom_data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResourcesResponse {
    pub resources: Vec<Resource>,
}
