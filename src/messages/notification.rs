//! StoreNotification protocol bodies (protocol 5).
//!
//! Pushes carry the subscription key chosen by the customer (`request_uuid`),
//! never a correlation id.

use serde::{Deserialize, Serialize};

use crate::messages::store::DataObject;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequestRecord {
    pub uri: String,
    /// Subscription key.
    pub uuid: String,
    pub include_object_data: bool,
    pub start_time: i64,
    pub object_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub request: NotificationRequestRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectChangeType {
    Upsert,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectChange {
    pub change_type: ObjectChangeType,
    pub change_time: i64,
    pub data_object: DataObject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    pub change: ObjectChange,
    pub request_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteNotification {
    pub delete: ObjectChange,
    pub request_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelNotification {
    pub request_uuid: String,
}
