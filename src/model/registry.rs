//! Ban and hold registries. Presence of a container number is the whole signal.

use serde::{Deserialize, Serialize};

/// Container that may never gate in while listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanEntry {
    pub container_no: String,
    pub notes: String,
}

/// Container that may not gate out while listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldEntry {
    pub container_no: String,
    pub notes: String,
}

/// Client catalog row, joined into listings for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub code: String,
    pub name: String,
}

/// Yard staff member, joined into listings as the creator name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YardUser {
    pub id: i64,
    pub full_name: String,
}
