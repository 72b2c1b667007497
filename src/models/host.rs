use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A managed host whose state is captured by fact scans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Unique identifier for the host
    pub id: Uuid,
    /// Host name, unique across the inventory
    pub name: String,
    /// When the host was registered
    pub created_at: DateTime<Utc>,
}

/// Input for registering a new host
#[derive(Debug, Clone)]
pub struct CreateHost {
    pub name: String,
}
