use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A single fact scan: a timestamped snapshot of one module's view of a host.
///
/// Facts are append-only. They are created by scans and only ever removed by
/// retention cleanup, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    /// Unique identifier for this scan record
    pub id: Uuid,
    /// Host the scan was taken from
    pub host_id: Uuid,
    /// Module that produced the scan (e.g., "ansible", "packages", "services")
    pub module: String,
    /// When the scan was taken
    pub timestamp: DateTime<Utc>,
    /// Opaque scan payload
    pub facts: JsonValue,
}

/// Input for recording a new fact scan
#[derive(Debug, Clone)]
pub struct CreateFact {
    pub host_id: Uuid,
    pub module: String,
    /// Scan time. Stored at millisecond precision.
    pub timestamp: DateTime<Utc>,
    pub facts: JsonValue,
}

/// Query parameters for listing or counting facts
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FactQuery {
    /// Filter by host
    pub host_id: Option<Uuid>,
    /// Filter by module name
    pub module: Option<String>,
    /// Maximum number of results to return (list only)
    pub limit: Option<i64>,
}

/// The identity and grouping columns of a fact, without its payload.
///
/// Retention sweeps only need to know which group a scan belongs to and when
/// it was taken, so candidates are loaded in this form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactStamp {
    pub id: Uuid,
    pub host_id: Uuid,
    pub module: String,
    pub timestamp: DateTime<Utc>,
}

impl FactStamp {
    /// Whether two stamps belong to the same (host, module) retention group.
    pub fn same_group(&self, other: &FactStamp) -> bool {
        self.host_id == other.host_id && self.module == other.module
    }
}

impl From<&Fact> for FactStamp {
    fn from(fact: &Fact) -> Self {
        Self {
            id: fact.id,
            host_id: fact.host_id,
            module: fact.module.clone(),
            timestamp: fact.timestamp,
        }
    }
}
