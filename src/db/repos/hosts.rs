use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{CreateHost, Host},
};

#[async_trait]
pub trait HostRepo: Send + Sync {
    /// Register a new host. Fails with `Conflict` if the name is taken.
    async fn create(&self, input: CreateHost) -> DbResult<Host>;

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Host>>;

    async fn get_by_name(&self, name: &str) -> DbResult<Option<Host>>;

    /// List all hosts ordered by name
    async fn list(&self) -> DbResult<Vec<Host>>;
}
