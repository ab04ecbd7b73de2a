//! The remote read API seam.

use async_trait::async_trait;
use bastion_core::RemoteError;
use serde_json::Value as JsonValue;

/// A remote read API addressed by request key.
///
/// The key is opaque to the scheduler; for [`HttpApi`](crate::HttpApi) it is
/// the path and query of the request.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn get(&self, key: &str) -> Result<JsonValue, RemoteError>;
}
