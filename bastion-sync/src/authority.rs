//! The remote authority seam and its HTTP implementation.

use async_trait::async_trait;
use bastion_claims::ClaimMutation;
use bastion_core::{AuthorityConfig, RemoteError};
use bastion_net::decode_response;
use reqwest::Client;
use serde::Serialize;

use crate::bundle::{Bundle, SinceMarks};

/// The single reconciling authority for claims, war config and notes.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Collections changed since `since`.
    async fn pull(&self, since: &SinceMarks) -> Result<Bundle, RemoteError>;

    /// Submit local mutations. The reply may carry fresh authoritative state.
    async fn push(&self, batch: &[ClaimMutation]) -> Result<Bundle, RemoteError>;
}

#[derive(Serialize)]
struct PushBody<'a> {
    mutations: &'a [ClaimMutation],
}

/// Authority over HTTP: `POST {base}/pull` and `POST {base}/push`.
#[derive(Clone)]
pub struct HttpAuthority {
    client: Client,
    base_url: String,
    credential: Option<String>,
}

impl HttpAuthority {
    pub fn new(config: &AuthorityConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RemoteError::Network {
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credential: config.credential.clone(),
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Bundle, RemoteError> {
        let mut request = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .json(body);
        if let Some(credential) = &self.credential {
            request = request.bearer_auth(credential);
        }
        let response = request.send().await.map_err(|e| RemoteError::Network {
            reason: e.without_url().to_string(),
        })?;
        let value = decode_response(response).await?;
        serde_json::from_value(value).map_err(|e| RemoteError::Decode {
            reason: format!("Invalid bundle: {}", e),
        })
    }
}

#[async_trait]
impl RemoteAuthority for HttpAuthority {
    async fn pull(&self, since: &SinceMarks) -> Result<Bundle, RemoteError> {
        self.post("pull", since).await
    }

    async fn push(&self, batch: &[ClaimMutation]) -> Result<Bundle, RemoteError> {
        self.post("push", &PushBody { mutations: batch }).await
    }
}

impl std::fmt::Debug for HttpAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthority")
            .field("base_url", &self.base_url)
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
