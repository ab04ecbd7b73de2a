//! reqwest-backed remote API.

use async_trait::async_trait;
use bastion_core::{ApiConfig, RemoteError};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value as JsonValue;

use crate::remote::RemoteApi;

// Remote error codes.
const CODE_INCORRECT_KEY: i64 = 2;
const CODE_TOO_MANY_REQUESTS: i64 = 5;
const CODE_KEY_OWNER_JAILED: i64 = 10;
const CODE_KEY_DISABLED: i64 = 13;
const CODE_ACCESS_LEVEL: i64 = 16;
const CODE_KEY_PAUSED: i64 = 18;

/// Map a remote error code to its class.
pub fn classify_code(code: i64, message: impl Into<String>) -> RemoteError {
    let message = message.into();
    match code {
        CODE_TOO_MANY_REQUESTS => RemoteError::RateLimited { message },
        CODE_INCORRECT_KEY | CODE_KEY_OWNER_JAILED | CODE_KEY_DISABLED | CODE_KEY_PAUSED => {
            RemoteError::CredentialInvalid { message }
        }
        CODE_ACCESS_LEVEL => RemoteError::AccessDenied { message },
        _ => RemoteError::Api { code, message },
    }
}

/// Turn an `{"error": {...}}` body into an error; pass anything else through.
pub fn classify_body(body: JsonValue) -> Result<JsonValue, RemoteError> {
    let Some(error) = body.get("error") else {
        return Ok(body);
    };
    match error {
        JsonValue::Object(fields) => {
            let code = fields.get("code").and_then(JsonValue::as_i64).unwrap_or(0);
            let message = fields
                .get("error")
                .or_else(|| fields.get("message"))
                .and_then(JsonValue::as_str)
                .unwrap_or("unknown error");
            Err(classify_code(code, message))
        }
        JsonValue::String(message) => Err(RemoteError::Api {
            code: 0,
            message: message.clone(),
        }),
        JsonValue::Null => Ok(body),
        other => Err(RemoteError::Api {
            code: 0,
            message: other.to_string(),
        }),
    }
}

/// Classify an HTTP response.
///
/// 429 and 5xx are transient; a JSON error body is classified by code; any
/// other non-success status is a plain API error.
pub async fn decode_response(response: reqwest::Response) -> Result<JsonValue, RemoteError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(RemoteError::RateLimited {
            message: format!("HTTP {}", status),
        });
    }
    if status.is_server_error() {
        return Err(RemoteError::Network {
            reason: format!("HTTP {}", status),
        });
    }

    let body = match response.json::<JsonValue>().await {
        Ok(body) => body,
        Err(e) if status.is_success() => {
            return Err(RemoteError::Decode {
                reason: e.to_string(),
            })
        }
        Err(_) => {
            return Err(RemoteError::Api {
                code: i64::from(status.as_u16()),
                message: format!("HTTP {}", status),
            })
        }
    };

    let body = classify_body(body)?;
    if !status.is_success() {
        return Err(RemoteError::Api {
            code: i64::from(status.as_u16()),
            message: format!("HTTP {}", status),
        });
    }
    Ok(body)
}

pub(crate) fn transport_error(e: reqwest::Error) -> RemoteError {
    RemoteError::Network {
        reason: e.without_url().to_string(),
    }
}

/// Remote world API over HTTP.
///
/// Request keys are the path and query under `base_url`; the credential is
/// appended as the `key` query parameter.
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    credential: Option<String>,
}

impl HttpApi {
    pub fn new(config: &ApiConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(transport_error)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credential: config.credential.clone(),
        })
    }

    pub fn request_url(&self, key: &str) -> Result<Url, RemoteError> {
        let raw = format!("{}/{}", self.base_url, key.trim_start_matches('/'));
        let mut url = Url::parse(&raw).map_err(|e| RemoteError::Api {
            code: 0,
            message: format!("Invalid request key {}: {}", key, e),
        })?;
        if let Some(credential) = &self.credential {
            url.query_pairs_mut().append_pair("key", credential);
        }
        Ok(url)
    }
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn get(&self, key: &str) -> Result<JsonValue, RemoteError> {
        let url = self.request_url(key)?;
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        decode_response(response).await
    }
}

impl std::fmt::Debug for HttpApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApi")
            .field("base_url", &self.base_url)
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
