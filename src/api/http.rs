use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{ApiError, RollCallApi};
use crate::models::{Class, Group, NewRollCall, PersistedRollCall, Student};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

/// REST client. Every request carries `Authorization: Bearer <token>` when a
/// token is configured.
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("{method} {url}");
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let response = self.request(Method::GET, endpoint).send().await?;
        decode(response).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .request(Method::POST, endpoint)
            .json(body)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let detail = serde_json::from_slice::<ErrorBody>(&bytes)
            .ok()
            .and_then(|body| body.detail)
            .map(|detail| match detail {
                serde_json::Value::String(message) => message,
                other => other.to_string(),
            })
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        return Err(ApiError::Status {
            status: status.as_u16(),
            detail,
        });
    }

    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl RollCallApi for HttpApi {
    async fn list_classes(&self) -> Result<Vec<Class>, ApiError> {
        self.get_json("/classes").await
    }

    async fn list_groups(&self, class_id: i64) -> Result<Vec<Group>, ApiError> {
        self.get_json(&format!("/classes/{class_id}/groups")).await
    }

    async fn list_students(&self, group_id: i64) -> Result<Vec<Student>, ApiError> {
        self.get_json(&format!("/groups/{group_id}/students")).await
    }

    async fn create_roll_call(&self, record: NewRollCall) -> Result<PersistedRollCall, ApiError> {
        self.post_json("/roll-call", &record).await
    }

    async fn roll_call_history(&self) -> Result<Vec<PersistedRollCall>, ApiError> {
        self.get_json("/roll-call/history").await
    }
}
