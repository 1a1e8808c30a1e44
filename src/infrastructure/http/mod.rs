//! Backend REST client for the senior directory.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::BackendSettings;
use crate::domain::{HealthInfo, Senior, SeniorDirectory, StatusSource};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Senior record as returned by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct SeniorRecord {
    #[serde(alias = "id", deserialize_with = "number_or_string")]
    pub senior_id: i64,
    #[serde(alias = "name", default)]
    pub full_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, deserialize_with = "lenient_date")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub health_info: HealthInfo,
    #[serde(default, deserialize_with = "optional_text")]
    pub device_id: Option<String>,
    #[serde(alias = "profile_image", default, deserialize_with = "optional_text")]
    pub profile_img: Option<String>,
}

impl SeniorRecord {
    pub fn into_senior(self, profile_image_fallback: impl FnOnce(i64) -> String) -> Senior {
        let status = self.health_info.derived_status();
        let profile_image = self
            .profile_img
            .or_else(|| Some(profile_image_fallback(self.senior_id)));
        Senior {
            id: self.senior_id,
            name: self.full_name,
            address: self.address,
            birth_date: self.birth_date,
            status,
            status_source: StatusSource::HealthInfo,
            health_info: self.health_info,
            device_id: self.device_id,
            profile_image,
        }
    }
}

fn number_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("senior id out of range")),
        Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!("invalid senior id {other}"))),
    }
}

fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Accepts `1946-03-04`, `1946.03.04` and full timestamps.
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let head: String = raw.trim().chars().take(10).collect();
    Ok(NaiveDate::parse_from_str(&head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&head, "%Y.%m.%d"))
        .ok())
}

/// [`SeniorDirectory`] over the backend's REST API.
pub struct HttpSeniorDirectory {
    client: reqwest::Client,
    base: Url,
    token: String,
}

impl HttpSeniorDirectory {
    pub fn new(settings: &BackendSettings) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        let mut base = Url::parse(&settings.api_base_url).map_err(|e| {
            AppError::Validation(format!("invalid backend.api_base_url {}: {e}", settings.api_base_url))
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client,
            base,
            token: settings.access_token.clone(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, AppError> {
        self.base
            .join(path)
            .map_err(|e| AppError::Internal(format!("cannot build backend url for {path}: {e}")))
    }

    /// Image endpoint used when the record carries no explicit reference.
    pub fn profile_image_url(&self, id: i64) -> String {
        self.url(&format!("seniors/{id}/profile-image"))
            .map(|u| u.to_string())
            .unwrap_or_default()
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.token)
        }
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, AppError> {
        let started = Instant::now();
        let result = self.authorized(request).send().await;
        let status = match &result {
            Ok(response) => response.status().as_u16().to_string(),
            Err(_) => "error".to_string(),
        };
        metrics::record_backend_request(operation, &status, started.elapsed().as_secs_f64());
        Ok(result?)
    }

    fn to_senior(&self, record: SeniorRecord) -> Senior {
        record.into_senior(|id| self.profile_image_url(id))
    }
}

async fn upstream_error(response: reqwest::Response) -> AppError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    AppError::Upstream { status, message }
}

#[async_trait]
impl SeniorDirectory for HttpSeniorDirectory {
    #[instrument(skip(self))]
    async fn list_seniors(&self) -> Result<Vec<Senior>, AppError> {
        let response = self
            .send("list_seniors", self.client.get(self.url("seniors")?))
            .await?;
        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let body: Value = response.json().await?;
        let items = match body {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("seniors").or_else(|| map.remove("data")) {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(AppError::Upstream {
                        status: 200,
                        message: "senior list response has no array".into(),
                    })
                }
            },
            _ => Vec::new(),
        };

        let seniors: Vec<Senior> = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<SeniorRecord>(item) {
                Ok(record) => Some(self.to_senior(record)),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed senior record");
                    None
                }
            })
            .collect();
        debug!(count = seniors.len(), "Senior list fetched");
        Ok(seniors)
    }

    #[instrument(skip(self))]
    async fn get_senior(&self, id: i64) -> Result<Option<Senior>, AppError> {
        let response = self
            .send("get_senior", self.client.get(self.url(&format!("seniors/{id}"))?))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let record: SeniorRecord = response.json().await?;
                Ok(Some(self.to_senior(record)))
            }
            _ => Err(upstream_error(response).await),
        }
    }

    #[instrument(skip(self))]
    async fn delete_senior(&self, id: i64) -> Result<bool, AppError> {
        let response = self
            .send("delete_senior", self.client.delete(self.url(&format!("seniors/{id}"))?))
            .await?;
        let acknowledged = response.status().is_success();
        if !acknowledged {
            warn!(status = response.status().as_u16(), "Backend refused senior deletion");
        }
        Ok(acknowledged)
    }

    #[instrument(skip(self))]
    async fn profile_image(&self, id: i64) -> Result<Vec<u8>, AppError> {
        let response = self
            .send(
                "profile_image",
                self.client.get(self.url(&format!("seniors/{id}/profile-image"))?),
            )
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(AppError::NotFound(format!("profile image of senior {id}"))),
            status if status.is_success() => Ok(response.bytes().await?.to_vec()),
            _ => Err(upstream_error(response).await),
        }
    }
}
