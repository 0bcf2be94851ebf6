//! Cloud Healthcare DICOM 存储客户端

use crate::dicom_store::{ManagedDicomStore, OperationStatus};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};
use vizor_core::{Result, Settings, VizorError};
use vizor_dicom::DicomJsonDataset;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// 基于REST接口的托管存储客户端
///
/// 使用配置中的静态访问令牌，不做刷新；令牌过期后所有请求都会以
/// `Upstream` 错误失败，直到进程以新令牌重启。
pub struct HealthcareDicomStore {
    client: reqwest::Client,
    api_base: String,
    store_path: String,
    access_token: Option<String>,
}

impl HealthcareDicomStore {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VizorError::Config(format!("无法创建HTTP客户端: {}", e)))?;
        if settings.healthcare.access_token.is_some() {
            info!("Using static Healthcare access token; it is not refreshed during this process");
        }

        Ok(Self {
            client,
            api_base: settings.healthcare.api_base.trim_end_matches('/').to_string(),
            store_path: settings.dicom_store_path(),
            access_token: settings
                .healthcare
                .access_token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
        })
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.api_base, resource.trim_start_matches('/'))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send_json(&self, request: reqwest::RequestBuilder, what: &str) -> Result<Value> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| VizorError::Upstream(format!("{}: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VizorError::Upstream(format!("{}: HTTP {} {}", what, status, body.trim())));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| VizorError::Upstream(format!("{}: 响应解析失败: {}", what, e)))
    }
}

/// 解析长任务资源 `{"name", "done", "error": {"code", "message"}}`
fn operation_status(body: &Value) -> OperationStatus {
    let done = body.get("done").and_then(Value::as_bool).unwrap_or(false);
    if !done {
        return OperationStatus::running();
    }
    match body.get("error") {
        Some(error) if !error.is_null() => {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| {
                    let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
                    format!("operation failed with code {}", code)
                });
            OperationStatus::failed(message)
        }
        _ => OperationStatus::succeeded(),
    }
}

#[async_trait]
impl ManagedDicomStore for HealthcareDicomStore {
    fn store_path(&self) -> &str {
        &self.store_path
    }

    async fn start_import(&self, source_uri: &str) -> Result<String> {
        let url = self.url(&format!("{}:import", self.store_path));
        let body = json!({ "gcsSource": { "uri": source_uri } });
        let response = self
            .send_json(self.client.post(&url).json(&body), "dicomStores.import")
            .await?;

        let name = response
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| VizorError::Upstream("dicomStores.import 未返回任务名".to_string()))?;

        info!("Started DICOM import from {} -> {}, operation {}", source_uri, self.store_path, name);
        Ok(name.to_string())
    }

    async fn get_operation(&self, operation: &str) -> Result<OperationStatus> {
        let response = self
            .send_json(self.client.get(self.url(operation)), "operations.get")
            .await?;
        let status = operation_status(&response);
        debug!("Operation {} done={}", operation, status.done);
        Ok(status)
    }

    async fn study_metadata(&self, study_instance_uid: &str) -> Result<Vec<DicomJsonDataset>> {
        let url = self.url(&format!(
            "{}/dicomWeb/studies/{}/metadata",
            self.store_path, study_instance_uid
        ));
        let response = self
            .send_json(
                self.client.get(&url).header(ACCEPT, "application/dicom+json"),
                "studies.metadata",
            )
            .await?;
        let datasets: Vec<DicomJsonDataset> = serde_json::from_value(response)?;
        debug!("Fetched {} instance datasets for study {}", datasets.len(), study_instance_uid);
        Ok(datasets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_running() {
        let status = operation_status(&json!({ "name": "ops/1" }));
        assert_eq!(status, OperationStatus::running());
    }

    #[test]
    fn test_operation_success() {
        let status = operation_status(&json!({ "name": "ops/1", "done": true, "response": {} }));
        assert_eq!(status, OperationStatus::succeeded());
    }

    #[test]
    fn test_operation_failure_carries_message() {
        let status = operation_status(&json!({
            "done": true,
            "error": { "code": 3, "message": "invalid DICOM in gs://b/u/s/x.dcm" }
        }));
        assert_eq!(status.error.as_deref(), Some("invalid DICOM in gs://b/u/s/x.dcm"));

        let status = operation_status(&json!({ "done": true, "error": { "code": 13 } }));
        assert_eq!(status.error.as_deref(), Some("operation failed with code 13"));
    }

    #[test]
    fn test_urls() {
        let mut settings = Settings::default();
        settings.healthcare.api_base = "http://localhost:8080/v1/".to_string();
        let store = HealthcareDicomStore::new(&settings).unwrap();
        assert_eq!(
            store.url("projects/p/locations/l/operations/42"),
            "http://localhost:8080/v1/projects/p/locations/l/operations/42"
        );
        assert!(store.store_path().ends_with("dicomStores/vv-dicom"));
    }

    #[test]
    fn test_static_token_sent_as_configured() {
        let mut settings = Settings::default();
        settings.healthcare.access_token = Some(" ya29.token ".to_string());
        let store = HealthcareDicomStore::new(&settings).unwrap();
        let request = store
            .authorized(store.client.get("http://localhost/v1/ops/1"))
            .build()
            .unwrap();
        assert_eq!(request.headers()["authorization"], "Bearer ya29.token");

        settings.healthcare.access_token = Some("  ".to_string());
        let store = HealthcareDicomStore::new(&settings).unwrap();
        let request = store
            .authorized(store.client.get("http://localhost/v1/ops/1"))
            .build()
            .unwrap();
        assert!(request.headers().get("authorization").is_none());
    }
}
