use anyhow::{bail, Context, Result};
use serde_json::Value;

/// Thin JSON client for the controller's REST interface.
pub struct ControllerClient {
    base_url: String,
    http: reqwest::Client,
}

impl ControllerClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?;
        Self::parse(response).await
    }

    pub async fn post(&self, path: &str, body: Option<&Value>) -> Result<Value> {
        let mut request = self.http.post(format!("{}{path}", self.base_url));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("POST {path} failed"))?;
        Self::parse(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}{path}", self.base_url))
            .send()
            .await
            .with_context(|| format!("DELETE {path} failed"))?;
        if response.status().is_success() {
            return Ok(());
        }
        bail!("{}", Self::error_message(response).await)
    }

    async fn parse(response: reqwest::Response) -> Result<Value> {
        if response.status().is_success() {
            return response.json().await.context("invalid JSON response");
        }
        bail!("{}", Self::error_message(response).await)
    }

    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        let detail = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| "no detail".to_string());
        format!("server returned {status}: {detail}")
    }
}
