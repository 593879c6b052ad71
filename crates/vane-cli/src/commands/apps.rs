use anyhow::{Context, Result};
use serde_json::Value;

use crate::cli::OutputFormat;
use crate::client::ControllerClient;
use crate::output;

pub async fn list(client: &ControllerClient, format: OutputFormat) -> Result<()> {
    let apps = client.get("/api/v1/applications").await?;
    output::print_app_list(&apps, format);
    Ok(())
}

pub async fn get(client: &ControllerClient, name: &str, format: OutputFormat) -> Result<()> {
    let detail = client.get(&format!("/api/v1/applications/{name}")).await?;
    output::print_app_detail(&detail, format);
    Ok(())
}

pub async fn register(client: &ControllerClient, file: &str) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read declaration file '{file}'"))?;
    let declaration: Value =
        serde_json::from_str(&raw).with_context(|| format!("'{file}' is not valid JSON"))?;
    let response = client
        .post("/api/v1/applications", Some(&declaration))
        .await?;
    let name = response
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("application");
    output::print_success(&format!("Registered {name}"));
    Ok(())
}

pub async fn deregister(client: &ControllerClient, name: &str, cascade: bool) -> Result<()> {
    let path = if cascade {
        format!("/api/v1/applications/{name}?cascade=true")
    } else {
        format!("/api/v1/applications/{name}")
    };
    client.delete(&path).await?;
    output::print_success(&format!("Deregistered {name}"));
    Ok(())
}

pub async fn sync(client: &ControllerClient, name: &str) -> Result<()> {
    client
        .post(&format!("/api/v1/applications/{name}/sync"), None)
        .await?;
    output::print_success(&format!("Sync scheduled for {name}"));
    Ok(())
}

pub async fn rollback(client: &ControllerClient, name: &str, index: usize) -> Result<()> {
    let body = serde_json::json!({"revisionIndex": index});
    client
        .post(&format!("/api/v1/applications/{name}/rollback"), Some(&body))
        .await?;
    output::print_success(&format!("Rollback to revision {index} scheduled for {name}"));
    Ok(())
}
