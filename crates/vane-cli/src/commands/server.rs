use anyhow::Result;
use colored::Colorize;
use serde_json::Value;

use crate::client::ControllerClient;

pub async fn status(client: &ControllerClient, server: &str) -> Result<()> {
    let root = client.get("/").await?;
    let ready = client.get("/readyz").await?;

    println!("{}: {}", "Server".cyan(), server);
    println!(
        "{}: {}",
        "Version".cyan(),
        root.get("version").and_then(Value::as_str).unwrap_or("-")
    );
    println!(
        "{}: {}",
        "Observer".cyan(),
        ready.get("observer").and_then(Value::as_str).unwrap_or("-")
    );
    println!(
        "{}: {}",
        "Applications".cyan(),
        ready.get("applications").and_then(Value::as_u64).unwrap_or(0)
    );
    Ok(())
}
