use colored::Colorize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

fn colorize_status(status: &str) -> String {
    match status {
        "Synced" | "Healthy" => status.green().to_string(),
        "OutOfSync" | "Progressing" | "Unknown" => status.yellow().to_string(),
        "Degraded" | "Unhealthy" | "Missing" => status.red().to_string(),
        other => other.to_string(),
    }
}

fn field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("-")
}

/// Renders the application listing.
pub fn print_app_list(apps: &Value, format: OutputFormat) {
    if matches!(format, OutputFormat::Json) {
        println!(
            "{}",
            serde_json::to_string_pretty(apps).unwrap_or_default()
        );
        return;
    }
    let Some(rows) = apps.as_array() else { return };
    if rows.is_empty() {
        println!("No applications registered.");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["Name", "Sync", "Health", "Revision"]);
    for row in rows {
        builder.push_record([
            field(row, "name").to_string(),
            colorize_status(field(row, "sync")),
            colorize_status(field(row, "health")),
            field(row, "revision").to_string(),
        ]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

/// Renders one application's full status.
pub fn print_app_detail(detail: &Value, format: OutputFormat) {
    if matches!(format, OutputFormat::Json) {
        println!(
            "{}",
            serde_json::to_string_pretty(detail).unwrap_or_default()
        );
        return;
    }

    let status = &detail["status"];
    println!("{}: {}", "Application".cyan(), field(&detail["application"], "name"));
    println!("{}: {}", "Sync".cyan(), colorize_status(field(status, "sync")));
    println!(
        "{}: {}",
        "Health".cyan(),
        colorize_status(field(status, "health"))
    );
    println!("{}: {}", "Revision".cyan(), field(status, "revision"));
    if let Some(message) = status.get("message").and_then(Value::as_str) {
        println!("{}: {message}", "Message".cyan());
    }
    if let Some(plan) = status.get("lastPlan") {
        println!(
            "{}: {} created, {} updated, {} deleted, {} unchanged, {} drifted, {} failed",
            "Last plan".cyan(),
            plan["created"],
            plan["updated"],
            plan["deleted"],
            plan["unchanged"],
            plan["drifted"],
            plan["failed"],
        );
    }

    if let Some(history) = detail.get("history").and_then(Value::as_array) {
        if !history.is_empty() {
            println!("{}:", "History".cyan());
            let mut builder = Builder::default();
            builder.push_record(["Index", "Revision", "Resources", "Recorded"]);
            for entry in history {
                builder.push_record([
                    entry["index"].to_string(),
                    field(entry, "revision").to_string(),
                    entry["resourceCount"].to_string(),
                    field(entry, "recordedAt").to_string(),
                ]);
            }
            println!("{}", builder.build().with(Style::rounded()));
        }
    }
}
