//! Health check command - probes a running Livetree server.

use std::time::Duration;

use crate::cli::HealthArgs;

/// Endpoint URL for a server base URL; a URL already ending in `/health` is
/// used as is.
fn health_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/health") {
        base.to_string()
    } else {
        format!("{base}/health")
    }
}

/// Run the health check command. Exits with status 1 when the server is not
/// healthy.
pub async fn run(args: &HealthArgs) -> Result<(), Box<dyn std::error::Error>> {
    let url = health_url(&args.url);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()?;

    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            eprintln!("unhealthy: failed to reach {url}: {e}");
            std::process::exit(1);
        }
    };
    if !response.status().is_success() {
        eprintln!("unhealthy: {url} returned HTTP {}", response.status());
        std::process::exit(1);
    }

    let body: serde_json::Value = response.json().await?;
    match body.get("status").and_then(|s| s.as_str()) {
        Some("healthy") => {
            println!("healthy: {body}");
            Ok(())
        }
        status => {
            eprintln!("unhealthy: server reported status {}", status.unwrap_or("<missing>"));
            std::process::exit(1);
        }
    }
}
