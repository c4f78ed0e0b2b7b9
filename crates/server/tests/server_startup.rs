use std::io::Write;
use std::net::TcpListener;
use std::time::Duration;

use reqwest::Client;
use tempfile::NamedTempFile;
use tokio::time::{sleep, timeout};

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// A config the binary accepts without reaching any collaborator at startup.
fn minimal_config(port: u16) -> String {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = {}

[queue]
endpoint = "http://127.0.0.1:9/jobs"
blob_container_url = "https://blobs.test/uploads"

[completion]
api_key = "sk-startup-secret"
model = "vision-test"
"#,
        port
    )
}

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

async fn spawn_server(config_path: &std::path::Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_stratum"))
        .env("STRATUM_CONFIG", config_path)
        .env("RUST_LOG", "error")
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn server")
}

async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = Client::new();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/api/v1/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

async fn run_to_exit(config_path: &std::path::Path) -> std::process::Output {
    timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_stratum"))
            .env("STRATUM_CONFIG", config_path)
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command")
}

#[tokio::test]
async fn test_health_and_config_endpoints() {
    let port = get_available_port();
    let temp_file = write_config(&minimal_config(port));

    let mut server = spawn_server(temp_file.path()).await;
    assert!(
        wait_for_server(port, 40).await,
        "Server did not start in time"
    );

    let client = Client::new();
    let response = client
        .get(format!("http://127.0.0.1:{}/api/v1/health", port))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["status"], "ok");

    let response = client
        .get(format!("http://127.0.0.1:{}/api/v1/config", port))
        .send()
        .await
        .expect("Failed to send request");
    let text = response.text().await.expect("Failed to read body");
    assert!(!text.contains("sk-startup-secret"));
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["server"]["port"], port);
    assert_eq!(json["completion"]["api_key_configured"], true);

    server.kill().await.ok();
}

#[tokio::test]
async fn test_missing_config_file_exits_with_error() {
    let output = run_to_exit(std::path::Path::new("/nonexistent/config.toml")).await;
    assert!(!output.status.success());
}

#[tokio::test]
async fn test_missing_completion_section_exits_with_error() {
    let temp_file = write_config(
        r#"
[queue]
endpoint = "http://127.0.0.1:9/jobs"
blob_container_url = "https://blobs.test/uploads"
"#,
    );

    let output = run_to_exit(temp_file.path()).await;
    assert!(!output.status.success());
}

#[tokio::test]
async fn test_invalid_config_exits_with_error() {
    let config = minimal_config(get_available_port()).replace(
        "[completion]",
        "[deliberation]\nmax_rounds = 0\n\n[completion]",
    );
    let temp_file = write_config(&config);

    let output = run_to_exit(temp_file.path()).await;
    assert!(!output.status.success());
}
