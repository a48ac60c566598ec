//! Configuration source precedence

use std::io::Write;
use tempfile::TempDir;

use runbook_agent::{ConfigLoader, LoadOptions};

#[test]
fn test_file_environment_and_command_line_precedence() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("agent.json");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(
        br#"{
            "server": {"endpoint": "file.example.com", "api_key": "file-key"},
            "consumer": {"failure_threshold": 3, "max_messages": 5},
            "authenticator": {"public_key": "cHVibGljLWtleQ=="}
        }"#,
    )
    .unwrap();

    // Only this test in the binary touches the environment
    std::env::set_var("RUNBOOK_AGENT__CONSUMER__FAILURE_THRESHOLD", "7");
    std::env::set_var("RUNBOOK_AGENT__SERVER__ENDPOINT", "env.example.com");

    let config = ConfigLoader::load(&LoadOptions {
        config_path: Some(path),
        endpoint: Some("cli.example.com".to_string()),
        api_key: None,
        ignore_environment: false,
    })
    .unwrap()
    .into_config();

    std::env::remove_var("RUNBOOK_AGENT__CONSUMER__FAILURE_THRESHOLD");
    std::env::remove_var("RUNBOOK_AGENT__SERVER__ENDPOINT");

    // Environment beats the file
    assert_eq!(config.consumer.failure_threshold, 7);
    // File beats defaults
    assert_eq!(config.consumer.max_messages, 5);
    assert_eq!(config.server.api_key, "file-key");
    // Command line beats everything
    assert_eq!(config.server.endpoint, "cli.example.com");
}
