// Configuration loading and validation tests

use anyhow::Result;
use janmitra_voice::Config;

#[test]
fn test_defaults_match_deployment_values() {
    let config = Config::default();

    assert_eq!(config.audio.input_sample_rate, 16_000);
    assert_eq!(config.audio.output_sample_rate, 24_000);
    assert_eq!(config.audio.chunk_samples, 4096);
    assert_eq!(config.audio.channels, 1);
    assert_eq!(config.live.voice, "Zephyr");
    assert_eq!(config.agent.voice, "Charon");
    assert_eq!(config.agent.max_start_attempts, 3);
    assert!(config.live.endpoint.starts_with("wss://"));
    assert!(!config.recording.enabled);
}

#[test]
fn test_missing_api_key_is_fatal() {
    let config = Config::default();

    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("API key"));
}

#[test]
fn test_endpoint_scheme_is_enforced() {
    let mut config = Config::default();
    config.live.api_key = "AIzaTest".to_string();
    config.live.endpoint = "https://example.com/live".to_string();

    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("ws://"));
}

#[test]
fn test_valid_config_passes() {
    let mut config = Config::default();
    config.live.api_key = "AIzaTest".to_string();

    assert!(config.validate().is_ok());
}

#[test]
fn test_unusual_key_prefix_only_warns() {
    // A key without the AIza prefix is suspicious but not fatal
    let mut config = Config::default();
    config.live.api_key = "sk-something-else".to_string();

    assert!(config.validate().is_ok());
}

#[test]
fn test_load_from_file_keeps_defaults_for_untouched_sections() -> Result<()> {
    let temp_dir = tempfile::TempDir::new()?;
    let path = temp_dir.path().join("janmitra.toml");
    std::fs::write(
        &path,
        r#"
[live]
voice = "Kore"
temperature = 0.5

[recording]
enabled = true
dir = "/tmp/calls"
"#,
    )?;

    let config = Config::load(path.to_str().unwrap())?;

    assert_eq!(config.live.voice, "Kore");
    assert!((config.live.temperature - 0.5).abs() < 1e-6);
    assert!(config.recording.enabled);
    assert_eq!(config.recording.dir, "/tmp/calls");
    // Untouched sections keep their defaults
    assert_eq!(config.audio.chunk_samples, 4096);
    assert_eq!(config.http.port, 8080);
    Ok(())
}

#[test]
fn test_load_tolerates_missing_file() -> Result<()> {
    let config = Config::load("does/not/exist/janmitra")?;

    // Everything falls back to defaults (plus any ambient env overrides)
    assert_eq!(config.audio.chunk_samples, 4096);
    Ok(())
}
