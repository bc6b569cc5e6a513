use output_route_selector::config::TimingConfig;
use output_route_selector::{Config, ConfigLoader, MockFileSystem};
use std::path::PathBuf;

/// Integration tests for ConfigLoader with file system abstraction
#[cfg(test)]
mod config_loader_tests {
    use super::*;

    #[test]
    fn test_config_loading_with_mock_filesystem() {
        let file_system = MockFileSystem::new();
        let config_path = PathBuf::from("/test/config.toml");

        let config_content = r#"
[general]
log_level = "debug"

[timing]
poll_interval_ms = 500
subscribe_delay_ms = 50
bluetooth_broadcast_delay_ms = 400

[simulator]
telephony_capable = false
wired_headset_on = true
bluetooth_devices = ["AirPods Pro", "Car Kit"]
"#;
        file_system.add_file(&config_path, config_content.to_string());

        let config_loader = ConfigLoader::new(file_system.clone(), config_path.clone());
        let config = config_loader.load_config().unwrap();

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.timing.poll_interval_ms, 500);
        assert_eq!(config.timing.subscribe_delay_ms, 50);
        assert_eq!(config.timing.bluetooth_broadcast_delay_ms, 400);
        assert_eq!(config.timing.settle_delay_ms, 300);
        assert!(!config.simulator.telephony_capable);
        assert!(config.simulator.wired_headset_on);
        assert_eq!(config.simulator.bluetooth_devices.len(), 2);

        let read_calls = file_system.get_read_calls();
        assert_eq!(read_calls, vec![config_path]);
    }

    #[test]
    fn test_missing_file_writes_loadable_default() {
        let file_system = MockFileSystem::new();
        let config_path = PathBuf::from("/home/user/.config/output-route-selector/config.toml");
        let config_loader = ConfigLoader::new(file_system.clone(), config_path.clone());

        let created = config_loader.load_config().unwrap();
        assert_eq!(created, Config::default());

        let write_calls = file_system.get_write_calls();
        assert_eq!(write_calls.len(), 1);
        assert!(write_calls[0].1.contains("[timing]"));

        // The written default parses back to the same configuration.
        let reloaded = config_loader.reload_config().unwrap();
        assert_eq!(reloaded, created);
        assert_eq!(
            file_system.get_directory_creation_calls(),
            vec![PathBuf::from("/home/user/.config/output-route-selector")]
        );
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let file_system = MockFileSystem::new();
        let config_path = PathBuf::from("/test/config.toml");
        file_system.add_file(&config_path, "[timing\nsettle_delay_ms = ".to_string());

        let config_loader = ConfigLoader::new(file_system, config_path);
        let err = config_loader.load_config().unwrap_err();

        assert!(format!("{:#}", err).contains("Failed to parse configuration file"));
    }

    #[test]
    fn test_zero_settle_delay_is_rejected() {
        let file_system = MockFileSystem::new();
        let config_path = PathBuf::from("/test/config.toml");
        file_system.add_file(&config_path, "[timing]\nsettle_delay_ms = 0\n".to_string());

        let config_loader = ConfigLoader::new(file_system, config_path);

        assert!(config_loader.load_config().is_err());
    }

    #[test]
    fn test_read_failure_propagates() {
        let file_system = MockFileSystem::new();
        let config_path = PathBuf::from("/test/config.toml");
        file_system.add_file(&config_path, String::new());
        file_system.set_read_failure(true);

        let config_loader = ConfigLoader::new(file_system, config_path);

        assert!(config_loader.load_config().is_err());
    }

    #[test]
    fn test_save_failure_propagates() {
        let file_system = MockFileSystem::new();
        file_system.set_write_failure(true);
        let config_loader = ConfigLoader::new(file_system, PathBuf::from("/test/config.toml"));

        assert!(config_loader.save_config(&Config::default()).is_err());
    }

    #[test]
    fn test_reload_picks_up_new_timing() {
        let file_system = MockFileSystem::new();
        let config_path = PathBuf::from("/test/config.toml");
        file_system.add_file(&config_path, String::new());
        let config_loader = ConfigLoader::new(file_system.clone(), config_path.clone());

        assert_eq!(config_loader.load_config().unwrap().timing, TimingConfig::default());

        file_system.add_file(
            &config_path,
            "[timing]\nmax_confirm_attempts = 5\nretry_step_ms = 150\n".to_string(),
        );
        let reloaded = config_loader.reload_config().unwrap();

        assert_eq!(reloaded.timing.max_confirm_attempts, 5);
        assert_eq!(reloaded.timing.retry_step_ms, 150);
    }
}
