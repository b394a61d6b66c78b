use ddpg_core::{
    logging::{
        setup_logging,
        LoggingConfig,
    },
    util::{
        read_config,
        write_config,
    },
};

#[test]
fn logging_can_only_be_installed_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("debug.log");
    let config = LoggingConfig {
        file_level: "debug".to_string(),
        stdout_level: "warn".to_string(),
        dependencies: false,
    };
    write_config(&config, dir.path().join("logging.ron")).unwrap();
    let config: LoggingConfig = read_config(dir.path().join("logging.ron")).unwrap();

    setup_logging(&path, &config).unwrap();
    tracing::info!("written to the log file");
    assert!(path.exists());

    assert!(setup_logging(&dir.path().join("again.log"), &LoggingConfig::default()).is_err());
}
