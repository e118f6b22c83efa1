//! End-to-end command runs against the simulated sensor box

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ridelink_cli::{Cli, CliAppConfig, CliError, CommandDispatcher};
use ridelink_core::SessionConfig;
use tokio::time::timeout;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("ridelink-cli-{}", uuid::Uuid::new_v4()))
}

fn simulated_config(ride_dir: PathBuf) -> CliAppConfig {
    let mut config = CliAppConfig::default();
    config.session = SessionConfig::testing();
    config.output.ride_dir = ride_dir;
    config
}

async fn run(args: &[&str], config: CliAppConfig) -> Result<(), CliError> {
    let cli = Cli::parse_from(args);
    timeout(COMMAND_TIMEOUT, CommandDispatcher::execute(cli, config))
        .await
        .expect("command timed out")
}

#[tokio::test]
async fn test_simulated_scan() {
    let config = simulated_config(temp_dir());
    run(&["ridelink", "--simulate", "scan", "--seconds", "1"], config)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_simulated_stream() {
    let config = simulated_config(temp_dir());
    run(
        &[
            "ridelink",
            "--simulate",
            "stream",
            "--device",
            "SIM-BOX",
            "--channel",
            "acc",
            "--seconds",
            "1",
        ],
        config,
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_simulated_ride_is_stored() {
    let ride_dir = temp_dir();
    let config = simulated_config(ride_dir.clone());

    run(
        &["ridelink", "--simulate", "ride", "--device", "SIM-BOX", "--seconds", "2"],
        config,
    )
    .await
    .unwrap();

    let files: Vec<PathBuf> = std::fs::read_dir(&ride_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);

    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&files[0]).unwrap()).unwrap();
    assert_eq!(stored["user"], "anonymous");
    assert_eq!(stored["record"]["device"], "SIM:00:01");
    assert_eq!(stored["record"]["location"]["kind"], "unknown");
    let samples = stored["record"]["aggregates"]["acceleration"]["samples"]
        .as_array()
        .unwrap();
    assert!(!samples.is_empty());

    std::fs::remove_dir_all(&ride_dir).ok();
}

#[tokio::test]
async fn test_firmware_lookup() {
    let catalog_dir = temp_dir();
    std::fs::create_dir_all(&catalog_dir).unwrap();
    std::fs::write(
        catalog_dir.join("catalog.prod.json"),
        r#"{ "bluestsdk_v2": [ { "ble_dev_id": "0x0A", "ble_fw_id": "0x0D", "fw_version": "1.2.0" } ] }"#,
    )
    .unwrap();

    let mut config = CliAppConfig::default();
    config.catalog.dir = Some(catalog_dir.clone());
    let args = ["ridelink", "firmware", "--device-id", "0x0A", "--firmware-id", "0x0D"];
    run(&args, config.clone()).await.unwrap();

    // Absence from the catalog is reported, not an error
    let args = ["ridelink", "firmware", "--device-id", "0x0B", "--firmware-id", "0x0D"];
    run(&args, config.clone()).await.unwrap();

    let args = ["ridelink", "firmware", "--device-id", "0xZZ", "--firmware-id", "0x0D"];
    assert!(matches!(
        run(&args, config).await,
        Err(CliError::InvalidArgument(_))
    ));

    std::fs::remove_dir_all(&catalog_dir).ok();
}

#[tokio::test]
async fn test_firmware_lookup_needs_catalog() {
    let args = ["ridelink", "firmware", "--device-id", "0x0A", "--firmware-id", "0x0D"];
    let result = run(&args, CliAppConfig::default()).await;
    assert!(matches!(result, Err(CliError::InvalidArgument(_))));
}
