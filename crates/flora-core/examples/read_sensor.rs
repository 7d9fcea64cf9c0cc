//! Example: Reading a Mi Flora Sensor
//!
//! This example polls one sensor over Bluetooth and prints every
//! parameter. The measurement is read once; the remaining parameters are
//! served from the cache.
//!
//! Run with: `cargo run --example read_sensor -- <DEVICE_ADDRESS> [CONFIG.toml]`

use std::env;

use flora_core::{BleTransport, Parameter, PollerConfig, SensorPoller};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let address = if args.len() > 1 {
        args[1].parse()?
    } else {
        eprintln!("Usage: {} <DEVICE_ADDRESS> [CONFIG.toml]", args[0]);
        eprintln!();
        eprintln!("Example:");
        eprintln!("  {} C4:7C:8D:6A:3E:11", args[0]);
        std::process::exit(1);
    };

    let config = match args.get(2) {
        Some(path) => PollerConfig::load(path)?,
        None => PollerConfig::default(),
    };

    let poller = SensorPoller::try_with_config(address, BleTransport::new(), config)?;

    println!("Polling {}...", poller.address());
    if let Some(name) = poller.name().await {
        println!("  Name:         {}", name);
    }
    match poller.firmware_version().await {
        Some(version) => println!("  Firmware:     {}", version),
        None => println!("  Firmware:     unavailable"),
    }

    println!();
    println!("Current Readings:");
    for parameter in Parameter::ALL {
        match poller.parameter_value(parameter, true).await {
            Ok(value) => println!("  {:<13} {} {}", parameter, value, parameter.unit()),
            Err(e) => println!("  {:<13} {}", parameter, e),
        }
    }

    println!();
    println!("Cache: {:?}", poller.cache_status().await);

    Ok(())
}
