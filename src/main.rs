use anyhow::{Context, Result};
use nimbus_core::Config;
use nimbus_weather::{SdkConfig, WeatherClient};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    nimbus_core::init(&config.logging.filter)?;

    let validation = config.validate();
    if !validation.is_valid() {
        anyhow::bail!("Configuration validation failed: {}", validation.error_summary());
    }
    for warning in &validation.warnings {
        tracing::warn!("Config warning: {}", warning);
    }

    let cities: Vec<String> = std::env::args().skip(1).collect();
    if cities.is_empty() {
        println!("Usage: nimbus <city> [<city> ...]");
        println!("\nConfiguration: {}", config.config_dir.display());
        return Ok(());
    }

    let sdk_config =
        SdkConfig::from_settings(&config.weather).context("Invalid weather configuration")?;
    let client = WeatherClient::new(sdk_config).context("Failed to create weather client")?;

    tracing::info!("Nimbus started");

    for city in &cities {
        match client.get_weather(city).await {
            Ok(weather) => println!("{}", serde_json::to_string_pretty(&weather)?),
            Err(e) => {
                tracing::debug!("Lookup for {} failed: {:?}", city, e);
                eprintln!("{}: {} ({})", city, e, e.user_message());
            }
        }
    }

    println!("\nMetrics: {}", client.metrics()?);

    client.shutdown().await;
    Ok(())
}
