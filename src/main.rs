use anyhow::Result;
use log::{debug, error, info};
use std::fs::File;
use std::io::Write;
use std::time::Instant;

use tissue_common::{AggregateSnapshot, SimulationConfig};
use tissue_engine::Tissue;

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting Tissue Engine...");

    // --- Load Configuration ---
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = SimulationConfig::load(&config_path)?;
    info!("Loaded configuration from {}.", config_path);
    info!("Using {} Rayon threads.", rayon::current_num_threads());

    // --- Initialize Tissue ---
    let mut tissue = Tissue::new(config)?;
    debug!("Simulation Parameters: {:#?}", tissue.config().get_sim_params());

    let start_time = Instant::now();
    let outcome = tissue.run().map(|_| ());
    if let Err(e) = outcome {
        error!("Simulation aborted after {} macro-iterations: {:#}", tissue.macro_iteration(), e);
        save_snapshots(tissue.config(), tissue.snapshots());
        return Err(e);
    }
    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds. {} migrants left the tissue.",
        total_duration.as_secs_f64(),
        tissue.lost_migrants()
    );

    save_snapshots(tissue.config(), tissue.snapshots());
    info!("Simulation Complete.");
    Ok(())
}

// Writes all aggregate snapshots in the configured format.
fn save_snapshots(config: &SimulationConfig, snapshots: &[AggregateSnapshot]) {
    if !config.output.save_stats {
        info!("Skipping saving snapshots as per config (save_stats is false).");
        return;
    }
    let base = &config.output.base_filename;
    let output_format = config.output.format.as_deref().unwrap_or("json");

    match output_format {
        "bincode" => {
            let filename = format!("{}_snapshots.bin", base);
            match File::create(&filename) {
                Ok(file) => match bincode::serialize_into(file, snapshots) {
                    Ok(_) => info!("All snapshots saved to {} (binary format)", filename),
                    Err(e) => error!("Error serializing snapshots to bincode: {}", e),
                },
                Err(e) => error!("Error creating snapshot file '{}': {}", filename, e),
            }
        }
        "messagepack" => {
            let filename = format!("{}_snapshots.msgpack", base);
            match &mut File::create(&filename) {
                Ok(file) => match rmp_serde::encode::write(file, snapshots) {
                    Ok(_) => info!("All snapshots saved to {} (MessagePack format)", filename),
                    Err(e) => error!("Error serializing snapshots to MessagePack: {}", e),
                },
                Err(e) => error!("Error creating snapshot file '{}': {}", filename, e),
            }
        }
        other => {
            if other != "json" {
                error!("Unknown output format: {}. Using JSON instead.", other);
            }
            let filename = format!("{}_snapshots.json", base);
            match File::create(&filename) {
                Ok(mut file) => match serde_json::to_string(snapshots) {
                    Ok(json_string) => {
                        if let Err(e) = file.write_all(json_string.as_bytes()) {
                            error!("Error writing snapshot JSON to file '{}': {}", filename, e);
                        } else {
                            info!("All snapshots saved to {}", filename);
                        }
                    }
                    Err(e) => error!("Error serializing snapshots to JSON: {}", e),
                },
                Err(e) => error!("Error creating snapshot file '{}': {}", filename, e),
            }
        }
    }
}
