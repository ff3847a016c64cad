//! Example demonstrating configuration files driving the equalizer
//!
//! Run with: cargo run --package sixband-core --example config_demo

use sixband_core::domain::{
    AtomicParameterStore, ParamId, ParametricEq, ParameterStore, ProcessSpec, SixbandConfig,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("sixband_core=debug,info")
        .init();

    println!("=== Sixband Configuration Demo ===\n");

    // 1. Create factory default configuration
    println!("1. Creating factory default configuration...");
    let mut config = SixbandConfig::factory_default();
    println!("   ✓ {} parameters at their defaults", config.parameters.len());

    // 2. Shape the curve and save it
    println!("\n2. Saving a tilted curve to file...");
    config.parameters.insert("LOWSHELFGAIN".to_string(), 4.0);
    config.parameters.insert("HISHELFGAIN".to_string(), -4.0);
    config.parameters.insert("LOWCUTFREQ".to_string(), 60.0);
    config.parameters.insert("LOWCUTSLOPE".to_string(), 2.0);
    let config_path = "demo_config.toml";
    config.save_to_file(config_path).await?;
    println!("   ✓ Configuration saved to {}", config_path);

    // 3. Load it back into a live parameter store
    println!("\n3. Loading configuration into the parameter store...");
    let loaded = SixbandConfig::load_from_file(config_path).await?;
    let store = Arc::new(AtomicParameterStore::new());
    let written = loaded.apply_parameters(&store)?;
    println!("   ✓ {} parameters applied", written);

    for id in [ParamId::LowCutFreq, ParamId::LowCutSlope, ParamId::LowShelfGain] {
        println!("   {:<16} = {}", id.name(), store.value(id));
    }

    // 4. Run a block and print the resulting curve
    println!("\n4. Response after one block:");
    let spec = ProcessSpec::stereo(f64::from(loaded.app.sample_rate), 512);
    let mut eq = ParametricEq::new(store.clone());
    eq.prepare(spec)?;

    let mut left = vec![0.0_f32; 512];
    let mut right = vec![0.0_f32; 512];
    eq.process(&mut left, &mut right)?;

    for freq in [30.0, 60.0, 120.0, 1000.0, 8000.0, 16000.0] {
        println!("   {:>7.0} Hz  {:>7.2} dB", freq, eq.magnitude_db(freq)?);
    }

    // 5. Cleanup
    println!("\n5. Cleaning up...");
    tokio::fs::remove_file(config_path).await?;
    println!("   ✓ Demo files removed");

    println!("\n=== Demo Complete ===");
    Ok(())
}
