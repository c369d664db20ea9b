/// Example program to print the loaded configuration
///
/// Run with: cargo run -p rune-config --example print_config

fn main() {
    let config = rune_config::RuneConfig::load();

    println!("=== Rune Configuration ===\n");

    println!("Blit Settings:");
    println!("  Force Shader Path: {}", config.blit.force_shader_path);
    println!("  Hardware Scaling: {}", config.blit.allow_hardware_scaling);
    println!();

    println!("Staging Settings:");
    println!("  Min Stage Size: {}", config.staging.min_stage_size);
    println!("  Max Idle Generations: {}", config.staging.max_idle_generations);
    println!();

    println!("Disposer Settings:");
    println!("  Frames In Flight: {}", config.disposer.frames_in_flight);
    println!();

    println!("Logging:");
    println!("  Filter: {:?}", config.logging.filter);
    println!();

    match toml::to_string_pretty(&config) {
        Ok(toml_str) => {
            println!("=== Serialized Configuration ===");
            println!("{}", toml_str);
        }
        Err(e) => {
            eprintln!("Failed to serialize config: {}", e);
        }
    }
}
