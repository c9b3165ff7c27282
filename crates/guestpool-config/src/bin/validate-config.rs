//! Config validation CLI tool
//!
//! Validates a guestpool configuration file and reports any errors.

use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a guestpool configuration file.");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", guestpool_config::DEFAULT_CONFIG_PATH);
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!(
            "Error: Configuration file not found: {}",
            config_path.display()
        );
        return ExitCode::from(1);
    }

    match guestpool_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Resolved policy:");
            println!("  enabled:       {}", policy.enabled);
            println!("  guest name:    {}", policy.guest_name);
            println!("  guest group:   {}", policy.group);
            println!(
                "  slots:         {}1 .. {}{}",
                policy.guest_name, policy.guest_name, policy.capacity
            );
            println!("  home size:     {} MiB", policy.home_size_mib);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                guestpool_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                guestpool_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                guestpool_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                guestpool_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        guestpool_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
