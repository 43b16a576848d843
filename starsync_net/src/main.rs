// CLI entry point for the standalone starsync hub.
//
// Runs the relay half of the system on its own: peers connect, send their
// entity positions, and receive everyone else's. The hub binary hosts no
// local entity, so its consumer callback only logs applied updates for
// inspection. See `endpoint.rs` for the networking architecture.
//
// Usage:
//   hub [OPTIONS]
//     --port <PORT>   Listen port (default: 7777)

use std::time::Duration;

use log::debug;
use starsync_net::endpoint::{Endpoint, HubConfig};

fn main() {
    env_logger::init();

    let config = parse_args();
    let mut endpoint = Endpoint::new(|update| {
        debug!(
            "applied {} -> ({}, {})",
            update.entity_id, update.x, update.y
        );
    });

    let addr = match endpoint.start_hub(&config) {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("Failed to start hub: {e}");
            std::process::exit(1);
        }
    };

    println!("Hub listening on {addr}");
    println!("Press Ctrl+C to stop.");

    // Drain the apply queue at a steady cadence until the process is
    // killed. SIGINT/SIGTERM terminate the process outright and the OS
    // reclaims the sockets, which is fine for a standalone relay.
    loop {
        endpoint.drain();
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Parse command-line arguments into a `HubConfig`. Plain
/// `std::env::args()` matching — one flag does not need a CLI crate.
fn parse_args() -> HubConfig {
    let mut config = HubConfig::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_usage() {
    println!("Usage: hub [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <PORT>   Listen port (default: 7777)");
    println!("  --help, -h      Show this help");
}
