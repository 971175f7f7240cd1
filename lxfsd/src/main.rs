//! # lxfs Daemon
//!
//! Main entry point for the lxfs filesystem server.

use lxfsd::logger;
use services_lxfs::{DriverConfig, MountConfig};
use std::env;
use std::path::PathBuf;
use std::process;

/// What the command line asked for
struct Options {
    config: DriverConfig,
    print_config: bool,
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("lxfsd");

    let options = parse_args(&args).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        print_usage(program);
        process::exit(1);
    });
    let config = options.config;

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    if options.print_config {
        match serde_json::to_string_pretty(&config) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Failed to render configuration: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    let level = config.level_filter().unwrap_or(log::LevelFilter::Info);
    if let Err(e) = logger::init(&config.server_name, level) {
        eprintln!("Failed to install logger: {}", e);
    }

    if let Err(e) = lxfsd::serve_stdio(&config) {
        log::error!("{}", e);
        eprintln!("lxfsd: {}", e);
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut config = DriverConfig::default();
    let mut print_config = false;
    let mut image: Option<PathBuf> = None;
    let mut device = "sd0".to_string();
    let mut block_size: Option<usize> = None;
    let mut create_blocks: Option<u64> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --config".to_string());
                }
                config = DriverConfig::load(&args[i])
                    .map_err(|e| format!("Failed to load config file: {}", e))?;
            }
            "--image" | "-i" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --image".to_string());
                }
                image = Some(PathBuf::from(&args[i]));
            }
            "--device" | "-d" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --device".to_string());
                }
                device = args[i].clone();
            }
            "--block-size" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --block-size".to_string());
                }
                block_size = Some(
                    args[i]
                        .parse()
                        .map_err(|_| format!("Invalid block-size value: {}", args[i]))?,
                );
            }
            "--create" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --create".to_string());
                }
                create_blocks = Some(
                    args[i]
                        .parse()
                        .map_err(|_| format!("Invalid block count: {}", args[i]))?,
                );
            }
            "--log-level" | "-l" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --log-level".to_string());
                }
                config.log_level = args[i].clone();
            }
            "--max-hops" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing value for --max-hops".to_string());
                }
                config.symlink_hop_limit = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid max-hops value: {}", args[i]))?;
            }
            "--print-config" => {
                print_config = true;
            }
            "--help" | "-h" => {
                print_usage(args.first().map(String::as_str).unwrap_or("lxfsd"));
                process::exit(0);
            }
            other => {
                return Err(format!("Unknown option: {}", other));
            }
        }
        i += 1;
    }

    match image {
        Some(image) => {
            let mut mount = MountConfig::new(device, image);
            if let Some(size) = block_size {
                mount.block_size = size;
            }
            mount.create_blocks = create_blocks;
            config.mounts.retain(|m| m.device != mount.device);
            config.mounts.push(mount);
        }
        None if block_size.is_some() || create_blocks.is_some() => {
            return Err("--block-size and --create need --image".to_string());
        }
        None => {}
    }

    Ok(Options {
        config,
        print_config,
    })
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} [OPTIONS]", program);
    eprintln!();
    eprintln!("Serves lxfs volumes over stdin/stdout.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <FILE>      JSON configuration file");
    eprintln!("  -i, --image <FILE>       Volume image to serve");
    eprintln!("  -d, --device <NAME>      Device name for --image (default: sd0)");
    eprintln!("  --block-size <BYTES>     Block size of --image (default: 4096)");
    eprintln!("  --create <BLOCKS>        Create and format --image if it does not exist");
    eprintln!("  -l, --log-level <LEVEL>  error, warn, info, debug, trace or off");
    eprintln!("  --max-hops <N>           Symbolic links followed per lookup (default: 40)");
    eprintln!("  --print-config           Print the effective configuration and exit");
    eprintln!("  -h, --help               Show this help message");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  {} --image sd0.img --block-size 512 --create 4096", program);
    eprintln!("  {} --config lxfs.json --log-level debug", program);
}
