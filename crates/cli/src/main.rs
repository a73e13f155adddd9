//! lunab: run Lua scripts through lunabridge
//!
//! Loads configuration, preloads any module bundles, then runs either an
//! inline chunk (`-e`) or a script file, and optionally calls a global
//! function afterwards.
//!
//! Exit status is 0 when every step succeeded and 1 otherwise.

use clap::Parser as ClapParser;
use lunabridge::{Bridge, BridgeConfig};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(ClapParser)]
#[command(name = "lunab")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run Lua scripts and module bundles through lunabridge", long_about = None)]
struct Cli {
    /// Bridge configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Add a directory to the module search path
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    include: Vec<PathBuf>,

    /// Preload the chunks of a zip bundle before running
    #[arg(long = "bundle", value_name = "ZIP")]
    bundles: Vec<String>,

    /// Run this chunk instead of a script file
    #[arg(short = 'e', long = "execute", value_name = "CODE", conflicts_with = "script")]
    execute: Option<String>,

    /// Script file to run
    script: Option<String>,

    /// Global function to call after the script has run
    #[arg(long, value_name = "NAME")]
    call: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lunabridge=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => match BridgeConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        None => BridgeConfig::default(),
    };
    let config = cli
        .include
        .iter()
        .fold(config.with_env_overrides(), |config, dir| {
            config.with_search_path(dir)
        });

    let bridge = match Bridge::create_with(config) {
        Ok(bridge) => bridge,
        Err(e) => {
            eprintln!("Error: failed to initialize Lua engine: {}", e);
            process::exit(1);
        }
    };

    let ok = run(&bridge, &cli);
    bridge.close();
    if !ok {
        process::exit(1);
    }
}

fn run(bridge: &Bridge, cli: &Cli) -> bool {
    for bundle in &cli.bundles {
        if !bridge.load_chunks_from_zip(bundle) {
            error!("bundle {} could not be loaded", bundle);
            return false;
        }
    }

    let status = match (&cli.execute, &cli.script) {
        (Some(code), _) => bridge.execute_string(code),
        (None, Some(script)) => bridge.execute_script_file(script),
        (None, None) => 1,
    };
    if status == 0 {
        return false;
    }

    if let Some(name) = &cli.call {
        let result = bridge.execute_global_function(name);
        info!("{} returned {}", name, result);
        println!("{}", result);
    }
    true
}
