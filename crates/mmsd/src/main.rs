// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! mmsd - MMS transaction daemon.
//!
//! This is the binary entry point for the daemon and its inspection tools.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod decode;
mod list;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mmsd_config::model::MmsdConfig;

/// mmsd - MMS transaction daemon.
#[derive(Parser, Debug)]
#[command(name = "mmsd", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the daemon.
    Serve {
        /// WAP-Push payloads to hand to the engine once it is running.
        #[arg(long = "push", value_name = "FILE")]
        pushes: Vec<PathBuf>,
    },
    /// Pretty-print an MMS PDU or WAP-Push payload.
    Decode {
        /// File holding the raw bytes.
        file: PathBuf,
    },
    /// Print the messages in the store.
    List {
        /// Only inbound or outbound messages.
        #[arg(long, value_parser = ["inbound", "outbound"])]
        direction: Option<String>,
        /// Only unread messages.
        #[arg(long)]
        unread: bool,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Decode { file }) => decode::run_decode(&file),
        Some(Commands::Serve { pushes }) => {
            let config = load_config(cli.config.as_deref());
            serve::run_serve(config, pushes).await
        }
        Some(Commands::List {
            direction,
            unread,
            json,
            plain,
        }) => {
            let config = load_config(cli.config.as_deref());
            let options = list::ListOptions {
                direction,
                unread,
                json,
                plain,
            };
            list::run_list(&config, &options).await
        }
        None => {
            println!("mmsd: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Loads and validates configuration, exiting with rendered diagnostics on error.
fn load_config(path: Option<&std::path::Path>) -> MmsdConfig {
    let loaded = match path {
        Some(path) => mmsd_config::load_and_validate_path(path),
        None => mmsd_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            mmsd_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}
