mod batch;
mod cds;
mod cli;
mod config;
mod download;
mod request;
mod task;

use std::process;

use anyhow::{Error, Result};
use clap::Parser;
use cli::{command, Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Download { config, run } => match command::download(config, run).await {
            Ok(report) => {
                println!("{}", report.summary());
                if !report.is_success() {
                    for (path, error) in report.failures() {
                        eprintln!("Failed `{}`: {}", path.display(), error);
                    }
                    process::exit(1);
                }
            }
            Err(e) => exit_with(e),
        },
        Commands::Plan { config } => match command::plan(config) {
            Ok(lines) => lines.iter().for_each(|line| println!("{}", line)),
            Err(e) => exit_with(e),
        },
        Commands::Request {
            config,
            target,
            year,
            month,
        } => match command::request(config, target, *year, *month) {
            Ok(json) => println!("{}", json),
            Err(e) => exit_with(e),
        },
        Commands::Config { config } => match command::show_config(config) {
            Ok(text) => print!("{}", text),
            Err(e) => exit_with(e),
        },
    }

    Ok(())
}

fn exit_with(e: Error) -> ! {
    eprintln!("Error: {:#}", e);
    process::exit(1)
}
