//! Command line interface.

pub mod command;

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{BoundingBox, Config, ErrorPolicy};

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download every month of every variable
    Download {
        #[command(flatten)]
        config: ConfigArgs,
        #[command(flatten)]
        run: RunArgs,
    },
    /// List the files a download would produce
    Plan {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the request submitted for one month
    Request {
        #[command(flatten)]
        config: ConfigArgs,
        /// Variable name
        #[arg(value_name = "VARIABLE")]
        target: String,
        year: i32,
        month: u32,
    },
    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Variable to download, may be repeated
    #[arg(short, long = "variable")]
    pub variables: Vec<String>,
    /// First year, inclusive
    #[arg(long)]
    pub year_start: Option<i32>,
    /// Last year, inclusive
    #[arg(long)]
    pub year_end: Option<i32>,
    /// Bounding box as north,west,south,east
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub area: Option<Vec<f64>>,
    /// Directory the files are written to
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// File name template using {variable}, {year} and {month}
    #[arg(long)]
    pub naming: Option<String>,
    /// Archive dataset name
    #[arg(long)]
    pub dataset: Option<String>,
}

impl ConfigArgs {
    /// Defaults, then the config file, then flags.
    pub fn resolve(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if !self.variables.is_empty() {
            config.variables.clone_from(&self.variables);
        }
        if let Some(year) = self.year_start {
            config.year_start = year;
        }
        if let Some(year) = self.year_end {
            config.year_end = year;
        }
        if let Some(area) = &self.area {
            config.bounding_box = BoundingBox::from_slice(area)?;
        }
        if let Some(dir) = &self.output_dir {
            config.output_directory.clone_from(dir);
        }
        if let Some(naming) = &self.naming {
            config.output_naming.clone_from(naming);
        }
        if let Some(dataset) = &self.dataset {
            config.dataset.clone_from(dataset);
        }

        config.validate()?;

        Ok(config)
    }
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// What to do after a failed month
    #[arg(long, value_enum)]
    pub on_error: Option<ErrorPolicy>,
    /// Do not download files that already exist
    #[arg(long)]
    pub skip_existing: bool,
    /// Number of requests in flight
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,
    /// Retries for server and network errors
    #[arg(long)]
    pub max_retries: Option<u32>,
}

impl RunArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(policy) = self.on_error {
            config.on_error = policy;
        }
        if self.skip_existing {
            config.skip_existing = true;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
    }
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    let bar = ProgressBar::new(size).with_message(message);
    if let Ok(style) = ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}") {
        bar.set_style(style.progress_chars("##-"));
    }

    bar
}

// -- Tests -------------------------------------------------------------------
