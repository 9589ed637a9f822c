//! Batch configuration.
//!
//! Defaults reproduce the soil water download for the Girona area: layers 3 and 4 of
//! ERA5-Land, 2018 to 2023. A TOML file can override any field, and command line flags
//! override the file.

use std::{
    fs,
    ops::RangeInclusive,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::task::FileNameTemplate;

pub const DEFAULT_DATASET: &str = "reanalysis-era5-land";
pub const DEFAULT_NAMING: &str = "{variable}_hourly_{month}_{year}.nc";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub dataset: String,
    pub variables: Vec<String>,
    pub year_start: i32,
    pub year_end: i32,
    pub output_directory: PathBuf,
    pub output_naming: String,
    pub on_error: ErrorPolicy,
    pub skip_existing: bool,
    pub concurrency: usize,
    pub max_retries: u32,
    pub poll_interval_secs: u64,
    pub poll_interval_max_secs: u64,
    pub bounding_box: BoundingBox,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dataset: DEFAULT_DATASET.to_string(),
            variables: vec![
                "volumetric_soil_water_layer_3".to_string(),
                "volumetric_soil_water_layer_4".to_string(),
            ],
            year_start: 2018,
            year_end: 2023,
            output_directory: PathBuf::from("."),
            output_naming: DEFAULT_NAMING.to_string(),
            on_error: ErrorPolicy::Abort,
            skip_existing: false,
            concurrency: 1,
            max_retries: 0,
            poll_interval_secs: 1,
            poll_interval_max_secs: 120,
            bounding_box: BoundingBox::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config `{}`", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config `{}`", path.display()))?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dataset.trim().is_empty() {
            return Err(anyhow!("No dataset configured"));
        }
        if self.variables.is_empty() {
            return Err(anyhow!("No variables configured"));
        }
        if let Some(blank) = self.variables.iter().find(|v| v.trim().is_empty()) {
            return Err(anyhow!("Invalid variable name `{}`", blank));
        }
        if self.year_start > self.year_end {
            return Err(anyhow!(
                "year_start ({}) is after year_end ({})",
                self.year_start,
                self.year_end
            ));
        }
        if self.concurrency == 0 {
            return Err(anyhow!("concurrency must be at least 1"));
        }
        FileNameTemplate::parse(&self.output_naming)?;

        Ok(())
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        self.year_start..=self.year_end
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_interval_max(&self) -> Duration {
        Duration::from_secs(self.poll_interval_max_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
/// Geographic extent of a request, in degrees.
pub struct BoundingBox {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        BoundingBox {
            north: 41.5,
            west: 2.0,
            south: 42.5,
            east: 3.0,
        }
    }
}

impl BoundingBox {
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        match values {
            [north, west, south, east] => Ok(BoundingBox {
                north: *north,
                west: *west,
                south: *south,
                east: *east,
            }),
            _ => Err(anyhow!(
                "Bounding box needs 4 values (north,west,south,east), got {}",
                values.len()
            )),
        }
    }

    /// Order expected by the archive's `area` key.
    pub fn as_area(&self) -> [f64; 4] {
        [self.north, self.west, self.south, self.east]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
/// What the batch does after a task fails.
pub enum ErrorPolicy {
    /// Stop at the failing task
    #[default]
    Abort,
    /// Attempt every remaining task
    Continue,
}

// -- Tests -------------------------------------------------------------------
