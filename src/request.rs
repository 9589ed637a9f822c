//! Request payload submitted to the archive for one task.

use serde::Serialize;

use crate::{config::BoundingBox, task::Task};

pub const DATA_FORMAT: &str = "netcdf";
pub const DOWNLOAD_FORMAT: &str = "unarchived";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestDescriptor {
    pub variable: Vec<String>,
    pub year: String,
    pub month: String,
    pub day: Vec<String>,
    pub time: Vec<String>,
    pub data_format: String,
    pub download_format: String,
    /// North, west, south, east.
    pub area: [f64; 4],
}

impl RequestDescriptor {
    pub fn for_task(task: &Task, area: &BoundingBox) -> Self {
        RequestDescriptor {
            variable: vec![task.variable.clone()],
            year: task.year.to_string(),
            month: format!("{:02}", task.month),
            day: task.days(),
            time: hourly_times(),
            data_format: DATA_FORMAT.to_string(),
            download_format: DOWNLOAD_FORMAT.to_string(),
            area: area.as_area(),
        }
    }
}

/// "00:00" through "23:00".
pub fn hourly_times() -> Vec<String> {
    (0..24).map(|hour| format!("{:02}:00", hour)).collect()
}

// -- Tests -------------------------------------------------------------------
