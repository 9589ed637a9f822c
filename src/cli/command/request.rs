use anyhow::Result;

use crate::{cli::ConfigArgs, request::RequestDescriptor, task::Task};

/// Returns the JSON request for one month of one variable.
pub fn request(args: &ConfigArgs, variable: &str, year: i32, month: u32) -> Result<String> {
    let config = args.resolve()?;
    let task = Task::new(variable, year, month)?;
    let descriptor = RequestDescriptor::for_task(&task, &config.bounding_box);

    Ok(serde_json::to_string_pretty(&descriptor)?)
}

// -- Tests -------------------------------------------------------------------
