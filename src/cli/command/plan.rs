use anyhow::Result;

use crate::{
    cli::ConfigArgs,
    task::{generate_tasks, FileNameTemplate},
};

/// Lists the output path and day count of every task, in download order.
pub fn plan(args: &ConfigArgs) -> Result<Vec<String>> {
    let config = args.resolve()?;
    let naming = FileNameTemplate::parse(&config.output_naming)?;
    let tasks = generate_tasks(&config.variables, config.years())?;

    let lines = tasks
        .iter()
        .map(|task| {
            let path = config.output_directory.join(naming.render(task));
            format!("{}\t{} days", path.display(), task.day_count)
        })
        .collect();

    Ok(lines)
}

/// Effective configuration after applying the file and flags.
pub fn show_config(args: &ConfigArgs) -> Result<String> {
    let config = args.resolve()?;

    Ok(toml::to_string_pretty(&config)?)
}

// -- Tests -------------------------------------------------------------------
