use std::io;

use anyhow::Result;
use indicatif::MultiProgress;

use crate::{
    batch::{self, BatchReport},
    cds::{Client, Credentials},
    cli::{ConfigArgs, RunArgs},
};

pub async fn download(args: &ConfigArgs, run: &RunArgs) -> Result<BatchReport> {
    let mut config = args.resolve()?;
    run.apply(&mut config);
    config.validate()?;

    let credentials = Credentials::from_environment()?;
    let client = Client::new(credentials)?
        .with_polling(config.poll_interval(), config.poll_interval_max());

    println!(
        "Requesting {} variable(s), {} to {}, into `{}`",
        config.variables.len(),
        config.year_start,
        config.year_end,
        config.output_directory.display()
    );

    let progress = MultiProgress::new();
    batch::run(&config, &client, &progress, &mut io::stdout()).await
}
