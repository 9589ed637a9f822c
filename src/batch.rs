//! Runs every task of a batch against the archive.
//!
//! Tasks run in enumeration order, `concurrency` at a time. Each task ends in a
//! [`TaskOutcome`]; under [`ErrorPolicy::Abort`] the first failure stops any further
//! task from starting, and everything after it is reported as not attempted.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use anyhow::{Context, Result};
use futures::{stream, StreamExt};
use indicatif::{MultiProgress, ProgressBar};

use crate::{
    cds::{Backoff, Retrieve, RetrieveError},
    cli::{create_progress_bar, create_spinner},
    config::{Config, ErrorPolicy},
    request::RequestDescriptor,
    task::{generate_tasks, FileNameTemplate, Task},
};

#[derive(Debug)]
pub enum TaskOutcome {
    Downloaded(PathBuf),
    /// Output already present and `skip_existing` is set.
    Skipped(PathBuf),
    Failed { path: PathBuf, error: RetrieveError },
    NotAttempted(PathBuf),
}

impl TaskOutcome {
    pub fn path(&self) -> &Path {
        match self {
            TaskOutcome::Downloaded(path)
            | TaskOutcome::Skipped(path)
            | TaskOutcome::NotAttempted(path)
            | TaskOutcome::Failed { path, .. } => path,
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub entries: Vec<(Task, TaskOutcome)>,
}

impl BatchReport {
    pub fn downloaded(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Downloaded(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Failed { .. }))
    }

    pub fn not_attempted(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::NotAttempted(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.not_attempted() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &RetrieveError)> {
        self.entries.iter().filter_map(|(_, outcome)| match outcome {
            TaskOutcome::Failed { error, .. } => Some((outcome.path(), error)),
            _ => None,
        })
    }

    pub fn summary(&self) -> String {
        format!(
            "{} downloaded, {} skipped, {} failed, {} not attempted",
            self.downloaded(),
            self.skipped(),
            self.failed(),
            self.not_attempted()
        )
    }

    fn count(&self, predicate: impl Fn(&TaskOutcome) -> bool) -> usize {
        self.entries.iter().filter(|(_, o)| predicate(o)).count()
    }
}

/// Downloads every task described by `config`, writing one notice line per task to `out`.
pub async fn run<R: Retrieve, W: Write>(
    config: &Config,
    retriever: &R,
    progress: &MultiProgress,
    out: &mut W,
) -> Result<BatchReport> {
    config.validate()?;
    let naming = FileNameTemplate::parse(&config.output_naming)?;
    let tasks = generate_tasks(&config.variables, config.years())?;

    fs::create_dir_all(&config.output_directory).with_context(|| {
        format!(
            "Failed to create output directory `{}`",
            config.output_directory.display()
        )
    })?;

    let bar = progress.add(create_progress_bar(
        tasks.len() as u64,
        "Downloading...".to_string(),
    ));
    let aborted = AtomicBool::new(false);
    let out = Mutex::new(out);

    let outcomes: Vec<TaskOutcome> = stream::iter(tasks.iter())
        .map(|task| {
            let path = config.output_directory.join(naming.render(task));
            let console = Console {
                progress,
                out: &out,
            };
            run_task(task, path, config, retriever, console, &bar, &aborted)
        })
        .buffered(config.concurrency)
        .collect()
        .await;

    let report = BatchReport {
        entries: tasks.into_iter().zip(outcomes).collect(),
    };
    bar.finish_with_message(report.summary());

    Ok(report)
}

/// Notice lines go to `out` above the progress bars, and still appear when the bars are hidden.
struct Console<'a, W: Write> {
    progress: &'a MultiProgress,
    out: &'a Mutex<W>,
}

impl<W: Write> Console<'_, W> {
    fn notice(&self, line: String) {
        self.progress.suspend(|| {
            if let Ok(mut out) = self.out.lock() {
                let _ = writeln!(out, "{}", line);
                let _ = out.flush();
            }
        });
    }
}

async fn run_task<R: Retrieve, W: Write>(
    task: &Task,
    path: PathBuf,
    config: &Config,
    retriever: &R,
    console: Console<'_, W>,
    bar: &ProgressBar,
    aborted: &AtomicBool,
) -> TaskOutcome {
    if aborted.load(Ordering::SeqCst) {
        return TaskOutcome::NotAttempted(path);
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    if config.skip_existing && path.exists() {
        console.notice(format!("Skipping: {}", file_name));
        bar.inc(1);
        return TaskOutcome::Skipped(path);
    }

    console.notice(format!("Downloading: {}", file_name));

    let progress = console.progress;
    let job_bar = progress.add(create_spinner(file_name.clone()));
    let result = fetch_with_retries(task, &path, config, retriever, &job_bar).await;
    job_bar.finish_and_clear();
    progress.remove(&job_bar);
    bar.inc(1);

    match result {
        Ok(_) => TaskOutcome::Downloaded(path),
        Err(error) => {
            console.notice(format!("Failed: {} ({})", file_name, error));
            if config.on_error == ErrorPolicy::Abort {
                aborted.store(true, Ordering::SeqCst);
            }
            TaskOutcome::Failed { path, error }
        }
    }
}

async fn fetch_with_retries<R: Retrieve>(
    task: &Task,
    path: &Path,
    config: &Config,
    retriever: &R,
    job_bar: &ProgressBar,
) -> Result<u64, RetrieveError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let request = RequestDescriptor::for_task(task, &config.bounding_box);
    let mut backoff = Backoff::new(config.poll_interval(), config.poll_interval_max());
    let mut attempt = 0;

    loop {
        match retriever
            .fetch(&config.dataset, &request, path, job_bar)
            .await
        {
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                attempt += 1;
                job_bar.set_message(format!(
                    "retry {}/{} after: {}",
                    attempt, config.max_retries, e
                ));
                tokio::time::sleep(backoff.next_delay()).await;
            }
            result => return result,
        }
    }
}

// -- Tests -------------------------------------------------------------------
