//! Enumerates the (variable, year, month) tasks of a batch and names their output files.

use std::ops::RangeInclusive;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Eq)]
/// One month of one variable, mapped to exactly one output file.
pub struct Task {
    pub variable: String,
    pub year: i32,
    pub month: u32,
    pub day_count: u32,
}

impl Task {
    pub fn new(variable: &str, year: i32, month: u32) -> Result<Self> {
        let day_count = days_in_month(year, month)
            .ok_or_else(|| anyhow!("Invalid month {} for year {}", month, year))?;

        Ok(Task {
            variable: variable.to_string(),
            year,
            month,
            day_count,
        })
    }

    /// Zero-padded days of the month, "01" up to the day count.
    pub fn days(&self) -> Vec<String> {
        (1..=self.day_count).map(|day| format!("{:02}", day)).collect()
    }
}

/// Number of days in the month, or `None` if the date is not representable.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };

    u32::try_from(next.signed_duration_since(first).num_days()).ok()
}

/// Variable-major, then year, then month.
pub fn generate_tasks(variables: &[String], years: RangeInclusive<i32>) -> Result<Vec<Task>> {
    let mut tasks = vec![];

    for variable in variables {
        for year in years.clone() {
            for month in 1..=12 {
                tasks.push(Task::new(variable, year, month)?);
            }
        }
    }

    Ok(tasks)
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Variable,
    Year,
    Month,
}

#[derive(Debug, Clone, PartialEq)]
/// Output file name template with `{variable}`, `{year}` and `{month}` placeholders.
/// `{month}` renders as two digits.
pub struct FileNameTemplate {
    segments: Vec<Segment>,
}

impl FileNameTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = vec![];
        let mut literal = String::new();
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            if c != '{' {
                literal.push(c);
                continue;
            }

            let mut name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                name.push(c);
            }
            if !closed {
                return Err(anyhow!("Unclosed placeholder in template `{}`", template));
            }

            let segment = match name.as_str() {
                "variable" => Segment::Variable,
                "year" => Segment::Year,
                "month" => Segment::Month,
                _ => {
                    return Err(anyhow!(
                        "Unknown placeholder `{{{}}}` in template `{}`",
                        name,
                        template
                    ))
                }
            };

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(segment);
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if segments.is_empty() {
            return Err(anyhow!("Output file name template is empty"));
        }

        Ok(FileNameTemplate { segments })
    }

    pub fn render(&self, task: &Task) -> String {
        let mut file_name = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => file_name.push_str(s),
                Segment::Variable => file_name.push_str(&task.variable),
                Segment::Year => file_name.push_str(&task.year.to_string()),
                Segment::Month => file_name.push_str(&format!("{:02}", task.month)),
            }
        }

        file_name
    }
}

// -- Tests -------------------------------------------------------------------
