//! Client for the Climate Data Store retrieve API.

pub mod client;
pub mod credentials;
pub mod error;

use std::{path::Path, time::Duration};

use indicatif::ProgressBar;

use crate::request::RequestDescriptor;

pub use client::Client;
pub use credentials::Credentials;
pub use error::RetrieveError;

/// Submits a request, waits for the archive to produce it and saves the result.
pub trait Retrieve {
    /// Returns the number of bytes written to `target`.
    async fn fetch(
        &self,
        dataset: &str,
        request: &RequestDescriptor,
        target: &Path,
        progress: &ProgressBar,
    ) -> Result<u64, RetrieveError>;
}

#[derive(Debug, Clone)]
/// Delay that grows by half on every step, up to a cap.
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Backoff {
            next: initial.min(max),
            max,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.mul_f64(1.5).min(self.max);

        delay
    }
}

// -- Tests -------------------------------------------------------------------
