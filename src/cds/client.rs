//! Job submission and polling.
//!
//! A retrieval is a job on the archive side: the request is posted to the dataset's
//! `execution` endpoint, the job is polled until it settles, and the result asset is then
//! downloaded from the URL listed in the job's results.

use std::{path::Path, time::Duration};

use indicatif::ProgressBar;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::{Backoff, Credentials, Retrieve, RetrieveError};
use crate::{download::download_with_progress, request::RequestDescriptor};

const TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const USER_AGENT: &str = concat!("era5-soil/", env!("CARGO_PKG_VERSION"));
/// Further polls allowed once a job reports a status outside [`JobState`].
const UNRECOGNISED_POLL_LIMIT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Accepted,
    Running,
    Successful,
    Failed,
    Rejected,
    Dismissed,
    Unknown,
}

impl JobState {
    pub fn parse(status: &str) -> Self {
        match status {
            "accepted" => JobState::Accepted,
            "running" => JobState::Running,
            "successful" => JobState::Successful,
            "failed" => JobState::Failed,
            "rejected" => JobState::Rejected,
            "dismissed" => JobState::Dismissed,
            _ => JobState::Unknown,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    #[serde(rename = "jobID")]
    job_id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct JobResults {
    asset: Asset,
}

#[derive(Debug, Deserialize)]
struct Asset {
    value: AssetValue,
}

#[derive(Debug, Deserialize)]
struct AssetValue {
    href: String,
    #[serde(rename = "file:size")]
    size: Option<u64>,
}

#[derive(Serialize)]
struct Execution<'a> {
    inputs: &'a RequestDescriptor,
}

pub struct Client {
    http: reqwest::Client,
    credentials: Credentials,
    poll_interval: Duration,
    poll_interval_max: Duration,
}

/// A finished job whose result is ready to download.
pub struct Remote<'a> {
    client: &'a Client,
    pub job_id: String,
    pub href: String,
    pub size: Option<u64>,
}

impl Client {
    pub fn new(credentials: Credentials) -> Result<Self, RetrieveError> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Client {
            http,
            credentials,
            poll_interval: Duration::from_secs(1),
            poll_interval_max: Duration::from_secs(120),
        })
    }

    pub fn with_polling(mut self, initial: Duration, max: Duration) -> Self {
        self.poll_interval = initial;
        self.poll_interval_max = max;
        self
    }

    /// Submits the request and blocks until the archive has finished the job.
    pub async fn retrieve(
        &self,
        dataset: &str,
        request: &RequestDescriptor,
        progress: &ProgressBar,
    ) -> Result<Remote<'_>, RetrieveError> {
        let url = format!(
            "{}/retrieve/v1/processes/{}/execution",
            self.credentials.url, dataset
        );
        let response = self
            .http
            .post(&url)
            .header(TOKEN_HEADER, &self.credentials.key)
            .json(&Execution { inputs: request })
            .send()
            .await?;
        let mut job: JobStatus = check(response).await?.json().await?;

        let mut backoff = Backoff::new(self.poll_interval, self.poll_interval_max);
        let mut unrecognised = 0;
        loop {
            match JobState::parse(&job.status) {
                JobState::Successful => break,
                JobState::Rejected => {
                    let message = self.job_error(&job.job_id).await;
                    return Err(RetrieveError::InvalidRequest(message));
                }
                JobState::Failed | JobState::Dismissed => {
                    let message = self.job_error(&job.job_id).await;
                    return Err(RetrieveError::Processing {
                        job_id: job.job_id,
                        message,
                    });
                }
                JobState::Unknown if unrecognised >= UNRECOGNISED_POLL_LIMIT => {
                    return Err(RetrieveError::Protocol(format!(
                        "job {} reports unrecognised status `{}`",
                        job.job_id, job.status
                    )));
                }
                state => {
                    if state == JobState::Unknown {
                        unrecognised += 1;
                    } else {
                        unrecognised = 0;
                    }
                    progress.set_message(format!("{} ({})", job.job_id, job.status));
                    tokio::time::sleep(backoff.next_delay()).await;
                    job = self.get(&self.job_url(&job.job_id)).await?.json().await?;
                }
            }
        }

        let results: JobResults = self
            .get(&format!("{}/results", self.job_url(&job.job_id)))
            .await?
            .json()
            .await?;

        let href = Url::parse(&self.credentials.url)
            .and_then(|base| base.join(&results.asset.value.href))
            .map_err(|e| RetrieveError::Protocol(format!("invalid result location: {}", e)))?;

        Ok(Remote {
            client: self,
            job_id: job.job_id,
            href: href.to_string(),
            size: results.asset.value.size,
        })
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/retrieve/v1/jobs/{}", self.credentials.url, job_id)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, RetrieveError> {
        let response = self
            .http
            .get(url)
            .header(TOKEN_HEADER, &self.credentials.key)
            .send()
            .await?;

        check(response).await
    }

    // The results endpoint of a failed job returns the error document
    async fn job_error(&self, job_id: &str) -> String {
        let url = format!("{}/results", self.job_url(job_id));
        let response = self
            .http
            .get(&url)
            .header(TOKEN_HEADER, &self.credentials.key)
            .send()
            .await;

        match response {
            Ok(response) => super::error::error_message(&response.text().await.unwrap_or_default()),
            Err(e) => e.to_string(),
        }
    }
}

impl Remote<'_> {
    pub async fn download(&self, path: &Path, progress: &ProgressBar) -> Result<u64, RetrieveError> {
        progress.set_message(format!("{} (downloading)", self.job_id));
        download_with_progress(&self.client.http, &self.href, path, self.size, progress).await
    }
}

impl Retrieve for Client {
    async fn fetch(
        &self,
        dataset: &str,
        request: &RequestDescriptor,
        target: &Path,
        progress: &ProgressBar,
    ) -> Result<u64, RetrieveError> {
        let remote = self.retrieve(dataset, request, progress).await?;
        remote.download(target, progress).await
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, RetrieveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(RetrieveError::from_status(status.as_u16(), &body))
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use std::{
        net::SocketAddr,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };

    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    use super::*;
    use crate::{config::BoundingBox, task::Task};

    const PAYLOAD: &[u8] = b"CDF\x01netcdf";

    #[derive(Clone, Default)]
    struct Archive {
        fail: bool,
        stuck_status: Option<&'static str>,
        polls: Arc<AtomicUsize>,
        submitted: Arc<Mutex<Option<Value>>>,
    }

    async fn submit(
        State(archive): State<Archive>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Response {
        let token = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok());
        if token != Some("secret") {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"title": "Authentication failed", "detail": "invalid token"})),
            )
                .into_response();
        }

        *archive.submitted.lock().unwrap() = Some(body);
        Json(json!({"jobID": "job-1", "status": "accepted"})).into_response()
    }

    async fn status(State(archive): State<Archive>) -> Json<Value> {
        let polls = archive.polls.fetch_add(1, Ordering::SeqCst);
        let status = match (archive.stuck_status, archive.fail, polls) {
            (Some(status), _, _) => status,
            (None, true, _) => "failed",
            (None, false, 0) => "running",
            (None, false, _) => "successful",
        };

        Json(json!({"jobID": "job-1", "status": status}))
    }

    async fn results(State(archive): State<Archive>) -> Response {
        if archive.fail {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"title": "The job has failed", "detail": "MARS returned no data"})),
            )
                .into_response();
        }

        Json(json!({"asset": {"value": {"href": "/files/result.nc", "file:size": PAYLOAD.len()}}}))
            .into_response()
    }

    async fn start_archive(archive: Archive) -> SocketAddr {
        let app = Router::new()
            .route(
                "/api/retrieve/v1/processes/reanalysis-era5-land/execution",
                post(submit),
            )
            .route("/api/retrieve/v1/jobs/job-1", get(status))
            .route("/api/retrieve/v1/jobs/job-1/results", get(results))
            .route("/files/result.nc", get(|| async { PAYLOAD.to_vec() }))
            .with_state(archive);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        addr
    }

    fn client(addr: SocketAddr, key: &str) -> Client {
        let credentials = Credentials {
            url: format!("http://{}/api", addr),
            key: key.to_string(),
        };
        Client::new(credentials)
            .unwrap()
            .with_polling(Duration::ZERO, Duration::ZERO)
    }

    fn request() -> RequestDescriptor {
        let task = Task::new("volumetric_soil_water_layer_3", 2018, 1).unwrap();
        RequestDescriptor::for_task(&task, &BoundingBox::default())
    }

    #[tokio::test]
    async fn should_submit_poll_and_download() {
        let archive = Archive::default();
        let addr = start_archive(archive.clone()).await;
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("volumetric_soil_water_layer_3_hourly_01_2018.nc");

        let size = client(addr, "secret")
            .fetch("reanalysis-era5-land", &request(), &target, &ProgressBar::hidden())
            .await
            .unwrap();

        assert_eq!(size, PAYLOAD.len() as u64);
        assert_eq!(std::fs::read(&target).unwrap(), PAYLOAD);
        assert_eq!(archive.polls.load(Ordering::SeqCst), 2);

        let submitted = archive.submitted.lock().unwrap().clone().unwrap();
        assert_eq!(submitted["inputs"]["month"], json!("01"));
        assert_eq!(submitted["inputs"]["day"].as_array().unwrap().len(), 31);
        assert_eq!(submitted["inputs"]["data_format"], json!("netcdf"));
    }

    #[tokio::test]
    async fn should_resolve_result_location() {
        let addr = start_archive(Archive::default()).await;
        let client = client(addr, "secret");

        let remote = client
            .retrieve("reanalysis-era5-land", &request(), &ProgressBar::hidden())
            .await
            .unwrap();

        assert_eq!(remote.job_id, "job-1");
        assert_eq!(remote.href, format!("http://{}/files/result.nc", addr));
        assert_eq!(remote.size, Some(PAYLOAD.len() as u64));
    }

    #[tokio::test]
    async fn should_report_authentication_failure() {
        let addr = start_archive(Archive::default()).await;
        let dir = TempDir::new().unwrap();

        let result = client(addr, "wrong")
            .fetch(
                "reanalysis-era5-land",
                &request(),
                &dir.path().join("out.nc"),
                &ProgressBar::hidden(),
            )
            .await;

        match result {
            Err(RetrieveError::Authentication(message)) => {
                assert_eq!(message, "Authentication failed: invalid token")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn should_report_failed_job() {
        let archive = Archive {
            fail: true,
            ..Archive::default()
        };
        let addr = start_archive(archive).await;
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.nc");

        let result = client(addr, "secret")
            .fetch("reanalysis-era5-land", &request(), &target, &ProgressBar::hidden())
            .await;

        match result {
            Err(RetrieveError::Processing { job_id, message }) => {
                assert_eq!(job_id, "job-1");
                assert_eq!(message, "The job has failed: MARS returned no data");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn should_reject_unknown_dataset() {
        let addr = start_archive(Archive::default()).await;

        let client = client(addr, "secret");
        let result = client
            .retrieve("reanalysis-era5-single-levels", &request(), &ProgressBar::hidden())
            .await;

        assert!(matches!(result, Err(RetrieveError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn should_give_up_on_unrecognised_status() {
        let archive = Archive {
            stuck_status: Some("paused"),
            ..Archive::default()
        };
        let addr = start_archive(archive.clone()).await;

        let client = client(addr, "secret");
        let result = client
            .retrieve("reanalysis-era5-land", &request(), &ProgressBar::hidden())
            .await;

        match result {
            Err(RetrieveError::Protocol(message)) => {
                assert_eq!(message, "job job-1 reports unrecognised status `paused`")
            }
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("expected an error"),
        }
        assert_eq!(
            archive.polls.load(Ordering::SeqCst),
            UNRECOGNISED_POLL_LIMIT as usize + 1
        );
    }

    #[test]
    fn should_parse_job_states() {
        assert_eq!(JobState::parse("accepted"), JobState::Accepted);
        assert_eq!(JobState::parse("successful"), JobState::Successful);
        assert_eq!(JobState::parse("dismissed"), JobState::Dismissed);
        assert_eq!(JobState::parse("paused"), JobState::Unknown);
    }
}
