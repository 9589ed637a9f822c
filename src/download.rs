//! Streams a finished result file to disk.

use std::{io::Write, path::Path};

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tempfile::NamedTempFile;

use crate::cds::RetrieveError;

/// Downloads `url` to `file_path` with a byte progress bar when the size is known.
///
/// Content is written to a temporary file next to the target and renamed into place
/// once complete, so an interrupted download never leaves a truncated file behind.
pub async fn download_with_progress(
    http: &reqwest::Client,
    url: &str,
    file_path: &Path,
    expected_size: Option<u64>,
    progress_bar: &ProgressBar,
) -> Result<u64, RetrieveError> {
    let response = http.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RetrieveError::from_status(status.as_u16(), &body));
    }

    // Convert spinner to progress bar if we have size info
    let total_size = response.content_length().or(expected_size).unwrap_or(0);
    if total_size > 0 {
        progress_bar.set_length(total_size);
        progress_bar.set_position(0);
        if let Ok(style) = ProgressStyle::with_template(
            "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {eta}",
        ) {
            progress_bar.set_style(style.progress_chars("=> "));
        }
    }

    let mut file = NamedTempFile::new_in(parent_dir(file_path))?;
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        progress_bar.set_position(downloaded);
    }

    file.flush()?;
    file.persist(file_path).map_err(|e| e.error)?;

    Ok(downloaded)
}

fn parent_dir(file_path: &Path) -> &Path {
    match file_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use std::net::SocketAddr;

    use axum::{http::StatusCode, routing::get, Router};
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    use super::*;

    async fn start_server() -> SocketAddr {
        let app = Router::new()
            .route("/data.nc", get(|| async { vec![7u8; 4096] }))
            .route(
                "/missing.nc",
                get(|| async { (StatusCode::NOT_FOUND, "gone") }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        addr
    }

    #[tokio::test]
    async fn should_stream_file_to_disk() {
        let addr = start_server().await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.nc");
        let bar = ProgressBar::hidden();

        let size = download_with_progress(
            &reqwest::Client::new(),
            &format!("http://{}/data.nc", addr),
            &path,
            Some(4096),
            &bar,
        )
        .await
        .unwrap();

        assert_eq!(size, 4096);
        assert_eq!(std::fs::read(&path).unwrap(), vec![7u8; 4096]);
        assert_eq!(bar.position(), 4096);
        assert_eq!(bar.length(), Some(4096));
    }

    #[tokio::test]
    async fn should_leave_nothing_behind_on_error() {
        let addr = start_server().await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.nc");

        let result = download_with_progress(
            &reqwest::Client::new(),
            &format!("http://{}/missing.nc", addr),
            &path,
            None,
            &ProgressBar::hidden(),
        )
        .await;

        assert!(matches!(result, Err(RetrieveError::InvalidRequest(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn should_use_current_dir_for_bare_file_name() {
        assert_eq!(parent_dir(Path::new("out.nc")), Path::new("."));
        assert_eq!(parent_dir(Path::new("data/out.nc")), Path::new("data"));
    }
}
