//! HTTP probe implementations.

use std::time::{Duration, Instant};

use reqwest::{Client, Url};

use super::{AppCheck, ProbeError};

fn map_request_error(e: reqwest::Error, timeout: Duration) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout(timeout)
    } else {
        ProbeError::Network(e.to_string())
    }
}

/// Run a plain HTTP probe. Any 2xx or 3xx status counts as up.
///
/// Returns the time to receive the full response.
pub async fn run_http_probe(client: &Client, url: &Url, timeout: Duration) -> Result<Duration, ProbeError> {
    let start = Instant::now();

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| map_request_error(e, timeout))?;
    let status = response.status();

    // Read the full body to measure complete transfer time
    let _body = response
        .bytes()
        .await
        .map_err(|e| map_request_error(e, timeout))?;

    if !(status.is_success() || status.is_redirection()) {
        return Err(ProbeError::Status(status.as_u16()));
    }

    Ok(start.elapsed())
}

/// Run an application health probe and validate its response.
pub async fn run_app_probe(
    client: &Client,
    url: &Url,
    check: &AppCheck,
    timeout: Duration,
) -> Result<Duration, ProbeError> {
    let start = Instant::now();

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| map_request_error(e, timeout))?;
    let status = response.status().as_u16();

    let body = response
        .text()
        .await
        .map_err(|e| map_request_error(e, timeout))?;
    let elapsed = start.elapsed();

    if !check.accepts(status) {
        return Err(ProbeError::Protocol(format!(
            "{} health endpoint {} returned HTTP {}",
            check.app,
            url.path(),
            status
        )));
    }

    // Only a successful answer carries a meaningful body
    if (200..300).contains(&status) {
        check.validate_body(&body).map_err(|marker| {
            ProbeError::Protocol(format!(
                "{} health response missing {:?}: {}",
                check.app,
                marker,
                body.chars().take(120).collect::<String>()
            ))
        })?;
    }

    Ok(elapsed)
}
