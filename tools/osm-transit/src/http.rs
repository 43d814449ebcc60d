use crate::error::{Result, TransitError};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Build a blocking client with a fixed user agent and request timeout
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Check the status and decode the JSON body of a response
pub fn read_json<T: DeserializeOwned>(response: Response, context: &'static str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(TransitError::Status {
            url: response.url().to_string(),
            status,
        });
    }

    let body = response.text()?;
    log::debug!("  {} response: {} bytes", context, body.len());

    serde_json::from_str(&body).map_err(|source| TransitError::MalformedResponse { context, source })
}

/// Spinner shown while a blocking request is in flight
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg} [{elapsed}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.into());
    pb.tick();
    pb
}
