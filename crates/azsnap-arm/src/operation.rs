//! Long-running operation polling.
//!
//! ARM reports progress of an accepted PUT/DELETE in one of three ways, checked
//! in this order:
//!
//! 1. `Azure-AsyncOperation` header: poll the status monitor until its `status`
//!    is terminal.
//! 2. `Location` header: poll it while it answers 202.
//! 3. Neither header: the response body itself is the resource; if its
//!    `provisioningState` is not terminal, re-read the resource until it is.
//!    Only a DELETE treats the resource answering 404 as completion.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::credential::{TokenCredential, ARM_SCOPE};
use crate::error::{ensure_success, ArmError, ErrorDetail, Result};
use crate::models::Snapshot;

const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";

/// Handle to an accepted control-plane operation.
#[async_trait]
pub trait LongRunningOperation: Send {
    /// Resolves once the operation reaches a terminal state.
    async fn poll_until_done(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PollState {
    Done,
    /// Terminal state already reported by the initial response.
    Settled(String),
    AsyncOperation(Url),
    Location(Url),
    Resource(Url),
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

pub struct Operation {
    http: Client,
    method: Method,
    credential: Arc<dyn TokenCredential>,
    poll_interval: Duration,
    delay: Duration,
    state: PollState,
}

impl Operation {
    /// Builds the poller from the initial response to a `method` (PUT or DELETE)
    /// against `resource_url`.
    pub(crate) async fn from_response(
        http: Client,
        method: Method,
        credential: Arc<dyn TokenCredential>,
        poll_interval: Duration,
        resource_url: Url,
        response: Response,
    ) -> Result<Self> {
        let response = ensure_success(response).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let delay = retry_after(&headers).unwrap_or(poll_interval);

        let state = if let Some(url) = header_url(&headers, AZURE_ASYNC_OPERATION) {
            PollState::AsyncOperation(url)
        } else if let Some(url) = header_url(&headers, LOCATION.as_str()) {
            PollState::Location(url)
        } else if status == StatusCode::ACCEPTED {
            PollState::Resource(resource_url)
        } else {
            let body = response.bytes().await?;
            let snapshot = serde_json::from_slice::<Snapshot>(&body).ok();
            match snapshot.as_ref().and_then(|s| s.provisioning_state()) {
                Some(state) if !is_terminal(state) => PollState::Resource(resource_url),
                Some(state) => PollState::Settled(state.to_string()),
                None => PollState::Done,
            }
        };

        debug!(%method, ?state, %status, "long-running operation accepted");
        Ok(Self {
            http,
            method,
            credential,
            poll_interval,
            delay,
            state,
        })
    }

    pub fn is_done(&self) -> bool {
        self.state == PollState::Done
    }

    async fn advance(&self, url: &Url) -> Result<(PollState, Option<Duration>)> {
        let token = self.credential.get_token(&[ARM_SCOPE]).await?;
        let response = self
            .http
            .get(url.clone())
            .bearer_auth(token.token)
            .send()
            .await?;

        match &self.state {
            PollState::AsyncOperation(_) => {
                let response = ensure_success(response).await?;
                let delay = retry_after(response.headers());
                let status: OperationStatus = response.json().await?;
                debug!(status = %status.status, "operation status");
                if is_terminal(&status.status) {
                    terminal_result(&status.status, status.error)?;
                    Ok((PollState::Done, None))
                } else {
                    Ok((self.state.clone(), delay))
                }
            }
            PollState::Location(_) => {
                let response = ensure_success(response).await?;
                let delay = retry_after(response.headers());
                if response.status() == StatusCode::ACCEPTED {
                    Ok((self.state.clone(), delay))
                } else {
                    Ok((PollState::Done, None))
                }
            }
            PollState::Resource(_) => {
                if self.method == Method::DELETE && response.status() == StatusCode::NOT_FOUND {
                    return Ok((PollState::Done, None));
                }
                let response = ensure_success(response).await?;
                let delay = retry_after(response.headers());
                let snapshot: Snapshot = response.json().await?;
                match snapshot.provisioning_state() {
                    Some(state) if !is_terminal(state) => Ok((self.state.clone(), delay)),
                    Some(state) => {
                        terminal_result(state, None)?;
                        Ok((PollState::Done, None))
                    }
                    None => Ok((PollState::Done, None)),
                }
            }
            PollState::Done | PollState::Settled(_) => Ok((self.state.clone(), None)),
        }
    }
}

#[async_trait]
impl LongRunningOperation for Operation {
    async fn poll_until_done(&mut self) -> Result<()> {
        loop {
            let url = match &self.state {
                PollState::Done => return Ok(()),
                PollState::Settled(status) => {
                    let status = status.clone();
                    self.state = PollState::Done;
                    return terminal_result(&status, None);
                }
                PollState::AsyncOperation(url)
                | PollState::Location(url)
                | PollState::Resource(url) => url.clone(),
            };

            tokio::time::sleep(self.delay).await;
            let (state, delay) = self.advance(&url).await?;
            self.state = state;
            self.delay = delay.unwrap_or(self.poll_interval);
        }
    }
}

fn is_terminal(status: &str) -> bool {
    matches!(
        status.to_ascii_lowercase().as_str(),
        "succeeded" | "failed" | "canceled" | "cancelled"
    )
}

fn terminal_result(status: &str, error: Option<ErrorDetail>) -> Result<()> {
    if status.eq_ignore_ascii_case("succeeded") {
        return Ok(());
    }
    let message = error
        .map(|e| format!("{}: {}", e.code, e.message))
        .unwrap_or_else(|| "no error detail returned".to_string());
    Err(ArmError::OperationFailed {
        status: status.to_string(),
        message,
    })
}

fn header_url(headers: &HeaderMap, name: &str) -> Option<Url> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Url::parse(v).ok())
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
