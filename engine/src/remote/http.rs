//! HTTP remote client for the Oru sync relay.
//!
//! Speaks the relay's wire protocol: `POST /v1/sync/push` with a JSON
//! entry batch, `GET /v1/sync/pull` with cursor and limit. The bearer
//! token, when configured, is passed through opaquely. Any transport or
//! non-success response surfaces as `RemoteUnavailable`, which leaves the
//! sync engine's marks untouched and the call safe to retry.

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Remote, RemotePage};
use crate::error::{Error, Result};
use crate::op::OplogEntry;

/// Entries fetched per request; the client pages until the relay reports
/// no more.
const PAGE_LIMIT: usize = 500;

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    entries: &'a [OplogEntry],
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    accepted: usize,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    entries: Vec<OplogEntry>,
    cursor: String,
    has_more: bool,
}

pub struct HttpRemote {
    base: String,
    token: Option<String>,
    client: Client,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            client: Client::new(),
        }
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl Remote for HttpRemote {
    fn push(&mut self, entries: &[OplogEntry]) -> Result<()> {
        let url = format!("{}/v1/sync/push", self.base);
        let response = self
            .authorize(self.client.post(&url))
            .json(&PushRequest { entries })
            .send()
            .map_err(unavailable)?;
        let body: PushResponse = check_status(response)?.json().map_err(unavailable)?;
        debug!(sent = entries.len(), accepted = body.accepted, "pushed to relay");
        Ok(())
    }

    fn pull(&mut self, cursor: Option<&str>) -> Result<RemotePage> {
        let url = format!("{}/v1/sync/pull", self.base);
        let mut cursor = cursor.map(str::to_string);
        let mut entries = Vec::new();

        loop {
            let mut request = self
                .authorize(self.client.get(&url))
                .query(&[("limit", PAGE_LIMIT.to_string())]);
            if let Some(c) = &cursor {
                request = request.query(&[("cursor", c.clone())]);
            }
            let response = request.send().map_err(unavailable)?;
            let page: PullResponse = check_status(response)?.json().map_err(unavailable)?;

            if !page.entries.is_empty() {
                entries.extend(page.entries);
                cursor = Some(page.cursor);
            }
            if !page.has_more {
                break;
            }
        }

        debug!(count = entries.len(), "pulled from relay");
        // No new entries means the caller's cursor still stands.
        let cursor = if entries.is_empty() { None } else { cursor };
        Ok(RemotePage { entries, cursor })
    }
}

fn unavailable(err: reqwest::Error) -> Error {
    Error::RemoteUnavailable(err.to_string())
}

fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(Error::RemoteUnavailable(format!(
            "relay returned {}",
            response.status()
        )))
    }
}
