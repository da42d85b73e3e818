use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::from_str;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} failed: {status} {body}")]
    Status {
        method: &'static str,
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("{method} {url} decode failed: {reason} | {body}")]
    Decode {
        method: &'static str,
        url: String,
        reason: String,
        body: String,
    },

    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
}

impl HttpError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, HttpError::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

/// Blocking JSON client shared by the embedding, index and chat backends.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    bearer: Option<String>,
}

impl HttpClient {
    pub fn new(timeout: Duration, bearer: Option<String>) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HttpError::Build)?;
        Ok(Self { client, bearer })
    }

    pub fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, HttpError> {
        self.send("GET", url, self.client.get(url))
    }

    pub fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, HttpError> {
        let req = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        self.send("POST", url, req)
    }

    pub fn put_json<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, HttpError> {
        let req = self
            .client
            .put(url)
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        self.send("PUT", url, req)
    }

    fn send<T: DeserializeOwned>(
        &self,
        method: &'static str,
        url: &str,
        mut req: RequestBuilder,
    ) -> Result<T, HttpError> {
        if let Some(token) = &self.bearer {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        debug!(method, url, "sending request");
        let resp = req.send().map_err(|source| HttpError::Transport {
            method,
            url: url.to_string(),
            source,
        })?;
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        if !status.is_success() {
            return Err(HttpError::Status {
                method,
                url: url.to_string(),
                status,
                body: text,
            });
        }
        from_str::<T>(&text).map_err(|e| HttpError::Decode {
            method,
            url: url.to_string(),
            reason: e.to_string(),
            body: text,
        })
    }
}
