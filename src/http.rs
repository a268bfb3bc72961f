use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::USER_AGENT;
use tokio::io::{AsyncWrite, AsyncWriteExt as _};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

use crate::error::FetchError;

const USER_AGENT_VALUE: &str = concat!("serialarchive/", env!("CARGO_PKG_VERSION"));

/// Bounded HTTP pool shared by discovery and the resource cache.
///
/// A permit is held for the whole exchange, body included, so `concurrency`
/// caps the number of open downloads rather than just the number of requests.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

/// A successful response together with the pool permit it occupies.
#[derive(Debug)]
pub struct Download {
    url: String,
    response: reqwest::Response,
    _permit: OwnedSemaphorePermit,
}

impl HttpFetcher {
    pub fn new(concurrency: usize, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build http client")?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        })
    }

    /// Issues a GET and checks the status. Every failure is transient.
    pub async fn get(&self, url: &str) -> Result<Download, FetchError> {
        let parsed = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_owned(),
            source,
        })?;

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .expect("http fetcher semaphore is closed");

        tracing::debug!(%url, "GET");
        let response = self
            .client
            .get(parsed)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(url, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status,
            });
        }

        Ok(Download {
            url: url.to_owned(),
            response,
            _permit: permit,
        })
    }
}

impl Download {
    /// Streams the body into `sink`, returning the number of bytes written.
    pub async fn copy_to<W>(&mut self, sink: &mut W) -> Result<u64, CopyError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut written = 0_u64;
        while let Some(chunk) = self
            .response
            .chunk()
            .await
            .map_err(|err| CopyError::Fetch(FetchError::from_reqwest(&self.url, err)))?
        {
            sink.write_all(&chunk).await.map_err(CopyError::Write)?;
            written += chunk.len() as u64;
        }
        sink.flush().await.map_err(CopyError::Write)?;
        Ok(written)
    }

    pub async fn text(self) -> Result<String, FetchError> {
        let url = self.url;
        self.response
            .text()
            .await
            .map_err(|err| FetchError::from_reqwest(&url, err))
    }
}

/// Why a body copy stopped: the remote side (transient) or the sink (fatal).
#[derive(Debug)]
pub enum CopyError {
    Fetch(FetchError),
    Write(std::io::Error),
}
