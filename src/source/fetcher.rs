use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("couldn't fetch the file: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("invalid content identifier {cid}: {err}")]
    InvalidCid { cid: String, err: url::ParseError },
    #[error("unexpected status code: {0}")]
    UnexpectedStatus(StatusCode),
}

/// Content-addressed storage used to retrieve missing sources.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Returns `None` if the storage does not know the identifier.
    async fn fetch(&self, cid: &str) -> Result<Option<Bytes>, FetchError>;
}

/// Retrieves files through a public IPFS http gateway.
pub struct IpfsGateway {
    gateway: Url,
    client: reqwest::Client,
}

impl IpfsGateway {
    pub fn new(gateway: Url, request_timeout: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(request_timeout))
            .build()?;
        Ok(Self { gateway, client })
    }

    fn url(&self, cid: &str) -> Result<Url, FetchError> {
        self.gateway
            .join(&format!("ipfs/{cid}"))
            .map_err(|err| FetchError::InvalidCid {
                cid: cid.to_string(),
                err,
            })
    }
}

#[async_trait]
impl ContentFetcher for IpfsGateway {
    async fn fetch(&self, cid: &str) -> Result<Option<Bytes>, FetchError> {
        let url = self.url(cid)?;
        log::debug!("fetching {}", url);
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.bytes().await?)),
            status => Err(FetchError::UnexpectedStatus(status)),
        }
    }
}
