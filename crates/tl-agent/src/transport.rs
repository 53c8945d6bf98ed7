use crate::config::AgentConfig;
use crate::error::DeliveryError;
use futures::future::BoxFuture;
use reqwest::Client;
use std::time::Duration;
use tl_core::types::{TrackRequest, TrackResponse};

/// One delivery attempt of one event to the ingestion endpoint.
pub trait Transport: Send + Sync {
    fn deliver<'a>(&'a self, request: &'a TrackRequest) -> BoxFuture<'a, Result<(), DeliveryError>>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self, reqwest::Error> {
        Self::new(config.endpoint.clone(), config.timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Anything that kept the request from being answered counts as a
/// connectivity failure; a request that could not even be built never will be.
fn classify_send_error(err: &reqwest::Error) -> DeliveryError {
    if err.is_builder() {
        DeliveryError::Rejected {
            message: err.to_string(),
        }
    } else {
        DeliveryError::Connectivity {
            message: err.to_string(),
        }
    }
}

impl Transport for HttpTransport {
    fn deliver<'a>(&'a self, request: &'a TrackRequest) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.endpoint)
                .json(request)
                .send()
                .await
                .map_err(|err| classify_send_error(&err))?;

            let status = response.status();
            if !status.is_success() {
                return Err(DeliveryError::Rejected {
                    message: format!("server answered {status}"),
                });
            }

            match response.json::<TrackResponse>().await {
                Ok(TrackResponse { success: true }) => Ok(()),
                Ok(TrackResponse { success: false }) => Err(DeliveryError::Rejected {
                    message: "server did not accept the event".to_string(),
                }),
                Err(err) if err.is_timeout() => Err(DeliveryError::Connectivity {
                    message: err.to_string(),
                }),
                Err(err) => Err(DeliveryError::Rejected {
                    message: format!("unreadable reply: {err}"),
                }),
            }
        })
    }
}
