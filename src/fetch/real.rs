use itertools::Itertools;
use std::time::Duration;

use super::{FetchFailure, Sleeper, Transport};

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    async fn get_json(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value, FetchFailure> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    format!("{name}: {}", value.to_str().unwrap_or("<binary>"))
                })
                .join(", ");
            let body = response
                .text()
                .await
                .unwrap_or_else(|err| format!("<unreadable body: {err}>"));

            return Err(FetchFailure::Status {
                status: status.as_u16(),
                headers,
                body,
            });
        }

        // a 2xx is a success whatever the content type
        let text = response.text().await.map_err(classify)?;
        Ok(serde_json::from_str(&text)
            .unwrap_or(serde_json::Value::String(text)))
    }
}

fn classify(err: reqwest::Error) -> FetchFailure {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        FetchFailure::Network(format!("{err:?}"))
    } else {
        FetchFailure::Other(err.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
