//! Scripted implementations of [`Transport`] and [`Sleeper`] that replay
//! canned responses and record what was asked of them.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{FetchFailure, Sleeper, Transport};

type Response = Result<serde_json::Value, FetchFailure>;

/// Replays responses in order; once they run out every request fails with a
/// network error.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedTransport {
    responses: Arc<Mutex<VecDeque<Response>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTransport {
    pub(crate) fn new(responses: impl IntoIterator<Item = Response>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().collect())),
            requests: Arc::default(),
        }
    }

    /// URLs requested so far, in order.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    async fn get_json(
        &self,
        url: &str,
        _timeout: Duration,
    ) -> Result<serde_json::Value, FetchFailure> {
        self.requests.lock().unwrap().push(url.to_string());

        self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(FetchFailure::Network("connection refused".to_string()))
        })
    }
}

/// Returns immediately, remembering every requested delay.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub(crate) fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}
