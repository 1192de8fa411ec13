//! A [`ParserFactory`] that records how it was asked to build parsers and
//! how often they ran, optionally failing at either step.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{Parser, ParserFactory, ParserParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Failure {
    #[default]
    Never,
    OnBuild,
    OnRun,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingFactory {
    failure: Failure,
    built: Arc<Mutex<Vec<ParserParams>>>,
    runs: Arc<AtomicUsize>,
}

impl RecordingFactory {
    pub(crate) fn failing(failure: Failure) -> Self {
        Self { failure, ..Self::default() }
    }

    /// Parameters of every parser built so far.
    pub(crate) fn built(&self) -> Vec<ParserParams> {
        self.built.lock().unwrap().clone()
    }

    /// Number of completed or failed parser runs.
    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl ParserFactory for RecordingFactory {
    type Parser = RecordingParser;

    fn build(&self, params: ParserParams) -> anyhow::Result<RecordingParser> {
        self.built.lock().unwrap().push(params);

        if self.failure == Failure::OnBuild {
            anyhow::bail!("invalid rpc url");
        }

        Ok(RecordingParser {
            fail: self.failure == Failure::OnRun,
            runs: self.runs.clone(),
        })
    }
}

pub(crate) struct RecordingParser {
    fail: bool,
    runs: Arc<AtomicUsize>,
}

impl Parser for RecordingParser {
    async fn run(&self) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);

        if self.fail {
            anyhow::bail!("execution reverted");
        }

        Ok(())
    }
}
