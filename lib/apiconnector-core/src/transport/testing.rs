use std::sync::{Arc, Mutex, PoisonError};

use http::{HeaderMap, StatusCode};
use tokio::time::Instant;

use super::{Dispatch, DispatchError, OutgoingRequest, Response};

/// Replays a script of outcomes, repeating the last one once exhausted.
#[derive(Debug, Clone)]
pub(crate) struct ScriptedDispatcher {
    script: Arc<Vec<Result<Response, DispatchError>>>,
    calls: Arc<Mutex<Vec<(Instant, OutgoingRequest)>>>,
}

impl ScriptedDispatcher {
    pub(crate) fn new(script: impl IntoIterator<Item = Result<Response, DispatchError>>) -> Self {
        let script: Vec<_> = script.into_iter().collect();
        assert!(!script.is_empty(), "empty script");
        Self {
            script: Arc::new(script),
            calls: Arc::default(),
        }
    }

    pub(crate) fn statuses(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self::new(statuses.into_iter().map(|status| {
            let status = StatusCode::from_u16(status).expect("valid status");
            Ok(Response::new(status, HeaderMap::new(), status.as_str().to_string()))
        }))
    }

    pub(crate) fn calls(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn instants(&self) -> Vec<Instant> {
        self.lock().iter().map(|(instant, _)| *instant).collect()
    }

    pub(crate) fn requests(&self) -> Vec<OutgoingRequest> {
        self.lock()
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Instant, OutgoingRequest)>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Dispatch for ScriptedDispatcher {
    async fn dispatch(&self, request: &OutgoingRequest) -> Result<Response, DispatchError> {
        let index = {
            let mut calls = self.lock();
            calls.push((Instant::now(), request.clone()));
            calls.len() - 1
        };
        let outcome = self
            .script
            .get(index)
            .or_else(|| self.script.last())
            .expect("non empty script");
        outcome.clone()
    }
}
