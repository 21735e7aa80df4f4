//! Test doubles for the fetcher boundary.
//!
//! `ScriptedOperation` plays back a fixed sequence of outcomes so
//! resilience behavior (retries, circuit transitions, fallback tiers)
//! can be asserted deterministically, with call counts and timestamps
//! recorded for backoff assertions.

use crate::error::{Result, SyncError};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// One scripted network outcome.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Resolve successfully with this payload
    Value(Value),
    /// Resolve with a non-2xx status
    HttpStatus(u16),
    /// Resolve with a transport-level failure
    Transport(String),
    /// Resolve with a timeout the operation detected itself
    Timeout,
    /// Never resolve; only meaningful under the fetcher's hard timeout
    Hang,
}

/// Replays outcomes in order; once the script is exhausted every
/// further call fails with a transport error so over-calling is loud.
#[derive(Clone)]
pub struct ScriptedOperation {
    script: Arc<Mutex<VecDeque<ScriptedOutcome>>>,
    calls: Arc<AtomicUsize>,
    call_times: Arc<Mutex<Vec<Instant>>>,
}

impl ScriptedOperation {
    pub fn new(outcomes: Vec<ScriptedOutcome>) -> Self {
        Self {
            script: Arc::new(Mutex::new(outcomes.into())),
            calls: Arc::new(AtomicUsize::new(0)),
            call_times: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shorthand for a script that always fails the same way.
    pub fn always(outcome: ScriptedOutcome, times: usize) -> Self {
        Self::new(vec![outcome; times])
    }

    /// Network attempts performed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Instants of each attempt, for backoff-shape assertions.
    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().expect("call_times lock").clone()
    }

    /// The operation closure to hand to `ResilientFetcher::request`.
    pub fn operation(&self) -> impl FnMut() -> BoxFuture<'static, Result<Value>> {
        let script = Arc::clone(&self.script);
        let calls = Arc::clone(&self.calls);
        let call_times = Arc::clone(&self.call_times);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            call_times.lock().expect("call_times lock").push(Instant::now());
            let next = script.lock().expect("script lock").pop_front();
            Box::pin(async move {
                match next {
                    Some(ScriptedOutcome::Value(value)) => Ok(value),
                    Some(ScriptedOutcome::HttpStatus(status)) => {
                        Err(SyncError::HttpStatus(status))
                    }
                    Some(ScriptedOutcome::Transport(reason)) => {
                        Err(SyncError::Transport(reason))
                    }
                    Some(ScriptedOutcome::Timeout) => {
                        Err(SyncError::Timeout("scripted timeout".to_string()))
                    }
                    Some(ScriptedOutcome::Hang) => {
                        futures::future::pending::<()>().await;
                        unreachable!("pending future resolved")
                    }
                    None => Err(SyncError::Transport(
                        "scripted operation exhausted".to_string(),
                    )),
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn script_plays_back_in_order_and_counts_calls() {
        let scripted = ScriptedOperation::new(vec![
            ScriptedOutcome::HttpStatus(500),
            ScriptedOutcome::Value(json!({"ok": true})),
        ]);
        let mut operation = scripted.operation();

        assert!(matches!(operation().await, Err(SyncError::HttpStatus(500))));
        assert_eq!(operation().await.unwrap(), json!({"ok": true}));
        assert!(matches!(operation().await, Err(SyncError::Transport(_))));
        assert_eq!(scripted.calls(), 3);
        assert_eq!(scripted.call_times().len(), 3);
    }
}
