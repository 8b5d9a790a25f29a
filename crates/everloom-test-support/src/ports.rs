//! Scripted capability-port implementations for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Barrier;
use uuid::Uuid;

use everloom_core::error::PortError;
use everloom_core::ports::{ActorResolver, TextCompletion, TimerEffects};
use everloom_core::types::{ExpiredTimer, TurnPrompt};

/// A completion port that returns pre-scripted payloads in order.
///
/// An optional barrier lets concurrency tests hold every caller inside
/// Phase B until all of them have finished Phase A. Only the first
/// `complete` call of an instance waits, so a retry never blocks on a
/// barrier nobody else will reach.
#[derive(Debug)]
pub struct ScriptedCompletion {
    outputs: Mutex<VecDeque<serde_json::Value>>,
    barrier: Mutex<Option<Arc<Barrier>>>,
}

impl ScriptedCompletion {
    /// Scripts the given payloads, returned one per `complete` call.
    #[must_use]
    pub fn new(outputs: Vec<serde_json::Value>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            barrier: Mutex::new(None),
        }
    }

    /// Holds the first `complete` call on `barrier` before returning.
    #[must_use]
    pub fn with_barrier(self, barrier: Arc<Barrier>) -> Self {
        *self.barrier.lock().unwrap() = Some(barrier);
        self
    }
}

#[async_trait]
impl TextCompletion for ScriptedCompletion {
    async fn complete(&self, _prompt: &TurnPrompt) -> Result<serde_json::Value, PortError> {
        let barrier = self.barrier.lock().unwrap().take();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PortError::new("text_completion", "completion script exhausted"))
    }
}

/// A completion port that always fails.
#[derive(Debug)]
pub struct FailingCompletion;

#[async_trait]
impl TextCompletion for FailingCompletion {
    async fn complete(&self, _prompt: &TurnPrompt) -> Result<serde_json::Value, PortError> {
        Err(PortError::new("text_completion", "backend unavailable"))
    }
}

/// An actor resolver backed by a fixed mention table. Unknown mentions
/// resolve to `None`.
#[derive(Debug, Default)]
pub struct StaticActorResolver {
    mentions: HashMap<String, Uuid>,
}

impl StaticActorResolver {
    /// Builds a resolver from `(mention, actor_id)` pairs.
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = (String, Uuid)>) -> Self {
        Self {
            mentions: entries.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ActorResolver for StaticActorResolver {
    async fn resolve(&self, mention: &str) -> Result<Option<Uuid>, PortError> {
        Ok(self.mentions.get(mention).copied())
    }
}

/// A timer-effects port that records every timer it is asked to apply.
#[derive(Debug, Default)]
pub struct RecordingTimerEffects {
    applied: Mutex<Vec<ExpiredTimer>>,
}

impl RecordingTimerEffects {
    /// Returns a snapshot of the timers applied so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn applied(&self) -> Vec<ExpiredTimer> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl TimerEffects for RecordingTimerEffects {
    async fn apply(&self, timer: &ExpiredTimer) -> Result<(), PortError> {
        self.applied.lock().unwrap().push(timer.clone());
        Ok(())
    }
}

/// A timer-effects port that always fails, leaving timers in `expired`.
#[derive(Debug)]
pub struct FailingTimerEffects;

#[async_trait]
impl TimerEffects for FailingTimerEffects {
    async fn apply(&self, _timer: &ExpiredTimer) -> Result<(), PortError> {
        Err(PortError::new("timer_effects", "effects backend unavailable"))
    }
}
