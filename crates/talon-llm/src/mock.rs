//! Mock collaborators for deterministic testing.
//!
//! No HTTP calls; every request is recorded for assertions.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use talon_core::{RetrievalError, SchedulerFireError};

use crate::assistant::{Assistant, AssistantRequest};
use crate::embedding::EmbeddingProvider;

/// An assistant that answers with a canned reply, or fails on demand.
///
/// # Example
/// ```
/// use talon_llm::mock::MockAssistant;
/// let assistant = MockAssistant::new().with_reply("done");
/// assert!(assistant.requests().is_empty());
/// ```
#[derive(Clone, Default)]
pub struct MockAssistant {
    reply: String,
    error: Option<String>,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<AssistantRequest>>>,
}

impl MockAssistant {
    pub fn new() -> Self {
        Self {
            reply: "ok".into(),
            ..Default::default()
        }
    }

    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = reply.to_string();
        self
    }

    /// Fail every submission with this reason.
    pub fn failing(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<AssistantRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Assistant for MockAssistant {
    async fn submit(&self, request: AssistantRequest) -> Result<String, SchedulerFireError> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.error {
            Some(reason) => Err(SchedulerFireError {
                job_id: request.job_id,
                reason: reason.clone(),
            }),
            None => Ok(self.reply.clone()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// An embedding provider whose behaviour is fixed up front.
pub enum MockEmbedding {
    /// Every call fails, as if the service were down.
    Unavailable(String),
    /// Returns one vector fewer than requested.
    ShortBatch { dims: usize },
}

#[async_trait]
impl EmbeddingProvider for MockEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        match self {
            Self::Unavailable(reason) => Err(RetrievalError::Embedding(reason.clone())),
            Self::ShortBatch { dims } => Ok(texts
                .iter()
                .skip(1)
                .map(|_| vec![1.0; *dims])
                .collect()),
        }
    }

    fn dimensions(&self) -> usize {
        match self {
            Self::Unavailable(_) => 0,
            Self::ShortBatch { dims } => *dims,
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
