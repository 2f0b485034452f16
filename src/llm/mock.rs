//! Scripted provider for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::llm::{GenerateRequest, Generation, LlmProvider};

type Handler = dyn Fn(&GenerateRequest, u32) -> Result<Generation, ProviderError> + Send + Sync;
type Delay = dyn Fn(&GenerateRequest) -> Duration + Send + Sync;

/// Answers each request with a closure of (request, 1-based call number)
pub(crate) struct ScriptedProvider {
    handler: Box<Handler>,
    delay: Option<Box<Delay>>,
    calls: AtomicU32,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedProvider {
    pub(crate) fn new(
        handler: impl Fn(&GenerateRequest, u32) -> Result<Generation, ProviderError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delay: None,
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_delay(
        mut self,
        delay: impl Fn(&GenerateRequest) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay = Some(Box::new(delay));
        self
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(request)).await;
        }
        (self.handler)(request, call)
    }
}

pub(crate) fn reply(text: impl Into<String>) -> Result<Generation, ProviderError> {
    Ok(Generation {
        text: text.into(),
        tokens_used: 10,
    })
}

/// Chunk index (0-based) named in a map prompt's "# Chunk N of M" header
pub(crate) fn chunk_index(prompt: &str) -> Option<usize> {
    let header = prompt.lines().next()?.strip_prefix("# Chunk ")?;
    let number: usize = header.split_whitespace().next()?.parse().ok()?;
    number.checked_sub(1)
}

/// Section key named in a reduce or refine prompt header
pub(crate) fn section_key(prompt: &str) -> Option<&str> {
    let header = prompt.lines().next()?;
    header
        .strip_prefix("# Merge section: ")
        .or_else(|| header.strip_prefix("# Densify section: "))
        .map(str::trim)
}

/// Text under the "## Current text" heading of a refine prompt
pub(crate) fn current_text(prompt: &str) -> Option<&str> {
    let start = prompt.find("## Current text\n")? + "## Current text\n".len();
    let end = prompt[start..].find("\n\n## Instructions")? + start;
    Some(&prompt[start..end])
}
