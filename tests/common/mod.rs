#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use precis::llm::{MAP_SYSTEM_PROMPT, REDUCE_SYSTEM_PROMPT, REFINE_SYSTEM_PROMPT};
use precis::{
    GenerateRequest, Generation, LlmProvider, ProviderError, Transcript, TranscriptSegment,
    WorkflowConfig,
};

/// Which stage a request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Map(usize),
    Reduce,
    Refine,
}

impl Call {
    pub fn of(request: &GenerateRequest) -> Call {
        if request.system == MAP_SYSTEM_PROMPT {
            Call::Map(chunk_index(&request.prompt).expect("map prompt names its chunk"))
        } else if request.system == REDUCE_SYSTEM_PROMPT {
            Call::Reduce
        } else if request.system == REFINE_SYSTEM_PROMPT {
            Call::Refine
        } else {
            panic!("unexpected system prompt: {}", request.system)
        }
    }
}

type Handler = dyn Fn(&GenerateRequest, Call) -> Result<Generation, ProviderError> + Send + Sync;
type Delay = dyn Fn(Call) -> Duration + Send + Sync;

/// Provider answering from a closure, recording every call
pub struct MockProvider {
    handler: Box<Handler>,
    delay: Option<Box<Delay>>,
    calls: AtomicU32,
    log: Mutex<Vec<Call>>,
}

impl MockProvider {
    pub fn new(
        handler: impl Fn(&GenerateRequest, Call) -> Result<Generation, ProviderError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delay: None,
            calls: AtomicU32::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: impl Fn(Call) -> Duration + Send + Sync + 'static) -> Self {
        self.delay = Some(Box::new(delay));
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    /// Completion order of map calls
    pub fn map_order(&self) -> Vec<usize> {
        self.log()
            .into_iter()
            .filter_map(|c| match c {
                Call::Map(i) => Some(i),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let call = Call::of(request);
        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(call)).await;
        }
        self.log.lock().unwrap().push(call);
        (self.handler)(request, call)
    }
}

pub fn text(reply: impl Into<String>) -> Result<Generation, ProviderError> {
    Ok(Generation {
        text: reply.into(),
        tokens_used: 100,
    })
}

/// Chunk index (0-based) from a map prompt's "# Chunk N of M" header
pub fn chunk_index(prompt: &str) -> Option<usize> {
    let header = prompt.lines().next()?.strip_prefix("# Chunk ")?;
    let number: usize = header.split_whitespace().next()?.parse().ok()?;
    number.checked_sub(1)
}

/// Fragment block of a reduce prompt, headers included
pub fn fragments(prompt: &str) -> String {
    let start = prompt.find("## Fragments\n").map(|i| i + "## Fragments\n".len());
    let end = prompt.find("## Instructions");
    match (start, end) {
        (Some(start), Some(end)) if end > start => prompt[start..end].trim().to_string(),
        _ => String::new(),
    }
}

/// Current section text of a refine prompt
pub fn current_text(prompt: &str) -> String {
    let marker = "## Current text\n";
    let start = prompt.find(marker).map(|i| i + marker.len()).unwrap_or(0);
    let end = prompt[start..]
        .find("\n\n## Instructions")
        .map(|i| i + start)
        .unwrap_or(prompt.len());
    prompt[start..end].to_string()
}

/// Reduce concatenates, refine echoes
pub fn pass_through(request: &GenerateRequest, call: Call) -> Result<Generation, ProviderError> {
    match call {
        Call::Reduce => text(fragments(&request.prompt)),
        Call::Refine => text(current_text(&request.prompt)),
        Call::Map(i) => text(format!(r#"{{"summary": "Chunk {} summary"}}"#, i)),
    }
}

/// Config with millisecond backoff so retries do not slow tests down
pub fn fast_config() -> WorkflowConfig {
    let mut config = WorkflowConfig::default();
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.refine.passes = 1;
    config
}

/// Transcript of `count` segments, each large enough to need its own chunk
/// under a 1000-token budget
pub fn one_chunk_per_segment(count: usize) -> Transcript {
    Transcript::from_segments(
        (0..count)
            .map(|i| {
                let start = i as u64 * 60_000;
                TranscriptSegment::new(
                    format!("Speaker {}", i % 2),
                    start,
                    start + 55_000,
                    format!("Segment {} {}", i, "lorem ".repeat(600)),
                )
            })
            .collect(),
    )
}
