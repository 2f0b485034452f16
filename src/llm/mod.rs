pub mod anthropic;
pub mod coverage;
#[cfg(test)]
pub(crate) mod mock;
pub mod openai;
pub mod prompts;
pub mod provider;
pub mod retry;
pub mod validation;

pub use anthropic::*;
pub use coverage::CoverageFingerprint;
pub use openai::*;
pub use prompts::*;
pub use provider::{build_provider, GenerateRequest, Generation, LlmProvider, ProviderKind, TokenMeter};
pub use retry::*;
pub use validation::*;
