pub mod chunk;
pub mod deepgram;
pub mod job;
pub mod summary;
pub mod transcript;

pub use chunk::*;
pub use deepgram::*;
pub use job::*;
pub use summary::*;
pub use transcript::*;
