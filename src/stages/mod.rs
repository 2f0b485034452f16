pub mod chunker;
pub mod map;
pub mod reduce;
pub mod refine;
pub mod template;

pub use chunker::*;
pub use map::*;
pub use reduce::*;
pub use refine::*;
pub use template::*;
