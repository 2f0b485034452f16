pub mod collaborators;
pub mod engine;

pub use collaborators::*;
pub use engine::*;
