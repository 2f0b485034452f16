pub mod input;
pub mod media;
pub mod output;
pub mod transcriber;

pub use input::*;
pub use media::*;
pub use output::*;
pub use transcriber::*;
