pub mod backend;
pub mod driver;
pub mod error;
pub mod frontend;
pub mod index;
pub mod middle;

pub use driver::{CompileError, CompileOptions, compile};
