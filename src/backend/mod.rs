//! The backend turns optimized IR into target assembly. Storage for every
//! variable is fixed first, then each statement is translated on its own
//! with no register allocation across statements.

pub mod assemblers;
pub mod layout;
pub mod targets;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Precede the code of every IR statement with a comment rendering it
    pub emit_comments: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            emit_comments: true,
        }
    }
}
