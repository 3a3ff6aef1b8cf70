//! User facing compiler errors. Every error carries the source position it
//! refers to and renders as `line:column: message`.

use thiserror::Error;

use crate::{
    frontend::Position,
    middle::{ty::MAX_STORAGE_SIZE, type_check::TypeBoundary},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("duplicate definition of `{name}`")]
    DuplicateDefinition { name: String },
    #[error("conflicting types for `{name}`: previously declared as `{previous}`, now `{current}`")]
    PrototypeMismatch {
        name: String,
        previous: String,
        current: String,
    },
    #[error("`{name}` is already defined as a function")]
    FunctionAlreadyDefined { name: String },
    #[error("undefined reference to `{name}`")]
    UndefinedReference { name: String },
    #[error("`{name}` is a function and cannot be used as a variable")]
    NotVariable { name: String },
    #[error("`{name}` is not a function")]
    NotFunction { name: String },
    #[error("expression is not assignable")]
    NotAssignable,
    #[error("cannot take the address of an rvalue")]
    AddressOfRvalue,
    #[error("expected a pointer but found `{actual}`")]
    ExpectedPointer { actual: String },
    #[error("type mismatch in {boundary}: expected `{expected}` but found `{actual}`")]
    TypeMismatch {
        boundary: TypeBoundary,
        expected: String,
        actual: String,
    },
    #[error("`{name}` expects {expected} argument(s) but {actual} were given")]
    ArgumentCountMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("`void` cannot be used as part of the type `{ty}`")]
    VoidMisuse { ty: String },
    #[error("`{name}` does not fit in the {} bytes available for storage", MAX_STORAGE_SIZE)]
    StorageTooLarge { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{position}: {kind}")]
pub struct Diagnostic {
    pub position: Position,
    pub kind: ErrorKind,
}

impl Diagnostic {
    pub fn new(position: Position, kind: ErrorKind) -> Self {
        Self { position, kind }
    }
}
