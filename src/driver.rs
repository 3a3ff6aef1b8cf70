//! The compilation pipeline from source text to assembly.

use thiserror::Error;

use crate::{
    backend::{
        CodegenOptions,
        targets::{CodeGenerator, Target},
    },
    error::Diagnostic,
    frontend::{SourceFile, parse_program},
    middle::{
        ir::{NameGenerator, lowering::LoweringContext},
        optimization::optimize_program,
        resolve::Resolver,
        type_check::TypeChecker,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Run constant folding and dead code elimination
    pub optimize: bool,
    pub target: Target,
    pub codegen: CodegenOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            target: Target::default(),
            codegen: CodegenOptions::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0}")]
    Syntax(Diagnostic),
    #[error("{} error(s) during name resolution", .0.len())]
    Resolution(Vec<Diagnostic>),
    #[error("{0}")]
    Type(Diagnostic),
}

impl CompileError {
    /// Every diagnostic carried by this error, in source order
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileError::Syntax(diagnostic) | CompileError::Type(diagnostic) => {
                std::slice::from_ref(diagnostic)
            }
            CompileError::Resolution(diagnostics) => diagnostics,
        }
    }
}

/// Compiles one source file to assembly for `options.target`. No output is
/// produced if any stage reports an error.
pub fn compile(source: &SourceFile, options: &CompileOptions) -> Result<String, CompileError> {
    log::debug!("compiling {}", source.origin);

    let program = parse_program(source).map_err(CompileError::Syntax)?;
    let mut resolution = Resolver::resolve_names(&program).map_err(CompileError::Resolution)?;
    let types =
        TypeChecker::type_check_program(&program, &resolution).map_err(CompileError::Type)?;

    let mut names = NameGenerator::new();
    let mut ir = LoweringContext::lower_program(&program, &mut resolution, &types, &mut names);

    if options.optimize {
        optimize_program(&mut ir, &resolution.scopes);
    }

    let generator = options.target.get_code_generator();
    Ok(generator.translate_to_asm(&ir, &resolution.scopes, &options.codegen))
}
