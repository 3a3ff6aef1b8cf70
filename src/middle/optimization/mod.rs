//! Dataflow optimizations over the IR of each function.
//!
//! Constant folding and dead code elimination are alternated until neither
//! changes anything. Both passes are driven by reaching definitions, which
//! are recomputed from scratch on every round.

use crate::middle::{
    ir::{self, FunctionDefinition},
    scope::{ScopeTree, SymbolId},
};

pub mod cfg;
pub mod dce;
pub mod fold;
pub mod reaching;

#[cfg(test)]
mod interpret;

use cfg::ControlFlowGraph;
use reaching::{ReachingDefinitions, Variables};

pub fn optimize_program(program: &mut ir::Program, scopes: &ScopeTree) {
    for function in &mut program.functions {
        optimize_function(function, &program.globals, scopes);
    }
}

pub fn optimize_function(
    function: &mut FunctionDefinition,
    globals: &[SymbolId],
    scopes: &ScopeTree,
) {
    let mut rounds = 0;

    loop {
        rounds += 1;

        let variables = Variables::collect(function, globals);
        let reaching = analyze(function, &variables);
        let folded = fold::fold_constants(function, &reaching);

        let reaching = analyze(function, &variables);
        let removed = dce::eliminate_dead_code(function, &reaching, &variables, scopes);

        log::trace!(
            "round {rounds} on `{}`: folded {folded}, removed {removed}",
            function.name
        );

        if folded == 0 && removed == 0 {
            break;
        }
    }

    log::debug!("optimized `{}` in {rounds} rounds", function.name);
}

fn analyze(function: &FunctionDefinition, variables: &Variables) -> ReachingDefinitions {
    let cfg = ControlFlowGraph::build(function);
    ReachingDefinitions::analyze(&cfg, variables)
}
