//! Dead code elimination of assignments nobody reads.

use hashbrown::HashSet;

use crate::middle::{
    ir::{FunctionDefinition, StatementId, StatementKind},
    optimization::reaching::{Definition, ReachingDefinitions, Variables},
    scope::ScopeTree,
};

/// Every definition which reaches at least one use of the variable it
/// defines
fn live_definitions(
    function: &FunctionDefinition,
    reaching: &ReachingDefinitions,
) -> HashSet<StatementId> {
    let mut live = HashSet::new();

    for statement in function.body.flatten() {
        statement.kind.for_each_used_variable(&mut |symbol| {
            let Some(definitions) = reaching.reaching(statement.id, symbol) else {
                return;
            };

            live.extend(definitions.iter().filter_map(|definition| match definition {
                Definition::Statement(id) => Some(*id),
                Definition::Entry => None,
            }));
        });
    }

    live
}

/// Removes assignments and memory reads whose result is never used. Only
/// locals which nothing outside the function can observe are considered.
/// Returns the number of statements removed.
pub fn eliminate_dead_code(
    function: &mut FunctionDefinition,
    reaching: &ReachingDefinitions,
    variables: &Variables,
    scopes: &ScopeTree,
) -> usize {
    let live = live_definitions(function, reaching);

    let removed = function.body.retain_statements(&mut |statement| {
        let destination = match &statement.kind {
            StatementKind::Assign { destination, .. } | StatementKind::Read { destination, .. } => {
                *destination
            }
            _ => return true,
        };

        let symbol = scopes.symbol(destination);
        let removable = !symbol.is_global()
            && !symbol.ty.is_array()
            && !variables.escaped.contains(&destination);

        !removable || live.contains(&statement.id)
    });

    if removed > 0 {
        log::trace!("removed {removed} dead statements from `{}`", function.name);
    }

    removed
}
