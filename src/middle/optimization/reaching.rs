//! Reaching definitions.
//!
//! For every statement, computes which definitions of each variable may
//! still be visible when the statement runs. Calls may define any variable
//! that escapes the function: globals and locals whose address is taken.
//! Writes through pointers may define any variable at all.

use std::collections::{BTreeMap, BTreeSet};

use hashbrown::HashMap;

use crate::{
    index::IndexVec,
    middle::{
        ir::{Expression, FunctionDefinition, Statement, StatementId, StatementKind},
        optimization::cfg::{BlockId, ControlFlowGraph},
        scope::SymbolId,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Definition {
    /// The value a variable holds when the function is entered
    Entry,
    Statement(StatementId),
}

/// Reaching definitions of every tracked variable at one program point
pub type Definitions = BTreeMap<SymbolId, BTreeSet<Definition>>;

/// Variables a function may touch, split by whether anything outside the
/// function body can change them
#[derive(Debug, Default)]
pub struct Variables {
    pub tracked: BTreeSet<SymbolId>,
    pub escaped: BTreeSet<SymbolId>,
}

impl Variables {
    pub fn collect(function: &FunctionDefinition, globals: &[SymbolId]) -> Self {
        let mut variables = Variables::default();

        variables.tracked.extend(globals);
        variables.escaped.extend(globals);
        variables.tracked.extend(&function.parameters);

        for statement in function.body.flatten() {
            statement
                .kind
                .for_each_used_variable(&mut |symbol| {
                    variables.tracked.insert(symbol);
                });
            variables.tracked.extend(statement.kind.destination());

            if let StatementKind::Assign { value, .. } = &statement.kind {
                collect_address_taken(value, &mut variables.escaped);
            }
        }

        variables.tracked.extend(variables.escaped.iter().copied());
        variables
    }
}

fn collect_address_taken(expression: &Expression, into: &mut BTreeSet<SymbolId>) {
    match expression {
        Expression::AddressOf(symbol) => {
            into.insert(*symbol);
        }
        Expression::Binary { lhs, rhs, .. } => {
            collect_address_taken(lhs, into);
            collect_address_taken(rhs, into);
        }
        Expression::Variable(_) | Expression::Number(_) => {}
    }
}

#[derive(Debug)]
pub struct ReachingDefinitions {
    /// State on entry to each statement
    before: HashMap<StatementId, Definitions>,
}

impl ReachingDefinitions {
    pub fn analyze(cfg: &ControlFlowGraph<'_>, variables: &Variables) -> Self {
        let entry = variables
            .tracked
            .iter()
            .map(|symbol| (*symbol, BTreeSet::from([Definition::Entry])))
            .collect::<Definitions>();

        let mut outputs: IndexVec<BlockId, Definitions> =
            IndexVec::from_raw(vec![Definitions::new(); cfg.blocks.len()]);
        outputs[BlockId::BEGIN] = entry;

        let mut iterations = 0;
        let mut changed = true;

        while changed {
            changed = false;
            iterations += 1;

            for block in cfg.blocks.indices().skip(1) {
                let mut state = merge(
                    cfg.blocks[block]
                        .predecessors
                        .iter()
                        .map(|predecessor| &outputs[*predecessor]),
                );

                for statement in &cfg.blocks[block].statements {
                    transfer(statement, &mut state, variables);
                }

                if state != outputs[block] {
                    outputs[block] = state;
                    changed = true;
                }
            }
        }

        log::trace!("reaching definitions converged after {iterations} iterations");

        let mut before = HashMap::new();

        for block in cfg.blocks.indices() {
            let mut state = merge(
                cfg.blocks[block]
                    .predecessors
                    .iter()
                    .map(|predecessor| &outputs[*predecessor]),
            );

            for statement in &cfg.blocks[block].statements {
                before.insert(statement.id, state.clone());
                transfer(statement, &mut state, variables);
            }
        }

        Self { before }
    }

    /// Definitions of `symbol` which may reach `statement`. Unreachable
    /// statements have none.
    pub fn reaching(
        &self,
        statement: StatementId,
        symbol: SymbolId,
    ) -> Option<&BTreeSet<Definition>> {
        self.before.get(&statement)?.get(&symbol)
    }

    /// The single statement defining `symbol` at `statement`, if there is
    /// exactly one
    pub fn unique(&self, statement: StatementId, symbol: SymbolId) -> Option<StatementId> {
        let definitions = self.reaching(statement, symbol)?;

        match definitions.iter().collect::<Vec<_>>()[..] {
            [Definition::Statement(id)] => Some(*id),
            _ => None,
        }
    }
}

fn merge<'a>(states: impl Iterator<Item = &'a Definitions>) -> Definitions {
    let mut merged = Definitions::new();

    for state in states {
        for (symbol, definitions) in state {
            merged
                .entry(*symbol)
                .or_default()
                .extend(definitions.iter().copied());
        }
    }

    merged
}

fn transfer(statement: &Statement, state: &mut Definitions, variables: &Variables) {
    let definition = Definition::Statement(statement.id);

    // May-definitions first, so a call's own destination still kills.
    // Writes have no alias information and may hit any variable.
    let clobbered = match statement.kind {
        StatementKind::Write { .. } => Some(&variables.tracked),
        StatementKind::Call { .. } => Some(&variables.escaped),
        _ => None,
    };

    for symbol in clobbered.into_iter().flatten() {
        state.entry(*symbol).or_default().insert(definition);
    }

    if let Some(destination) = statement.kind.destination() {
        state.insert(destination, BTreeSet::from([definition]));
    }
}
