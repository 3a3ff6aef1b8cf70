//! Basic blocks and the control flow graph of a single function.

use std::collections::BTreeSet;

use hashbrown::HashMap;

use crate::{
    index::{Index, IndexVec, simple_index},
    middle::ir::{FunctionDefinition, Label, Statement, StatementKind},
};

simple_index! {
    pub struct BlockId;
}

impl BlockId {
    /// Empty entry block, the only block without predecessors in a
    /// function without dead code
    pub const BEGIN: BlockId = BlockId(0);
    /// Empty exit block which every return jumps to
    pub const END: BlockId = BlockId(1);
}

impl core::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            BlockId::BEGIN => f.write_str("BEGIN"),
            BlockId::END => f.write_str("END"),
            BlockId(n) => write!(f, "bb{n}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct BasicBlock<'a> {
    pub statements: Vec<&'a Statement>,
    pub successors: BTreeSet<BlockId>,
    pub predecessors: BTreeSet<BlockId>,
}

#[derive(Debug)]
pub struct ControlFlowGraph<'a> {
    pub blocks: IndexVec<BlockId, BasicBlock<'a>>,
}

impl<'a> ControlFlowGraph<'a> {
    /// Splits the function into maximal straight-line blocks. A block starts
    /// at a label or after a terminator and ends at a terminator.
    pub fn build(function: &'a FunctionDefinition) -> Self {
        let mut blocks = IndexVec::new();
        blocks.push(BasicBlock::default());
        blocks.push(BasicBlock::default());

        let mut labels = HashMap::new();
        let mut current = BasicBlock::default();

        for statement in function.body.flatten() {
            let starts_block = matches!(statement.kind, StatementKind::Label(_));
            let ends_previous = current
                .statements
                .last()
                .is_some_and(|last: &&Statement| last.kind.is_terminator());

            if (starts_block || ends_previous) && !current.statements.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }

            if let StatementKind::Label(label) = statement.kind {
                labels.insert(label, blocks.next_index());
            }

            current.statements.push(statement);
        }

        if !current.statements.is_empty() {
            blocks.push(current);
        }

        let mut cfg = Self { blocks };
        cfg.connect(&labels);

        log::trace!(
            "built control flow graph for `{}` with {} blocks",
            function.name,
            cfg.blocks.len()
        );

        cfg
    }

    fn connect(&mut self, labels: &HashMap<Label, BlockId>) {
        let first = BlockId::new(2);
        let entry = if self.blocks.len() > 2 {
            first
        } else {
            BlockId::END
        };
        self.add_edge(BlockId::BEGIN, entry);

        for block in self.blocks.indices().skip(2) {
            let next = match block.plus(1) {
                next if next.index() < self.blocks.len() => next,
                _ => BlockId::END,
            };
            let target = |label: &Label| match labels.get(label) {
                Some(block) => *block,
                None => unreachable!("jump to undefined label `{label}`"),
            };

            let successors = match self.blocks[block].statements.last().map(|s| &s.kind) {
                Some(StatementKind::Goto(label)) => vec![target(label)],
                Some(StatementKind::Branch {
                    positive, negative, ..
                }) => [positive, negative]
                    .into_iter()
                    .map(|label| label.as_ref().map_or(next, target))
                    .collect(),
                Some(StatementKind::Return(_)) => vec![BlockId::END],
                _ => vec![next],
            };

            for successor in successors {
                self.add_edge(block, successor);
            }
        }
    }

    fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from].successors.insert(to);
        self.blocks[to].predecessors.insert(from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ir::tests::lower_source;

    /// Blocks which can be reached from [`BlockId::BEGIN`]
    fn reachable(cfg: &ControlFlowGraph) -> BTreeSet<BlockId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![BlockId::BEGIN];

        while let Some(block) = stack.pop() {
            if seen.insert(block) {
                stack.extend(cfg.blocks[block].successors.iter().copied());
            }
        }

        seen
    }

    #[test]
    fn loop_has_back_edge() {
        let (program, _) = lower_source(indoc::indoc! {"
            int main() {
                int i;
                i = 0;
                while (i < 10) i = i + 1;
                return i;
            }
        "});
        let cfg = ControlFlowGraph::build(&program.functions[0]);

        // i = 0 | while.begin: test; br | body; goto | while.end: return
        assert_eq!(cfg.blocks.len(), 6);

        let header = BlockId::new(3);
        let body = BlockId::new(4);
        let exit = BlockId::new(5);

        assert!(cfg.blocks[header].successors.contains(&body));
        assert!(cfg.blocks[header].successors.contains(&exit));
        assert_eq!(
            cfg.blocks[body].successors.iter().copied().collect::<Vec<_>>(),
            vec![header]
        );
        assert!(cfg.blocks[exit].successors.contains(&BlockId::END));
        assert_eq!(reachable(&cfg).len(), cfg.blocks.len());
    }

    #[test]
    fn code_after_return_is_unreachable() {
        let (program, _) = lower_source("int main() { return 1; print(2); }");
        let cfg = ControlFlowGraph::build(&program.functions[0]);

        assert!(reachable(&cfg).len() < cfg.blocks.len());
    }

    #[test]
    fn empty_function_flows_to_end() {
        let (program, _) = lower_source("void main() { }");
        let cfg = ControlFlowGraph::build(&program.functions[0]);

        assert_eq!(cfg.blocks.len(), 2);
        assert!(cfg.blocks[BlockId::BEGIN].successors.contains(&BlockId::END));
    }
}
