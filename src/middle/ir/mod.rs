//! Three address intermediate representation.
//!
//! Structured control flow is gone at this level: conditionals and loops are
//! expressed with labels, branches and gotos. Every operand of a binary
//! expression is a variable or a literal, and memory is only touched through
//! explicit read and write statements.

use hashbrown::HashMap;
use strum::{Display, EnumString};

use crate::{
    frontend::intern::Name,
    index::{Index, simple_index},
    middle::scope::SymbolId,
};

pub mod lowering;
pub mod pretty_print;

simple_index! {
    /// Stable identity of an IR statement, used to key dataflow facts
    pub struct StatementId;
}

#[derive(Debug)]
pub struct Program {
    pub globals: Vec<SymbolId>,
    pub functions: Vec<FunctionDefinition>,
}

#[derive(Debug)]
pub struct FunctionDefinition {
    pub symbol: SymbolId,
    pub name: Name,
    pub parameters: Vec<SymbolId>,
    pub body: CompoundStatement,
}

/// A block of statements along with the locals declared in it
#[derive(Debug, Default, Clone)]
pub struct CompoundStatement {
    pub declarations: Vec<SymbolId>,
    pub statements: Vec<Statement>,
}

impl CompoundStatement {
    /// Statements in execution order with nested compounds spliced in place
    pub fn flatten(&self) -> Vec<&Statement> {
        let mut statements = Vec::new();
        self.flatten_into(&mut statements);
        statements
    }

    fn flatten_into<'a>(&'a self, statements: &mut Vec<&'a Statement>) {
        for statement in &self.statements {
            match &statement.kind {
                StatementKind::Compound(inner) => inner.flatten_into(statements),
                _ => statements.push(statement),
            }
        }
    }

    /// Visits every statement, descending into nested compounds
    pub fn for_each_statement_mut(&mut self, f: &mut impl FnMut(&mut Statement)) {
        for statement in &mut self.statements {
            match &mut statement.kind {
                StatementKind::Compound(inner) => inner.for_each_statement_mut(f),
                _ => f(statement),
            }
        }
    }

    /// Removes every non-compound statement for which `keep` returns false.
    /// Returns the number of statements removed.
    pub fn retain_statements(&mut self, keep: &mut impl FnMut(&Statement) -> bool) -> usize {
        let before = self.statements.len();
        let mut removed = 0;

        self.statements.retain_mut(|statement| match &mut statement.kind {
            StatementKind::Compound(inner) => {
                removed += inner.retain_statements(keep);
                true
            }
            _ => keep(statement),
        });

        removed + before - self.statements.len()
    }
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub id: StatementId,
    pub kind: StatementKind,
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    /// destination = value
    Assign {
        destination: SymbolId,
        value: Expression,
    },
    /// *address = value
    Write { address: SymbolId, value: SymbolId },
    /// destination = *address
    Read {
        destination: SymbolId,
        address: SymbolId,
    },
    Label(Label),
    /// Jumps to `positive` if the condition is non-zero and to `negative`
    /// otherwise. A missing label falls through to the next statement.
    Branch {
        condition: SymbolId,
        positive: Option<Label>,
        negative: Option<Label>,
    },
    Goto(Label),
    /// Calls to void functions have no destination
    Call {
        destination: Option<SymbolId>,
        function: SymbolId,
        arguments: Vec<SymbolId>,
    },
    Return(Option<SymbolId>),
    Syscall { call: Syscall, argument: SymbolId },
    Compound(CompoundStatement),
}

impl StatementKind {
    /// The variable this statement assigns a new value to
    pub fn destination(&self) -> Option<SymbolId> {
        match self {
            StatementKind::Assign { destination, .. }
            | StatementKind::Read { destination, .. } => Some(*destination),
            StatementKind::Call { destination, .. } => *destination,
            _ => None,
        }
    }

    /// Calls `f` with every variable whose value this statement reads
    pub fn for_each_used_variable(&self, f: &mut impl FnMut(SymbolId)) {
        match self {
            StatementKind::Assign { value, .. } => value.for_each_used_variable(f),
            StatementKind::Write { address, value } => {
                f(*address);
                f(*value);
            }
            StatementKind::Read { address, .. } => f(*address),
            StatementKind::Branch { condition, .. } => f(*condition),
            StatementKind::Call { arguments, .. } => arguments.iter().copied().for_each(f),
            StatementKind::Return(Some(value)) => f(*value),
            StatementKind::Syscall { argument, .. } => f(*argument),
            StatementKind::Label(_)
            | StatementKind::Goto(_)
            | StatementKind::Return(None)
            | StatementKind::Compound(_) => {}
        }
    }

    /// Ends a basic block
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            StatementKind::Branch { .. } | StatementKind::Goto(_) | StatementKind::Return(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Variable(SymbolId),
    Number(i32),
    Binary {
        operator: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    AddressOf(SymbolId),
}

impl Expression {
    pub fn binary(operator: BinaryOperator, lhs: Expression, rhs: Expression) -> Self {
        Self::Binary {
            operator,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Calls `f` with every variable whose value this expression reads
    pub fn for_each_used_variable(&self, f: &mut impl FnMut(SymbolId)) {
        match self {
            Expression::Variable(symbol) => f(*symbol),
            Expression::Number(_) | Expression::AddressOf(_) => {}
            Expression::Binary { lhs, rhs, .. } => {
                lhs.for_each_used_variable(f);
                rhs.for_each_used_variable(f);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BinaryOperator {
    #[strum(to_string = "+")]
    Add,
    #[strum(to_string = "-")]
    Subtract,
    #[strum(to_string = "*")]
    Multiply,
    #[strum(to_string = "/")]
    Divide,
    #[strum(to_string = "<")]
    LessThan,
    #[strum(to_string = "<=")]
    LessThanOrEqualTo,
    #[strum(to_string = ">")]
    GreaterThan,
    #[strum(to_string = ">=")]
    GreaterThanOrEqualTo,
    #[strum(to_string = "==")]
    Equals,
    #[strum(to_string = "!=")]
    NotEquals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(pub Name);

impl core::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.value())
    }
}

/// Functions from the prelude which map directly onto simulator system calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Syscall {
    /// print_int
    Print,
    /// print_char
    #[strum(serialize = "putchar", to_string = "putchar")]
    PutChar,
}

impl Syscall {
    /// The value loaded into `$v0` to select this call
    pub fn number(self) -> u32 {
        match self {
            Syscall::Print => 1,
            Syscall::PutChar => 11,
        }
    }
}

/// Source of compiler generated names and statement ids for one compilation.
///
/// Each prefix has its own counter, so names never repeat within a run and
/// repeated runs produce identical names.
#[derive(Debug, Default)]
pub struct NameGenerator {
    counters: HashMap<&'static str, u32>,
    next_statement_id: usize,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `{prefix}.{n}` where `n` counts up from 0 per prefix
    pub fn fresh(&mut self, prefix: &'static str) -> Name {
        let counter = self.counters.entry(prefix).or_insert(0);
        let name = format!("{prefix}.{counter}");
        *counter += 1;

        Name::new(&name)
    }

    pub fn label(&mut self, prefix: &'static str) -> Label {
        Label(self.fresh(prefix))
    }

    pub fn statement_id(&mut self) -> StatementId {
        let id = StatementId::new(self.next_statement_id);
        self.next_statement_id += 1;
        id
    }

    pub fn statement(&mut self, kind: StatementKind) -> Statement {
        Statement {
            id: self.statement_id(),
            kind,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::{
        frontend::{SourceFile, parse_program},
        middle::{
            resolve::{Resolution, Resolver},
            type_check::TypeChecker,
        },
    };

    /// Runs the front end and lowering over a program which must be valid
    pub(crate) fn lower_source(source: &str) -> (Program, Resolution) {
        let program = parse_program(&SourceFile::from_memory(source)).unwrap();
        let mut resolution = Resolver::resolve_names(&program).unwrap();
        let types = TypeChecker::type_check_program(&program, &resolution).unwrap();
        let mut names = NameGenerator::new();

        let ir =
            lowering::LoweringContext::lower_program(&program, &mut resolution, &types, &mut names);

        (ir, resolution)
    }

    #[test]
    fn names_count_per_prefix() {
        let mut names = NameGenerator::new();

        assert_eq!(names.fresh("tmp").value(), "tmp.0");
        assert_eq!(names.fresh("tmp").value(), "tmp.1");
        assert_eq!(names.label("while.begin").to_string(), "while.begin.0");
        assert_eq!(names.fresh("tmp").value(), "tmp.2");

        let mut again = NameGenerator::new();
        assert_eq!(again.fresh("tmp").value(), "tmp.0");
    }

    #[test]
    fn statement_ids_are_monotonic() {
        let mut names = NameGenerator::new();

        let a = names.statement(StatementKind::Return(None));
        let b = names.statement(StatementKind::Return(None));

        assert!(a.id < b.id);
    }

    #[test]
    fn syscalls_by_name() {
        assert_eq!(Syscall::from_str("print"), Ok(Syscall::Print));
        assert_eq!(Syscall::from_str("putchar"), Ok(Syscall::PutChar));
        assert!(Syscall::from_str("main").is_err());
        assert_eq!(Syscall::PutChar.number(), 11);
        assert_eq!(Syscall::PutChar.to_string(), "putchar");
    }
}
