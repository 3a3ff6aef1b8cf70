use core::fmt;

use colored::Colorize;
use itertools::Itertools;

use crate::middle::{
    ir::{CompoundStatement, Expression, FunctionDefinition, Label, Statement, StatementKind},
    scope::{ScopeTree, SymbolId},
};

/// Pairs an IR value with the scope tree its symbols live in
pub struct Pretty<'a, T: ?Sized> {
    value: &'a T,
    scopes: &'a ScopeTree,
}

impl<'a, T: ?Sized> Pretty<'a, T> {
    pub fn new(value: &'a T, scopes: &'a ScopeTree) -> Self {
        Self { value, scopes }
    }

    fn with<U: ?Sized>(&self, value: &'a U) -> Pretty<'a, U> {
        Pretty::new(value, self.scopes)
    }
}

pub fn render_statement(statement: &StatementKind, scopes: &ScopeTree) -> String {
    Pretty::new(statement, scopes).to_string()
}

pub fn render_function(function: &FunctionDefinition, scopes: &ScopeTree) -> String {
    let mut output = format!(
        "{} {}{}{}{}\n",
        "fn".magenta(),
        function.name.value().blue(),
        "(".white(),
        function
            .parameters
            .iter()
            .map(|parameter| Pretty::new(parameter, scopes).to_string())
            .join(", "),
        ") {".white()
    );

    render_compound(&function.body, scopes, 1, &mut output);

    output.push_str(&"}".white().to_string());
    output.push('\n');
    output
}

fn render_compound(
    compound: &CompoundStatement,
    scopes: &ScopeTree,
    depth: usize,
    output: &mut String,
) {
    for Statement { kind, .. } in &compound.statements {
        match kind {
            StatementKind::Compound(inner) => render_compound(inner, scopes, depth + 1, output),
            // Labels are outdented so jump targets stand out
            StatementKind::Label(_) => {
                output.push_str(&"    ".repeat(depth - 1));
                output.push_str(&render_statement(kind, scopes));
                output.push('\n');
            }
            _ => {
                output.push_str(&"    ".repeat(depth));
                output.push_str(&render_statement(kind, scopes));
                output.push('\n');
            }
        }
    }
}

impl fmt::Display for Pretty<'_, SymbolId> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = self.scopes.symbol(*self.value);
        write!(f, "{}", symbol.name.value().yellow())
    }
}

fn label(label: &Option<Label>) -> String {
    match label {
        Some(label) => label.to_string().blue().to_string(),
        None => "_".white().to_string(),
    }
}

impl fmt::Display for Pretty<'_, Expression> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Expression::Variable(symbol) => write!(f, "{}", self.with(symbol)),
            Expression::Number(value) => write!(f, "{}", value.to_string().purple()),
            Expression::Binary { operator, lhs, rhs } => write!(
                f,
                "{} {} {}",
                self.with(lhs.as_ref()),
                operator.to_string().white(),
                self.with(rhs.as_ref())
            ),
            Expression::AddressOf(symbol) => write!(f, "{}{}", "&".white(), self.with(symbol)),
        }
    }
}

impl fmt::Display for Pretty<'_, StatementKind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            StatementKind::Assign { destination, value } => write!(
                f,
                "{} {} {}",
                self.with(destination),
                "=".white(),
                self.with(value)
            ),
            StatementKind::Write { address, value } => write!(
                f,
                "{}{} {} {}",
                "*".white(),
                self.with(address),
                "=".white(),
                self.with(value)
            ),
            StatementKind::Read {
                destination,
                address,
            } => write!(
                f,
                "{} {} {}{}",
                self.with(destination),
                "=".white(),
                "*".white(),
                self.with(address)
            ),
            StatementKind::Label(name) => write!(f, "{}", format!("{name}:").bright_red()),
            StatementKind::Branch {
                condition,
                positive,
                negative,
            } => write!(
                f,
                "{} {} {}, {}",
                "br".cyan(),
                self.with(condition),
                label(positive),
                label(negative)
            ),
            StatementKind::Goto(target) => {
                write!(f, "{} {}", "goto".cyan(), target.to_string().blue())
            }
            StatementKind::Call {
                destination,
                function,
                arguments,
            } => {
                if let Some(destination) = destination {
                    write!(f, "{} {} ", self.with(destination), "=".white())?;
                }

                write!(
                    f,
                    "{} {}{}{}{}",
                    "call".cyan(),
                    self.scopes.symbol(*function).name.value().blue(),
                    "(".white(),
                    arguments
                        .iter()
                        .map(|argument| self.with(argument).to_string())
                        .join(", "),
                    ")".white()
                )
            }
            StatementKind::Return(Some(value)) => {
                write!(f, "{} {}", "return".cyan(), self.with(value))
            }
            StatementKind::Return(None) => write!(f, "{}", "return".cyan()),
            StatementKind::Syscall { call, argument } => write!(
                f,
                "{} {}{}{}{}",
                "syscall".cyan(),
                call.to_string().blue(),
                "(".white(),
                self.with(argument),
                ")".white()
            ),
            StatementKind::Compound(compound) => write!(
                f,
                "{{ {} statements }}",
                compound.statements.len().to_string().purple()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frontend::intern::Name,
        middle::{
            ir::{BinaryOperator, NameGenerator, Syscall},
            ty::Type,
        },
    };

    fn plain(statement: &StatementKind, scopes: &ScopeTree) -> String {
        strip_ansi_escapes::strip_str(render_statement(statement, scopes))
    }

    #[test]
    fn statements_read_like_three_address_code() {
        let mut scopes = ScopeTree::new();
        let mut names = NameGenerator::new();
        let x = scopes.add_temporary(Name::new("x"), Type::int());
        let p = scopes.add_temporary(Name::new("p"), Type::pointer(Type::int()));

        let assign = StatementKind::Assign {
            destination: x,
            value: Expression::binary(
                BinaryOperator::LessThanOrEqualTo,
                Expression::Variable(x),
                Expression::Number(-1),
            ),
        };
        assert_eq!(plain(&assign, &scopes), "x = x <= -1");

        let write = StatementKind::Write {
            address: p,
            value: x,
        };
        assert_eq!(plain(&write, &scopes), "*p = x");

        let branch = StatementKind::Branch {
            condition: x,
            positive: None,
            negative: Some(names.label("if.end")),
        };
        assert_eq!(plain(&branch, &scopes), "br x _, if.end.0");

        let syscall = StatementKind::Syscall {
            call: Syscall::PutChar,
            argument: x,
        };
        assert_eq!(plain(&syscall, &scopes), "syscall putchar(x)");
    }
}
