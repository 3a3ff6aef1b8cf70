//! Lowering of the checked syntax tree into IR.
//!
//! Expressions are lowered into a value plus the temporaries and statements
//! which must run before the value can be used. The value is either an atom
//! (a variable or a literal) or a single binary operation on atoms.

use std::str::FromStr;

use crate::{
    frontend::ast::{
        self, BinaryOperatorKind, Block, Declaration, ExpressionKind, Identifier, ItemKind,
        StatementKind as AstStatementKind, UnaryOperator,
    },
    middle::{
        ir::{
            BinaryOperator, CompoundStatement, Expression, FunctionDefinition, NameGenerator,
            Program, StatementKind, Syscall,
        },
        resolve::Resolution,
        scope::{SymbolId, SymbolKind},
        ty::Type,
        type_check::TypeCheckResults,
    },
};

pub struct LoweringContext<'a> {
    resolution: &'a mut Resolution,
    types: &'a TypeCheckResults,
    names: &'a mut NameGenerator,
}

impl<'a> LoweringContext<'a> {
    /// Lowers a program which has passed resolution and type checking.
    /// Temporaries are added to the symbol arena of `resolution`.
    pub fn lower_program(
        program: &ast::Program,
        resolution: &'a mut Resolution,
        types: &'a TypeCheckResults,
        names: &'a mut NameGenerator,
    ) -> Program {
        let mut context = Self {
            resolution,
            types,
            names,
        };

        let mut globals = Vec::new();
        let mut functions = Vec::new();

        for item in &program.items {
            match &item.kind {
                ItemKind::GlobalDeclaration(declaration) => {
                    globals.extend(context.declared_symbols(declaration));
                }
                ItemKind::FunctionPrototype(_) => {}
                ItemKind::FunctionDefinition(function) => {
                    functions.push(context.lower_function_definition(function));
                }
            }
        }

        log::debug!(
            "lowered {} globals and {} functions",
            globals.len(),
            functions.len()
        );

        Program { globals, functions }
    }

    fn symbol_of(&self, identifier: &Identifier) -> SymbolId {
        self.resolution.symbol_of(identifier)
    }

    fn type_of(&self, expression: &ast::Expression) -> Type {
        self.types.type_of(expression).clone()
    }

    fn declared_symbols<'d>(
        &'d self,
        declaration: &'d Declaration,
    ) -> impl Iterator<Item = SymbolId> + 'd {
        declaration
            .declarators
            .iter()
            .map(|declarator| self.symbol_of(&declarator.name))
    }

    fn emit(&mut self, kind: StatementKind, into: &mut CompoundStatement) {
        let statement = self.names.statement(kind);
        into.statements.push(statement);
    }

    fn temporary(&mut self, ty: Type, into: &mut CompoundStatement) -> SymbolId {
        let name = self.names.fresh("tmp");
        let symbol = self.resolution.scopes.add_temporary(name, ty);

        into.declarations.push(symbol);
        symbol
    }

    /// Stores `value` into a fresh temporary
    fn materialize(
        &mut self,
        value: Expression,
        ty: Type,
        into: &mut CompoundStatement,
    ) -> SymbolId {
        let destination = self.temporary(ty, into);

        self.emit(StatementKind::Assign { destination, value }, into);

        destination
    }

    /// Reuses plain variables and materializes anything else
    fn to_variable(
        &mut self,
        value: Expression,
        ty: Type,
        into: &mut CompoundStatement,
    ) -> SymbolId {
        match value {
            Expression::Variable(symbol) => symbol,
            value => self.materialize(value, ty, into),
        }
    }

    /// Reduces a value to a variable or a literal
    fn to_atom(
        &mut self,
        value: Expression,
        ty: Type,
        into: &mut CompoundStatement,
    ) -> Expression {
        match value {
            Expression::Variable(_) | Expression::Number(_) => value,
            value => Expression::Variable(self.materialize(value, ty, into)),
        }
    }

    fn lower_function_definition(
        &mut self,
        function: &ast::FunctionDefinition,
    ) -> FunctionDefinition {
        let symbol = self.symbol_of(&function.signature.name);

        let parameters = function
            .signature
            .parameters
            .iter()
            .map(|parameter| self.symbol_of(&parameter.name))
            .collect();

        FunctionDefinition {
            symbol,
            name: function.signature.name.name,
            parameters,
            body: self.lower_block(&function.body),
        }
    }

    fn lower_block(&mut self, block: &Block) -> CompoundStatement {
        let mut compound = CompoundStatement::default();

        for declaration in &block.declarations {
            let symbols = self.declared_symbols(declaration).collect::<Vec<_>>();
            compound.declarations.extend(symbols);
        }

        for statement in &block.statements {
            self.lower_statement(statement, &mut compound);
        }

        compound
    }

    /// Emits `branch condition; then...; else...` with fresh labels. An empty
    /// else branch falls through to the end label.
    fn lower_branch(
        &mut self,
        condition: SymbolId,
        then_branch: CompoundStatement,
        else_branch: Option<CompoundStatement>,
        into: &mut CompoundStatement,
    ) {
        let end = self.names.label("if.end");

        let Some(else_branch) = else_branch else {
            self.emit(
                StatementKind::Branch {
                    condition,
                    positive: None,
                    negative: Some(end),
                },
                into,
            );
            self.emit(StatementKind::Compound(then_branch), into);
            self.emit(StatementKind::Label(end), into);
            return;
        };

        let positive = self.names.label("if.true");
        let negative = self.names.label("if.false");

        self.emit(
            StatementKind::Branch {
                condition,
                positive: Some(positive),
                negative: Some(negative),
            },
            into,
        );
        self.emit(StatementKind::Label(positive), into);
        self.emit(StatementKind::Compound(then_branch), into);
        self.emit(StatementKind::Goto(end), into);
        self.emit(StatementKind::Label(negative), into);
        self.emit(StatementKind::Compound(else_branch), into);
        self.emit(StatementKind::Label(end), into);
    }

    /// `begin: condition; branch to end if zero; body; goto begin; end:`
    fn lower_loop(
        &mut self,
        condition: Option<&ast::Expression>,
        body: CompoundStatement,
        into: &mut CompoundStatement,
    ) {
        let begin = self.names.label("while.begin");
        let end = self.names.label("while.end");

        self.emit(StatementKind::Label(begin), into);

        let value = match condition {
            Some(condition) => self.lower_expression(condition, into),
            None => Expression::Number(1),
        };
        let condition = self.materialize(value, Type::int(), into);

        self.emit(
            StatementKind::Branch {
                condition,
                positive: None,
                negative: Some(end),
            },
            into,
        );
        self.emit(StatementKind::Compound(body), into);
        self.emit(StatementKind::Goto(begin), into);
        self.emit(StatementKind::Label(end), into);
    }

    fn lower_nested(&mut self, statement: &ast::Statement) -> CompoundStatement {
        let mut compound = CompoundStatement::default();
        self.lower_statement(statement, &mut compound);
        compound
    }

    fn lower_statement(&mut self, statement: &ast::Statement, into: &mut CompoundStatement) {
        match &statement.kind {
            AstStatementKind::Block(block) => {
                let compound = self.lower_block(block);
                self.emit(StatementKind::Compound(compound), into);
            }
            AstStatementKind::Empty => {}
            AstStatementKind::Expression(expression) => {
                // Only the side effects matter
                self.lower_expression(expression, into);
            }
            AstStatementKind::Assignment(assignment) => self.lower_assignment(assignment, into),
            AstStatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let value = self.lower_expression(condition, into);
                let condition = self.materialize(value, Type::int(), into);

                let then_branch = self.lower_nested(then_branch);
                let else_branch = else_branch.as_ref().map(|s| self.lower_nested(s));

                self.lower_branch(condition, then_branch, else_branch, into);
            }
            AstStatementKind::While { condition, body } => {
                let body = self.lower_nested(body);
                self.lower_loop(Some(condition), body, into);
            }
            AstStatementKind::For {
                initializer,
                condition,
                update,
                body,
            } => {
                // { init; while (cond) { body; update } }
                let mut compound = CompoundStatement::default();

                if let Some(initializer) = initializer {
                    self.lower_statement(initializer, &mut compound);
                }

                let mut loop_body = self.lower_nested(body);
                if let Some(update) = update {
                    self.lower_statement(update, &mut loop_body);
                }

                self.lower_loop(condition.as_deref(), loop_body, &mut compound);
                self.emit(StatementKind::Compound(compound), into);
            }
            AstStatementKind::Return(value) => {
                let value = value.as_ref().map(|value| {
                    let ty = self.type_of(value);
                    let lowered = self.lower_expression(value, into);
                    self.materialize(lowered, ty, into)
                });

                self.emit(StatementKind::Return(value), into);
            }
        }
    }

    fn lower_assignment(&mut self, assignment: &ast::Assignment, into: &mut CompoundStatement) {
        let target = &assignment.target;
        let value = &assignment.value;

        match &target.kind {
            ExpressionKind::Identifier(identifier) => {
                let destination = self.symbol_of(identifier);

                // var = *ptr reads straight into the variable
                if let Some(address) = self.lower_load_address(value, into) {
                    self.emit(
                        StatementKind::Read {
                            destination,
                            address,
                        },
                        into,
                    );
                    return;
                }

                let value = self.lower_expression(value, into);
                self.emit(StatementKind::Assign { destination, value }, into);
            }
            ExpressionKind::Unary {
                operator: UnaryOperator::Deref,
                ..
            }
            | ExpressionKind::Index { .. } => {
                let Some(address) = self.lower_load_address(target, into) else {
                    unreachable!("dereference target has no address");
                };

                let ty = self.type_of(value);
                let lowered = self.lower_expression(value, into);
                let value = self.materialize(lowered, ty, into);

                self.emit(StatementKind::Write { address, value }, into);
            }
            _ => unreachable!("assignment to a non-lvalue passed type checking"),
        }
    }

    /// For `*e` and `a[i]`, lowers the address being loaded from into a
    /// variable. Returns `None` for every other expression.
    fn lower_load_address(
        &mut self,
        expression: &ast::Expression,
        into: &mut CompoundStatement,
    ) -> Option<SymbolId> {
        let address = match &expression.kind {
            ExpressionKind::Unary {
                operator: UnaryOperator::Deref,
                operand,
            } => {
                let value = self.lower_expression(operand, into);
                self.to_variable(value, self.type_of(operand), into)
            }
            ExpressionKind::Index { base, index } => {
                let value = self.lower_pointer_arithmetic(BinaryOperator::Add, base, index, into);
                self.to_variable(value, Type::pointer(self.type_of(expression)), into)
            }
            _ => return None,
        };

        Some(address)
    }

    /// Lowers `lhs op rhs` where one side may be a pointer, scaling the
    /// integer side by the size of the pointed-to type
    fn lower_pointer_arithmetic(
        &mut self,
        operator: BinaryOperator,
        lhs: &ast::Expression,
        rhs: &ast::Expression,
        into: &mut CompoundStatement,
    ) -> Expression {
        let lhs_type = self.type_of(lhs);
        let rhs_type = self.type_of(rhs);

        let lhs_value = self.lower_expression(lhs, into);
        let mut lhs_value = self.to_atom(lhs_value, lhs_type.clone(), into);
        let rhs_value = self.lower_expression(rhs, into);
        let mut rhs_value = self.to_atom(rhs_value, rhs_type.clone(), into);

        if let Some(pointee) = lhs_type.pointee() {
            let scaled = Expression::binary(
                BinaryOperator::Multiply,
                rhs_value,
                Expression::Number(pointee.size() as i32),
            );
            rhs_value = Expression::Variable(self.materialize(scaled, Type::int(), into));
        } else if let Some(pointee) = rhs_type.pointee() {
            let scaled = Expression::binary(
                BinaryOperator::Multiply,
                lhs_value,
                Expression::Number(pointee.size() as i32),
            );
            lhs_value = Expression::Variable(self.materialize(scaled, Type::int(), into));
        }

        Expression::binary(operator, lhs_value, rhs_value)
    }

    /// Lowers `&&` and `||` to nested branches that store 1 or 0 into a fresh temporary
    fn lower_logical(
        &mut self,
        operator: BinaryOperatorKind,
        lhs: &ast::Expression,
        rhs: &ast::Expression,
        into: &mut CompoundStatement,
    ) -> Expression {
        let result = self.temporary(Type::int(), into);

        let value = self.lower_expression(lhs, into);
        let lhs_condition = self.materialize(value, Type::int(), into);

        // rhs is only evaluated when it can change the result
        let mut inner = CompoundStatement::default();
        let value = self.lower_expression(rhs, &mut inner);
        let rhs_condition = self.materialize(value, Type::int(), &mut inner);

        let set_true = self.assign_constant(result, 1);
        let set_false = self.assign_constant(result, 0);
        self.lower_branch(rhs_condition, set_true, Some(set_false), &mut inner);

        let short_circuit = match operator {
            BinaryOperatorKind::LogicalAnd => self.assign_constant(result, 0),
            BinaryOperatorKind::LogicalOr => self.assign_constant(result, 1),
            _ => unreachable!("{operator} is not a logical operator"),
        };

        match operator {
            BinaryOperatorKind::LogicalAnd => {
                self.lower_branch(lhs_condition, inner, Some(short_circuit), into)
            }
            _ => self.lower_branch(lhs_condition, short_circuit, Some(inner), into),
        }

        Expression::Variable(result)
    }

    fn assign_constant(&mut self, destination: SymbolId, value: i32) -> CompoundStatement {
        let mut compound = CompoundStatement::default();

        self.emit(
            StatementKind::Assign {
                destination,
                value: Expression::Number(value),
            },
            &mut compound,
        );

        compound
    }

    fn lower_call(
        &mut self,
        expression: &ast::Expression,
        function: &Identifier,
        arguments: &[ast::Expression],
        into: &mut CompoundStatement,
    ) -> Expression {
        let mut argument_symbols = Vec::with_capacity(arguments.len());

        for argument in arguments {
            let ty = self.type_of(argument);
            let value = self.lower_expression(argument, into);
            argument_symbols.push(self.materialize(value, ty, into));
        }

        let symbol = self.symbol_of(function);

        if let Some(call) = self.syscall_for(symbol) {
            let [argument] = argument_symbols[..] else {
                unreachable!("system call `{call}` takes exactly one argument");
            };

            self.emit(StatementKind::Syscall { call, argument }, into);
            return Expression::Number(0);
        }

        let return_type = self.type_of(expression);
        let destination = match return_type.is_void() {
            true => None,
            false => Some(self.temporary(return_type, into)),
        };

        self.emit(
            StatementKind::Call {
                destination,
                function: symbol,
                arguments: argument_symbols,
            },
            into,
        );

        match destination {
            Some(destination) => Expression::Variable(destination),
            // Void results are never used as values
            None => Expression::Number(0),
        }
    }

    /// Prelude functions the program never defines become system calls
    fn syscall_for(&self, symbol: SymbolId) -> Option<Syscall> {
        let scopes = &self.resolution.scopes;
        let name = scopes.symbol(symbol).name;

        let call = Syscall::from_str(name.value()).ok()?;
        let current = scopes.resolve(scopes.global(), name)?;

        (scopes.symbol(current).kind == SymbolKind::Prototype).then_some(call)
    }

    /// Lowers an expression, appending everything that must run first to
    /// `into`
    pub fn lower_expression(
        &mut self,
        expression: &ast::Expression,
        into: &mut CompoundStatement,
    ) -> Expression {
        match &expression.kind {
            ExpressionKind::Number(value) => Expression::Number(*value),
            ExpressionKind::Identifier(identifier) => {
                Expression::Variable(self.symbol_of(identifier))
            }
            ExpressionKind::Call {
                function,
                arguments,
            } => self.lower_call(expression, function, arguments, into),
            ExpressionKind::Unary {
                operator: UnaryOperator::Negate,
                operand,
            } => {
                let value = self.lower_expression(operand, into);
                let value = self.to_atom(value, Type::int(), into);

                Expression::binary(BinaryOperator::Subtract, Expression::Number(0), value)
            }
            ExpressionKind::Unary {
                operator: UnaryOperator::AddressOf,
                operand,
            } => match &operand.kind {
                ExpressionKind::Identifier(identifier) => {
                    Expression::AddressOf(self.symbol_of(identifier))
                }
                // &*e is e
                ExpressionKind::Unary {
                    operator: UnaryOperator::Deref,
                    operand: inner,
                } => self.lower_expression(inner, into),
                ExpressionKind::Index { base, index } => {
                    self.lower_pointer_arithmetic(BinaryOperator::Add, base, index, into)
                }
                _ => unreachable!("address of an rvalue passed type checking"),
            },
            ExpressionKind::Unary {
                operator: UnaryOperator::Deref,
                ..
            }
            | ExpressionKind::Index { .. } => {
                let Some(address) = self.lower_load_address(expression, into) else {
                    unreachable!("memory read without an address");
                };

                let destination = self.temporary(self.type_of(expression), into);
                self.emit(
                    StatementKind::Read {
                        destination,
                        address,
                    },
                    into,
                );

                Expression::Variable(destination)
            }
            ExpressionKind::Binary { lhs, operator, rhs } => {
                let operator = match operator.kind {
                    BinaryOperatorKind::LogicalAnd | BinaryOperatorKind::LogicalOr => {
                        return self.lower_logical(operator.kind, lhs, rhs, into);
                    }
                    BinaryOperatorKind::Add => BinaryOperator::Add,
                    BinaryOperatorKind::Subtract => BinaryOperator::Subtract,
                    BinaryOperatorKind::Multiply => BinaryOperator::Multiply,
                    BinaryOperatorKind::Divide => BinaryOperator::Divide,
                    BinaryOperatorKind::LessThan => BinaryOperator::LessThan,
                    BinaryOperatorKind::LessThanOrEqualTo => BinaryOperator::LessThanOrEqualTo,
                    BinaryOperatorKind::GreaterThan => BinaryOperator::GreaterThan,
                    BinaryOperatorKind::GreaterThanOrEqualTo => {
                        BinaryOperator::GreaterThanOrEqualTo
                    }
                    BinaryOperatorKind::Equals => BinaryOperator::Equals,
                    BinaryOperatorKind::NotEquals => BinaryOperator::NotEquals,
                };

                if matches!(operator, BinaryOperator::Add | BinaryOperator::Subtract) {
                    return self.lower_pointer_arithmetic(operator, lhs, rhs, into);
                }

                let lhs_value = self.lower_expression(lhs, into);
                let lhs_value = self.to_atom(lhs_value, self.type_of(lhs), into);
                let rhs_value = self.lower_expression(rhs, into);
                let rhs_value = self.to_atom(rhs_value, self.type_of(rhs), into);

                Expression::binary(operator, lhs_value, rhs_value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ir::{pretty_print::render_function, tests::lower_source as lower};

    fn lines(source: &str, function: usize) -> Vec<String> {
        let (ir, resolution) = lower(source);

        strip_ansi_escapes::strip_str(render_function(
            &ir.functions[function],
            &resolution.scopes,
        ))
        .lines()
        .map(|line| line.trim().to_owned())
        .collect()
    }

    #[test]
    fn array_store_scales_index_then_writes() {
        let lines = lines("int a[4]; int main() { a[1] = 5; return 0; }", 0);

        let scale = lines
            .iter()
            .position(|l| l == "tmp.0 = 1 * 4")
            .expect("index is scaled by the element size");
        let address = lines
            .iter()
            .position(|l| l == "tmp.1 = a + tmp.0")
            .expect("address is computed from the array base");
        let store = lines
            .iter()
            .position(|l| l == "*tmp.1 = tmp.2")
            .expect("value is stored through the address");

        assert!(scale < address && address < store);
    }

    #[test]
    fn read_into_variable_and_write_through_pointer() {
        let lines = lines(
            "int main() { int x; int *p; p = &x; *p = 3; x = *p; return x; }",
            0,
        );

        assert!(lines.contains(&"p = &x".to_owned()));
        assert!(lines.contains(&"*p = tmp.0".to_owned()));
        assert!(lines.contains(&"x = *p".to_owned()));
    }

    #[test]
    fn short_circuit_skips_rhs() {
        let (ir, _) = lower("int f() { return 1; } int main() { int x; x = 0 && f(); return x; }");
        let main = &ir.functions[1];

        let flat = main.body.flatten();
        let call = flat
            .iter()
            .position(|s| matches!(s.kind, StatementKind::Call { .. }))
            .expect("rhs call is lowered");
        let first_branch = flat
            .iter()
            .position(|s| matches!(s.kind, StatementKind::Branch { .. }))
            .expect("lhs is tested first");

        assert!(first_branch < call);
    }

    #[test]
    fn while_condition_is_reevaluated_each_iteration() {
        let lines = lines(
            "int main() { int i; i = 0; while (i < 3) i = i + 1; return i; }",
            0,
        );

        let begin = lines.iter().position(|l| l == "while.begin.0:").unwrap();
        let test = lines.iter().position(|l| l.contains("i < 3")).unwrap();
        let back = lines.iter().position(|l| l == "goto while.begin.0").unwrap();
        let end = lines.iter().position(|l| l == "while.end.0:").unwrap();

        assert!(begin < test && test < back && back < end);
    }

    #[test]
    fn print_becomes_syscall_unless_defined() {
        let (ir, _) = lower("int main() { print(1); putchar(10); return 0; }");
        let flat = ir.functions[0].body.flatten();

        let calls = flat
            .iter()
            .filter_map(|s| match s.kind {
                StatementKind::Syscall { call, .. } => Some(call),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(calls, vec![Syscall::Print, Syscall::PutChar]);

        let (ir, _) = lower("void print(int value) { } int main() { print(1); return 0; }");
        let flat = ir.functions[1].body.flatten();
        assert!(flat
            .iter()
            .any(|s| matches!(s.kind, StatementKind::Call { destination: None, .. })));
    }

    #[test]
    fn return_value_is_materialized() {
        let lines = lines("int main() { return 1 + 2; }", 0);

        assert_eq!(lines[1], "tmp.0 = 1 + 2");
        assert_eq!(lines[2], "return tmp.0");
    }
}
