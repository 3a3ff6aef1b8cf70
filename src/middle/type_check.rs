//! Structural type checking of a resolved program.
//!
//! The checker walks items in order and stops at the first error. On success
//! it produces the (decayed) type of every expression node, which lowering
//! uses to scale pointer arithmetic.

use std::collections::BTreeMap;

use strum::Display;

use crate::{
    error::{Diagnostic, ErrorKind},
    frontend::{
        Position,
        ast::{
            Assignment, BinaryOperatorKind, Block, Declaration, Expression, ExpressionKind,
            FunctionDefinition, FunctionSignature, Identifier, ItemKind, NodeId, Program,
            Statement, StatementKind, UnaryOperator,
        },
    },
    middle::{
        resolve::{Resolution, signature_type},
        scope::Symbol,
        ty::{Type, TypeKind},
    },
};

/// A kind of place in the source code where two types are required to agree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TypeBoundary {
    /// Operands of a binary operator must fit the operator
    #[strum(to_string = "binary operation")]
    BinaryOperation,
    /// The operand of unary minus must be an int
    #[strum(to_string = "unary operation")]
    UnaryOperation,
    /// Sides of an assignment must have the same type
    #[strum(to_string = "assignment")]
    Assignment,
    /// Function argument type must match function parameter type
    #[strum(to_string = "function argument")]
    FunctionArgument,
    /// The returned value must match the declared return type
    #[strum(to_string = "return statement")]
    Return,
    /// Conditions of if, while and for may be anything but void
    #[strum(to_string = "condition")]
    Condition,
    /// Only int variables may have their address taken
    #[strum(to_string = "address-of operand")]
    AddressOf,
}

#[derive(Debug, Default)]
pub struct TypeCheckResults {
    /// Type of every expression node, after array decay
    pub expression_types: BTreeMap<NodeId, Type>,
}

impl TypeCheckResults {
    pub fn type_of(&self, expression: &Expression) -> &Type {
        match self.expression_types.get(&expression.id) {
            Some(ty) => ty,
            None => unreachable!("expression {:?} was never type checked", expression.id),
        }
    }
}

macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .unwrap_or("<unknown>")
    }};
}

macro_rules! report_error {
    ($position:expr, $kind:expr $(,)?) => {{
        #[cfg(feature = "error-backtrace")]
        log::debug!(
            "type error raised in {}::{} (at {}:{}:{})",
            module_path!(),
            function!(),
            file!(),
            line!(),
            column!()
        );

        return Err(Diagnostic::new($position, $kind))
    }};
}

type CheckResult<T> = Result<T, Diagnostic>;

#[derive(Debug)]
pub struct TypeChecker<'a> {
    resolution: &'a Resolution,
    results: TypeCheckResults,
    /// Declared return type of the function being checked
    return_type: Option<Type>,
}

impl<'a> TypeChecker<'a> {
    pub fn type_check_program(
        program: &Program,
        resolution: &'a Resolution,
    ) -> CheckResult<TypeCheckResults> {
        let mut checker = Self {
            resolution,
            results: TypeCheckResults::default(),
            return_type: None,
        };

        for item in &program.items {
            match &item.kind {
                ItemKind::GlobalDeclaration(declaration) => {
                    checker.check_declaration(declaration)?
                }
                ItemKind::FunctionPrototype(signature) => {
                    checker.check_signature(signature)?;
                }
                ItemKind::FunctionDefinition(function) => {
                    checker.check_function_definition(function)?
                }
            }
        }

        log::debug!(
            "type checked {} expressions",
            checker.results.expression_types.len()
        );

        Ok(checker.results)
    }

    fn symbol(&self, identifier: &Identifier) -> &'a Symbol {
        let resolution = self.resolution;
        resolution.scopes.symbol(resolution.symbol_of(identifier))
    }

    fn check_declared_type(&self, position: Position, ty: &Type) -> CheckResult<()> {
        if ty.misuses_void() {
            report_error!(position, ErrorKind::VoidMisuse { ty: ty.signature() });
        }

        Ok(())
    }

    fn check_signature(&mut self, signature: &FunctionSignature) -> CheckResult<Type> {
        let ty = signature_type(signature);
        self.check_declared_type(signature.name.span.position, &ty)?;

        Ok(ty)
    }

    fn check_declaration(&mut self, declaration: &Declaration) -> CheckResult<()> {
        for declarator in &declaration.declarators {
            let ty = &self.symbol(&declarator.name).ty;
            self.check_declared_type(declarator.name.span.position, ty)?;
        }

        Ok(())
    }

    fn check_function_definition(&mut self, function: &FunctionDefinition) -> CheckResult<()> {
        let ty = self.check_signature(&function.signature)?;

        let TypeKind::Function { return_type, .. } = &*ty else {
            unreachable!("function signature produced a non-function type");
        };

        self.return_type = Some(return_type.clone());
        self.check_block(&function.body)?;
        self.return_type = None;

        Ok(())
    }

    fn check_block(&mut self, block: &Block) -> CheckResult<()> {
        for declaration in &block.declarations {
            self.check_declaration(declaration)?;
        }

        for statement in &block.statements {
            self.check_statement(statement)?;
        }

        Ok(())
    }

    fn check_condition(&mut self, condition: &Expression) -> CheckResult<()> {
        let ty = self.check_expression(condition)?;

        if ty.is_void() {
            report_error!(
                condition.span.position,
                ErrorKind::TypeMismatch {
                    boundary: TypeBoundary::Condition,
                    expected: "int".into(),
                    actual: ty.signature(),
                },
            );
        }

        Ok(())
    }

    fn check_statement(&mut self, statement: &Statement) -> CheckResult<()> {
        match &statement.kind {
            StatementKind::Block(block) => self.check_block(block),
            StatementKind::Empty => Ok(()),
            StatementKind::Expression(expression) => {
                self.check_expression(expression)?;
                Ok(())
            }
            StatementKind::Assignment(assignment) => self.check_assignment(assignment),
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.check_condition(condition)?;
                self.check_statement(then_branch)?;

                if let Some(else_branch) = else_branch {
                    self.check_statement(else_branch)?;
                }

                Ok(())
            }
            StatementKind::While { condition, body } => {
                self.check_condition(condition)?;
                self.check_statement(body)
            }
            StatementKind::For {
                initializer,
                condition,
                update,
                body,
            } => {
                if let Some(initializer) = initializer {
                    self.check_statement(initializer)?;
                }
                if let Some(condition) = condition {
                    self.check_condition(condition)?;
                }
                if let Some(update) = update {
                    self.check_statement(update)?;
                }

                self.check_statement(body)
            }
            StatementKind::Return(value) => {
                let (actual, position) = match value {
                    Some(value) => (self.check_expression(value)?, value.span.position),
                    None => (Type::void(), statement.span.position),
                };

                let Some(expected) = self.return_type.clone() else {
                    unreachable!("return statement outside of a function body");
                };

                if actual != expected {
                    report_error!(
                        position,
                        ErrorKind::TypeMismatch {
                            boundary: TypeBoundary::Return,
                            expected: expected.signature(),
                            actual: actual.signature(),
                        },
                    );
                }

                Ok(())
            }
        }
    }

    fn check_assignment(&mut self, assignment: &Assignment) -> CheckResult<()> {
        let target = &assignment.target;

        let assignable = match &target.kind {
            ExpressionKind::Identifier(identifier) => {
                let symbol = self.symbol(identifier);
                !symbol.is_callable() && !symbol.ty.is_array() && !symbol.ty.is_void()
            }
            ExpressionKind::Unary {
                operator: UnaryOperator::Deref,
                ..
            }
            | ExpressionKind::Index { .. } => true,
            _ => false,
        };

        if !assignable {
            report_error!(target.span.position, ErrorKind::NotAssignable);
        }

        let target_type = self.check_expression(target)?;
        let value_type = self.check_expression(&assignment.value)?;

        if target_type != value_type {
            report_error!(
                assignment.value.span.position,
                ErrorKind::TypeMismatch {
                    boundary: TypeBoundary::Assignment,
                    expected: target_type.signature(),
                    actual: value_type.signature(),
                },
            );
        }

        Ok(())
    }

    fn check_expression(&mut self, expression: &Expression) -> CheckResult<Type> {
        let ty = self.compute_expression_type(expression)?;

        self.results
            .expression_types
            .insert(expression.id, ty.clone());

        Ok(ty)
    }

    fn compute_expression_type(&mut self, expression: &Expression) -> CheckResult<Type> {
        let position = expression.span.position;

        match &expression.kind {
            ExpressionKind::Number(_) => Ok(Type::int()),
            ExpressionKind::Identifier(identifier) => {
                let symbol = self.symbol(identifier);

                if symbol.is_callable() {
                    report_error!(
                        position,
                        ErrorKind::NotVariable {
                            name: identifier.name.to_string(),
                        },
                    );
                }

                Ok(symbol.ty.decay())
            }
            ExpressionKind::Call {
                function,
                arguments,
            } => self.check_call(position, function, arguments),
            ExpressionKind::Unary { operator, operand } => {
                self.check_unary_expression(position, *operator, operand)
            }
            ExpressionKind::Binary { lhs, operator, rhs } => {
                let lhs_type = self.check_expression(lhs)?;
                let rhs_type = self.check_expression(rhs)?;

                self.check_binary_operation(
                    operator.span.position,
                    operator.kind,
                    lhs_type,
                    rhs_type,
                )
            }
            ExpressionKind::Index { base, index } => {
                let base_type = self.check_expression(base)?;
                let index_type = self.check_expression(index)?;

                // a[i] is *(a + i)
                let address = self.check_binary_operation(
                    position,
                    BinaryOperatorKind::Add,
                    base_type,
                    index_type,
                )?;

                match address.pointee() {
                    Some(element) => Ok(element.clone()),
                    None => report_error!(
                        base.span.position,
                        ErrorKind::ExpectedPointer {
                            actual: address.signature(),
                        },
                    ),
                }
            }
        }
    }

    fn check_call(
        &mut self,
        position: Position,
        function: &Identifier,
        arguments: &[Expression],
    ) -> CheckResult<Type> {
        let symbol = self.symbol(function);

        let TypeKind::Function {
            parameters,
            return_type,
        } = &*symbol.ty
        else {
            report_error!(
                position,
                ErrorKind::NotFunction {
                    name: function.name.to_string(),
                },
            );
        };

        if parameters.len() != arguments.len() {
            report_error!(
                position,
                ErrorKind::ArgumentCountMismatch {
                    name: function.name.to_string(),
                    expected: parameters.len(),
                    actual: arguments.len(),
                },
            );
        }

        for (argument, parameter) in arguments.iter().zip(parameters.iter()) {
            let argument_type = self.check_expression(argument)?;

            if argument_type != *parameter {
                report_error!(
                    argument.span.position,
                    ErrorKind::TypeMismatch {
                        boundary: TypeBoundary::FunctionArgument,
                        expected: parameter.signature(),
                        actual: argument_type.signature(),
                    },
                );
            }
        }

        Ok(return_type.clone())
    }

    fn check_unary_expression(
        &mut self,
        position: Position,
        operator: UnaryOperator,
        operand: &Expression,
    ) -> CheckResult<Type> {
        match operator {
            UnaryOperator::Negate => {
                let ty = self.check_expression(operand)?;

                if !ty.is_int() {
                    report_error!(
                        position,
                        ErrorKind::TypeMismatch {
                            boundary: TypeBoundary::UnaryOperation,
                            expected: "int".into(),
                            actual: ty.signature(),
                        },
                    );
                }

                Ok(ty)
            }
            UnaryOperator::Deref => {
                let ty = self.check_expression(operand)?;

                match ty.pointee() {
                    Some(inner) => Ok(inner.clone()),
                    None => report_error!(
                        position,
                        ErrorKind::ExpectedPointer {
                            actual: ty.signature(),
                        },
                    ),
                }
            }
            UnaryOperator::AddressOf => match &operand.kind {
                ExpressionKind::Identifier(identifier) => {
                    self.check_expression(operand)?;

                    let declared = &self.symbol(identifier).ty;

                    if !declared.is_int() {
                        report_error!(
                            operand.span.position,
                            ErrorKind::TypeMismatch {
                                boundary: TypeBoundary::AddressOf,
                                expected: "int".into(),
                                actual: declared.signature(),
                            },
                        );
                    }

                    Ok(Type::pointer(Type::int()))
                }
                // &*e and &a[i] name a location without loading from it
                ExpressionKind::Unary {
                    operator: UnaryOperator::Deref,
                    ..
                }
                | ExpressionKind::Index { .. } => {
                    let ty = self.check_expression(operand)?;
                    Ok(Type::pointer(ty))
                }
                _ => report_error!(operand.span.position, ErrorKind::AddressOfRvalue),
            },
        }
    }

    fn check_binary_operation(
        &mut self,
        position: Position,
        operator: BinaryOperatorKind,
        lhs: Type,
        rhs: Type,
    ) -> CheckResult<Type> {
        let mismatch = |expected: &Type, actual: &Type| {
            Diagnostic::new(
                position,
                ErrorKind::TypeMismatch {
                    boundary: TypeBoundary::BinaryOperation,
                    expected: expected.signature(),
                    actual: actual.signature(),
                },
            )
        };

        if operator.is_logical() {
            if !lhs.is_int() {
                return Err(mismatch(&Type::int(), &lhs));
            }
            if !rhs.is_int() {
                return Err(mismatch(&Type::int(), &rhs));
            }

            return Ok(Type::int());
        }

        if !operator.is_arithmetic() {
            // Relational and equality operators compare values of one type
            if lhs.is_void() {
                return Err(mismatch(&Type::int(), &lhs));
            }
            if lhs != rhs {
                return Err(mismatch(&lhs, &rhs));
            }

            return Ok(Type::int());
        }

        if lhs.is_int() && rhs.is_int() {
            return Ok(Type::int());
        }

        match operator {
            BinaryOperatorKind::Add if lhs.pointee().is_some() && rhs.is_int() => Ok(lhs),
            BinaryOperatorKind::Add if lhs.is_int() && rhs.pointee().is_some() => Ok(rhs),
            BinaryOperatorKind::Subtract if lhs.pointee().is_some() && rhs.is_int() => Ok(lhs),
            _ if lhs.is_int() => Err(mismatch(&lhs, &rhs)),
            _ => Err(mismatch(&Type::int(), &lhs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frontend::{SourceFile, parse_program},
        middle::resolve::Resolver,
    };

    fn check(source: &str) -> CheckResult<TypeCheckResults> {
        let program = parse_program(&SourceFile::from_memory(source)).unwrap();
        let resolution = Resolver::resolve_names(&program).unwrap();
        TypeChecker::type_check_program(&program, &resolution)
    }

    fn error_kind(source: &str) -> ErrorKind {
        check(source).unwrap_err().kind
    }

    #[test]
    fn accepts_pointer_arithmetic_and_decay() {
        check(indoc::indoc! {"
            int a[4];
            int **pp;
            int main() {
                int *p;
                int x;
                p = a + 1;
                p = 2 + a;
                p = p - 1;
                pp = pp + x;
                x = a[3] + *p + **pp;
                p = &x;
                p = &a[2];
                p = &*p;
                a[0] = 5;
                *p = x;
                return x < 3 && p == a || *p != 0;
            }
        "})
        .unwrap();
    }

    #[test]
    fn rejects_pointer_plus_pointer() {
        assert!(matches!(
            error_kind("int main() { int *p; int *q; p = p + q; return 0; }"),
            ErrorKind::TypeMismatch {
                boundary: TypeBoundary::BinaryOperation,
                ..
            }
        ));
    }

    #[test]
    fn rejects_int_minus_pointer() {
        assert!(matches!(
            error_kind("int main() { int *p; int x; x = 1 - p; return 0; }"),
            ErrorKind::TypeMismatch { .. }
        ));
    }

    #[test]
    fn dereference_requires_pointer() {
        assert_eq!(
            error_kind("int main() { int x; x = *x; return 0; }"),
            ErrorKind::ExpectedPointer {
                actual: "int".into()
            }
        );
    }

    #[test]
    fn address_of_rules() {
        assert_eq!(
            error_kind("int main() { int *p; p = &(1 + 2); return 0; }"),
            ErrorKind::AddressOfRvalue
        );
        assert!(matches!(
            error_kind("int main() { int *p; int **q; q = &p; return 0; }"),
            ErrorKind::TypeMismatch {
                boundary: TypeBoundary::AddressOf,
                ..
            }
        ));
    }

    #[test]
    fn assignment_targets() {
        assert_eq!(
            error_kind("int a[3]; int main() { int *p; a = p; return 0; }"),
            ErrorKind::NotAssignable
        );
        assert_eq!(
            error_kind("int main() { int x; 1 = x; return 0; }"),
            ErrorKind::NotAssignable
        );
        assert_eq!(
            error_kind("int f() { return 0; } int main() { f = 1; return 0; }"),
            ErrorKind::NotAssignable
        );
        assert!(matches!(
            error_kind("int main() { int x; int *p; x = p; return 0; }"),
            ErrorKind::TypeMismatch {
                boundary: TypeBoundary::Assignment,
                ..
            }
        ));
    }

    #[test]
    fn call_rules() {
        assert_eq!(
            error_kind("int f(int a) { return a; } int main() { return f(1, 2); }"),
            ErrorKind::ArgumentCountMismatch {
                name: "f".into(),
                expected: 1,
                actual: 2
            }
        );
        assert_eq!(
            error_kind("int f(int *a) { return 0; } int main() { return f(1); }"),
            ErrorKind::TypeMismatch {
                boundary: TypeBoundary::FunctionArgument,
                expected: "int*".into(),
                actual: "int".into(),
            }
        );
        assert_eq!(
            error_kind("int x; int main() { return x(); }"),
            ErrorKind::NotFunction { name: "x".into() }
        );
        assert_eq!(
            error_kind("int f() { return 0; } int main() { int x; x = f + 1; return x; }"),
            ErrorKind::NotVariable { name: "f".into() }
        );
    }

    #[test]
    fn return_types_must_match() {
        assert!(matches!(
            error_kind("void f() { return 1; }"),
            ErrorKind::TypeMismatch {
                boundary: TypeBoundary::Return,
                ..
            }
        ));
        assert!(matches!(
            error_kind("int f() { return; }"),
            ErrorKind::TypeMismatch {
                boundary: TypeBoundary::Return,
                ..
            }
        ));
        check("void f() { return; } int *g(int *p) { return p; }").unwrap();
    }

    #[test]
    fn void_only_as_bare_type() {
        assert_eq!(
            error_kind("void *p;"),
            ErrorKind::VoidMisuse { ty: "void*".into() }
        );
        assert!(matches!(
            error_kind("int f(void *p);"),
            ErrorKind::VoidMisuse { .. }
        ));
        assert!(matches!(
            error_kind("int main() { if (print(1)) return 1; return 0; }"),
            ErrorKind::TypeMismatch {
                boundary: TypeBoundary::Condition,
                ..
            }
        ));
    }

    #[test]
    fn stops_at_first_error() {
        let error = check("int main() { int *p; p = 1; p = *p; return 0; }").unwrap_err();

        assert_eq!(error.position, Position::new(1, 26));
    }

    #[test]
    fn records_decayed_expression_types() {
        let source = SourceFile::from_memory("int a[2]; int main() { return *(a + 1); }");
        let program = parse_program(&source).unwrap();
        let resolution = Resolver::resolve_names(&program).unwrap();
        let results = TypeChecker::type_check_program(&program, &resolution).unwrap();

        let signatures = results
            .expression_types
            .values()
            .map(Type::signature)
            .collect::<Vec<_>>();

        assert!(signatures.contains(&"int*".to_string()));
        assert!(!signatures.iter().any(|s| s.contains('[')));
    }
}
