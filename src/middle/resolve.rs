use std::collections::BTreeMap;

use crate::{
    error::{Diagnostic, ErrorKind},
    frontend::ast::{
        Block, Declaration, Declarator, Expression, ExpressionKind, FunctionDefinition,
        FunctionSignature, Identifier, ItemKind, NodeId, Program, Statement, StatementKind,
    },
    middle::{
        scope::{ScopeId, ScopeTree, SymbolId, SymbolKind},
        ty::{MAX_STORAGE_SIZE, Type, WORD_SIZE},
    },
};

/// The result of name resolution: the scope tree and a side table from every
/// identifier node (declarations and uses) to the symbol it names
#[derive(Debug)]
pub struct Resolution {
    pub scopes: ScopeTree,
    pub symbols: BTreeMap<NodeId, SymbolId>,
}

impl Resolution {
    /// The symbol an identifier resolved to. Only valid on programs that
    /// resolved without errors.
    pub fn symbol_of(&self, identifier: &Identifier) -> SymbolId {
        match self.symbols.get(&identifier.id) {
            Some(symbol) => *symbol,
            None => unreachable!("identifier `{}` was never resolved", identifier.name),
        }
    }
}

/// Program name resolver
///
/// Registers every declaration in the scope it belongs to and binds every
/// identifier use to its nearest enclosing declaration. All errors are
/// collected so they can be reported together.
#[derive(Debug)]
pub struct Resolver {
    scopes: ScopeTree,
    symbols: BTreeMap<NodeId, SymbolId>,
    errors: Vec<Diagnostic>,
    /// Bytes declared at global scope so far
    global_storage: u32,
    /// Bytes declared by the parameters and locals of the current function.
    /// Sibling blocks are summed, which overestimates the frame.
    frame_storage: u32,
}

impl Resolver {
    /// Resolves all names in a program. Items are processed in order, so a
    /// function may only be called after it has been declared.
    pub fn resolve_names(program: &Program) -> Result<Resolution, Vec<Diagnostic>> {
        let mut resolver = Self {
            scopes: ScopeTree::new(),
            symbols: BTreeMap::new(),
            errors: Vec::new(),
            global_storage: 0,
            frame_storage: 0,
        };

        let global = resolver.scopes.global();

        for item in &program.items {
            match &item.kind {
                ItemKind::GlobalDeclaration(declaration) => {
                    resolver.resolve_declaration(global, declaration)
                }
                ItemKind::FunctionPrototype(signature) => {
                    resolver.bind_signature(signature, SymbolKind::Prototype);
                }
                ItemKind::FunctionDefinition(function) => {
                    resolver.resolve_function_definition(function)
                }
            }
        }

        log::debug!(
            "resolved {} identifiers with {} errors",
            resolver.symbols.len(),
            resolver.errors.len()
        );

        if !resolver.errors.is_empty() {
            return Err(resolver.errors);
        }

        Ok(Resolution {
            scopes: resolver.scopes,
            symbols: resolver.symbols,
        })
    }

    fn report(&mut self, identifier: &Identifier, kind: ErrorKind) {
        self.errors.push(Diagnostic::new(identifier.span.position, kind));
    }

    fn bind(&mut self, scope: ScopeId, identifier: &Identifier, kind: SymbolKind, ty: Type) {
        match self.scopes.register(scope, identifier.name, kind, ty) {
            Ok(symbol) => {
                self.symbols.insert(identifier.id, symbol);
            }
            Err(error) => self.report(identifier, error),
        }
    }

    fn bind_signature(&mut self, signature: &FunctionSignature, kind: SymbolKind) {
        let global = self.scopes.global();
        let ty = signature_type(signature);

        self.bind(global, &signature.name, kind, ty);
    }

    fn resolve_function_definition(&mut self, function: &FunctionDefinition) {
        // Bound before the body so the function can call itself
        self.bind_signature(&function.signature, SymbolKind::Function);

        let parameter_scope = self.scopes.create_child(self.scopes.global());
        self.frame_storage = 0;

        for parameter in &function.signature.parameters {
            self.frame_storage = self.frame_storage.saturating_add(WORD_SIZE);
            let ty = Type::from_type_specifier(&parameter.ty);
            self.bind(parameter_scope, &parameter.name, SymbolKind::Parameter, ty);
        }

        let body_scope = self.scopes.create_child(parameter_scope);
        self.resolve_block_in(body_scope, &function.body);
    }

    fn resolve_declaration(&mut self, scope: ScopeId, declaration: &Declaration) {
        for declarator in &declaration.declarators {
            let ty = declarator_type(declaration, declarator);

            if !self.reserve_storage(scope, &ty) {
                self.report(
                    &declarator.name,
                    ErrorKind::StorageTooLarge {
                        name: declarator.name.name.to_string(),
                    },
                );
            }

            self.bind(scope, &declarator.name, SymbolKind::Variable, ty);
        }
    }

    /// Accounts for a declaration of type `ty` in `scope`. Returns false if
    /// the total storage of the globals or of the current frame would exceed
    /// [`MAX_STORAGE_SIZE`].
    fn reserve_storage(&mut self, scope: ScopeId, ty: &Type) -> bool {
        let storage = if scope == self.scopes.global() {
            &mut self.global_storage
        } else {
            &mut self.frame_storage
        };

        let total = ty
            .checked_size()
            .and_then(|size| storage.checked_add(size.max(WORD_SIZE)))
            .filter(|total| *total <= MAX_STORAGE_SIZE);

        match total {
            Some(total) => {
                *storage = total;
                true
            }
            None => false,
        }
    }

    fn resolve_block_in(&mut self, scope: ScopeId, block: &Block) {
        for declaration in &block.declarations {
            self.resolve_declaration(scope, declaration);
        }

        for statement in &block.statements {
            self.resolve_statement(scope, statement);
        }
    }

    fn resolve_statement(&mut self, scope: ScopeId, statement: &Statement) {
        match &statement.kind {
            StatementKind::Block(block) => {
                let child = self.scopes.create_child(scope);
                self.resolve_block_in(child, block);
            }
            StatementKind::Empty => {}
            StatementKind::Expression(expression) => self.resolve_expression(scope, expression),
            StatementKind::Assignment(assignment) => {
                self.resolve_expression(scope, &assignment.target);
                self.resolve_expression(scope, &assignment.value);
            }
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expression(scope, condition);
                self.resolve_statement(scope, then_branch);

                if let Some(else_branch) = else_branch {
                    self.resolve_statement(scope, else_branch);
                }
            }
            StatementKind::While { condition, body } => {
                self.resolve_expression(scope, condition);
                self.resolve_statement(scope, body);
            }
            StatementKind::For {
                initializer,
                condition,
                update,
                body,
            } => {
                if let Some(initializer) = initializer {
                    self.resolve_statement(scope, initializer);
                }
                if let Some(condition) = condition {
                    self.resolve_expression(scope, condition);
                }
                if let Some(update) = update {
                    self.resolve_statement(scope, update);
                }

                self.resolve_statement(scope, body);
            }
            StatementKind::Return(value) => {
                if let Some(value) = value {
                    self.resolve_expression(scope, value);
                }
            }
        }
    }

    fn resolve_identifier(&mut self, scope: ScopeId, identifier: &Identifier) {
        match self.scopes.resolve(scope, identifier.name) {
            Some(symbol) => {
                self.symbols.insert(identifier.id, symbol);
            }
            None => self.report(
                identifier,
                ErrorKind::UndefinedReference {
                    name: identifier.name.to_string(),
                },
            ),
        }
    }

    fn resolve_expression(&mut self, scope: ScopeId, expression: &Expression) {
        match &expression.kind {
            ExpressionKind::Number(_) => {}
            ExpressionKind::Identifier(identifier) => self.resolve_identifier(scope, identifier),
            ExpressionKind::Call {
                function,
                arguments,
            } => {
                self.resolve_identifier(scope, function);

                for argument in arguments {
                    self.resolve_expression(scope, argument);
                }
            }
            ExpressionKind::Unary { operand, .. } => self.resolve_expression(scope, operand),
            ExpressionKind::Binary { lhs, rhs, .. } => {
                self.resolve_expression(scope, lhs);
                self.resolve_expression(scope, rhs);
            }
            ExpressionKind::Index { base, index } => {
                self.resolve_expression(scope, base);
                self.resolve_expression(scope, index);
            }
        }
    }
}

/// The declared type of a function, ignoring parameter names
pub fn signature_type(signature: &FunctionSignature) -> Type {
    let parameters = signature
        .parameters
        .iter()
        .map(|p| Type::from_type_specifier(&p.ty))
        .collect::<Vec<_>>();

    Type::function(Type::from_type_specifier(&signature.return_type), parameters)
}

pub fn declarator_type(declaration: &Declaration, declarator: &Declarator) -> Type {
    let ty = Type::from_specifier(declaration.base, declarator.pointer_depth);

    match declarator.array_length {
        Some(length) => Type::array(ty, length),
        None => ty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{Position, SourceFile, parse_program};

    fn resolve(source: &str) -> Result<Resolution, Vec<Diagnostic>> {
        let program = parse_program(&SourceFile::from_memory(source)).unwrap();
        Resolver::resolve_names(&program)
    }

    #[test]
    fn duplicate_global_reports_second_declarator() {
        let errors = resolve("int a, a;").unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].position, Position::new(1, 8));
        assert!(matches!(
            errors[0].kind,
            ErrorKind::DuplicateDefinition { .. }
        ));
    }

    #[test]
    fn collects_every_error() {
        let errors = resolve(indoc::indoc! {"
            int f(int x);
            int f(int x) { return y; }
            void f(int x);
            int main() { int a; int a; return z; }
        "})
        .unwrap_err();

        let kinds = errors.iter().map(|e| &e.kind).collect::<Vec<_>>();

        assert_eq!(kinds.len(), 4);
        assert!(matches!(kinds[0], ErrorKind::UndefinedReference { name } if name == "y"));
        assert!(matches!(kinds[1], ErrorKind::PrototypeMismatch { .. }));
        assert!(matches!(kinds[2], ErrorKind::DuplicateDefinition { name } if name == "a"));
        assert!(matches!(kinds[3], ErrorKind::UndefinedReference { name } if name == "z"));
    }

    #[test]
    fn oversized_storage_is_rejected() {
        let errors =
            resolve("int a[2000000000];\nint main() { a[1] = 1; return 0; }").unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].position, Position::new(1, 5));
        assert!(matches!(&errors[0].kind, ErrorKind::StorageTooLarge { name } if name == "a"));

        // each array fits on its own, but not together
        let errors = resolve("int a[200000000];\nint b[200000000];\nint c;").unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].position, Position::new(2, 5));

        let errors = resolve(indoc::indoc! {"
            int main() {
                int x;
                { int big[300000000]; big[0] = 1; }
                return x;
            }
            int f(int n) { int y[200000000]; return n; }
        "})
        .unwrap_err();

        // frames are bounded per function
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].position, Position::new(3, 11));
    }

    #[test]
    fn identical_prototypes_are_accepted() {
        assert!(resolve("int f(int a); int f(int b); int f(int c) { return c; }").is_ok());
    }

    #[test]
    fn uses_resolve_to_innermost_declaration() {
        let source = SourceFile::from_memory(indoc::indoc! {"
            int x;
            int main() {
                int x;
                { int x; x = 1; }
                x = 2;
                return x;
            }
        "});
        let program = parse_program(&source).unwrap();
        let resolution = Resolver::resolve_names(&program).unwrap();

        let levels = resolution
            .symbols
            .values()
            .map(|id| resolution.scopes.symbol(*id))
            .filter(|symbol| symbol.name.value() == "x")
            .map(|symbol| symbol.level)
            .collect::<Vec<_>>();

        // declarations at levels 0, 2 and 3, then uses at 3, 2 and 2
        assert_eq!(levels, vec![0, 2, 3, 3, 2, 2]);
    }
}
