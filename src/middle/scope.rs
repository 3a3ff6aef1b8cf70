//! Lexical scopes and the symbols declared in them.
//!
//! Scopes live in an arena and only know their parent, so the tree can be
//! walked upwards from any scope without reference cycles. Symbols live in a
//! second arena and are referred to by [`SymbolId`] everywhere after
//! resolution.

use std::collections::BTreeMap;

use strum::Display;

use crate::{
    error::ErrorKind,
    frontend::intern::Name,
    index::{Index, IndexVec, simple_index},
    middle::ty::Type,
};

simple_index! {
    /// Index of a scope in a [`ScopeTree`]
    pub struct ScopeId;
}

simple_index! {
    /// Stable identity of a declared name
    pub struct SymbolId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SymbolKind {
    Variable,
    Parameter,
    Function,
    Prototype,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: Name,
    pub kind: SymbolKind,
    pub ty: Type,
    /// Nesting level of the declaring scope. 0 is the global scope.
    pub level: usize,
}

impl Symbol {
    pub fn is_global(&self) -> bool {
        self.level == 0
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.kind, SymbolKind::Function | SymbolKind::Prototype)
    }
}

#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub level: usize,
    table: BTreeMap<Name, SymbolId>,
}

#[derive(Debug)]
pub struct ScopeTree {
    scopes: IndexVec<ScopeId, Scope>,
    symbols: IndexVec<SymbolId, Symbol>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    /// Creates a tree containing only the global scope
    pub fn new() -> Self {
        let mut scopes = IndexVec::new();

        scopes.push(Scope {
            parent: None,
            level: 0,
            table: BTreeMap::new(),
        });

        Self {
            scopes,
            symbols: IndexVec::new(),
        }
    }

    pub fn global(&self) -> ScopeId {
        ScopeId::new(0)
    }

    pub fn create_child(&mut self, parent: ScopeId) -> ScopeId {
        let level = self.scopes[parent].level + 1;

        self.scopes.push(Scope {
            parent: Some(parent),
            level,
            table: BTreeMap::new(),
        })
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols.enumerate()
    }

    /// Declares `name` in `scope`.
    ///
    /// A prototype may be repeated, and may be followed or preceded by the
    /// matching definition, as long as every declaration has the same
    /// signature. A definition replaces an earlier prototype in the table.
    pub fn register(
        &mut self,
        scope: ScopeId,
        name: Name,
        kind: SymbolKind,
        ty: Type,
    ) -> Result<SymbolId, ErrorKind> {
        let level = self.scopes[scope].level;

        let Some(&existing_id) = self.scopes[scope].table.get(&name) else {
            let id = self.symbols.push(Symbol {
                name,
                kind,
                ty,
                level,
            });
            self.scopes[scope].table.insert(name, id);

            return Ok(id);
        };

        let existing = &self.symbols[existing_id];

        match (existing.kind, kind) {
            (SymbolKind::Prototype, SymbolKind::Prototype)
            | (SymbolKind::Prototype, SymbolKind::Function)
            | (SymbolKind::Function, SymbolKind::Prototype) => {
                if existing.ty != ty {
                    return Err(ErrorKind::PrototypeMismatch {
                        name: name.to_string(),
                        previous: existing.ty.signature(),
                        current: ty.signature(),
                    });
                }

                if kind != SymbolKind::Function {
                    return Ok(existing_id);
                }

                let id = self.symbols.push(Symbol {
                    name,
                    kind,
                    ty,
                    level,
                });
                self.scopes[scope].table.insert(name, id);

                Ok(id)
            }
            (SymbolKind::Function | SymbolKind::Prototype, SymbolKind::Variable) if level == 0 => {
                Err(ErrorKind::FunctionAlreadyDefined {
                    name: name.to_string(),
                })
            }
            _ => Err(ErrorKind::DuplicateDefinition {
                name: name.to_string(),
            }),
        }
    }

    /// Finds the nearest declaration of `name`, starting at `scope` and
    /// walking towards the global scope
    pub fn resolve(&self, scope: ScopeId, name: Name) -> Option<SymbolId> {
        let mut current = Some(scope);

        while let Some(id) = current {
            let scope = &self.scopes[id];

            if let Some(symbol) = scope.table.get(&name) {
                return Some(*symbol);
            }

            current = scope.parent;
        }

        None
    }

    /// Adds a compiler generated local which is not visible to name lookup
    pub fn add_temporary(&mut self, name: Name, ty: Type) -> SymbolId {
        self.symbols.push(Symbol {
            name,
            kind: SymbolKind::Variable,
            ty,
            level: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_function() -> Type {
        Type::function(Type::int(), vec![Type::int()])
    }

    #[test]
    fn inner_declarations_shadow_outer_ones() {
        let mut tree = ScopeTree::new();
        let name = Name::new("x");

        let outer = tree
            .register(tree.global(), name, SymbolKind::Variable, Type::int())
            .unwrap();

        let mut scope = tree.global();
        let mut innermost = outer;

        for depth in 1..=4 {
            scope = tree.create_child(scope);
            assert_eq!(tree.scope(scope).level, depth);
            assert_eq!(tree.resolve(scope, name), Some(innermost));

            innermost = tree
                .register(scope, name, SymbolKind::Variable, Type::int())
                .unwrap();
            assert_eq!(tree.resolve(scope, name), Some(innermost));
            assert_eq!(tree.symbol(innermost).level, depth);
        }

        assert_eq!(tree.resolve(tree.global(), name), Some(outer));
        assert_eq!(tree.resolve(scope, Name::new("missing")), None);
    }

    #[test]
    fn duplicate_variables_are_rejected() {
        let mut tree = ScopeTree::new();
        let scope = tree.create_child(tree.global());
        let name = Name::new("a");

        tree.register(scope, name, SymbolKind::Variable, Type::int())
            .unwrap();

        assert_eq!(
            tree.register(scope, name, SymbolKind::Variable, Type::int()),
            Err(ErrorKind::DuplicateDefinition { name: "a".into() })
        );
    }

    #[test]
    fn matching_prototypes_coexist_with_definition() {
        let mut tree = ScopeTree::new();
        let global = tree.global();
        let name = Name::new("f");

        let first = tree
            .register(global, name, SymbolKind::Prototype, int_function())
            .unwrap();
        let second = tree
            .register(global, name, SymbolKind::Prototype, int_function())
            .unwrap();
        assert_eq!(first, second);

        let definition = tree
            .register(global, name, SymbolKind::Function, int_function())
            .unwrap();
        assert_ne!(definition, first);
        assert_eq!(tree.resolve(global, name), Some(definition));

        let after = tree
            .register(global, name, SymbolKind::Prototype, int_function())
            .unwrap();
        assert_eq!(after, definition);

        assert!(matches!(
            tree.register(global, name, SymbolKind::Function, int_function()),
            Err(ErrorKind::DuplicateDefinition { .. })
        ));
    }

    #[test]
    fn mismatched_prototype_is_rejected() {
        let mut tree = ScopeTree::new();
        let global = tree.global();
        let name = Name::new("g");

        tree.register(global, name, SymbolKind::Prototype, int_function())
            .unwrap();

        let error = tree
            .register(
                global,
                name,
                SymbolKind::Function,
                Type::function(Type::void(), vec![Type::int()]),
            )
            .unwrap_err();

        assert_eq!(
            error,
            ErrorKind::PrototypeMismatch {
                name: "g".into(),
                previous: "(int) -> int".into(),
                current: "(int) -> void".into(),
            }
        );
    }

    #[test]
    fn global_variable_cannot_reuse_function_name() {
        let mut tree = ScopeTree::new();
        let global = tree.global();
        let name = Name::new("h");

        tree.register(global, name, SymbolKind::Function, int_function())
            .unwrap();

        assert_eq!(
            tree.register(global, name, SymbolKind::Variable, Type::int()),
            Err(ErrorKind::FunctionAlreadyDefined { name: "h".into() })
        );
    }

    #[test]
    fn temporaries_are_not_visible_to_lookup() {
        let mut tree = ScopeTree::new();
        let name = Name::new("tmp.0");

        let id = tree.add_temporary(name, Type::int());

        assert_eq!(tree.symbol(id).name, name);
        assert!(!tree.symbol(id).is_global());
        assert_eq!(tree.resolve(tree.global(), name), None);
    }
}
