use std::rc::Rc;

use itertools::Itertools;
use strum::Display;

use crate::frontend::ast::{BaseType, TypeSpecifier};

/// Size in bytes of a machine word. Both `int` and pointers occupy one word.
pub const WORD_SIZE: u32 = 4;

/// Upper bound on the declared storage of all globals, and of the locals of
/// any one function. Leaves headroom below `i32::MAX` for compiler
/// temporaries so every `$gp` and `$fp` offset fits in a signed word.
pub const MAX_STORAGE_SIZE: u32 = 1 << 30;

/// Cheaply clonable handle to an immutable type. Types compare equal iff
/// their canonical signatures are equal.
#[derive(Clone)]
pub struct Type(Rc<TypeKind>);

#[derive(Debug, PartialEq, Eq)]
pub enum TypeKind {
    /// int, void
    Basic(BasicType),
    /// T*
    Pointer(Type),
    /// T[length]
    ///
    /// A fixed size allocation of T's which decays to a T* when used in an
    /// expression
    Array { ty: Type, length: u32 },
    /// (T, U) -> R
    Function {
        parameters: Rc<[Type]>,
        return_type: Type,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum BasicType {
    Int,
    Void,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn int() -> Self {
        Self::new(TypeKind::Basic(BasicType::Int))
    }

    pub fn void() -> Self {
        Self::new(TypeKind::Basic(BasicType::Void))
    }

    pub fn pointer(inner: Type) -> Self {
        Self::new(TypeKind::Pointer(inner))
    }

    pub fn array(inner: Type, length: u32) -> Self {
        Self::new(TypeKind::Array { ty: inner, length })
    }

    pub fn function(return_type: Type, parameters: impl Into<Rc<[Type]>>) -> Self {
        Self::new(TypeKind::Function {
            parameters: parameters.into(),
            return_type,
        })
    }

    /// Builds the type named by a base type and some number of `*`s
    pub fn from_specifier(base: BaseType, pointer_depth: usize) -> Self {
        let mut ty = match base {
            BaseType::Int => Self::int(),
            BaseType::Void => Self::void(),
        };

        for _ in 0..pointer_depth {
            ty = Self::pointer(ty);
        }

        ty
    }

    pub fn from_type_specifier(specifier: &TypeSpecifier) -> Self {
        Self::from_specifier(specifier.base, specifier.pointer_depth)
    }

    /// The canonical rendering of this type used for equality and
    /// compatibility checks, e.g. `int*[10]` or `(int, int*) -> void`
    pub fn signature(&self) -> String {
        match &*self.0 {
            TypeKind::Basic(basic) => basic.to_string(),
            TypeKind::Pointer(inner) => format!("{}*", inner.signature()),
            TypeKind::Array { ty, length } => format!("{}[{length}]", ty.signature()),
            TypeKind::Function {
                parameters,
                return_type,
            } => format!(
                "({}) -> {}",
                parameters.iter().map(Type::signature).join(", "),
                return_type.signature()
            ),
        }
    }

    /// Size in bytes of a value of this type, or `None` if it does not fit
    /// in a `u32`
    pub fn checked_size(&self) -> Option<u32> {
        match &*self.0 {
            TypeKind::Basic(BasicType::Int) => Some(WORD_SIZE),
            TypeKind::Basic(BasicType::Void) => Some(0),
            TypeKind::Pointer(_) => Some(WORD_SIZE),
            TypeKind::Array { ty, length } => ty.checked_size()?.checked_mul(*length),
            TypeKind::Function { .. } => Some(0),
        }
    }

    /// Size in bytes of a value of this type. Declarations are bounded by
    /// [`MAX_STORAGE_SIZE`] during name resolution, so this only saturates on
    /// types that were never declared.
    pub fn size(&self) -> u32 {
        self.checked_size().unwrap_or(u32::MAX)
    }

    /// Arrays decay to a pointer to their element type
    pub fn decay(&self) -> Type {
        match &*self.0 {
            TypeKind::Array { ty, .. } => Type::pointer(ty.clone()),
            _ => self.clone(),
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(&*self.0, TypeKind::Basic(BasicType::Int))
    }

    pub fn is_void(&self) -> bool {
        matches!(&*self.0, TypeKind::Basic(BasicType::Void))
    }

    pub fn is_array(&self) -> bool {
        matches!(&*self.0, TypeKind::Array { .. })
    }

    /// The type a pointer points to
    pub fn pointee(&self) -> Option<&Type> {
        match &*self.0 {
            TypeKind::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// Returns true if `void` appears anywhere other than as a bare type or a
    /// bare function return type
    pub fn misuses_void(&self) -> bool {
        fn contains_void(ty: &Type) -> bool {
            match &*ty.0 {
                TypeKind::Basic(basic) => *basic == BasicType::Void,
                TypeKind::Pointer(inner) => contains_void(inner),
                TypeKind::Array { ty, .. } => contains_void(ty),
                TypeKind::Function {
                    parameters,
                    return_type,
                } => parameters.iter().any(contains_void) || contains_void(return_type),
            }
        }

        match &*self.0 {
            TypeKind::Basic(_) => false,
            TypeKind::Pointer(_) | TypeKind::Array { .. } => contains_void(self),
            TypeKind::Function {
                parameters,
                return_type,
            } => parameters.iter().any(contains_void) || return_type.misuses_void(),
        }
    }
}

impl core::ops::Deref for Type {
    type Target = TypeKind;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.signature() == other.signature()
    }
}

impl Eq for Type {}

impl core::fmt::Debug for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Type").field(&self.signature()).finish()
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.signature())
    }
}
