//! Storage layout of globals and stack frames.
//!
//! Globals are addressed relative to `$gp` and grow downwards from it. Frame
//! slots are addressed relative to `$fp`, which points at the highest word
//! of the frame. Every offset addresses the lowest byte of its object, so
//! array elements are laid out upwards from there.

use std::collections::BTreeMap;

use crate::middle::{
    ir::{CompoundStatement, FunctionDefinition, StatementKind},
    scope::{ScopeTree, SymbolId},
    ty::WORD_SIZE,
};

/// Parameters passed in `$a0`-`$a3`
pub const REGISTER_ARGUMENTS: usize = 4;

/// Saved `$ra` and `$fp`
const SAVED_REGISTERS_SIZE: u32 = 2 * WORD_SIZE;

#[derive(Debug, Default)]
pub struct GlobalLayout {
    offsets: BTreeMap<SymbolId, i32>,
}

impl GlobalLayout {
    pub fn compute(globals: &[SymbolId], scopes: &ScopeTree) -> Self {
        let mut offsets = BTreeMap::new();
        let mut offset = 0;

        for global in globals {
            offset -= scopes.symbol(*global).ty.size() as i32;
            offsets.insert(*global, offset);
        }

        Self { offsets }
    }

    pub fn offset(&self, symbol: SymbolId) -> Option<i32> {
        self.offsets.get(&symbol).copied()
    }

    pub fn size(&self) -> u32 {
        self.offsets.values().min().map_or(0, |lowest| lowest.unsigned_abs())
    }
}

#[derive(Debug)]
pub struct FrameLayout {
    offsets: BTreeMap<SymbolId, i32>,
    /// Total frame size in bytes, saved registers included
    pub size: u32,
}

impl FrameLayout {
    pub fn compute(function: &FunctionDefinition, scopes: &ScopeTree) -> Self {
        let mut offsets = BTreeMap::new();
        let mut offset = 0;

        for (index, parameter) in function.parameters.iter().enumerate() {
            if index < REGISTER_ARGUMENTS {
                offsets.insert(*parameter, offset);
                offset -= WORD_SIZE as i32;
            } else {
                // Pushed by the caller just above our frame
                offsets.insert(*parameter, (index as i32 - 3) * WORD_SIZE as i32);
            }
        }

        let lowest = layout_compound(&function.body, offset, scopes, &mut offsets);

        Self {
            offsets,
            size: SAVED_REGISTERS_SIZE + lowest.unsigned_abs(),
        }
    }

    pub fn offset(&self, symbol: SymbolId) -> Option<i32> {
        self.offsets.get(&symbol).copied()
    }
}

/// Assigns slots to the declarations of `compound` starting at `base`, then
/// lays out nested compounds below them. Sibling compounds share space.
/// Returns the lowest offset in use.
fn layout_compound(
    compound: &CompoundStatement,
    base: i32,
    scopes: &ScopeTree,
    offsets: &mut BTreeMap<SymbolId, i32>,
) -> i32 {
    let mut offset = base;

    for declaration in &compound.declarations {
        let size = scopes.symbol(*declaration).ty.size().max(WORD_SIZE) as i32;

        offsets.insert(*declaration, offset - size + WORD_SIZE as i32);
        offset -= size;
    }

    compound
        .statements
        .iter()
        .filter_map(|statement| match &statement.kind {
            StatementKind::Compound(inner) => Some(layout_compound(inner, offset, scopes, offsets)),
            _ => None,
        })
        .fold(offset, i32::min)
}
