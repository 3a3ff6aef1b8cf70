use crate::{
    backend::CodegenOptions,
    middle::{ir, scope::ScopeTree},
};

mod mips32_spim;

pub trait CodeGenerator {
    fn translate_to_asm(
        &self,
        program: &ir::Program,
        scopes: &ScopeTree,
        options: &CodegenOptions,
    ) -> String;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// 32-bit MIPS assembly for the SPIM simulator
    #[default]
    Mips32Spim,
}

impl Target {
    pub fn get_code_generator(self) -> impl CodeGenerator {
        match self {
            Target::Mips32Spim => mips32_spim::CodeGeneratorMips32Spim,
        }
    }
}
