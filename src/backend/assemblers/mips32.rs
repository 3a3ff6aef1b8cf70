use crate::{
    backend::layout::{FrameLayout, GlobalLayout, REGISTER_ARGUMENTS},
    middle::{
        scope::{ScopeTree, SymbolId},
        ty::WORD_SIZE,
    },
};

/// Builds the assembly text of one function
pub struct Assembler<'a> {
    output: String,
    function_name: &'a str,
    frame: &'a FrameLayout,
    globals: &'a GlobalLayout,
    scopes: &'a ScopeTree,
    next_local_label: u32,
}

impl<'a> Assembler<'a> {
    pub fn new(
        function_name: &'a str,
        frame: &'a FrameLayout,
        globals: &'a GlobalLayout,
        scopes: &'a ScopeTree,
    ) -> Self {
        Self {
            output: String::new(),
            function_name,
            frame,
            globals,
            scopes,
            next_local_label: 0,
        }
    }

    pub fn into_output(self) -> String {
        self.output
    }

    fn push_line(&mut self, string: impl AsRef<str>) {
        self.output.push_str(string.as_ref());
        self.output.push('\n');
    }

    pub fn emit(&mut self, string: impl AsRef<str>) {
        self.output.push_str("    ");
        self.push_line(string);
    }

    pub fn label(&mut self, name: impl AsRef<str>) {
        self.push_line(format!("{}:", name.as_ref()));
    }

    pub fn comment(&mut self, comment: impl AsRef<str>) {
        self.emit(format!("# {}", comment.as_ref()));
    }

    /// A label no other function uses, for branches within one instruction
    /// sequence
    pub fn local_label(&mut self, prefix: &str) -> String {
        let label = format!("{}.{prefix}.{}", self.function_name, self.next_local_label);
        self.next_local_label += 1;
        label
    }

    pub fn exit_label(&self) -> String {
        format!("{}.exit", self.function_name)
    }

    pub fn function_prologue(&mut self, parameters: &[SymbolId]) {
        let size = self.frame.size;

        self.label(self.function_name);
        self.emit(format!("addi $sp, $sp, -{size}"));
        self.emit("sw $ra, 4($sp)");
        self.emit("sw $fp, 0($sp)");
        self.emit(format!("addi $fp, $sp, {}", size - WORD_SIZE));

        for (index, parameter) in parameters.iter().take(REGISTER_ARGUMENTS).enumerate() {
            let argument = Register::argument(index);
            self.store_variable(*parameter, argument);
        }
    }

    pub fn function_epilogue(&mut self) {
        self.label(self.exit_label());
        self.emit("lw $fp, 0($sp)");
        self.emit("lw $ra, 4($sp)");
        self.emit(format!("addi $sp, $sp, {}", self.frame.size));
        self.emit("jr $ra");
    }

    /// Base register and offset of a variable's storage
    fn slot(&self, symbol: SymbolId) -> (i32, Register) {
        if let Some(offset) = self.frame.offset(symbol) {
            return (offset, Register::Fp);
        }

        match self.globals.offset(symbol) {
            Some(offset) => (offset, Register::Gp),
            None => unreachable!(
                "`{}` has no storage",
                self.scopes.symbol(symbol).name
            ),
        }
    }

    pub fn load_address(&mut self, destination: Register, symbol: SymbolId) {
        let (offset, base) = self.slot(symbol);
        self.emit(format!("addi {destination}, {base}, {offset}"));
    }

    /// Loads the value of a variable. Arrays evaluate to their address.
    pub fn load_variable(&mut self, destination: Register, symbol: SymbolId) {
        if self.scopes.symbol(symbol).ty.is_array() {
            return self.load_address(destination, symbol);
        }

        let (offset, base) = self.slot(symbol);
        self.emit(format!("lw {destination}, {offset}({base})"));
    }

    pub fn store_variable(&mut self, symbol: SymbolId, source: Register) {
        let (offset, base) = self.slot(symbol);
        self.emit(format!("sw {source}, {offset}({base})"));
    }

    pub fn push(&mut self, source: Register) {
        self.emit(format!("addi $sp, $sp, -{WORD_SIZE}"));
        self.emit(format!("sw {source}, 0($sp)"));
    }

    pub fn pop(&mut self, destination: Register) {
        self.emit(format!("lw {destination}, 0($sp)"));
        self.emit(format!("addi $sp, $sp, {WORD_SIZE}"));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Register {
    #[strum(to_string = "$zero")]
    Zero,
    #[strum(to_string = "$v0")]
    V0,
    #[strum(to_string = "$a0")]
    A0,
    #[strum(to_string = "$a1")]
    A1,
    #[strum(to_string = "$a2")]
    A2,
    #[strum(to_string = "$a3")]
    A3,
    #[strum(to_string = "$t0")]
    T0,
    #[strum(to_string = "$t1")]
    T1,
    #[strum(to_string = "$t2")]
    T2,
    #[strum(to_string = "$gp")]
    Gp,
    #[strum(to_string = "$sp")]
    Sp,
    #[strum(to_string = "$fp")]
    Fp,
    #[strum(to_string = "$ra")]
    Ra,
}

impl Register {
    pub const ARGUMENTS: [Register; REGISTER_ARGUMENTS] =
        [Register::A0, Register::A1, Register::A2, Register::A3];

    pub fn argument(index: usize) -> Register {
        Self::ARGUMENTS[index]
    }
}
