use itertools::Itertools;

use crate::{
    backend::{
        CodegenOptions,
        assemblers::mips32::{Assembler, Register},
        layout::{FrameLayout, GlobalLayout, REGISTER_ARGUMENTS},
        targets::CodeGenerator,
    },
    middle::{
        ir::{self, BinaryOperator, CompoundStatement, Expression, StatementKind},
        ir::pretty_print::render_statement,
        scope::ScopeTree,
        ty::WORD_SIZE,
    },
};

pub struct CodeGeneratorMips32Spim;

impl CodeGenerator for CodeGeneratorMips32Spim {
    fn translate_to_asm(
        &self,
        program: &ir::Program,
        scopes: &ScopeTree,
        options: &CodegenOptions,
    ) -> String {
        let globals = GlobalLayout::compute(&program.globals, scopes);

        let global_comments = program
            .globals
            .iter()
            .map(|global| {
                let symbol = scopes.symbol(*global);
                format!(
                    "# {}: {} at {}($gp)",
                    symbol.name,
                    symbol.ty,
                    globals.offset(*global).unwrap_or_default()
                )
            })
            .join("\n");

        let function_bodies = program
            .functions
            .iter()
            .map(|function| codegen_function(function, &globals, scopes, options))
            .join("\n");

        log::debug!(
            "generated {} functions using {} bytes of global data",
            program.functions.len(),
            globals.size()
        );

        format!(
            indoc::indoc! {"
                .data
                .align 2
                {0}

                .text
                .globl main

                {1}"
            },
            global_comments, function_bodies
        )
    }
}

fn codegen_function(
    function: &ir::FunctionDefinition,
    globals: &GlobalLayout,
    scopes: &ScopeTree,
    options: &CodegenOptions,
) -> String {
    let frame = FrameLayout::compute(function, scopes);
    let mut assembler = Assembler::new(function.name.value(), &frame, globals, scopes);

    assembler.function_prologue(&function.parameters);
    codegen_compound(&mut assembler, &function.body, scopes, options);
    assembler.function_epilogue();

    assembler.into_output()
}

fn codegen_compound(
    assembler: &mut Assembler<'_>,
    compound: &CompoundStatement,
    scopes: &ScopeTree,
    options: &CodegenOptions,
) {
    for statement in &compound.statements {
        if let StatementKind::Compound(inner) = &statement.kind {
            codegen_compound(assembler, inner, scopes, options);
            continue;
        }

        if options.emit_comments {
            assembler.comment(strip_ansi_escapes::strip_str(render_statement(
                &statement.kind,
                scopes,
            )));
        }

        codegen_statement(assembler, &statement.kind, scopes);
    }
}

fn codegen_statement(assembler: &mut Assembler<'_>, statement: &StatementKind, scopes: &ScopeTree) {
    match statement {
        StatementKind::Assign { destination, value } => {
            codegen_expression(assembler, value, Register::T0);
            assembler.store_variable(*destination, Register::T0);
        }
        StatementKind::Write { address, value } => {
            assembler.load_variable(Register::T0, *address);
            assembler.load_variable(Register::T1, *value);
            assembler.emit("sw $t1, 0($t0)");
        }
        StatementKind::Read {
            destination,
            address,
        } => {
            assembler.load_variable(Register::T0, *address);
            assembler.emit("lw $t0, 0($t0)");
            assembler.store_variable(*destination, Register::T0);
        }
        StatementKind::Label(label) => assembler.label(label.to_string()),
        StatementKind::Branch {
            condition,
            positive,
            negative,
        } => {
            assembler.load_variable(Register::T0, *condition);

            if let Some(positive) = positive {
                assembler.emit(format!("bne $t0, {}, {positive}", Register::Zero));
            }
            if let Some(negative) = negative {
                assembler.emit(format!("beq $t0, {}, {negative}", Register::Zero));
            }
        }
        StatementKind::Goto(label) => assembler.emit(format!("j {label}")),
        StatementKind::Call {
            destination,
            function,
            arguments,
        } => {
            let stack_arguments = arguments.get(REGISTER_ARGUMENTS..).unwrap_or_default();

            // The fifth argument ends up on top, right above the callee's frame
            for argument in stack_arguments.iter().rev() {
                assembler.load_variable(Register::T0, *argument);
                assembler.push(Register::T0);
            }

            for (index, argument) in arguments.iter().take(REGISTER_ARGUMENTS).enumerate() {
                assembler.load_variable(Register::argument(index), *argument);
            }

            assembler.emit(format!("jal {}", scopes.symbol(*function).name));

            if !stack_arguments.is_empty() {
                assembler.emit(format!(
                    "addi $sp, $sp, {}",
                    stack_arguments.len() as u32 * WORD_SIZE
                ));
            }

            if let Some(destination) = destination {
                assembler.store_variable(*destination, Register::V0);
            }
        }
        StatementKind::Return(value) => {
            if let Some(value) = value {
                assembler.load_variable(Register::V0, *value);
            }

            let exit = assembler.exit_label();
            assembler.emit(format!("j {exit}"));
        }
        StatementKind::Syscall { call, argument } => {
            assembler.emit(format!("li $v0, {}", call.number()));
            assembler.load_variable(Register::A0, *argument);
            assembler.emit("syscall");
        }
        StatementKind::Compound(_) => unreachable!("compounds are walked by the caller"),
    }
}

/// Evaluates `expression` into `destination`. The left operand of a binary
/// expression is kept on the stack while the right one is evaluated.
fn codegen_expression(
    assembler: &mut Assembler<'_>,
    expression: &Expression,
    destination: Register,
) {
    match expression {
        Expression::Variable(symbol) => assembler.load_variable(destination, *symbol),
        Expression::Number(value) => assembler.emit(format!("li {destination}, {value}")),
        Expression::AddressOf(symbol) => assembler.load_address(destination, *symbol),
        Expression::Binary { operator, lhs, rhs } => {
            codegen_expression(assembler, lhs, Register::T0);
            assembler.push(Register::T0);
            codegen_expression(assembler, rhs, Register::T1);
            assembler.pop(Register::T0);

            codegen_binary_operator(assembler, *operator, destination);
        }
    }
}

/// Combines `$t0` and `$t1` into `destination`
fn codegen_binary_operator(
    assembler: &mut Assembler<'_>,
    operator: BinaryOperator,
    destination: Register,
) {
    let (lhs, rhs) = (Register::T0, Register::T1);

    match operator {
        BinaryOperator::Add => assembler.emit(format!("add {destination}, {lhs}, {rhs}")),
        BinaryOperator::Subtract => assembler.emit(format!("sub {destination}, {lhs}, {rhs}")),
        BinaryOperator::Multiply => assembler.emit(format!("mul {destination}, {lhs}, {rhs}")),
        BinaryOperator::Divide => assembler.emit(format!("div {destination}, {lhs}, {rhs}")),
        BinaryOperator::LessThan => assembler.emit(format!("slt {destination}, {lhs}, {rhs}")),
        BinaryOperator::LessThanOrEqualTo => {
            codegen_less_or_equal(assembler, lhs, rhs, destination);
        }
        // a > b is !(a <= b)
        BinaryOperator::GreaterThan => {
            codegen_less_or_equal(assembler, lhs, rhs, destination);
            assembler.emit(format!("xori {destination}, {destination}, 1"));
        }
        // a >= b is b <= a
        BinaryOperator::GreaterThanOrEqualTo => {
            codegen_less_or_equal(assembler, rhs, lhs, destination);
        }
        BinaryOperator::Equals | BinaryOperator::NotEquals => {
            let instruction = match operator {
                BinaryOperator::Equals => "beq",
                _ => "bne",
            };
            let done = assembler.local_label("cmp");

            assembler.emit(format!("li {}, 1", Register::T2));
            assembler.emit(format!("{instruction} {lhs}, {rhs}, {done}"));
            assembler.emit(format!("li {}, 0", Register::T2));
            assembler.label(&done);
            assembler.emit(format!("move {destination}, {}", Register::T2));
        }
    }
}

/// `lhs <= rhs` is `!(rhs < lhs)`
fn codegen_less_or_equal(
    assembler: &mut Assembler<'_>,
    lhs: Register,
    rhs: Register,
    destination: Register,
) {
    assembler.emit(format!("slt {destination}, {rhs}, {lhs}"));
    assembler.emit(format!("xori {destination}, {destination}, 1"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::{ir::tests::lower_source, optimization::optimize_program};

    fn compile(source: &str, optimize: bool) -> String {
        let (mut program, resolution) = lower_source(source);

        if optimize {
            optimize_program(&mut program, &resolution.scopes);
        }

        CodeGeneratorMips32Spim.translate_to_asm(
            &program,
            &resolution.scopes,
            &CodegenOptions::default(),
        )
    }

    fn instructions(assembly: &str) -> Vec<&str> {
        assembly
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect()
    }

    #[test]
    fn prologue_and_shared_exit() {
        let assembly = compile("int main() { return 1 + 2; }", true);
        let lines = instructions(&assembly);

        let start = lines.iter().position(|l| *l == "main:").unwrap();
        assert_eq!(
            lines[start..start + 5],
            [
                "main:",
                "addi $sp, $sp, -12",
                "sw $ra, 4($sp)",
                "sw $fp, 0($sp)",
                "addi $fp, $sp, 8",
            ]
        );

        assert!(lines.contains(&"li $t0, 3"));
        assert!(lines.contains(&"j main.exit"));

        let exit = lines.iter().position(|l| *l == "main.exit:").unwrap();
        assert_eq!(
            lines[exit + 1..],
            [
                "lw $fp, 0($sp)",
                "lw $ra, 4($sp)",
                "addi $sp, $sp, 12",
                "jr $ra"
            ]
        );
    }

    #[test]
    fn fifth_argument_goes_through_the_stack() {
        let assembly = compile(
            indoc::indoc! {"
                int f(int a, int b, int c, int d, int e) { return e; }
                int main() { return f(1, 2, 3, 4, 5); }
            "},
            false,
        );
        let lines = instructions(&assembly);

        // callee side
        assert!(lines.contains(&"sw $a3, -12($fp)"));
        assert!(lines.contains(&"lw $t0, 4($fp)"));

        // caller side
        let call = lines.iter().position(|l| *l == "jal f").unwrap();
        assert_eq!(lines[call - 6..call - 4], ["addi $sp, $sp, -4", "sw $t0, 0($sp)"]);
        assert!(lines[call - 4].starts_with("lw $a0, "));
        assert!(lines[call - 1].starts_with("lw $a3, "));
        assert_eq!(lines[call + 1], "addi $sp, $sp, 4");
        assert!(lines[call + 2].starts_with("sw $v0, "));
    }

    #[test]
    fn syscalls_and_globals() {
        let assembly = compile("int g[2]; int main() { putchar(g[1]); return 0; }", false);
        let lines = instructions(&assembly);

        assert!(assembly.contains("# g: int[2] at -8($gp)"));
        assert!(lines.contains(&"addi $t0, $gp, -8"));
        assert!(lines.contains(&"lw $t0, 0($t0)"));

        let syscall = lines.iter().position(|l| *l == "syscall").unwrap();
        assert_eq!(lines[syscall - 2], "li $v0, 11");
        assert!(lines[syscall - 1].starts_with("lw $a0, "));
    }

    #[test]
    fn equality_uses_local_labels() {
        let assembly = compile(
            "int main() { int a; a = 1; if (a == 2) print(a); return a != 1; }",
            false,
        );

        assert!(assembly.contains("beq $t0, $t1, main.cmp.0"));
        assert!(assembly.contains("bne $t0, $t1, main.cmp.1"));
        assert!(assembly.contains("main.cmp.1:"));
        assert!(assembly.contains("beq $t0, $zero, if.end.0"));
    }

    #[test]
    fn orderings_are_built_from_less_or_equal() {
        let operators = |source: &str| {
            let assembly = compile(source, false);
            let lines = instructions(&assembly);
            let start = lines.iter().position(|l| *l == "lw $t0, 0($sp)").unwrap();

            lines[start + 2..]
                .iter()
                .take_while(|l| !l.starts_with("sw "))
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
        };

        let body = |operator: &str| {
            format!("int main() {{ int a; int b; a = 1; b = 2; return a {operator} b; }}")
        };

        assert_eq!(operators(&body("<=")), ["slt $t0, $t1, $t0", "xori $t0, $t0, 1"]);
        assert_eq!(
            operators(&body(">")),
            ["slt $t0, $t1, $t0", "xori $t0, $t0, 1", "xori $t0, $t0, 1"]
        );
        assert_eq!(operators(&body(">=")), ["slt $t0, $t0, $t1", "xori $t0, $t0, 1"]);
        assert_eq!(operators(&body("<")), ["slt $t0, $t0, $t1"]);
    }

    #[test]
    fn comments_render_each_statement() {
        let assembly = compile("int main() { int *p; int x; p = &x; *p = 4; return x; }", false);

        assert!(assembly.contains("# p = &x"));
        assert!(assembly.contains("# *p = tmp.0"));
        assert!(assembly.contains("sw $t1, 0($t0)"));

        let (program, resolution) = lower_source("int main() { return 0; }");
        let quiet = CodeGeneratorMips32Spim.translate_to_asm(
            &program,
            &resolution.scopes,
            &CodegenOptions {
                emit_comments: false,
            },
        );
        assert!(!quiet.contains("# return"));
    }
}
