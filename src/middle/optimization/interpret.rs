//! A reference interpreter for the IR, used to check that optimized programs
//! behave exactly like unoptimized ones.
//!
//! Memory is a map from byte addresses to words. Every call gets fresh slots
//! for its parameters and locals, so uninitialized reads always see 0.

use hashbrown::HashMap;

use super::fold;
use crate::{
    frontend::intern::Name,
    middle::{
        ir::{
            CompoundStatement, Expression, FunctionDefinition, Label, Program, StatementKind,
            Syscall,
        },
        scope::{ScopeTree, SymbolId},
        ty::WORD_SIZE,
    },
};

/// Statements executed before a run is considered stuck
const FUEL: usize = 1_000_000;

/// Observable behaviour of a program: everything it printed and the value
/// returned from `main`
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Run {
    pub output: Vec<(Syscall, i32)>,
    pub exit_code: i32,
}

pub(crate) fn run(program: &Program, scopes: &ScopeTree) -> Run {
    let mut interpreter = Interpreter {
        scopes,
        functions: program
            .functions
            .iter()
            .map(|function| (function.name, function))
            .collect(),
        globals: HashMap::new(),
        memory: HashMap::new(),
        next_address: 0x1000_0000,
        fuel: FUEL,
        output: Vec::new(),
    };

    for global in &program.globals {
        let address = interpreter.allocate(*global);
        interpreter.globals.insert(*global, address);
    }

    let exit_code = interpreter.call(Name::new("main"), &[]);

    Run {
        output: interpreter.output,
        exit_code,
    }
}

type Frame = HashMap<SymbolId, i32>;

struct Interpreter<'a> {
    scopes: &'a ScopeTree,
    functions: HashMap<Name, &'a FunctionDefinition>,
    globals: HashMap<SymbolId, i32>,
    memory: HashMap<i32, i32>,
    next_address: i32,
    fuel: usize,
    output: Vec<(Syscall, i32)>,
}

impl<'a> Interpreter<'a> {
    fn allocate(&mut self, symbol: SymbolId) -> i32 {
        let size = self.scopes.symbol(symbol).ty.size().max(WORD_SIZE);
        let address = self.next_address;

        self.next_address += size as i32;
        address
    }

    fn address_of(&self, frame: &Frame, symbol: SymbolId) -> i32 {
        match frame.get(&symbol).or_else(|| self.globals.get(&symbol)) {
            Some(address) => *address,
            None => panic!("`{}` has no storage", self.scopes.symbol(symbol).name),
        }
    }

    fn load(&self, frame: &Frame, symbol: SymbolId) -> i32 {
        let address = self.address_of(frame, symbol);

        // arrays evaluate to their base address
        if self.scopes.symbol(symbol).ty.is_array() {
            return address;
        }

        self.memory.get(&address).copied().unwrap_or(0)
    }

    fn store(&mut self, frame: &Frame, symbol: SymbolId, value: i32) {
        let address = self.address_of(frame, symbol);
        self.memory.insert(address, value);
    }

    fn evaluate(&self, frame: &Frame, expression: &Expression) -> i32 {
        match expression {
            Expression::Variable(symbol) => self.load(frame, *symbol),
            Expression::Number(value) => *value,
            Expression::AddressOf(symbol) => self.address_of(frame, *symbol),
            Expression::Binary { operator, lhs, rhs } => {
                let lhs = self.evaluate(frame, lhs);
                let rhs = self.evaluate(frame, rhs);

                fold::evaluate(*operator, lhs, rhs).expect("division by zero")
            }
        }
    }

    fn call(&mut self, name: Name, arguments: &[i32]) -> i32 {
        let function: &'a FunctionDefinition = self.functions[&name];

        let mut locals = function.parameters.clone();
        collect_declarations(&function.body, &mut locals);

        let mut frame = Frame::new();
        for symbol in locals {
            let address = self.allocate(symbol);
            frame.insert(symbol, address);
        }

        for (parameter, value) in function.parameters.iter().zip(arguments) {
            self.store(&frame, *parameter, *value);
        }

        let statements = function.body.flatten();
        let labels = statements
            .iter()
            .enumerate()
            .filter_map(|(index, statement)| match statement.kind {
                StatementKind::Label(label) => Some((label, index)),
                _ => None,
            })
            .collect::<HashMap<Label, usize>>();

        let mut pc = 0;

        while let Some(statement) = statements.get(pc) {
            self.fuel = self.fuel.checked_sub(1).expect("program ran out of fuel");
            pc += 1;

            match &statement.kind {
                StatementKind::Assign { destination, value } => {
                    let value = self.evaluate(&frame, value);
                    self.store(&frame, *destination, value);
                }
                StatementKind::Write { address, value } => {
                    let address = self.load(&frame, *address);
                    let value = self.load(&frame, *value);
                    self.memory.insert(address, value);
                }
                StatementKind::Read {
                    destination,
                    address,
                } => {
                    let address = self.load(&frame, *address);
                    let value = self.memory.get(&address).copied().unwrap_or(0);
                    self.store(&frame, *destination, value);
                }
                StatementKind::Label(_) => {}
                StatementKind::Branch {
                    condition,
                    positive,
                    negative,
                } => {
                    let target = match self.load(&frame, *condition) {
                        0 => negative,
                        _ => positive,
                    };

                    if let Some(target) = target {
                        pc = labels[target];
                    }
                }
                StatementKind::Goto(label) => pc = labels[label],
                StatementKind::Call {
                    destination,
                    function,
                    arguments,
                } => {
                    let values = arguments
                        .iter()
                        .map(|argument| self.load(&frame, *argument))
                        .collect::<Vec<_>>();
                    let result = self.call(self.scopes.symbol(*function).name, &values);

                    if let Some(destination) = destination {
                        self.store(&frame, *destination, result);
                    }
                }
                StatementKind::Return(value) => {
                    return value.map_or(0, |value| self.load(&frame, value));
                }
                StatementKind::Syscall { call, argument } => {
                    let value = self.load(&frame, *argument);
                    self.output.push((*call, value));
                }
                StatementKind::Compound(_) => unreachable!("statements are flattened"),
            }
        }

        0
    }
}

fn collect_declarations(compound: &CompoundStatement, into: &mut Vec<SymbolId>) {
    into.extend(&compound.declarations);

    for statement in &compound.statements {
        if let StatementKind::Compound(inner) = &statement.kind {
            collect_declarations(inner, into);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::{ir::tests::lower_source, optimization::optimize_program};

    /// Runs `source` with and without optimizations and checks that both
    /// behave the same
    fn run_both(source: &str) -> Run {
        let (plain, plain_resolution) = lower_source(source);
        let (mut optimized, resolution) = lower_source(source);
        optimize_program(&mut optimized, &resolution.scopes);

        let expected = run(&plain, &plain_resolution.scopes);
        let actual = run(&optimized, &resolution.scopes);

        assert_eq!(expected, actual);
        expected
    }

    fn printed(run: &Run) -> Vec<i32> {
        run.output
            .iter()
            .filter(|(call, _)| *call == Syscall::Print)
            .map(|(_, value)| *value)
            .collect()
    }

    #[test]
    fn recursion_and_syscalls() {
        let run = run_both(indoc::indoc! {"
            int fib(int n) {
                if (n < 2) return n;
                return fib(n - 1) + fib(n - 2);
            }
            int main() {
                int i;
                for (i = 0; i < 8; i = i + 1) {
                    print(fib(i));
                    putchar(32);
                }
                return fib(10);
            }
        "});

        assert_eq!(printed(&run), vec![0, 1, 1, 2, 3, 5, 8, 13]);
        assert_eq!(run.output[1], (Syscall::PutChar, 32));
        assert_eq!(run.exit_code, 55);
    }

    #[test]
    fn writes_through_pointers_to_locals() {
        let run = run_both(indoc::indoc! {"
            void set(int *p, int v) { *p = v; }
            int main() {
                int x;
                int y;
                int *p;
                x = 1;
                p = &x;
                *p = 7;
                y = x + 1;
                print(y);
                set(&x, 40);
                print(x + 2);
                set(&*p, -3);
                print(x);
                return x;
            }
        "});

        assert_eq!(printed(&run), vec![8, 42, -3]);
        assert_eq!(run.exit_code, -3);
    }

    #[test]
    fn calls_update_globals() {
        let run = run_both(indoc::indoc! {"
            int counter;
            int table[4];
            void bump(int by) { counter = counter + by; table[counter - 1] = counter; }
            int main() {
                int before;
                counter = 0;
                before = counter;
                bump(1);
                bump(2);
                print(before);
                print(counter);
                print(table[0] + table[2]);
                return counter;
            }
        "});

        assert_eq!(printed(&run), vec![0, 3, 4]);
        assert_eq!(run.exit_code, 3);
    }

    #[test]
    fn short_circuit_logic() {
        let run = run_both(indoc::indoc! {"
            int calls;
            int touch(int v) { calls = calls + 1; return v; }
            int main() {
                int a;
                int b;
                a = 0;
                b = 5;
                if (a != 0 && b / a > 1) print(1); else print(0);
                if (a == 0 || touch(1)) print(2);
                print(touch(0) && touch(1));
                print(touch(1) || touch(1));
                print(b > 3 && b <= 5 && b >= 5);
                return calls;
            }
        "});

        assert_eq!(printed(&run), vec![0, 2, 0, 1, 1]);
        assert_eq!(run.exit_code, 2);
    }

    #[test]
    fn nested_loops_and_arrays() {
        let run = run_both(indoc::indoc! {"
            int main() {
                int grid[9];
                int i;
                int j;
                int sum;
                for (i = 0; i < 3; i = i + 1)
                    for (j = 0; j < 3; j = j + 1)
                        grid[i * 3 + j] = i * j;
                sum = 0;
                i = 0;
                while (i < 9) {
                    j = 0;
                    while (j < i) {
                        sum = sum + grid[j];
                        j = j + 1;
                    }
                    i = i + 1;
                }
                print(sum);
                return grid[8];
            }
        "});

        assert_eq!(printed(&run), vec![12]);
        assert_eq!(run.exit_code, 4);
    }

    #[test]
    fn calls_with_stack_arguments() {
        let run = run_both(indoc::indoc! {"
            int weigh(int a, int b, int c, int d, int e, int f) {
                return a - b + c * d - e / f;
            }
            int main() {
                int k;
                k = 2;
                print(weigh(k, 1, k + 1, 4, 10, k));
                print(weigh(1, 2, 3, 4, 5, 6) * -1);
                return weigh(0, 0, 0, 0, 0, 1);
            }
        "});

        assert_eq!(printed(&run), vec![8, -11]);
        assert_eq!(run.exit_code, 0);
    }
}
