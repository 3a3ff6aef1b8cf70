//! Constant folding driven by reaching definitions.
//!
//! A variable is constant at a statement when exactly one definition of it
//! reaches that statement and that definition assigns a foldable expression.

use hashbrown::{HashMap, HashSet};

use crate::middle::{
    ir::{BinaryOperator, Expression, FunctionDefinition, Statement, StatementId, StatementKind},
    optimization::reaching::ReachingDefinitions,
};

/// Evaluates a binary operator the way the target machine does. Division
/// by zero is left for run time.
pub fn evaluate(operator: BinaryOperator, lhs: i32, rhs: i32) -> Option<i32> {
    let value = match operator {
        BinaryOperator::Add => lhs.wrapping_add(rhs),
        BinaryOperator::Subtract => lhs.wrapping_sub(rhs),
        BinaryOperator::Multiply => lhs.wrapping_mul(rhs),
        BinaryOperator::Divide if rhs == 0 => return None,
        BinaryOperator::Divide => lhs.wrapping_div(rhs),
        BinaryOperator::LessThan => (lhs < rhs) as i32,
        BinaryOperator::LessThanOrEqualTo => (lhs <= rhs) as i32,
        BinaryOperator::GreaterThan => (lhs > rhs) as i32,
        BinaryOperator::GreaterThanOrEqualTo => (lhs >= rhs) as i32,
        BinaryOperator::Equals => (lhs == rhs) as i32,
        BinaryOperator::NotEquals => (lhs != rhs) as i32,
    };

    Some(value)
}

struct ConstantFolder<'a> {
    reaching: &'a ReachingDefinitions,
    assignments: HashMap<StatementId, &'a Expression>,
    /// Memoised constant value of each assignment
    known: HashMap<StatementId, Option<i32>>,
    visiting: HashSet<StatementId>,
}

impl ConstantFolder<'_> {
    /// Value assigned by the assignment statement `definition`
    fn definition_value(&mut self, definition: StatementId) -> Option<i32> {
        if let Some(known) = self.known.get(&definition) {
            return *known;
        }

        let expression = *self.assignments.get(&definition)?;

        if !self.visiting.insert(definition) {
            return None;
        }

        let value = self.fold(expression, definition);

        self.visiting.remove(&definition);
        self.known.insert(definition, value);

        value
    }

    /// Value of `expression` when evaluated at statement `at`
    fn fold(&mut self, expression: &Expression, at: StatementId) -> Option<i32> {
        match expression {
            Expression::Number(value) => Some(*value),
            Expression::Variable(symbol) => {
                let definition = self.reaching.unique(at, *symbol)?;

                if definition == at {
                    return None;
                }

                self.definition_value(definition)
            }
            Expression::AddressOf(_) => None,
            Expression::Binary { operator, lhs, rhs } => {
                let lhs = self.fold(lhs, at)?;
                let rhs = self.fold(rhs, at)?;

                evaluate(*operator, lhs, rhs)
            }
        }
    }

    /// Rewritten form of an assignment's value, if anything could be folded
    fn simplify(&mut self, expression: &Expression, at: StatementId) -> Option<Expression> {
        if let Some(value) = self.fold(expression, at) {
            return (*expression != Expression::Number(value)).then_some(Expression::Number(value));
        }

        let Expression::Binary { operator, lhs, rhs } = expression else {
            return None;
        };

        let mut operand = |side: &Expression| match side {
            Expression::Variable(_) => self.fold(side, at).map(Expression::Number),
            _ => None,
        };

        match (operand(lhs), operand(rhs)) {
            (None, None) => None,
            (new_lhs, new_rhs) => Some(Expression::binary(
                *operator,
                new_lhs.unwrap_or_else(|| lhs.as_ref().clone()),
                new_rhs.unwrap_or_else(|| rhs.as_ref().clone()),
            )),
        }
    }
}

/// Computes the folded value of every assignment which can be simplified
fn find_rewrites(
    function: &FunctionDefinition,
    reaching: &ReachingDefinitions,
) -> HashMap<StatementId, Expression> {
    let statements = function.body.flatten();

    let assignments = statements
        .into_iter()
        .filter_map(|statement| match &statement.kind {
            StatementKind::Assign { value, .. } => Some((statement.id, value)),
            _ => None,
        })
        .collect::<HashMap<_, _>>();

    let mut folder = ConstantFolder {
        reaching,
        assignments: assignments.clone(),
        known: HashMap::new(),
        visiting: HashSet::new(),
    };

    assignments
        .into_iter()
        .filter_map(|(id, value)| Some((id, folder.simplify(value, id)?)))
        .collect()
}

/// Folds constants in every assignment of `function`. Returns the number of
/// assignments rewritten.
pub fn fold_constants(function: &mut FunctionDefinition, reaching: &ReachingDefinitions) -> usize {
    let mut rewrites = find_rewrites(function, reaching);
    let count = rewrites.len();

    function.body.for_each_statement_mut(&mut |statement: &mut Statement| {
        let Some(folded) = rewrites.remove(&statement.id) else {
            return;
        };

        if let StatementKind::Assign { value, .. } = &mut statement.kind {
            log::trace!("folded statement {:?}", statement.id);
            *value = folded;
        }
    });

    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_like_the_machine() {
        assert_eq!(evaluate(BinaryOperator::Add, i32::MAX, 1), Some(i32::MIN));
        assert_eq!(evaluate(BinaryOperator::Divide, 7, -2), Some(-3));
        assert_eq!(evaluate(BinaryOperator::Divide, 1, 0), None);
        assert_eq!(evaluate(BinaryOperator::LessThanOrEqualTo, 2, 2), Some(1));
        assert_eq!(evaluate(BinaryOperator::NotEquals, 2, 2), Some(0));
    }
}
