use strum::Display;

use super::intern::Name;
use crate::frontend::lexer::Span;

#[derive(Debug)]
pub struct Program {
    /// Top level items, prelude first
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

#[derive(Debug)]
pub struct Item {
    pub id: NodeId,
    pub span: Span,
    pub kind: ItemKind,
}

#[derive(Debug)]
pub enum ItemKind {
    /// `int a, *b, c[10];` at file scope
    GlobalDeclaration(Declaration),
    /// `int f(int a);`
    FunctionPrototype(FunctionSignature),
    FunctionDefinition(Box<FunctionDefinition>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum BaseType {
    Int,
    Void,
}

/// A base type followed by some number of `*`
#[derive(Debug, Clone, Copy)]
pub struct TypeSpecifier {
    pub span: Span,
    pub base: BaseType,
    pub pointer_depth: usize,
}

/// One declaration statement which may declare several names
#[derive(Debug)]
pub struct Declaration {
    pub id: NodeId,
    pub span: Span,
    pub base: BaseType,
    pub declarators: Vec<Declarator>,
}

#[derive(Debug)]
pub struct Declarator {
    pub id: NodeId,
    pub span: Span,
    pub name: Identifier,
    pub pointer_depth: usize,
    pub array_length: Option<u32>,
}

#[derive(Debug)]
pub struct FunctionSignature {
    pub id: NodeId,
    pub span: Span,
    pub return_type: TypeSpecifier,
    pub name: Identifier,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug)]
pub struct Parameter {
    pub id: NodeId,
    pub span: Span,
    pub ty: TypeSpecifier,
    pub name: Identifier,
}

#[derive(Debug)]
pub struct FunctionDefinition {
    pub id: NodeId,
    pub span: Span,
    pub signature: FunctionSignature,
    pub body: Block,
}

#[derive(Debug, Clone, Copy)]
pub struct Identifier {
    pub id: NodeId,
    pub span: Span,
    pub name: Name,
}

/// A compound statement. Declarations always precede statements.
#[derive(Debug)]
pub struct Block {
    pub id: NodeId,
    pub span: Span,
    pub declarations: Vec<Declaration>,
    pub statements: Vec<Statement>,
}

#[derive(Debug)]
pub struct Statement {
    pub id: NodeId,
    pub span: Span,
    pub kind: StatementKind,
}

#[derive(Debug)]
pub enum StatementKind {
    Block(Box<Block>),
    Empty,
    Expression(Box<Expression>),
    Assignment(Box<Assignment>),
    If {
        condition: Box<Expression>,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
    },
    While {
        condition: Box<Expression>,
        body: Box<Statement>,
    },
    /// The initializer and update are restricted to assignments and bare
    /// expressions
    For {
        initializer: Option<Box<Statement>>,
        condition: Option<Box<Expression>>,
        update: Option<Box<Statement>>,
        body: Box<Statement>,
    },
    Return(Option<Box<Expression>>),
}

#[derive(Debug)]
pub struct Assignment {
    pub target: Expression,
    pub value: Expression,
}

#[derive(Debug)]
pub struct Expression {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExpressionKind,
}

#[derive(Debug)]
pub enum ExpressionKind {
    Number(i32),
    Identifier(Identifier),
    Call {
        function: Identifier,
        arguments: Vec<Expression>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    Binary {
        lhs: Box<Expression>,
        operator: BinaryOperator,
        rhs: Box<Expression>,
    },
    /// `base[index]`
    Index {
        base: Box<Expression>,
        index: Box<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UnaryOperator {
    #[strum(to_string = "-")]
    Negate,
    #[strum(to_string = "&")]
    AddressOf,
    #[strum(to_string = "*")]
    Deref,
}

#[derive(Debug, Clone, Copy)]
pub struct BinaryOperator {
    pub span: Span,
    pub kind: BinaryOperatorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BinaryOperatorKind {
    #[strum(to_string = "+")]
    Add,
    #[strum(to_string = "-")]
    Subtract,
    #[strum(to_string = "*")]
    Multiply,
    #[strum(to_string = "/")]
    Divide,
    #[strum(to_string = "<")]
    LessThan,
    #[strum(to_string = "<=")]
    LessThanOrEqualTo,
    #[strum(to_string = ">")]
    GreaterThan,
    #[strum(to_string = ">=")]
    GreaterThanOrEqualTo,
    #[strum(to_string = "==")]
    Equals,
    #[strum(to_string = "!=")]
    NotEquals,
    #[strum(to_string = "&&")]
    LogicalAnd,
    #[strum(to_string = "||")]
    LogicalOr,
}

impl BinaryOperatorKind {
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, Self::LogicalAnd | Self::LogicalOr)
    }
}
