use super::{
    ast::{
        Assignment, BaseType, BinaryOperator, BinaryOperatorKind, Block, Declaration, Declarator,
        Expression, ExpressionKind, FunctionDefinition, FunctionSignature, Identifier, Item,
        ItemKind, NodeId, Parameter, Statement, StatementKind, TypeSpecifier, UnaryOperator,
    },
    intern::Name,
};
use crate::{
    error::{Diagnostic, ErrorKind},
    frontend::{
        SourceFile,
        lexer::{Keyword, Lexer, Span, Token, TokenKind},
    },
};

type ParseResult<T> = Result<T, Diagnostic>;

/// Recursive descent parser. Stops at the first syntax error.
#[derive(Debug)]
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    next_node_id: u32,
}

impl<'source> Parser<'source> {
    pub fn new(source_file: &'source SourceFile, first_node_id: u32) -> Self {
        Self {
            lexer: Lexer::new(source_file),
            next_node_id: first_node_id,
        }
    }

    /// The id the next created node will receive
    pub fn next_node_id(&self) -> u32 {
        self.next_node_id
    }

    pub fn parse_items(&mut self) -> ParseResult<Vec<Item>> {
        let mut items = Vec::new();

        while self.lexer.peek()?.is_some() {
            items.push(self.parse_item()?);
        }

        Ok(items)
    }

    fn create_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    fn error_at(&self, span: Span, message: String) -> Diagnostic {
        Diagnostic::new(span.position, ErrorKind::Syntax(message))
    }

    fn unexpected(&self, token: Token, expecting: &str) -> Diagnostic {
        self.error_at(
            token.span,
            format!(
                "expected {expecting} but found `{}`",
                self.lexer.source().value_of_span(token.span)
            ),
        )
    }

    fn expect_peek(&mut self, expecting: &str) -> ParseResult<Token> {
        match self.lexer.peek()? {
            Some(token) => Ok(token),
            None => Err(Diagnostic::new(
                self.lexer.current_position(),
                ErrorKind::Syntax(format!("expected {expecting} but reached end of file")),
            )),
        }
    }

    fn expect_next(&mut self, expecting: &str) -> ParseResult<Token> {
        let token = self.expect_peek(expecting)?;
        self.lexer.next()?;
        Ok(token)
    }

    fn expect_next_to_be(&mut self, kind: TokenKind, expecting: &str) -> ParseResult<Token> {
        let token = self.expect_next(expecting)?;

        if token.kind != kind {
            return Err(self.unexpected(token, expecting));
        }

        Ok(token)
    }

    fn peek_is(&mut self, kind: TokenKind) -> ParseResult<bool> {
        Ok(self.lexer.peek()?.is_some_and(|t| t.kind == kind))
    }

    /// Consumes the next token if it is of the given kind
    fn eat(&mut self, kind: TokenKind) -> ParseResult<Option<Token>> {
        if self.peek_is(kind)? {
            return self.lexer.next();
        }

        Ok(None)
    }

    fn parse_item(&mut self) -> ParseResult<Item> {
        let ty = self.parse_type_specifier()?;
        let name = self.parse_identifier()?;

        if self.peek_is(TokenKind::OpenParen)? {
            let signature = self.parse_function_signature(ty, name)?;

            if let Some(semicolon) = self.eat(TokenKind::Semicolon)? {
                return Ok(Item {
                    id: self.create_node_id(),
                    span: signature.span.to(semicolon.span),
                    kind: ItemKind::FunctionPrototype(signature),
                });
            }

            let body = self.parse_block()?;
            let span = signature.span.to(body.span);

            return Ok(Item {
                id: self.create_node_id(),
                span,
                kind: ItemKind::FunctionDefinition(Box::new(FunctionDefinition {
                    id: self.create_node_id(),
                    span,
                    signature,
                    body,
                })),
            });
        }

        // The stars parsed with the type belong to the first declarator only
        let first = self.parse_declarator_rest(ty.pointer_depth, name)?;
        let declaration = self.parse_declaration_rest(ty.span, ty.base, first)?;

        Ok(Item {
            id: self.create_node_id(),
            span: declaration.span,
            kind: ItemKind::GlobalDeclaration(declaration),
        })
    }

    // int **
    fn parse_type_specifier(&mut self) -> ParseResult<TypeSpecifier> {
        let keyword = self.expect_next("type")?;

        let base = match keyword.kind {
            TokenKind::Keyword(Keyword::Int) => BaseType::Int,
            TokenKind::Keyword(Keyword::Void) => BaseType::Void,
            _ => return Err(self.unexpected(keyword, "type")),
        };

        let mut span = keyword.span;
        let mut pointer_depth = 0;

        while let Some(asterisk) = self.eat(TokenKind::Asterisk)? {
            span = span.to(asterisk.span);
            pointer_depth += 1;
        }

        Ok(TypeSpecifier {
            span,
            base,
            pointer_depth,
        })
    }

    // main
    fn parse_identifier(&mut self) -> ParseResult<Identifier> {
        let token = self.expect_next_to_be(TokenKind::Identifier, "identifier")?;

        Ok(Identifier {
            id: self.create_node_id(),
            span: token.span,
            name: Name::new(self.lexer.source().value_of_span(token.span)),
        })
    }

    /// (int a, int *b)
    fn parse_function_signature(
        &mut self,
        return_type: TypeSpecifier,
        name: Identifier,
    ) -> ParseResult<FunctionSignature> {
        self.expect_next_to_be(TokenKind::OpenParen, "opening parenthesis")?;

        let mut parameters = Vec::new();

        let is_void_list = self.peek_is(TokenKind::Keyword(Keyword::Void))?
            && self
                .lexer
                .peek_nth(1)?
                .is_some_and(|t| t.kind == TokenKind::CloseParen);

        if is_void_list {
            // `(void)` declares no parameters
            self.lexer.next()?;
        } else if !self.peek_is(TokenKind::CloseParen)? {
            loop {
                let ty = self.parse_type_specifier()?;
                let name = self.parse_identifier()?;

                parameters.push(Parameter {
                    id: self.create_node_id(),
                    span: ty.span.to(name.span),
                    ty,
                    name,
                });

                if self.eat(TokenKind::Comma)?.is_none() {
                    break;
                }
            }
        }

        let close_paren = self.expect_next_to_be(TokenKind::CloseParen, "closing parenthesis")?;

        Ok(FunctionSignature {
            id: self.create_node_id(),
            span: return_type.span.to(close_paren.span),
            return_type,
            name,
            parameters,
        })
    }

    /// int a, *b, c[10];
    fn parse_declaration(&mut self) -> ParseResult<Declaration> {
        let keyword = self.expect_next("type")?;

        let base = match keyword.kind {
            TokenKind::Keyword(Keyword::Int) => BaseType::Int,
            TokenKind::Keyword(Keyword::Void) => BaseType::Void,
            _ => return Err(self.unexpected(keyword, "type")),
        };

        let first = self.parse_declarator()?;

        self.parse_declaration_rest(keyword.span, base, first)
    }

    fn parse_declaration_rest(
        &mut self,
        start: Span,
        base: BaseType,
        first: Declarator,
    ) -> ParseResult<Declaration> {
        let mut declarators = vec![first];

        while self.eat(TokenKind::Comma)?.is_some() {
            declarators.push(self.parse_declarator()?);
        }

        let semicolon = self.expect_next_to_be(TokenKind::Semicolon, "semicolon")?;

        Ok(Declaration {
            id: self.create_node_id(),
            span: start.to(semicolon.span),
            base,
            declarators,
        })
    }

    // *name[10]
    fn parse_declarator(&mut self) -> ParseResult<Declarator> {
        let mut pointer_depth = 0;

        while self.eat(TokenKind::Asterisk)?.is_some() {
            pointer_depth += 1;
        }

        let name = self.parse_identifier()?;

        self.parse_declarator_rest(pointer_depth, name)
    }

    fn parse_declarator_rest(
        &mut self,
        pointer_depth: usize,
        name: Identifier,
    ) -> ParseResult<Declarator> {
        let mut span = name.span;
        let mut array_length = None;

        if self.eat(TokenKind::OpenBracket)?.is_some() {
            let length = self.expect_next_to_be(TokenKind::IntegerLiteral, "array length")?;
            let text = self.lexer.source().value_of_span(length.span);

            match text.parse::<u32>() {
                Ok(value) if value > 0 => array_length = Some(value),
                _ => {
                    return Err(self.error_at(
                        length.span,
                        format!("invalid array length `{text}`"),
                    ));
                }
            }

            let close = self.expect_next_to_be(TokenKind::CloseBracket, "closing bracket")?;
            span = span.to(close.span);
        }

        Ok(Declarator {
            id: self.create_node_id(),
            span,
            name,
            pointer_depth,
            array_length,
        })
    }

    /// { declarations... statements... }
    fn parse_block(&mut self) -> ParseResult<Block> {
        let open_brace = self.expect_next_to_be(TokenKind::OpenBrace, "opening brace")?;

        let mut declarations = Vec::new();
        let mut statements = Vec::new();

        while self.expect_peek("declaration")?.kind.is_type_keyword() {
            declarations.push(self.parse_declaration()?);
        }

        while !self.peek_is(TokenKind::CloseBrace)? {
            statements.push(self.parse_statement()?);
        }

        let close_brace = self.expect_next_to_be(TokenKind::CloseBrace, "closing brace")?;

        Ok(Block {
            id: self.create_node_id(),
            span: open_brace.span.to(close_brace.span),
            declarations,
            statements,
        })
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        let peeked = self.expect_peek("statement")?;

        match peeked.kind {
            TokenKind::OpenBrace => {
                let block = self.parse_block()?;

                Ok(Statement {
                    id: self.create_node_id(),
                    span: block.span,
                    kind: StatementKind::Block(Box::new(block)),
                })
            }
            TokenKind::Semicolon => {
                self.lexer.next()?;

                Ok(Statement {
                    id: self.create_node_id(),
                    span: peeked.span,
                    kind: StatementKind::Empty,
                })
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if_statement(),
            TokenKind::Keyword(Keyword::While) => self.parse_while_statement(),
            TokenKind::Keyword(Keyword::For) => self.parse_for_statement(),
            TokenKind::Keyword(Keyword::Return) => self.parse_return_statement(),
            TokenKind::Keyword(Keyword::Int | Keyword::Void) => Err(self.error_at(
                peeked.span,
                "declarations must appear before statements in a block".into(),
            )),
            _ => {
                let mut statement = self.parse_simple_statement()?;
                let semicolon = self.expect_next_to_be(TokenKind::Semicolon, "semicolon")?;
                statement.span = statement.span.to(semicolon.span);
                Ok(statement)
            }
        }
    }

    /// An assignment or a bare expression, without the trailing semicolon
    fn parse_simple_statement(&mut self) -> ParseResult<Statement> {
        let target = self.parse_expression()?;

        if self.eat(TokenKind::Equals)?.is_some() {
            let value = self.parse_expression()?;

            return Ok(Statement {
                id: self.create_node_id(),
                span: target.span.to(value.span),
                kind: StatementKind::Assignment(Box::new(Assignment { target, value })),
            });
        }

        Ok(Statement {
            id: self.create_node_id(),
            span: target.span,
            kind: StatementKind::Expression(Box::new(target)),
        })
    }

    fn parse_parenthesized_condition(&mut self) -> ParseResult<Expression> {
        self.expect_next_to_be(TokenKind::OpenParen, "opening parenthesis")?;
        let condition = self.parse_expression()?;
        self.expect_next_to_be(TokenKind::CloseParen, "closing parenthesis")?;

        Ok(condition)
    }

    // if (cond) stmt else stmt
    fn parse_if_statement(&mut self) -> ParseResult<Statement> {
        let if_keyword =
            self.expect_next_to_be(TokenKind::Keyword(Keyword::If), "if keyword")?;

        let condition = self.parse_parenthesized_condition()?;
        let then_branch = self.parse_statement()?;

        let else_branch = match self.eat(TokenKind::Keyword(Keyword::Else))? {
            Some(_) => Some(Box::new(self.parse_statement()?)),
            None => None,
        };

        let end = else_branch
            .as_ref()
            .map(|s| s.span)
            .unwrap_or(then_branch.span);

        Ok(Statement {
            id: self.create_node_id(),
            span: if_keyword.span.to(end),
            kind: StatementKind::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch,
            },
        })
    }

    // while (cond) stmt
    fn parse_while_statement(&mut self) -> ParseResult<Statement> {
        let while_keyword =
            self.expect_next_to_be(TokenKind::Keyword(Keyword::While), "while keyword")?;

        let condition = self.parse_parenthesized_condition()?;
        let body = self.parse_statement()?;

        Ok(Statement {
            id: self.create_node_id(),
            span: while_keyword.span.to(body.span),
            kind: StatementKind::While {
                condition: Box::new(condition),
                body: Box::new(body),
            },
        })
    }

    // for (init; cond; update) stmt
    fn parse_for_statement(&mut self) -> ParseResult<Statement> {
        let for_keyword =
            self.expect_next_to_be(TokenKind::Keyword(Keyword::For), "for keyword")?;

        self.expect_next_to_be(TokenKind::OpenParen, "opening parenthesis")?;

        let initializer = match self.peek_is(TokenKind::Semicolon)? {
            true => None,
            false => Some(Box::new(self.parse_simple_statement()?)),
        };
        self.expect_next_to_be(TokenKind::Semicolon, "semicolon")?;

        let condition = match self.peek_is(TokenKind::Semicolon)? {
            true => None,
            false => Some(Box::new(self.parse_expression()?)),
        };
        self.expect_next_to_be(TokenKind::Semicolon, "semicolon")?;

        let update = match self.peek_is(TokenKind::CloseParen)? {
            true => None,
            false => Some(Box::new(self.parse_simple_statement()?)),
        };
        self.expect_next_to_be(TokenKind::CloseParen, "closing parenthesis")?;

        let body = self.parse_statement()?;

        Ok(Statement {
            id: self.create_node_id(),
            span: for_keyword.span.to(body.span),
            kind: StatementKind::For {
                initializer,
                condition,
                update,
                body: Box::new(body),
            },
        })
    }

    // return expr;
    fn parse_return_statement(&mut self) -> ParseResult<Statement> {
        let return_keyword =
            self.expect_next_to_be(TokenKind::Keyword(Keyword::Return), "return keyword")?;

        let value = match self.peek_is(TokenKind::Semicolon)? {
            true => None,
            false => Some(Box::new(self.parse_expression()?)),
        };

        let semicolon = self.expect_next_to_be(TokenKind::Semicolon, "semicolon")?;

        Ok(Statement {
            id: self.create_node_id(),
            span: return_keyword.span.to(semicolon.span),
            kind: StatementKind::Return(value),
        })
    }

    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_logical_or_expression()
    }

    fn make_binary(
        &mut self,
        lhs: Expression,
        operator: Token,
        rhs: Expression,
    ) -> Expression {
        let kind = match operator.kind {
            TokenKind::LogicalOr => BinaryOperatorKind::LogicalOr,
            TokenKind::LogicalAnd => BinaryOperatorKind::LogicalAnd,
            TokenKind::DoubleEquals => BinaryOperatorKind::Equals,
            TokenKind::NotEquals => BinaryOperatorKind::NotEquals,
            TokenKind::LessThan => BinaryOperatorKind::LessThan,
            TokenKind::LessThanOrEqualTo => BinaryOperatorKind::LessThanOrEqualTo,
            TokenKind::GreaterThan => BinaryOperatorKind::GreaterThan,
            TokenKind::GreaterThanOrEqualTo => BinaryOperatorKind::GreaterThanOrEqualTo,
            TokenKind::Plus => BinaryOperatorKind::Add,
            TokenKind::Minus => BinaryOperatorKind::Subtract,
            TokenKind::Asterisk => BinaryOperatorKind::Multiply,
            TokenKind::Divide => BinaryOperatorKind::Divide,
            _ => unreachable!("token {:?} is not a binary operator", operator.kind),
        };

        Expression {
            id: self.create_node_id(),
            span: lhs.span.to(rhs.span),
            kind: ExpressionKind::Binary {
                lhs: Box::new(lhs),
                operator: BinaryOperator {
                    span: operator.span,
                    kind,
                },
                rhs: Box::new(rhs),
            },
        }
    }

    fn parse_logical_or_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_logical_and_expression()?;

        while let Some(operator) = self.eat(TokenKind::LogicalOr)? {
            let rhs = self.parse_logical_and_expression()?;
            expression = self.make_binary(expression, operator, rhs);
        }

        Ok(expression)
    }

    fn parse_logical_and_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_equality_expression()?;

        while let Some(operator) = self.eat(TokenKind::LogicalAnd)? {
            let rhs = self.parse_equality_expression()?;
            expression = self.make_binary(expression, operator, rhs);
        }

        Ok(expression)
    }

    fn parse_equality_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_relational_expression()?;

        while self
            .expect_peek("operator or expression")?
            .kind
            .is_equality_operator()
        {
            let operator = self.expect_next("equality operator")?;
            let rhs = self.parse_relational_expression()?;
            expression = self.make_binary(expression, operator, rhs);
        }

        Ok(expression)
    }

    fn parse_relational_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_term_expression()?;

        while self
            .expect_peek("operator or expression")?
            .kind
            .is_relational_operator()
        {
            let operator = self.expect_next("relational operator")?;
            let rhs = self.parse_term_expression()?;
            expression = self.make_binary(expression, operator, rhs);
        }

        Ok(expression)
    }

    fn parse_term_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_factor_expression()?;

        while self
            .expect_peek("operator or expression")?
            .kind
            .is_term_operator()
        {
            let operator = self.expect_next("term operator")?;
            let rhs = self.parse_factor_expression()?;
            expression = self.make_binary(expression, operator, rhs);
        }

        Ok(expression)
    }

    fn parse_factor_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_unary_expression()?;

        while self
            .expect_peek("operator or expression")?
            .kind
            .is_factor_operator()
        {
            let operator = self.expect_next("factor operator")?;
            let rhs = self.parse_unary_expression()?;
            expression = self.make_binary(expression, operator, rhs);
        }

        Ok(expression)
    }

    fn parse_unary_expression(&mut self) -> ParseResult<Expression> {
        let peeked = self.expect_peek("expression")?;

        if !peeked.kind.is_unary_operator() {
            return self.parse_postfix_expression();
        }

        self.lexer.next()?;

        let operator = match peeked.kind {
            TokenKind::Minus => UnaryOperator::Negate,
            TokenKind::Ampersand => UnaryOperator::AddressOf,
            TokenKind::Asterisk => UnaryOperator::Deref,
            _ => unreachable!(),
        };

        let operand = self.parse_unary_expression()?;

        Ok(Expression {
            id: self.create_node_id(),
            span: peeked.span.to(operand.span),
            kind: ExpressionKind::Unary {
                operator,
                operand: Box::new(operand),
            },
        })
    }

    // a[1][2]
    fn parse_postfix_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_primary_expression()?;

        while self.eat(TokenKind::OpenBracket)?.is_some() {
            let index = self.parse_expression()?;
            let close = self.expect_next_to_be(TokenKind::CloseBracket, "closing bracket")?;

            expression = Expression {
                id: self.create_node_id(),
                span: expression.span.to(close.span),
                kind: ExpressionKind::Index {
                    base: Box::new(expression),
                    index: Box::new(index),
                },
            };
        }

        Ok(expression)
    }

    fn parse_primary_expression(&mut self) -> ParseResult<Expression> {
        let peeked = self.expect_peek("expression")?;

        match peeked.kind {
            TokenKind::IntegerLiteral => {
                self.lexer.next()?;

                let text = self.lexer.source().value_of_span(peeked.span);
                let Ok(value) = text.parse::<i32>() else {
                    return Err(self.error_at(
                        peeked.span,
                        format!("integer literal `{text}` is out of range"),
                    ));
                };

                Ok(Expression {
                    id: self.create_node_id(),
                    span: peeked.span,
                    kind: ExpressionKind::Number(value),
                })
            }
            TokenKind::Identifier => {
                let identifier = self.parse_identifier()?;

                if self.eat(TokenKind::OpenParen)?.is_none() {
                    return Ok(Expression {
                        id: self.create_node_id(),
                        span: identifier.span,
                        kind: ExpressionKind::Identifier(identifier),
                    });
                }

                let mut arguments = Vec::new();

                if !self.peek_is(TokenKind::CloseParen)? {
                    loop {
                        arguments.push(self.parse_expression()?);

                        if self.eat(TokenKind::Comma)?.is_none() {
                            break;
                        }
                    }
                }

                let close_paren =
                    self.expect_next_to_be(TokenKind::CloseParen, "closing parenthesis")?;

                Ok(Expression {
                    id: self.create_node_id(),
                    span: identifier.span.to(close_paren.span),
                    kind: ExpressionKind::Call {
                        function: identifier,
                        arguments,
                    },
                })
            }
            TokenKind::OpenParen => {
                self.lexer.next()?;
                let mut expression = self.parse_expression()?;
                let close_paren =
                    self.expect_next_to_be(TokenKind::CloseParen, "closing parenthesis")?;

                expression.span = peeked.span.to(close_paren.span);

                Ok(expression)
            }
            _ => Err(self.unexpected(peeked, "expression")),
        }
    }
}
