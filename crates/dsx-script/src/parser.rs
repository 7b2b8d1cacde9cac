//! Expression Parser
//!
//! Recursive-descent parser for template expressions. The whole input must
//! form exactly one expression (or a comma sequence of them).

use crate::ast::{Ast, AstNode, AstNodeKind, BinaryOp, LiteralValue, LogicalOp, NodeId, UnaryOp};
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};
use std::fmt;

/// Parser error
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.span.start)
    }
}

impl std::error::Error for ParseError {}

/// Deepest nesting of subexpressions accepted
pub const MAX_NESTING: usize = 256;

/// Expression parser
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token,
    previous: Token,
    ast: Ast,
    depth: usize,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Self {
            lexer,
            current: current.clone(),
            previous: current,
            ast: Ast::new(),
            depth: 0,
        }
    }

    fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, self.lexer.next_token());
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    fn consume(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> ParseError {
        let message = match &self.current.kind {
            TokenKind::Eof => "unexpected end of expression".to_string(),
            TokenKind::Error(message) => message.to_string(),
            other => format!("unexpected token {other:?}"),
        };
        ParseError {
            message,
            span: self.current.span,
        }
    }

    /// Run `parse` one nesting level deeper, failing past [`MAX_NESTING`]
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, ParseError>) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError {
                message: "expression nested too deeply".into(),
                span: self.current.span,
            });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn add(&mut self, kind: AstNodeKind, span: Span) -> NodeId {
        self.ast.add_node(AstNode::new(kind, span))
    }

    fn spanning(&self, first: NodeId, last: NodeId) -> Span {
        self.ast.span(first).merge(self.ast.span(last))
    }

    /// Parse the full input as one expression
    pub fn parse(mut self) -> Result<Ast, ParseError> {
        if self.check(&TokenKind::Eof) {
            return Err(ParseError {
                message: "empty expression".into(),
                span: self.current.span,
            });
        }

        let root = self.parse_sequence()?;
        if !self.check(&TokenKind::Eof) {
            return Err(ParseError {
                message: "not a valid expression".into(),
                span: self.current.span,
            });
        }

        self.ast.set_root(root);
        Ok(self.ast)
    }

    fn parse_sequence(&mut self) -> Result<NodeId, ParseError> {
        let first = self.parse_conditional()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }

        let mut expressions = vec![first];
        while self.check(&TokenKind::Comma) {
            self.advance();
            expressions.push(self.parse_conditional()?);
        }
        let span = self.ast.span(first).merge(self.previous.span);
        Ok(self.add(AstNodeKind::SequenceExpression { expressions }, span))
    }

    fn parse_conditional(&mut self) -> Result<NodeId, ParseError> {
        self.nested(Self::parse_conditional_inner)
    }

    fn parse_conditional_inner(&mut self) -> Result<NodeId, ParseError> {
        let test = self.parse_binary(1)?;
        if !self.check(&TokenKind::Question) {
            return Ok(test);
        }

        self.advance();
        let consequent = self.parse_conditional()?;
        self.consume(TokenKind::Colon)?;
        let alternate = self.parse_conditional()?;
        let span = self.spanning(test, alternate);
        Ok(self.add(
            AstNodeKind::ConditionalExpression { test, consequent, alternate },
            span,
        ))
    }

    /// Precedence climbing over the binary and logical operators
    fn parse_binary(&mut self, min_precedence: u8) -> Result<NodeId, ParseError> {
        let mut left = self.parse_unary()?;

        loop {
            let precedence = self.current.kind.precedence();
            if precedence == 0 || precedence < min_precedence {
                break;
            }

            let operator = self.current.kind.clone();
            self.advance();
            // ** is right-associative
            let next_min = if operator == TokenKind::StarStar {
                precedence
            } else {
                precedence + 1
            };
            let right = self.nested(|parser| parser.parse_binary(next_min))?;
            let span = self.spanning(left, right);

            let kind = match operator {
                TokenKind::PipePipe => AstNodeKind::LogicalExpression { operator: LogicalOp::Or, left, right },
                TokenKind::AmpersandAmpersand => AstNodeKind::LogicalExpression { operator: LogicalOp::And, left, right },
                TokenKind::QuestionQuestion => {
                    AstNodeKind::LogicalExpression { operator: LogicalOp::NullishCoalescing, left, right }
                }
                other => match binary_operator(&other) {
                    Some(operator) => AstNodeKind::BinaryExpression { operator, left, right },
                    None => {
                        return Err(ParseError {
                            message: format!("unknown operator {other:?}"),
                            span,
                        });
                    }
                },
            };
            left = self.add(kind, span);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<NodeId, ParseError> {
        let start = self.current.span;
        let operator = match self.current.kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Tilde => UnaryOp::BitwiseNot,
            TokenKind::Typeof => UnaryOp::Typeof,
            TokenKind::Void => UnaryOp::Void,
            TokenKind::Delete => UnaryOp::Delete,
            _ => return self.parse_call_member(),
        };

        self.advance();
        let argument = self.nested(Self::parse_unary)?;
        let span = start.merge(self.ast.span(argument));
        Ok(self.add(AstNodeKind::UnaryExpression { operator, argument }, span))
    }

    fn parse_call_member(&mut self) -> Result<NodeId, ParseError> {
        let mut expr = if self.check(&TokenKind::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };

        loop {
            match self.current.kind {
                TokenKind::Dot => {
                    self.advance();
                    expr = self.parse_static_member(expr, false)?;
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    expr = match self.current.kind {
                        TokenKind::LBracket => self.parse_computed_member(expr, true)?,
                        TokenKind::LParen => self.parse_call_arguments(expr)?,
                        _ => self.parse_static_member(expr, true)?,
                    };
                }
                TokenKind::LBracket => expr = self.parse_computed_member(expr, false)?,
                TokenKind::LParen => expr = self.parse_call_arguments(expr)?,
                _ => break,
            }
        }

        Ok(expr)
    }

    /// `new Callee(args)`; the callee is a member chain without calls
    fn parse_new(&mut self) -> Result<NodeId, ParseError> {
        let start = self.current.span;
        self.advance(); // new

        let mut callee = if self.check(&TokenKind::New) {
            self.nested(Self::parse_new)?
        } else {
            self.parse_primary()?
        };
        loop {
            match self.current.kind {
                TokenKind::Dot => {
                    self.advance();
                    callee = self.parse_static_member(callee, false)?;
                }
                TokenKind::LBracket => callee = self.parse_computed_member(callee, false)?,
                _ => break,
            }
        }

        let arguments = if self.check(&TokenKind::LParen) {
            self.advance();
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        let span = start.merge(self.previous.span);
        Ok(self.add(AstNodeKind::NewExpression { callee, arguments }, span))
    }

    fn parse_static_member(&mut self, object: NodeId, optional: bool) -> Result<NodeId, ParseError> {
        let span = self.current.span;
        let Some(name) = self.current.kind.property_name().map(Box::<str>::from) else {
            return Err(self.unexpected());
        };
        self.advance();
        let property = self.add(AstNodeKind::Identifier { name }, span);
        let span = self.spanning(object, property);
        Ok(self.add(
            AstNodeKind::MemberExpression { object, property, computed: false, optional },
            span,
        ))
    }

    fn parse_computed_member(&mut self, object: NodeId, optional: bool) -> Result<NodeId, ParseError> {
        self.advance(); // [
        let property = self.parse_sequence()?;
        self.consume(TokenKind::RBracket)?;
        let span = self.ast.span(object).merge(self.previous.span);
        Ok(self.add(
            AstNodeKind::MemberExpression { object, property, computed: true, optional },
            span,
        ))
    }

    fn parse_call_arguments(&mut self, callee: NodeId) -> Result<NodeId, ParseError> {
        self.advance(); // (
        let arguments = self.parse_arguments()?;
        let span = self.ast.span(callee).merge(self.previous.span);
        Ok(self.add(AstNodeKind::CallExpression { callee, arguments }, span))
    }

    /// Arguments after `(`, consuming the closing `)`
    fn parse_arguments(&mut self) -> Result<Vec<NodeId>, ParseError> {
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) {
            if self.check(&TokenKind::DotDotDot) {
                return Err(ParseError {
                    message: "spread arguments are not supported".into(),
                    span: self.current.span,
                });
            }
            args.push(self.parse_conditional()?);
            if !self.check(&TokenKind::RParen) {
                self.consume(TokenKind::Comma)?;
            }
        }
        self.consume(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<NodeId, ParseError> {
        let span = self.current.span;
        let literal = match &self.current.kind {
            TokenKind::Number(n) => Some(LiteralValue::Number(*n)),
            TokenKind::String(s) => Some(LiteralValue::String(s.clone())),
            TokenKind::Boolean(b) => Some(LiteralValue::Bool(*b)),
            TokenKind::Null => Some(LiteralValue::Null),
            TokenKind::Undefined => Some(LiteralValue::Undefined),
            _ => None,
        };
        if let Some(value) = literal {
            self.advance();
            return Ok(self.add(AstNodeKind::Literal { value }, span));
        }

        match &self.current.kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(self.add(AstNodeKind::Identifier { name }, span))
            }
            TokenKind::This => {
                self.advance();
                Ok(self.add(AstNodeKind::ThisExpression, span))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_sequence()?;
                self.consume(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::NoSubstitutionTemplate(text) => {
                let quasis = vec![text.clone()];
                self.advance();
                Ok(self.add(
                    AstNodeKind::TemplateLiteral { quasis, expressions: Vec::new() },
                    span,
                ))
            }
            TokenKind::TemplateHead(text) => {
                let quasis = vec![text.clone()];
                self.advance();
                self.parse_template_rest(span, quasis)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Substitutions and text chunks following a template head
    fn parse_template_rest(&mut self, start: Span, mut quasis: Vec<Box<str>>) -> Result<NodeId, ParseError> {
        let mut expressions = Vec::new();

        loop {
            expressions.push(self.parse_sequence()?);
            if !self.check(&TokenKind::RBrace) {
                return Err(self.unexpected());
            }

            // `current` is the closing brace; the lexer sits right after it
            let chunk = self.lexer.continue_template(self.current.span.start);
            let next = match &chunk.kind {
                TokenKind::TemplateMiddle(text) => Some((text.clone(), false)),
                TokenKind::TemplateTail(text) => Some((text.clone(), true)),
                _ => None,
            };
            self.current = chunk;
            let Some((text, done)) = next else {
                return Err(self.unexpected());
            };
            quasis.push(text);
            self.advance();
            if done {
                break;
            }
        }

        let span = start.merge(self.previous.span);
        Ok(self.add(AstNodeKind::TemplateLiteral { quasis, expressions }, span))
    }

    fn parse_array_literal(&mut self) -> Result<NodeId, ParseError> {
        let start = self.current.span;
        self.advance(); // [
        let mut elements = Vec::new();

        while !self.check(&TokenKind::RBracket) {
            if self.check(&TokenKind::Comma) {
                self.advance();
                elements.push(None); // elision
                continue;
            }
            if self.check(&TokenKind::DotDotDot) {
                return Err(ParseError {
                    message: "spread elements are not supported".into(),
                    span: self.current.span,
                });
            }
            elements.push(Some(self.parse_conditional()?));
            if !self.check(&TokenKind::RBracket) {
                self.consume(TokenKind::Comma)?;
            }
        }
        self.consume(TokenKind::RBracket)?;

        Ok(self.add(
            AstNodeKind::ArrayExpression { elements },
            start.merge(self.previous.span),
        ))
    }
}

fn binary_operator(kind: &TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        TokenKind::StarStar => BinaryOp::Pow,
        TokenKind::LessThan => BinaryOp::LessThan,
        TokenKind::LessThanEq => BinaryOp::LessThanEq,
        TokenKind::GreaterThan => BinaryOp::GreaterThan,
        TokenKind::GreaterThanEq => BinaryOp::GreaterThanEq,
        TokenKind::EqEq => BinaryOp::Equal,
        TokenKind::NotEq => BinaryOp::NotEqual,
        TokenKind::EqEqEq => BinaryOp::StrictEqual,
        TokenKind::NotEqEq => BinaryOp::StrictNotEqual,
        TokenKind::LShift => BinaryOp::LeftShift,
        TokenKind::RShift => BinaryOp::RightShift,
        TokenKind::URShift => BinaryOp::UnsignedRightShift,
        TokenKind::Ampersand => BinaryOp::BitwiseAnd,
        TokenKind::Pipe => BinaryOp::BitwiseOr,
        TokenKind::Caret => BinaryOp::BitwiseXor,
        TokenKind::In => BinaryOp::In,
        TokenKind::Instanceof => BinaryOp::Instanceof,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_kind(source: &str) -> AstNodeKind {
        let ast = Parser::new(source).parse().unwrap();
        let root = ast.root().unwrap();
        ast.get(root).unwrap().kind.clone()
    }

    #[test]
    fn test_literal() {
        assert!(matches!(
            root_kind("42"),
            AstNodeKind::Literal { value: LiteralValue::Number(n) } if n == 42.0
        ));
        assert!(matches!(
            root_kind("undefined"),
            AstNodeKind::Literal { value: LiteralValue::Undefined }
        ));
    }

    #[test]
    fn test_precedence() {
        let ast = Parser::new("1 + 2 * 3").parse().unwrap();
        let root = ast.get(ast.root().unwrap()).unwrap();
        match &root.kind {
            AstNodeKind::BinaryExpression { operator: BinaryOp::Add, right, .. } => {
                assert!(matches!(
                    ast.get(*right).unwrap().kind,
                    AstNodeKind::BinaryExpression { operator: BinaryOp::Mul, .. }
                ));
            }
            other => panic!("unexpected root {other:?}"),
        }
    }

    #[test]
    fn test_exponent_is_right_associative() {
        let ast = Parser::new("2 ** 3 ** 2").parse().unwrap();
        let root = ast.get(ast.root().unwrap()).unwrap();
        match &root.kind {
            AstNodeKind::BinaryExpression { operator: BinaryOp::Pow, left, right } => {
                assert!(matches!(ast.get(*left).unwrap().kind, AstNodeKind::Literal { .. }));
                assert!(matches!(
                    ast.get(*right).unwrap().kind,
                    AstNodeKind::BinaryExpression { operator: BinaryOp::Pow, .. }
                ));
            }
            other => panic!("unexpected root {other:?}"),
        }
    }

    #[test]
    fn test_logical_and_conditional() {
        assert!(matches!(
            root_kind("a || b && c"),
            AstNodeKind::LogicalExpression { operator: LogicalOp::Or, .. }
        ));
        assert!(matches!(root_kind("a ? b : c ? d : e"), AstNodeKind::ConditionalExpression { .. }));
        assert!(matches!(
            root_kind("a ?? 'x'"),
            AstNodeKind::LogicalExpression { operator: LogicalOp::NullishCoalescing, .. }
        ));
    }

    #[test]
    fn test_member_and_call_chain() {
        assert!(matches!(root_kind("a.b[c](1, 2)"), AstNodeKind::CallExpression { ref arguments, .. } if arguments.len() == 2));
        assert!(matches!(
            root_kind("obj.default"),
            AstNodeKind::MemberExpression { computed: false, optional: false, .. }
        ));
        assert!(matches!(root_kind("a?.b"), AstNodeKind::MemberExpression { optional: true, .. }));
    }

    #[test]
    fn test_new_expression() {
        assert!(matches!(root_kind("new Array(3)"), AstNodeKind::NewExpression { ref arguments, .. } if arguments.len() == 1));
        // member access applies to the constructed value
        assert!(matches!(root_kind("new Array(3).length"), AstNodeKind::MemberExpression { .. }));
    }

    #[test]
    fn test_template_literal() {
        match root_kind("`Hi ${name}, ${count + 1} left`") {
            AstNodeKind::TemplateLiteral { quasis, expressions } => {
                assert_eq!(quasis.len(), 3);
                assert_eq!(&*quasis[0], "Hi ");
                assert_eq!(&*quasis[2], " left");
                assert_eq!(expressions.len(), 2);
            }
            other => panic!("unexpected root {other:?}"),
        }
    }

    #[test]
    fn test_array_and_sequence() {
        assert!(matches!(root_kind("[1, , 3]"), AstNodeKind::ArrayExpression { ref elements } if elements.len() == 3 && elements[1].is_none()));
        assert!(matches!(root_kind("a, b"), AstNodeKind::SequenceExpression { ref expressions } if expressions.len() == 2));
    }

    #[test]
    fn test_rejects_non_expressions() {
        assert!(Parser::new("").parse().is_err());
        assert!(Parser::new("a = 1").parse().is_err());
        assert!(Parser::new("a b").parse().is_err());
        assert!(Parser::new("{a: 1}").parse().is_err());
        assert!(Parser::new("(x) => x").parse().is_err());
        assert!(Parser::new("foo(").parse().is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = |open: &str, close: &str, levels: usize| format!("{}1{}", open.repeat(levels), close.repeat(levels));
        assert!(Parser::new(&deep("(", ")", MAX_NESTING - 1)).parse().is_ok());

        for source in [
            deep("(", ")", 200_000),
            deep("[", "]", MAX_NESTING + 1),
            deep("!", "", MAX_NESTING + 1),
            deep("2 ** ", "", MAX_NESTING + 1),
            deep("f(", ")", MAX_NESTING + 1),
            format!("{}Array", "new ".repeat(MAX_NESTING + 1)),
        ] {
            let error = Parser::new(&source).parse().unwrap_err();
            assert_eq!(error.message, "expression nested too deeply");
        }
    }
}
