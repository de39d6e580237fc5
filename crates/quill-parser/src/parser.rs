//! Recursive-descent parser producing the owned AST.
//!
//! Statement structure follows the indentation tokens emitted by the
//! lexer; expressions use precedence climbing. The parser stops at the
//! first error: unlike semantic analysis, there is no recovery mode — a
//! malformed tree is not worth analysing.

use quill_core::{BinaryOp, ParseError, ParseErrorKind, Span, UnaryOp};

use crate::ast::*;
use crate::lexer::{Lexer, Token, TokenKind};

type Result<T> = std::result::Result<T, ParseError>;

/// Parse a complete compilation unit.
pub fn parse_module(source: &str) -> Result<Module> {
    let tokens = Lexer::tokenize(source)?;
    Parser::new(tokens).module()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    // ========================================================================
    // Token access
    // ========================================================================

    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn advance(&mut self) -> Token {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, Span::default()));
        self.pos += 1;
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.peek() == &kind {
            Ok(self.advance())
        } else {
            Err(ParseError::new(
                ParseErrorKind::ExpectedToken,
                format!("expected {}, found {}", kind.describe(), self.peek().describe()),
                self.span(),
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span)> {
        let span = self.span();
        match self.advance().kind {
            TokenKind::Ident(name) => Ok((name, span)),
            other => Err(ParseError::new(
                ParseErrorKind::ExpectedIdentifier,
                format!("expected identifier, found {}", other.describe()),
                span,
            )),
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn module(&mut self) -> Result<Module> {
        let mut stmts = Vec::new();
        while self.peek() != &TokenKind::Eof {
            if self.eat(&TokenKind::Newline) {
                continue;
            }
            stmts.push(self.statement()?);
        }
        Ok(Module { stmts })
    }

    fn statement(&mut self) -> Result<Stmt> {
        match self.peek() {
            TokenKind::At | TokenKind::Def | TokenKind::Class => self.decorated(),
            TokenKind::If => self.if_stmt(),
            TokenKind::While => self.while_stmt(),
            TokenKind::For => self.for_stmt(),
            _ => {
                let stmt = self.simple_stmt()?;
                self.expect(TokenKind::Newline)?;
                Ok(stmt)
            }
        }
    }

    fn decorated(&mut self) -> Result<Stmt> {
        let mut decorators = Vec::new();
        while self.peek() == &TokenKind::At {
            let span = self.span();
            self.advance();
            let (name, _) = self.expect_ident()?;
            let mut kwargs = Vec::new();
            if self.eat(&TokenKind::LParen) {
                while self.peek() != &TokenKind::RParen {
                    let (key, _) = self.expect_ident()?;
                    self.expect(TokenKind::Assign)?;
                    let value = self.expr()?;
                    kwargs.push((key, value));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen)?;
            }
            self.expect(TokenKind::Newline)?;
            decorators.push(Decorator { name, kwargs, span });
        }
        match self.peek() {
            TokenKind::Def => self.function_def(decorators),
            TokenKind::Class => self.class_def(decorators),
            _ => Err(ParseError::new(
                ParseErrorKind::InvalidStatement,
                "decorators must precede a function or class definition",
                self.span(),
            )),
        }
    }

    fn function_def(&mut self, decorators: Vec<Decorator>) -> Result<Stmt> {
        let start = self.span();
        self.expect(TokenKind::Def)?;
        let (name, _) = self.expect_ident()?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while self.peek() != &TokenKind::RParen {
            let (pname, pspan) = self.expect_ident()?;
            let annotation = if self.eat(&TokenKind::Colon) {
                Some(self.type_annotation()?)
            } else {
                None
            };
            let default = if self.eat(&TokenKind::Assign) {
                Some(self.expr()?)
            } else {
                None
            };
            params.push(ParamNode {
                name: pname,
                annotation,
                default,
                span: pspan,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        let returns = if self.eat(&TokenKind::Arrow) {
            Some(self.type_annotation()?)
        } else {
            None
        };
        self.expect(TokenKind::Colon)?;
        let body = self.block()?;
        Ok(Stmt {
            span: start,
            kind: StmtKind::FunctionDef(FunctionDef {
                name,
                decorators,
                params,
                returns,
                body,
                span: start,
            }),
        })
    }

    fn class_def(&mut self, decorators: Vec<Decorator>) -> Result<Stmt> {
        let start = self.span();
        self.expect(TokenKind::Class)?;
        let (name, _) = self.expect_ident()?;
        let mut bases = Vec::new();
        if self.eat(&TokenKind::LParen) {
            while self.peek() != &TokenKind::RParen {
                let (base, _) = self.expect_ident()?;
                bases.push(base);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
        }
        self.expect(TokenKind::Colon)?;
        let body = self.block()?;
        Ok(Stmt {
            span: start,
            kind: StmtKind::ClassDef(ClassDef {
                name,
                decorators,
                bases,
                body,
                span: start,
            }),
        })
    }

    fn if_stmt(&mut self) -> Result<Stmt> {
        let start = self.span();
        self.expect(TokenKind::If)?;
        let mut branches = Vec::new();
        let cond = self.expr()?;
        self.expect(TokenKind::Colon)?;
        branches.push((cond, self.block()?));
        let mut orelse = Vec::new();
        loop {
            if self.peek() == &TokenKind::Elif {
                self.advance();
                let cond = self.expr()?;
                self.expect(TokenKind::Colon)?;
                branches.push((cond, self.block()?));
            } else if self.peek() == &TokenKind::Else {
                self.advance();
                self.expect(TokenKind::Colon)?;
                orelse = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt {
            span: start,
            kind: StmtKind::If { branches, orelse },
        })
    }

    fn while_stmt(&mut self) -> Result<Stmt> {
        let start = self.span();
        self.expect(TokenKind::While)?;
        let cond = self.expr()?;
        self.expect(TokenKind::Colon)?;
        let body = self.block()?;
        Ok(Stmt {
            span: start,
            kind: StmtKind::While { cond, body },
        })
    }

    fn for_stmt(&mut self) -> Result<Stmt> {
        let start = self.span();
        self.expect(TokenKind::For)?;
        let (target, _) = self.expect_ident()?;
        if self.peek() == &TokenKind::Comma {
            // Tuple unpacking in loop headers is not supported.
            return Err(ParseError::new(
                ParseErrorKind::InvalidStatement,
                "loop target must be a single name",
                self.span(),
            ));
        }
        self.expect(TokenKind::In)?;
        let iter = self.expr_or_tuple()?;
        self.expect(TokenKind::Colon)?;
        let body = self.block()?;
        Ok(Stmt {
            span: start,
            kind: StmtKind::For { target, iter, body },
        })
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(TokenKind::Newline)?;
        if self.peek() != &TokenKind::Indent {
            return Err(ParseError::new(
                ParseErrorKind::ExpectedBlock,
                "expected an indented block",
                self.span(),
            ));
        }
        self.advance();
        let mut stmts = Vec::new();
        while self.peek() != &TokenKind::Dedent && self.peek() != &TokenKind::Eof {
            if self.eat(&TokenKind::Newline) {
                continue;
            }
            stmts.push(self.statement()?);
        }
        self.eat(&TokenKind::Dedent);
        Ok(stmts)
    }

    fn simple_stmt(&mut self) -> Result<Stmt> {
        let start = self.span();
        match self.peek() {
            TokenKind::Return => {
                self.advance();
                let value = if self.peek() == &TokenKind::Newline {
                    None
                } else {
                    Some(self.expr_or_tuple()?)
                };
                Ok(Stmt {
                    span: start,
                    kind: StmtKind::Return { value },
                })
            }
            TokenKind::Pass => {
                self.advance();
                Ok(Stmt {
                    span: start,
                    kind: StmtKind::Pass,
                })
            }
            TokenKind::Break => {
                self.advance();
                Ok(Stmt {
                    span: start,
                    kind: StmtKind::Break,
                })
            }
            TokenKind::Continue => {
                self.advance();
                Ok(Stmt {
                    span: start,
                    kind: StmtKind::Continue,
                })
            }
            TokenKind::Raise => {
                self.advance();
                let exc = self.expr()?;
                Ok(Stmt {
                    span: start,
                    kind: StmtKind::Raise { exc },
                })
            }
            TokenKind::Import => {
                self.advance();
                let (module, _) = self.expect_ident()?;
                Ok(Stmt {
                    span: start,
                    kind: StmtKind::Import { module },
                })
            }
            TokenKind::From => {
                self.advance();
                let (module, _) = self.expect_ident()?;
                self.expect(TokenKind::Import)?;
                let mut names = Vec::new();
                loop {
                    let (name, _) = self.expect_ident()?;
                    names.push(name);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                Ok(Stmt {
                    span: start,
                    kind: StmtKind::FromImport { module, names },
                })
            }
            _ => self.assignment_or_expr(),
        }
    }

    fn assignment_or_expr(&mut self) -> Result<Stmt> {
        let start = self.span();
        let target = self.expr_or_tuple()?;
        match self.peek().clone() {
            TokenKind::Assign => {
                self.advance();
                let value = self.expr_or_tuple()?;
                Ok(Stmt {
                    span: start,
                    kind: StmtKind::Assign { target, value },
                })
            }
            TokenKind::Colon => {
                self.advance();
                let annotation = self.type_annotation()?;
                self.expect(TokenKind::Assign)?;
                let value = self.expr_or_tuple()?;
                Ok(Stmt {
                    span: start,
                    kind: StmtKind::AnnAssign {
                        target,
                        annotation,
                        value,
                    },
                })
            }
            TokenKind::PlusAssign
            | TokenKind::MinusAssign
            | TokenKind::StarAssign
            | TokenKind::SlashAssign
            | TokenKind::PercentAssign => {
                let op = match self.advance().kind {
                    TokenKind::PlusAssign => BinaryOp::Add,
                    TokenKind::MinusAssign => BinaryOp::Sub,
                    TokenKind::StarAssign => BinaryOp::Mul,
                    TokenKind::SlashAssign => BinaryOp::Div,
                    _ => BinaryOp::Mod,
                };
                let value = self.expr_or_tuple()?;
                Ok(Stmt {
                    span: start,
                    kind: StmtKind::AugAssign { target, op, value },
                })
            }
            _ => Ok(Stmt {
                span: start,
                kind: StmtKind::Expr(target),
            }),
        }
    }

    // ========================================================================
    // Type annotations
    // ========================================================================

    fn type_annotation(&mut self) -> Result<TypeAnnotation> {
        let span = self.span();
        let name = match self.advance().kind {
            TokenKind::Ident(name) => name,
            TokenKind::None => "None".to_string(),
            other => {
                return Err(ParseError::new(
                    ParseErrorKind::ExpectedType,
                    format!("expected a type, found {}", other.describe()),
                    span,
                ));
            }
        };
        if self.eat(&TokenKind::LBracket) {
            let mut args = Vec::new();
            while self.peek() != &TokenKind::RBracket {
                args.push(self.type_annotation()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBracket)?;
            Ok(TypeAnnotation {
                kind: TypeAnnotationKind::Generic { name, args },
                span,
            })
        } else {
            Ok(TypeAnnotation {
                kind: TypeAnnotationKind::Name(name),
                span,
            })
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// An expression, or a bare comma-separated tuple.
    fn expr_or_tuple(&mut self) -> Result<Expr> {
        let first = self.expr()?;
        if self.peek() != &TokenKind::Comma {
            return Ok(first);
        }
        let span = first.span;
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if matches!(
                self.peek(),
                TokenKind::Newline | TokenKind::RParen | TokenKind::Eof
            ) {
                break;
            }
            items.push(self.expr()?);
        }
        Ok(Expr {
            kind: ExprKind::Tuple(items),
            span,
        })
    }

    fn expr(&mut self) -> Result<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.eat(&TokenKind::Or) {
            let right = self.and_expr()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.not_expr()?;
        while self.eat(&TokenKind::And) {
            let right = self.not_expr()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.peek() == &TokenKind::Not {
            let span = self.span();
            self.advance();
            let operand = self.not_expr()?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                span,
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.bit_or()?;
        let op = match self.peek() {
            TokenKind::EqEq => Some(BinaryOp::Eq),
            TokenKind::NotEq => Some(BinaryOp::NotEq),
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::LtE => Some(BinaryOp::LtE),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::GtE => Some(BinaryOp::GtE),
            TokenKind::In => Some(BinaryOp::In),
            TokenKind::Not if self.peek_at(1) == &TokenKind::In => Some(BinaryOp::NotIn),
            _ => None,
        };
        match op {
            Some(BinaryOp::NotIn) => {
                self.advance();
                self.advance();
                let right = self.bit_or()?;
                Ok(binary(BinaryOp::NotIn, left, right))
            }
            Some(op) => {
                self.advance();
                let right = self.bit_or()?;
                Ok(binary(op, left, right))
            }
            None => Ok(left),
        }
    }

    fn bit_or(&mut self) -> Result<Expr> {
        let mut left = self.bit_xor()?;
        while self.eat(&TokenKind::Pipe) {
            let right = self.bit_xor()?;
            left = binary(BinaryOp::BitOr, left, right);
        }
        Ok(left)
    }

    fn bit_xor(&mut self) -> Result<Expr> {
        let mut left = self.bit_and()?;
        while self.eat(&TokenKind::Caret) {
            let right = self.bit_and()?;
            left = binary(BinaryOp::BitXor, left, right);
        }
        Ok(left)
    }

    fn bit_and(&mut self) -> Result<Expr> {
        let mut left = self.shift()?;
        while self.eat(&TokenKind::Amp) {
            let right = self.shift()?;
            left = binary(BinaryOp::BitAnd, left, right);
        }
        Ok(left)
    }

    fn shift(&mut self) -> Result<Expr> {
        let mut left = self.arith()?;
        loop {
            let op = match self.peek() {
                TokenKind::Shl => BinaryOp::Shl,
                TokenKind::Shr => BinaryOp::Shr,
                _ => break,
            };
            self.advance();
            let right = self.arith()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn arith(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.term()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash | TokenKind::DoubleSlash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.factor()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr> {
        let span = self.span();
        let op = match self.peek() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Pos),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.factor()?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            });
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.postfix()?;
        if self.eat(&TokenKind::DoubleStar) {
            let exp = self.factor()?;
            return Ok(binary(BinaryOp::Pow, base, exp));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.atom()?;
        loop {
            match self.peek() {
                TokenKind::LParen => {
                    self.advance();
                    let (args, kwargs) = self.call_arguments()?;
                    let span = expr.span;
                    expr = Expr {
                        kind: ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            kwargs,
                        },
                        span,
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let (attr, _) = self.expect_ident()?;
                    let span = expr.span;
                    expr = Expr {
                        kind: ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        span,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    expr = self.subscript_or_slice(expr)?;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while self.peek() != &TokenKind::RParen {
            // `name=` introduces a keyword argument.
            let is_kwarg = matches!(self.peek(), TokenKind::Ident(_))
                && self.peek_at(1) == &TokenKind::Assign;
            if is_kwarg {
                let (key, _) = self.expect_ident()?;
                self.expect(TokenKind::Assign)?;
                kwargs.push((key, self.expr()?));
            } else {
                args.push(self.expr()?);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok((args, kwargs))
    }

    fn subscript_or_slice(&mut self, value: Expr) -> Result<Expr> {
        let span = value.span;
        let lower = if self.peek() == &TokenKind::Colon {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        if self.eat(&TokenKind::Colon) {
            let upper = if self.peek() == &TokenKind::RBracket {
                None
            } else {
                Some(Box::new(self.expr()?))
            };
            self.expect(TokenKind::RBracket)?;
            Ok(Expr {
                kind: ExprKind::Slice {
                    value: Box::new(value),
                    lower,
                    upper,
                },
                span,
            })
        } else {
            self.expect(TokenKind::RBracket)?;
            let index = lower.ok_or_else(|| {
                ParseError::new(
                    ParseErrorKind::ExpectedExpression,
                    "expected a subscript expression",
                    span,
                )
            })?;
            Ok(Expr {
                kind: ExprKind::Subscript {
                    value: Box::new(value),
                    index,
                },
                span,
            })
        }
    }

    fn atom(&mut self) -> Result<Expr> {
        let span = self.span();
        match self.advance().kind {
            TokenKind::Ident(name) => Ok(Expr {
                kind: ExprKind::Name(name),
                span,
            }),
            TokenKind::Int(value) => Ok(Expr {
                kind: ExprKind::Int(value),
                span,
            }),
            TokenKind::Str(value) => Ok(Expr {
                kind: ExprKind::Str(value),
                span,
            }),
            TokenKind::Bytes(value) => Ok(Expr {
                kind: ExprKind::Bytes(value),
                span,
            }),
            TokenKind::True => Ok(Expr {
                kind: ExprKind::Bool(true),
                span,
            }),
            TokenKind::False => Ok(Expr {
                kind: ExprKind::Bool(false),
                span,
            }),
            TokenKind::None => Ok(Expr {
                kind: ExprKind::NoneLit,
                span,
            }),
            TokenKind::LParen => {
                if self.eat(&TokenKind::RParen) {
                    return Ok(Expr {
                        kind: ExprKind::Tuple(Vec::new()),
                        span,
                    });
                }
                let inner = self.expr_or_tuple()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                let mut items = Vec::new();
                while self.peek() != &TokenKind::RBracket {
                    items.push(self.expr()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Expr {
                    kind: ExprKind::List(items),
                    span,
                })
            }
            TokenKind::LBrace => {
                let mut entries = Vec::new();
                while self.peek() != &TokenKind::RBrace {
                    let key = self.expr()?;
                    self.expect(TokenKind::Colon)?;
                    let value = self.expr()?;
                    entries.push((key, value));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace)?;
                Ok(Expr {
                    kind: ExprKind::Dict(entries),
                    span,
                })
            }
            other => Err(ParseError::new(
                ParseErrorKind::ExpectedExpression,
                format!("expected an expression, found {}", other.describe()),
                span,
            )),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let span = left.span;
    Expr {
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Module {
        parse_module(source).unwrap()
    }

    #[test]
    fn function_with_params_and_return() {
        let module = parse("def add(a: int, b: int) -> int:\n    return a + b\n");
        let func = module.functions().next().unwrap();
        assert_eq!(func.name, "add");
        assert_eq!(func.params.len(), 2);
        assert!(func.returns.is_some());
        assert_eq!(func.body.len(), 1);
    }

    #[test]
    fn decorator_with_kwargs() {
        let module = parse("@public(safe=True)\ndef f() -> int:\n    return 1\n");
        let func = module.functions().next().unwrap();
        let dec = func.decorator("public").unwrap();
        assert_eq!(dec.kwargs.len(), 1);
        assert_eq!(dec.kwargs[0].0, "safe");
    }

    #[test]
    fn precedence_mul_over_add() {
        let module = parse("x = 1 + 2 * 3\n");
        let StmtKind::Assign { value, .. } = &module.stmts[0].kind else {
            panic!("expected assignment");
        };
        let ExprKind::Binary { op, right, .. } = &value.kind else {
            panic!("expected binary expr");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn if_elif_else_chain() {
        let module = parse("if a:\n    pass\nelif b:\n    pass\nelse:\n    pass\n");
        let StmtKind::If { branches, orelse } = &module.stmts[0].kind else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(orelse.len(), 1);
    }

    #[test]
    fn class_with_base_and_method() {
        let source = "class Token(Base):\n    def __init__(self):\n        pass\n";
        let module = parse(source);
        let class = module.classes().next().unwrap();
        assert_eq!(class.bases, vec!["Base".to_string()]);
        assert_eq!(class.methods().count(), 1);
    }

    #[test]
    fn slice_and_subscript() {
        let module = parse("a = s[1]\nb = s[1:3]\nc = s[:2]\n");
        assert!(matches!(
            &module.stmts[0].kind,
            StmtKind::Assign { value, .. } if matches!(value.kind, ExprKind::Subscript { .. })
        ));
        assert!(matches!(
            &module.stmts[1].kind,
            StmtKind::Assign { value, .. } if matches!(value.kind, ExprKind::Slice { .. })
        ));
        assert!(matches!(
            &module.stmts[2].kind,
            StmtKind::Assign { value, .. }
                if matches!(&value.kind, ExprKind::Slice { lower: None, .. })
        ));
    }

    #[test]
    fn call_with_kwargs() {
        let module = parse("add_permission(contract='*', methods='*')\n");
        let StmtKind::Expr(expr) = &module.stmts[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Call { kwargs, args, .. } = &expr.kind else {
            panic!("expected call");
        };
        assert!(args.is_empty());
        assert_eq!(kwargs.len(), 2);
    }

    #[test]
    fn return_tuple_parses() {
        let module = parse("def f() -> int:\n    return 1, 2\n");
        let func = module.functions().next().unwrap();
        let StmtKind::Return { value: Some(value) } = &func.body[0].kind else {
            panic!("expected return");
        };
        assert!(matches!(value.kind, ExprKind::Tuple(_)));
    }

    #[test]
    fn imports() {
        let module = parse("import runtime\nfrom helpers import mint, burn\n");
        assert!(matches!(
            &module.stmts[0].kind,
            StmtKind::Import { module } if module == "runtime"
        ));
        assert!(matches!(
            &module.stmts[1].kind,
            StmtKind::FromImport { names, .. } if names.len() == 2
        ));
    }

    #[test]
    fn annotated_assignment() {
        let module = parse("total: int = 0\n");
        assert!(matches!(&module.stmts[0].kind, StmtKind::AnnAssign { .. }));
    }

    #[test]
    fn not_in_operator() {
        let module = parse("x = a not in b\n");
        let StmtKind::Assign { value, .. } = &module.stmts[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(
            value.kind,
            ExprKind::Binary {
                op: BinaryOp::NotIn,
                ..
            }
        ));
    }

    #[test]
    fn missing_block_is_an_error() {
        let err = parse_module("def f():\nreturn 1\n").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectedBlock);
    }
}
