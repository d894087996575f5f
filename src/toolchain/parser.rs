//! Parser: recursive descent parser for plugin units
//!
//! Consumes tokens from the lexer and produces a [`ParsedUnit`]. A malformed
//! statement produces one error, then the parser skips to the next `;` or
//! closing `}` at the same depth and carries on, so one unit can report many
//! independent problems.

use crate::toolchain::bytecode::BinaryOp;
use crate::toolchain::lexer::{Lexer, Token, TokenKind};
use crate::toolchain::SyntaxError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

impl Span {
    fn of(token: &Token) -> Self {
        Self {
            line: token.line,
            col: token.col,
        }
    }
}

/// `import util.logging.info;`
#[derive(Clone, Debug, PartialEq)]
pub struct Import {
    pub segments: Vec<String>,
    pub span: Span,
}

impl Import {
    pub fn qualified_name(&self) -> String {
        self.segments.join(".")
    }

    pub fn package(&self) -> String {
        self.segments[..self.segments.len().saturating_sub(1)].join(".")
    }

    /// Name the import binds in the unit
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PluginDecl {
    pub name: String,
    pub span: Span,
    pub supertype: Vec<String>,
    pub supertype_span: Span,
    pub functions: Vec<FunctionDecl>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub span: Span,
    pub params: Vec<(String, Span)>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Let {
        name: String,
        value: Expr,
        span: Span,
    },
    Assign {
        name: String,
        value: Expr,
        span: Span,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Expr(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Str(String),
    Bool(bool),
    Var(String),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// `Sibling.function(args)`
    MemberCall {
        target: String,
        method: String,
        args: Vec<Expr>,
    },
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Parse output for one unit
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedUnit {
    pub imports: Vec<Import>,
    pub plugin: Option<PluginDecl>,
}

impl ParsedUnit {
    /// (name, arity) of each declared function
    pub fn function_signatures(&self) -> Vec<(String, usize)> {
        self.plugin
            .iter()
            .flat_map(|p| p.functions.iter())
            .map(|f| (f.name.clone(), f.params.len()))
            .collect()
    }
}

type ParseResult<T> = std::result::Result<T, ()>;

/// Deepest statement and expression nesting a unit may use. Every nested
/// statement, parenthesis, unary operator and chained binary operator counts
/// one level, which also bounds the depth of the tree handed to the compiler.
pub const MAX_NESTING: usize = 64;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<SyntaxError>,
    depth: usize,
}

impl Parser {
    /// Parse source text. Lexical and syntax errors are returned together, in
    /// source order.
    pub fn parse(source: &str) -> (ParsedUnit, Vec<SyntaxError>) {
        let (tokens, lex_errors) = Lexer::new(source).tokenize();
        let mut parser = Self {
            tokens,
            pos: 0,
            errors: lex_errors,
            depth: 0,
        };
        let unit = parser.parse_unit();
        let mut errors = parser.errors;
        errors.sort_by_key(|e| (e.line, e.col));
        (unit, errors)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_ahead(&self, n: usize) -> &TokenKind {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)].kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn at_eof(&self) -> bool {
        self.check(&TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&mut self, expected: &str) {
        let token = self.peek().clone();
        let found = match &token.kind {
            TokenKind::Identifier | TokenKind::IntLiteral(_) => format!("`{}`", token.text),
            other => other.to_string(),
        };
        self.errors.push(SyntaxError {
            message: format!("expected {}, found {}", expected, found),
            line: token.line,
            col: token.col,
        });
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            self.error_here(&kind.to_string());
            Err(())
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<Token> {
        if self.check(&TokenKind::Identifier) {
            Ok(self.advance())
        } else {
            self.error_here("identifier");
            Err(())
        }
    }

    /// Take one nesting level. Past [`MAX_NESTING`] this records an error
    /// and fails, and the caller unwinds to statement recovery.
    fn enter(&mut self) -> ParseResult<()> {
        if self.depth >= MAX_NESTING {
            let token = self.peek().clone();
            self.errors.push(SyntaxError {
                message: format!("nesting exceeds {} levels", MAX_NESTING),
                line: token.line,
                col: token.col,
            });
            return Err(());
        }
        self.depth += 1;
        Ok(())
    }

    /// Run `f`, then give back every level it took
    fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        let depth = self.depth;
        let result = f(self);
        self.depth = depth;
        result
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        self.guarded(|parser| {
            parser.enter()?;
            f(parser)
        })
    }

    /// Skip to just after the next `;`, or to the `}` closing the current
    /// block, whichever comes first at the starting depth.
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek_kind() {
                TokenKind::Eof => return,
                TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenKind::CloseBrace if depth == 0 => return,
                TokenKind::CloseBrace => depth -= 1,
                TokenKind::OpenBrace => depth += 1,
                _ => {}
            }
            self.advance();
        }
    }

    fn parse_unit(&mut self) -> ParsedUnit {
        let mut unit = ParsedUnit::default();

        while !self.at_eof() {
            match self.peek_kind() {
                TokenKind::Import => match self.parse_import() {
                    Ok(import) => unit.imports.push(import),
                    Err(()) => self.synchronize(),
                },
                TokenKind::Plugin => {
                    let span = Span::of(self.peek());
                    let plugin = self.parse_plugin();
                    if unit.plugin.is_some() {
                        self.errors.push(SyntaxError {
                            message: "a unit declares exactly one plugin".to_string(),
                            line: span.line,
                            col: span.col,
                        });
                    } else {
                        unit.plugin = plugin;
                    }
                }
                _ => {
                    self.error_here("`import` or `plugin`");
                    self.advance();
                    // Skip the rest of the stray construct.
                    while !matches!(
                        self.peek_kind(),
                        TokenKind::Import | TokenKind::Plugin | TokenKind::Eof
                    ) {
                        self.advance();
                    }
                }
            }
        }

        unit
    }

    fn parse_import(&mut self) -> ParseResult<Import> {
        let start = self.expect(TokenKind::Import)?;
        let segments = self.parse_path()?;
        if segments.len() < 2 {
            self.errors.push(SyntaxError {
                message: "import must name a package and a symbol".to_string(),
                line: start.line,
                col: start.col,
            });
            return Err(());
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(Import {
            segments,
            span: Span::of(&start),
        })
    }

    fn parse_path(&mut self) -> ParseResult<Vec<String>> {
        let mut segments = vec![self.expect_identifier()?.text];
        while self.eat(&TokenKind::Dot) {
            segments.push(self.expect_identifier()?.text);
        }
        Ok(segments)
    }

    fn parse_plugin(&mut self) -> Option<PluginDecl> {
        self.advance();
        let header = (|| -> ParseResult<(Token, Vec<String>, Span)> {
            let name = self.expect_identifier()?;
            self.expect(TokenKind::Colon)?;
            let supertype_span = Span::of(self.peek());
            let supertype = self.parse_path()?;
            Ok((name, supertype, supertype_span))
        })();

        let header = match header {
            Ok(header) => Some(header),
            Err(()) => {
                while !matches!(self.peek_kind(), TokenKind::OpenBrace | TokenKind::Eof) {
                    self.advance();
                }
                None
            }
        };

        if self.expect(TokenKind::OpenBrace).is_err() {
            return None;
        }

        let mut functions = Vec::new();
        while !self.check(&TokenKind::CloseBrace) && !self.at_eof() {
            if self.check(&TokenKind::Fn) {
                if let Some(function) = self.parse_function() {
                    functions.push(function);
                }
            } else {
                self.error_here("`fn`");
                self.advance();
                while !matches!(
                    self.peek_kind(),
                    TokenKind::Fn | TokenKind::CloseBrace | TokenKind::Eof
                ) {
                    self.advance();
                }
            }
        }
        let _ = self.expect(TokenKind::CloseBrace);

        header.map(|(name, supertype, supertype_span)| PluginDecl {
            name: name.text.clone(),
            span: Span::of(&name),
            supertype,
            supertype_span,
            functions,
        })
    }

    fn parse_function(&mut self) -> Option<FunctionDecl> {
        self.advance();
        let header = (|| -> ParseResult<(Token, Vec<(String, Span)>)> {
            let name = self.expect_identifier()?;
            self.expect(TokenKind::OpenParen)?;
            let mut params = Vec::new();
            if !self.check(&TokenKind::CloseParen) {
                loop {
                    let param = self.expect_identifier()?;
                    params.push((param.text.clone(), Span::of(&param)));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::CloseParen)?;
            Ok((name, params))
        })();

        if header.is_err() {
            while !matches!(
                self.peek_kind(),
                TokenKind::OpenBrace | TokenKind::Fn | TokenKind::CloseBrace | TokenKind::Eof
            ) {
                self.advance();
            }
        }

        let body = if self.check(&TokenKind::OpenBrace) {
            self.parse_block()
        } else {
            if header.is_ok() {
                self.error_here("`{`");
            }
            Vec::new()
        };

        header.ok().map(|(name, params)| FunctionDecl {
            name: name.text.clone(),
            span: Span::of(&name),
            params,
            body,
        })
    }

    /// `{ stmt* }`. Always returns; errors are recorded.
    fn parse_block(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        if self.expect(TokenKind::OpenBrace).is_err() {
            return stmts;
        }
        while !self.check(&TokenKind::CloseBrace) && !self.at_eof() {
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(()) => self.synchronize(),
            }
        }
        let _ = self.expect(TokenKind::CloseBrace);
        stmts
    }

    fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        self.nested(Self::parse_statement)
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        let span = Span::of(self.peek());
        match self.peek_kind() {
            TokenKind::Let => {
                self.advance();
                let name = self.expect_identifier()?.text;
                self.expect(TokenKind::Assign)?;
                let value = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Let { name, value, span })
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expr()?;
                if !self.check(&TokenKind::OpenBrace) {
                    self.error_here("`{`");
                    return Err(());
                }
                let body = self.parse_block();
                Ok(Stmt::While { cond, body })
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.check(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Return { value, span })
            }
            TokenKind::Identifier if *self.peek_ahead(1) == TokenKind::Assign => {
                let name = self.advance().text;
                self.advance();
                let value = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Assign { name, value, span })
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        self.advance();
        let cond = self.parse_expr()?;
        if !self.check(&TokenKind::OpenBrace) {
            self.error_here("`{`");
            return Err(());
        }
        let then_body = self.parse_block();
        let else_body = if self.eat(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                Some(vec![self.nested(Self::parse_if)?])
            } else if self.check(&TokenKind::OpenBrace) {
                Some(self.parse_block())
            } else {
                self.error_here("`{` or `if`");
                return Err(());
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
        })
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.nested(Self::parse_or)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        self.guarded(|parser| {
            let mut lhs = parser.parse_and()?;
            while parser.check(&TokenKind::OrOr) {
                parser.enter()?;
                let span = Span::of(&parser.advance());
                let rhs = parser.parse_and()?;
                lhs = Expr {
                    kind: ExprKind::Or(Box::new(lhs), Box::new(rhs)),
                    span,
                };
            }
            Ok(lhs)
        })
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        self.guarded(|parser| {
            let mut lhs = parser.parse_binary(0)?;
            while parser.check(&TokenKind::AndAnd) {
                parser.enter()?;
                let span = Span::of(&parser.advance());
                let rhs = parser.parse_binary(0)?;
                lhs = Expr {
                    kind: ExprKind::And(Box::new(lhs), Box::new(rhs)),
                    span,
                };
            }
            Ok(lhs)
        })
    }

    /// Binary operator precedence levels, loosest first
    fn binary_op(kind: &TokenKind, level: usize) -> Option<BinaryOp> {
        match (level, kind) {
            (0, TokenKind::EqEq) => Some(BinaryOp::Eq),
            (0, TokenKind::NotEq) => Some(BinaryOp::Ne),
            (1, TokenKind::Lt) => Some(BinaryOp::Lt),
            (1, TokenKind::Le) => Some(BinaryOp::Le),
            (1, TokenKind::Gt) => Some(BinaryOp::Gt),
            (1, TokenKind::Ge) => Some(BinaryOp::Ge),
            (2, TokenKind::Plus) => Some(BinaryOp::Add),
            (2, TokenKind::Minus) => Some(BinaryOp::Sub),
            (3, TokenKind::Star) => Some(BinaryOp::Mul),
            (3, TokenKind::Slash) => Some(BinaryOp::Div),
            (3, TokenKind::Percent) => Some(BinaryOp::Rem),
            _ => None,
        }
    }

    fn parse_binary(&mut self, level: usize) -> ParseResult<Expr> {
        if level > 3 {
            return self.parse_unary();
        }
        self.guarded(|parser| {
            let mut lhs = parser.parse_binary(level + 1)?;
            while let Some(op) = Self::binary_op(parser.peek_kind(), level) {
                parser.enter()?;
                let span = Span::of(&parser.advance());
                let rhs = parser.parse_binary(level + 1)?;
                lhs = Expr {
                    kind: ExprKind::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    span,
                };
            }
            Ok(lhs)
        })
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let span = Span::of(self.peek());
        if self.eat(&TokenKind::Minus) {
            let operand = self.nested(Self::parse_unary)?;
            return Ok(Expr {
                kind: ExprKind::Neg(Box::new(operand)),
                span,
            });
        }
        if self.eat(&TokenKind::Bang) {
            let operand = self.nested(Self::parse_unary)?;
            return Ok(Expr {
                kind: ExprKind::Not(Box::new(operand)),
                span,
            });
        }
        self.parse_primary()
    }

    fn parse_args(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect(TokenKind::OpenParen)?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::CloseParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::CloseParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        let span = Span::of(&token);
        let kind = match &token.kind {
            TokenKind::IntLiteral(value) => {
                self.advance();
                ExprKind::Int(*value)
            }
            TokenKind::StringLiteral => {
                self.advance();
                ExprKind::Str(token.text.clone())
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Bool(true)
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Bool(false)
            }
            TokenKind::OpenParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::CloseParen)?;
                return Ok(inner);
            }
            TokenKind::Identifier => {
                self.advance();
                let name = token.text.clone();
                if self.check(&TokenKind::OpenParen) {
                    let args = self.parse_args()?;
                    ExprKind::Call { name, args }
                } else if self.eat(&TokenKind::Dot) {
                    let method = self.expect_identifier()?.text;
                    let args = self.parse_args()?;
                    ExprKind::MemberCall {
                        target: name,
                        method,
                        args,
                    }
                } else {
                    ExprKind::Var(name)
                }
            }
            _ => {
                self.error_here("expression");
                return Err(());
            }
        };
        Ok(Expr { kind, span })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_complete_unit() {
        let source = r#"
            import math.max;
            import util.logging.info;

            plugin Greeter : Plugin {
                fn execute() {
                    let x = max(1, 2) * 3 + 1;
                    if x > 3 && true { info("big"); } else { return; }
                    while x > 0 { x = x - 1; }
                }
                fn helper(a, b) { return Other.twice(a) + b; }
            }
        "#;
        let (unit, errors) = Parser::parse(source);
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(unit.imports.len(), 2);
        assert_eq!(unit.imports[1].package(), "util.logging");
        assert_eq!(unit.imports[1].name(), "info");

        let plugin = unit.plugin.as_ref().unwrap();
        assert_eq!(plugin.name, "Greeter");
        assert_eq!(plugin.supertype, vec!["Plugin".to_string()]);
        assert_eq!(
            unit.function_signatures(),
            vec![("execute".to_string(), 0), ("helper".to_string(), 2)]
        );
        assert_eq!(plugin.functions[0].body.len(), 3);
    }

    #[test]
    fn test_precedence() {
        let (unit, errors) = Parser::parse("plugin A : P { fn f() { return 1 + 2 * 3; } }");
        assert!(errors.is_empty());
        let body = &unit.plugin.unwrap().functions[0].body;
        match &body[0] {
            Stmt::Return {
                value: Some(Expr {
                    kind: ExprKind::Binary { op, rhs, .. },
                    ..
                }),
                ..
            } => {
                assert_eq!(*op, BinaryOp::Add);
                assert!(matches!(
                    rhs.kind,
                    ExprKind::Binary {
                        op: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_recovery_reports_each_bad_statement() {
        let source = "plugin A : Plugin {\n fn execute() {\n  let = 1;\n  let y 2;\n  let z = ;\n  let ok = 4;\n }\n}";
        let (unit, errors) = Parser::parse(source);
        assert_eq!(errors.len(), 3, "{:?}", errors);
        assert_eq!(errors[0].line, 3);
        assert_eq!(errors[1].line, 4);
        assert_eq!(errors[2].line, 5);
        let body = &unit.plugin.unwrap().functions[0].body;
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_errors_across_functions() {
        let source = "plugin A : Plugin {\n fn execute() { foo(; }\n fn other( { }\n fn last() { return 1 }\n}";
        let (unit, errors) = Parser::parse(source);
        assert_eq!(errors.len(), 3, "{:?}", errors);
        let names: Vec<_> = unit
            .plugin
            .unwrap()
            .functions
            .iter()
            .map(|f| f.name.clone())
            .collect();
        assert_eq!(names, vec!["execute".to_string(), "last".to_string()]);
    }

    fn in_execute(body: &str) -> String {
        format!("plugin A : Plugin {{ fn execute() {{ {} }} }}", body)
    }

    fn nesting_errors(errors: &[SyntaxError]) -> usize {
        errors
            .iter()
            .filter(|e| e.message.contains("nesting exceeds"))
            .count()
    }

    #[test]
    fn test_deep_parentheses_are_rejected_once() {
        let depth = 100_000;
        let source = in_execute(&format!(
            "let x = {}1{}; let y = 2;",
            "(".repeat(depth),
            ")".repeat(depth)
        ));
        let (unit, errors) = Parser::parse(&source);
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert_eq!(nesting_errors(&errors), 1);

        // Recovery resumes after the offending statement.
        let body = &unit.plugin.unwrap().functions[0].body;
        assert!(matches!(&body[..], [Stmt::Let { name, .. }] if name == "y"));
    }

    #[test]
    fn test_deep_unary_chain_is_rejected() {
        let source = in_execute(&format!("let x = {}true;", "!".repeat(50_000)));
        let (_, errors) = Parser::parse(&source);
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert_eq!(nesting_errors(&errors), 1);
    }

    #[test]
    fn test_long_operator_chain_is_rejected() {
        let source = in_execute(&format!("let x = 1{};", " + 1".repeat(20_000)));
        let (_, errors) = Parser::parse(&source);
        assert_eq!(nesting_errors(&errors), 1, "{:?}", errors);
    }

    #[test]
    fn test_deep_blocks_are_rejected() {
        let depth = 20_000;
        let source = in_execute(&format!(
            "{}return;{}",
            "if true { ".repeat(depth),
            "}".repeat(depth)
        ));
        let (_, errors) = Parser::parse(&source);
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert_eq!(nesting_errors(&errors), 1);

        let source = in_execute(&format!(
            "if false {{ }}{}",
            " else if false { }".repeat(20_000)
        ));
        let (_, errors) = Parser::parse(&source);
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert_eq!(nesting_errors(&errors), 1);
    }

    #[test]
    fn test_nesting_levels_are_released() {
        let statement = format!("let x = {}1{};", "(".repeat(40), ")".repeat(40));
        let source = in_execute(&statement.repeat(200));
        let (unit, errors) = Parser::parse(&source);
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(unit.plugin.unwrap().functions[0].body.len(), 200);
    }

    #[test]
    fn test_import_needs_package() {
        let (_, errors) = Parser::parse("import max;\nplugin A : Plugin { }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("package and a symbol"));
    }
}
