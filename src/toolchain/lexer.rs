//! Lexer: tokenizes plugin source text
//!
//! Never stops at the first problem. Malformed input is reported as a
//! `SyntaxError` and skipped so the parser still sees the rest of the unit.

use crate::toolchain::SyntaxError;

/// A token produced by the lexer
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// The raw text of the token (unescaped for string literals)
    pub text: String,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub col: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize, col: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            col,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    Import,
    Plugin,
    Fn,
    Let,
    If,
    Else,
    While,
    Return,
    True,
    False,

    // Identifiers and literals
    Identifier,
    IntLiteral(i64),
    StringLiteral,

    // Structural
    OpenBrace,
    CloseBrace,
    OpenParen,
    CloseParen,
    Comma,
    Semicolon,
    Colon,
    Dot,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,

    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Import => "`import`",
            Self::Plugin => "`plugin`",
            Self::Fn => "`fn`",
            Self::Let => "`let`",
            Self::If => "`if`",
            Self::Else => "`else`",
            Self::While => "`while`",
            Self::Return => "`return`",
            Self::True => "`true`",
            Self::False => "`false`",
            Self::Identifier => "identifier",
            Self::IntLiteral(_) => "integer",
            Self::StringLiteral => "string literal",
            Self::OpenBrace => "`{`",
            Self::CloseBrace => "`}`",
            Self::OpenParen => "`(`",
            Self::CloseParen => "`)`",
            Self::Comma => "`,`",
            Self::Semicolon => "`;`",
            Self::Colon => "`:`",
            Self::Dot => "`.`",
            Self::Plus => "`+`",
            Self::Minus => "`-`",
            Self::Star => "`*`",
            Self::Slash => "`/`",
            Self::Percent => "`%`",
            Self::Bang => "`!`",
            Self::Assign => "`=`",
            Self::EqEq => "`==`",
            Self::NotEq => "`!=`",
            Self::Lt => "`<`",
            Self::Le => "`<=`",
            Self::Gt => "`>`",
            Self::Ge => "`>=`",
            Self::AndAnd => "`&&`",
            Self::OrOr => "`||`",
            Self::Eof => "end of input",
        };
        f.write_str(text)
    }
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    errors: Vec<SyntaxError>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            errors: Vec::new(),
        }
    }

    /// Tokenize the entire input. The token stream always ends with `Eof`.
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<SyntaxError>) {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments();

            if self.pos >= self.input.len() {
                tokens.push(Token::new(TokenKind::Eof, "", self.line, self.col));
                break;
            }

            if let Some(token) = self.next_token() {
                tokens.push(token);
            }
        }

        (tokens, self.errors)
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.input.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn error(&mut self, message: String, line: usize, col: usize) {
        self.errors.push(SyntaxError { message, line, col });
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match (self.peek(), self.peek_next()) {
                (Some(c), _) if c.is_whitespace() => {
                    self.advance();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                (Some('/'), Some('*')) => {
                    let (line, col) = (self.line, self.col);
                    self.advance();
                    self.advance();
                    let mut closed = false;
                    while let Some(c) = self.advance() {
                        if c == '*' && self.peek() == Some('/') {
                            self.advance();
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        self.error("unterminated block comment".to_string(), line, col);
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Option<Token> {
        let line = self.line;
        let col = self.col;
        let ch = self.advance()?;

        let two = |lexer: &mut Lexer, next: char, long: TokenKind, short: TokenKind| {
            if lexer.peek() == Some(next) {
                lexer.advance();
                long
            } else {
                short
            }
        };

        let kind = match ch {
            '{' => TokenKind::OpenBrace,
            '}' => TokenKind::CloseBrace,
            '(' => TokenKind::OpenParen,
            ')' => TokenKind::CloseParen,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '!' => two(self, '=', TokenKind::NotEq, TokenKind::Bang),
            '=' => two(self, '=', TokenKind::EqEq, TokenKind::Assign),
            '<' => two(self, '=', TokenKind::Le, TokenKind::Lt),
            '>' => two(self, '=', TokenKind::Ge, TokenKind::Gt),
            '&' if self.peek() == Some('&') => {
                self.advance();
                TokenKind::AndAnd
            }
            '|' if self.peek() == Some('|') => {
                self.advance();
                TokenKind::OrOr
            }
            '"' => return self.read_string(line, col),
            c if c.is_ascii_digit() => return Some(self.read_number(c, line, col)),
            c if c.is_ascii_alphabetic() || c == '_' => return Some(self.read_word(c, line, col)),
            other => {
                self.error(format!("unexpected character `{}`", other), line, col);
                return None;
            }
        };

        let text: String = self.input[self.pos - (self.col - col)..self.pos]
            .iter()
            .collect();
        Some(Token::new(kind, text, line, col))
    }

    fn read_string(&mut self, line: usize, col: usize) -> Option<Token> {
        let mut value = String::new();
        loop {
            match self.advance() {
                Some('"') => return Some(Token::new(TokenKind::StringLiteral, value, line, col)),
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some(other) => {
                        self.error(
                            format!("unknown escape sequence `\\{}`", other),
                            self.line,
                            self.col - 1,
                        );
                    }
                    None => break,
                },
                Some('\n') | None => break,
                Some(c) => value.push(c),
            }
        }
        self.error("unterminated string literal".to_string(), line, col);
        None
    }

    fn read_number(&mut self, first: char, line: usize, col: usize) -> Token {
        let mut text = String::from(first);
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let digits: String = text.chars().filter(|c| *c != '_').collect();
        let value = match digits.parse::<i64>() {
            Ok(v) => v,
            Err(_) => {
                self.error(format!("integer literal `{}` is out of range", text), line, col);
                0
            }
        };
        Token::new(TokenKind::IntLiteral(value), text, line, col)
    }

    fn read_word(&mut self, first: char, line: usize, col: usize) -> Token {
        let mut text = String::from(first);
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let kind = match text.as_str() {
            "import" => TokenKind::Import,
            "plugin" => TokenKind::Plugin,
            "fn" => TokenKind::Fn,
            "let" => TokenKind::Let,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "return" => TokenKind::Return,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Identifier,
        };
        Token::new(kind, text, line, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, errors) = Lexer::new(source).tokenize();
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_and_operators() {
        assert_eq!(
            kinds("let x = a <= 10 && !b;"),
            vec![
                TokenKind::Let,
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::Identifier,
                TokenKind::Le,
                TokenKind::IntLiteral(10),
                TokenKind::AndAnd,
                TokenKind::Bang,
                TokenKind::Identifier,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_positions_and_comments() {
        let (tokens, _) = Lexer::new("// header\n  plugin /* inline */ A").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Plugin);
        assert_eq!((tokens[0].line, tokens[0].col), (2, 3));
        assert_eq!(tokens[1].text, "A");
        assert_eq!((tokens[1].line, tokens[1].col), (2, 23));
    }

    #[test]
    fn test_string_escapes() {
        let (tokens, errors) = Lexer::new(r#""a\"b\n""#).tokenize();
        assert!(errors.is_empty());
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[0].text, "a\"b\n");
    }

    #[test]
    fn test_errors_do_not_stop_lexing() {
        let (tokens, errors) = Lexer::new("a # b $ \"open").tokenize();
        assert_eq!(errors.len(), 3);
        let idents: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Identifier)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(idents, vec!["a", "b"]);
    }

    #[test]
    fn test_integer_overflow_is_reported() {
        let (_, errors) = Lexer::new("99999999999999999999").tokenize();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("out of range"));
    }
}
