//! Indentation-aware lexer for the contract language.
//!
//! Block structure is surfaced as `Newline`/`Indent`/`Dedent` tokens.
//! Inside brackets, line breaks and indentation are suppressed so
//! expressions can span lines.

use quill_core::{LexError, Span};

use super::token::{Token, TokenKind};

/// The lexer. Consumes the whole source up front.
pub struct Lexer<'src> {
    src: &'src [u8],
    pos: usize,
    line: u32,
    col: u32,
    /// Indentation stack; always starts with 0.
    indents: Vec<u32>,
    /// Open bracket depth; layout tokens are suppressed when non-zero.
    brackets: u32,
    tokens: Vec<Token>,
    /// Whether the current position is at the start of a logical line.
    at_line_start: bool,
}

impl<'src> Lexer<'src> {
    /// Tokenize a complete source text.
    pub fn tokenize(source: &'src str) -> Result<Vec<Token>, LexError> {
        let mut lexer = Lexer {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
            indents: vec![0],
            brackets: 0,
            tokens: Vec::new(),
            at_line_start: true,
        };
        lexer.run()?;
        Ok(lexer.tokens)
    }

    fn run(&mut self) -> Result<(), LexError> {
        loop {
            if self.at_line_start && self.brackets == 0 {
                if self.handle_indentation()? {
                    break;
                }
                continue;
            }
            if self.pos >= self.src.len() {
                break;
            }
            let c = self.src[self.pos];
            match c {
                b' ' | b'\t' => {
                    self.advance();
                }
                b'#' => {
                    while self.pos < self.src.len() && self.src[self.pos] != b'\n' {
                        self.advance();
                    }
                }
                b'\n' => {
                    if self.brackets == 0 {
                        self.push(TokenKind::Newline, 1);
                        self.at_line_start = true;
                    }
                    self.advance_newline();
                }
                b'\r' => {
                    self.advance();
                }
                b'0'..=b'9' => self.number()?,
                b'\'' | b'"' => self.string(c, false)?,
                b'b' if self.peek_next() == Some(b'\'') || self.peek_next() == Some(b'"') => {
                    self.advance();
                    let quote = self.src[self.pos];
                    self.string(quote, true)?;
                }
                b'A'..=b'Z' | b'a'..=b'z' | b'_' => self.identifier(),
                _ => self.operator()?,
            }
        }

        // Terminate a trailing logical line and close open blocks.
        if self
            .tokens
            .last()
            .is_some_and(|t| !matches!(t.kind, TokenKind::Newline))
        {
            self.push(TokenKind::Newline, 0);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, 0);
        }
        self.push(TokenKind::Eof, 0);
        Ok(())
    }

    /// Measure the current line's indentation. Returns true at end of input.
    fn handle_indentation(&mut self) -> Result<bool, LexError> {
        let mut width = 0u32;
        loop {
            match self.src.get(self.pos) {
                Some(b' ') => {
                    width += 1;
                    self.advance();
                }
                // A tab advances to the next multiple of eight columns.
                Some(b'\t') => {
                    width = (width / 8 + 1) * 8;
                    self.advance();
                }
                _ => break,
            }
        }
        match self.src.get(self.pos) {
            Option::None => return Ok(true),
            // Blank or comment-only lines carry no layout information.
            Some(b'\n') => {
                self.advance_newline();
                return Ok(false);
            }
            Some(b'\r') => {
                self.advance();
                return Ok(false);
            }
            Some(b'#') => {
                while self.pos < self.src.len() && self.src[self.pos] != b'\n' {
                    self.advance();
                }
                return Ok(false);
            }
            _ => {}
        }

        let current = *self.indents.last().unwrap_or(&0);
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent, 0);
        } else if width < current {
            while self.indents.len() > 1 && *self.indents.last().unwrap_or(&0) > width {
                self.indents.pop();
                self.push(TokenKind::Dedent, 0);
            }
            if *self.indents.last().unwrap_or(&0) != width {
                return Err(LexError::BadIndentation {
                    span: Span::point(self.line, self.col),
                });
            }
        }
        self.at_line_start = false;
        Ok(false)
    }

    fn identifier(&mut self) {
        let start = self.pos;
        let span_start = (self.line, self.col);
        while self
            .src
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == b'_')
        {
            self.advance();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        let kind = TokenKind::keyword(text).unwrap_or_else(|| TokenKind::Ident(text.to_string()));
        self.tokens.push(Token::new(
            kind,
            Span::new(span_start.0, span_start.1, (self.pos - start) as u32),
        ));
    }

    fn number(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let span_start = (self.line, self.col);
        let mut radix = 10;
        if self.src[self.pos] == b'0'
            && matches!(self.peek_next(), Some(b'x') | Some(b'X'))
        {
            radix = 16;
            self.advance();
            self.advance();
        }
        let digits_start = self.pos;
        while self.src.get(self.pos).is_some_and(|c| {
            c.is_ascii_alphanumeric() || *c == b'_'
        }) {
            self.advance();
        }
        let raw: String = std::str::from_utf8(&self.src[digits_start..self.pos])
            .unwrap_or("")
            .chars()
            .filter(|c| *c != '_')
            .collect();
        let span = Span::new(span_start.0, span_start.1, (self.pos - start) as u32);
        let value = i128::from_str_radix(&raw, radix).map_err(|e| LexError::InvalidNumber {
            span,
            detail: e.to_string(),
        })?;
        self.tokens.push(Token::new(TokenKind::Int(value), span));
        Ok(())
    }

    fn string(&mut self, quote: u8, is_bytes: bool) -> Result<(), LexError> {
        let span_start = (self.line, self.col);
        let start = self.pos;
        self.advance(); // opening quote
        let mut bytes: Vec<u8> = Vec::new();
        loop {
            match self.src.get(self.pos).copied() {
                Option::None | Some(b'\n') => {
                    return Err(LexError::UnterminatedString {
                        span: Span::point(span_start.0, span_start.1),
                    });
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    let escaped = self.src.get(self.pos).copied().ok_or(
                        LexError::UnterminatedString {
                            span: Span::point(span_start.0, span_start.1),
                        },
                    )?;
                    self.advance();
                    match escaped {
                        b'n' => bytes.push(b'\n'),
                        b't' => bytes.push(b'\t'),
                        b'r' => bytes.push(b'\r'),
                        b'0' => bytes.push(0),
                        b'\\' => bytes.push(b'\\'),
                        b'\'' => bytes.push(b'\''),
                        b'"' => bytes.push(b'"'),
                        b'x' => {
                            let hi = self.hex_digit(span_start)?;
                            let lo = self.hex_digit(span_start)?;
                            bytes.push(hi * 16 + lo);
                        }
                        other => {
                            bytes.push(b'\\');
                            bytes.push(other);
                        }
                    }
                }
                Some(c) => {
                    bytes.push(c);
                    self.advance();
                }
            }
        }
        let span = Span::new(span_start.0, span_start.1, (self.pos - start) as u32);
        let kind = if is_bytes {
            TokenKind::Bytes(bytes)
        } else {
            let text = String::from_utf8(bytes).map_err(|_| LexError::UnterminatedString {
                span: Span::point(span_start.0, span_start.1),
            })?;
            TokenKind::Str(text)
        };
        self.tokens.push(Token::new(kind, span));
        Ok(())
    }

    fn hex_digit(&mut self, span_start: (u32, u32)) -> Result<u8, LexError> {
        let c = self
            .src
            .get(self.pos)
            .copied()
            .ok_or(LexError::UnterminatedString {
                span: Span::point(span_start.0, span_start.1),
            })?;
        self.advance();
        match c {
            b'0'..=b'9' => Ok(c - b'0'),
            b'a'..=b'f' => Ok(c - b'a' + 10),
            b'A'..=b'F' => Ok(c - b'A' + 10),
            _ => Err(LexError::InvalidNumber {
                span: Span::point(self.line, self.col),
                detail: "invalid hex escape".to_string(),
            }),
        }
    }

    fn operator(&mut self) -> Result<(), LexError> {
        let span = Span::new(self.line, self.col, 1);
        let c = self.src[self.pos];
        let next = self.peek_next();
        let (kind, len) = match (c, next) {
            (b'*', Some(b'*')) => (TokenKind::DoubleStar, 2),
            (b'*', Some(b'=')) => (TokenKind::StarAssign, 2),
            (b'*', _) => (TokenKind::Star, 1),
            (b'/', Some(b'/')) => (TokenKind::DoubleSlash, 2),
            (b'/', Some(b'=')) => (TokenKind::SlashAssign, 2),
            (b'/', _) => (TokenKind::Slash, 1),
            (b'+', Some(b'=')) => (TokenKind::PlusAssign, 2),
            (b'+', _) => (TokenKind::Plus, 1),
            (b'-', Some(b'>')) => (TokenKind::Arrow, 2),
            (b'-', Some(b'=')) => (TokenKind::MinusAssign, 2),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'%', Some(b'=')) => (TokenKind::PercentAssign, 2),
            (b'%', _) => (TokenKind::Percent, 1),
            (b'<', Some(b'<')) => (TokenKind::Shl, 2),
            (b'<', Some(b'=')) => (TokenKind::LtE, 2),
            (b'<', _) => (TokenKind::Lt, 1),
            (b'>', Some(b'>')) => (TokenKind::Shr, 2),
            (b'>', Some(b'=')) => (TokenKind::GtE, 2),
            (b'>', _) => (TokenKind::Gt, 1),
            (b'=', Some(b'=')) => (TokenKind::EqEq, 2),
            (b'=', _) => (TokenKind::Assign, 1),
            (b'!', Some(b'=')) => (TokenKind::NotEq, 2),
            (b'&', _) => (TokenKind::Amp, 1),
            (b'|', _) => (TokenKind::Pipe, 1),
            (b'^', _) => (TokenKind::Caret, 1),
            (b'~', _) => (TokenKind::Tilde, 1),
            (b'(', _) => {
                self.brackets += 1;
                (TokenKind::LParen, 1)
            }
            (b')', _) => {
                self.brackets = self.brackets.saturating_sub(1);
                (TokenKind::RParen, 1)
            }
            (b'[', _) => {
                self.brackets += 1;
                (TokenKind::LBracket, 1)
            }
            (b']', _) => {
                self.brackets = self.brackets.saturating_sub(1);
                (TokenKind::RBracket, 1)
            }
            (b'{', _) => {
                self.brackets += 1;
                (TokenKind::LBrace, 1)
            }
            (b'}', _) => {
                self.brackets = self.brackets.saturating_sub(1);
                (TokenKind::RBrace, 1)
            }
            (b',', _) => (TokenKind::Comma, 1),
            (b':', _) => (TokenKind::Colon, 1),
            (b'.', _) => (TokenKind::Dot, 1),
            (b'@', _) => (TokenKind::At, 1),
            _ => {
                return Err(LexError::UnexpectedChar {
                    ch: c as char,
                    span,
                });
            }
        };
        for _ in 0..len {
            self.advance();
        }
        self.tokens
            .push(Token::new(kind, Span::new(span.line, span.col, len as u32)));
        Ok(())
    }

    fn push(&mut self, kind: TokenKind, len: u32) {
        self.tokens
            .push(Token::new(kind, Span::new(self.line, self.col, len)));
    }

    fn peek_next(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
        self.col += 1;
    }

    fn advance_newline(&mut self) {
        self.pos += 1;
        self.line += 1;
        self.col = 1;
        if self.brackets == 0 {
            self.at_line_start = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn simple_assignment() {
        assert_eq!(
            kinds("x = 1\n"),
            vec![
                TokenKind::Ident("x".to_string()),
                TokenKind::Assign,
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn indentation_produces_blocks() {
        let toks = kinds("def f():\n    return 1\n");
        assert!(toks.contains(&TokenKind::Indent));
        assert!(toks.contains(&TokenKind::Dedent));
    }

    #[test]
    fn brackets_suppress_newlines() {
        let toks = kinds("x = [1,\n     2]\n");
        let newlines = toks
            .iter()
            .filter(|k| matches!(k, TokenKind::Newline))
            .count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn keywords_and_identifiers() {
        let toks = kinds("if foo:\n    pass\n");
        assert_eq!(toks[0], TokenKind::If);
        assert_eq!(toks[1], TokenKind::Ident("foo".to_string()));
    }

    #[test]
    fn bytes_and_string_literals() {
        let toks = kinds("a = b'\\x01\\x02'\nb = 'hi'\n");
        assert!(toks.contains(&TokenKind::Bytes(vec![1, 2])));
        assert!(toks.contains(&TokenKind::Str("hi".to_string())));
    }

    #[test]
    fn hex_numbers() {
        assert!(kinds("x = 0xFF\n").contains(&TokenKind::Int(255)));
    }

    #[test]
    fn comment_only_lines_are_skipped() {
        let toks = kinds("# leading comment\nx = 1\n");
        assert_eq!(toks[0], TokenKind::Ident("x".to_string()));
    }

    #[test]
    fn unterminated_string_errors() {
        assert!(matches!(
            Lexer::tokenize("x = 'oops\n"),
            Err(LexError::UnterminatedString { .. })
        ));
    }

    #[test]
    fn inconsistent_dedent_errors() {
        let source = "if a:\n        x = 1\n    y = 2\n";
        assert!(matches!(
            Lexer::tokenize(source),
            Err(LexError::BadIndentation { .. })
        ));
    }
}
