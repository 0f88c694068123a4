use crate::error::ParseError;

/// Token types produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// A run of non-delimiter characters: keywords, identifiers, dotted type
    /// references and numeric literals.
    Word(&'a str),
    /// Raw content between a pair of quotes, escapes left as written.
    Str(&'a str),
    /// `"`
    Quote,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
    /// `=`
    Equals,
    /// `;`
    Semicolon,
    /// End of input
    Eof,
}

/// A token with its source location.
#[derive(Debug, Clone, Copy)]
pub struct Located<'a> {
    pub token: Token<'a>,
    pub line: usize,
}

fn is_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace()
        || matches!(
            b,
            b'{' | b'}' | b'[' | b']' | b',' | b'=' | b';' | b'"' | b'(' | b')'
        )
}

/// Tokenizer for `.proto` schema text.
///
/// Comments are stripped transparently. After an opening quote has been
/// returned, the next call yields the string body as a single `Str` token and
/// queues the closing quote.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    stack: Vec<Located<'a>>,
    in_string: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            pos: 0,
            line: 1,
            stack: Vec::new(),
            in_string: false,
        }
    }

    pub fn current_line(&self) -> usize {
        self.stack.last().map_or(self.line, |tok| tok.line)
    }

    fn bytes(&self) -> &'a [u8] {
        self.input.as_bytes()
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek_byte()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    /// Skip whitespace and comments. Returns false if an unterminated block
    /// comment swallowed the rest of the input.
    fn skip_whitespace_and_comments(&mut self) -> Result<bool, ParseError> {
        loop {
            match self.peek_byte() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.advance();
                }
                Some(b'/') => match self.bytes().get(self.pos + 1) {
                    Some(b'/') => {
                        while let Some(b) = self.advance() {
                            if b == b'\n' {
                                break;
                            }
                        }
                    }
                    Some(b'*') => {
                        self.pos += 2;
                        loop {
                            match self.advance() {
                                None => return Ok(false),
                                Some(b'*') if self.peek_byte() == Some(b'/') => {
                                    self.pos += 1;
                                    break;
                                }
                                Some(_) => {}
                            }
                        }
                    }
                    _ => {
                        return Err(ParseError::Lexical {
                            line: self.line,
                            message: "illegal comment opener, expected '//' or '/*'".into(),
                        });
                    }
                },
                _ => return Ok(true),
            }
        }
    }

    fn read_string(&mut self) -> Result<Located<'a>, ParseError> {
        let line = self.line;
        let start = self.pos;
        loop {
            match self.advance() {
                None => {
                    return Err(ParseError::Lexical {
                        line,
                        message: "unterminated string literal".into(),
                    });
                }
                Some(b'\\') => {
                    if self.advance().is_none() {
                        return Err(ParseError::Lexical {
                            line,
                            message: "unterminated string literal".into(),
                        });
                    }
                }
                Some(b'"') => {
                    let body = &self.input[start..self.pos - 1];
                    self.stack.push(Located {
                        token: Token::Quote,
                        line: self.line,
                    });
                    self.in_string = false;
                    return Ok(Located {
                        token: Token::Str(body),
                        line,
                    });
                }
                Some(_) => {}
            }
        }
    }

    /// Read the next token.
    pub fn next_token(&mut self) -> Result<Located<'a>, ParseError> {
        if let Some(tok) = self.stack.pop() {
            return Ok(tok);
        }
        if self.in_string {
            return self.read_string();
        }
        if !self.skip_whitespace_and_comments()? {
            return Ok(Located {
                token: Token::Eof,
                line: self.line,
            });
        }
        let line = self.line;

        let b = match self.peek_byte() {
            None => {
                return Ok(Located {
                    token: Token::Eof,
                    line,
                })
            }
            Some(b) => b,
        };

        let token = match b {
            b'{' => Token::LBrace,
            b'}' => Token::RBrace,
            b'[' => Token::LBracket,
            b']' => Token::RBracket,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b',' => Token::Comma,
            b'=' => Token::Equals,
            b';' => Token::Semicolon,
            b'"' => {
                self.in_string = true;
                Token::Quote
            }
            _ => {
                let start = self.pos;
                while let Some(b) = self.peek_byte() {
                    let comment = b == b'/'
                        && matches!(self.bytes().get(self.pos + 1), Some(b'/') | Some(b'*'));
                    if is_delimiter(b) || comment {
                        break;
                    }
                    self.advance();
                }
                return Ok(Located {
                    token: Token::Word(&self.input[start..self.pos]),
                    line,
                });
            }
        };
        self.advance();
        Ok(Located { token, line })
    }

    /// Peek at the next token without consuming it.
    pub fn peek_token(&mut self) -> Result<Located<'a>, ParseError> {
        let tok = self.next_token()?;
        self.stack.push(tok);
        Ok(tok)
    }
}
