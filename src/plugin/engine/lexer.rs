//! 词法分析

/// 词法单元
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),

    Fn,
    Let,
    Set,
    Var,
    Return,
    If,
    Else,
    Log,
    Emit,
    Fail,
    True,
    False,

    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Assign,
    At,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,

    Eof,
}

impl TokenKind {
    /// 用于错误信息的简短描述
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(s) => format!("identifier '{}'", s),
            TokenKind::Int(n) => format!("integer {}", n),
            TokenKind::Float(x) => format!("float {}", x),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Eof => "end of file".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::Fn => "fn",
            TokenKind::Let => "let",
            TokenKind::Set => "set",
            TokenKind::Var => "var",
            TokenKind::Return => "return",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::Log => "log",
            TokenKind::Emit => "emit",
            TokenKind::Fail => "fail",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Assign => "=",
            TokenKind::At => "@",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Bang => "!",
            TokenKind::Eq => "==",
            TokenKind::Ne => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            _ => "?",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "fn" => TokenKind::Fn,
        "let" => TokenKind::Let,
        "set" => TokenKind::Set,
        "var" => TokenKind::Var,
        "return" => TokenKind::Return,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "log" => TokenKind::Log,
        "emit" => TokenKind::Emit,
        "fail" => TokenKind::Fail,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => return None,
    })
}

struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }
}

/// 将源码切分为词法单元，末尾总是 `Eof`
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut cur = Cursor {
        chars: source.chars().peekable(),
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();

    loop {
        // 跳过空白与注释
        match cur.peek() {
            Some(c) if c.is_whitespace() => {
                cur.bump();
                continue;
            }
            Some('#') => {
                cur.skip_line();
                continue;
            }
            _ => {}
        }

        let (line, column) = (cur.line, cur.column);
        let err = |message: String| LexError {
            line,
            column,
            message,
        };

        let Some(c) = cur.bump() else {
            tokens.push(Token {
                kind: TokenKind::Eof,
                line,
                column,
            });
            return Ok(tokens);
        };

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '@' => TokenKind::At,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '%' => TokenKind::Percent,
            '/' => {
                if cur.eat('/') {
                    cur.skip_line();
                    continue;
                }
                TokenKind::Slash
            }
            '=' => {
                if cur.eat('=') {
                    TokenKind::Eq
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if cur.eat('=') {
                    TokenKind::Ne
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if cur.eat('=') {
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if cur.eat('=') {
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '&' => {
                if cur.eat('&') {
                    TokenKind::AndAnd
                } else {
                    return Err(err("expected '&&'".into()));
                }
            }
            '|' => {
                if cur.eat('|') {
                    TokenKind::OrOr
                } else {
                    return Err(err("expected '||'".into()));
                }
            }
            '"' => {
                let mut text = String::new();
                loop {
                    match cur.bump() {
                        None | Some('\n') => {
                            return Err(err("unterminated string literal".into()));
                        }
                        Some('"') => break,
                        Some('\\') => match cur.bump() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some('"') => text.push('"'),
                            Some('\\') => text.push('\\'),
                            Some(other) => {
                                return Err(err(format!("unknown escape '\\{}'", other)));
                            }
                            None => return Err(err("unterminated string literal".into())),
                        },
                        Some(ch) => text.push(ch),
                    }
                }
                TokenKind::Str(text)
            }
            c if c.is_ascii_digit() => {
                let mut text = String::from(c);
                while let Some(d) = cur.peek().filter(|d| d.is_ascii_digit() || *d == '_') {
                    if d != '_' {
                        text.push(d);
                    }
                    cur.bump();
                }
                // 小数点后必须紧跟数字才是浮点数
                let mut lookahead = cur.chars.clone();
                let is_float = lookahead.next() == Some('.')
                    && lookahead.next().is_some_and(|d| d.is_ascii_digit());
                if is_float {
                    cur.bump();
                    text.push('.');
                    while let Some(d) = cur.peek().filter(|d| d.is_ascii_digit()) {
                        text.push(d);
                        cur.bump();
                    }
                    let value: f64 = text
                        .parse()
                        .map_err(|_| err(format!("invalid float literal '{}'", text)))?;
                    TokenKind::Float(value)
                } else {
                    let value: i64 = text
                        .parse()
                        .map_err(|_| err(format!("integer literal '{}' out of range", text)))?;
                    TokenKind::Int(value)
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(d) = cur.peek().filter(|d| d.is_alphanumeric() || *d == '_') {
                    word.push(d);
                    cur.bump();
                }
                keyword(&word).unwrap_or(TokenKind::Ident(word))
            }
            other => return Err(err(format!("unexpected character '{}'", other))),
        };

        tokens.push(Token { kind, line, column });
    }
}
