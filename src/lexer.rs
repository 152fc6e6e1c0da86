/// Represents the different kinds of tokens of the attribute expression language.
#[derive(Debug, PartialEq, Clone)]
pub enum TokenType {
    // == Special Tokens ==
    /// Represents the end of the input.
    Eof,
    /// A run of whitespace characters.
    Whitespace,
    /// A character or sequence that could not be recognized, including unterminated strings.
    Unknown,

    // == Literals ==
    /// A name: a placeholder (`__x0`), an alias, or a member after `.`.
    Identifier(String),
    /// A quoted string (`'...'`, `"..."`, `'''...'''`, `"""..."""`), escapes decoded.
    String(String),
    Int(i64),
    Float(f64),

    // == Keywords ==
    True,
    False,
    None,
    And,
    Or,
    Not,
    In,

    // == Punctuation & Operators ==
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Plus,
    Minus,
    Star,
    /// `**`
    DoubleStar,
    Slash,
    /// `//`
    DoubleSlash,
    Percent,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A token with its type and byte position.
#[derive(Debug, Clone)]
pub struct Token {
    pub ttype: TokenType,
    pub pos_start: usize,
    pub pos_end: usize,
}

impl Token {
    pub fn new(ttype: TokenType, pos_start: usize, pos_end: usize) -> Token {
        Token {
            ttype,
            pos_start,
            pos_end,
        }
    }
}

/// Words that are never rewritten into `self.` paths by the analyzer.
pub const KEYWORDS: &[&str] = &["and", "or", "not", "in", "True", "False", "None"];

pub struct Lexer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().peekable(),
            position: 0,
        }
    }

    pub fn lex(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            if token.ttype == TokenType::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }
        tokens
    }

    pub fn next_token(&mut self) -> Token {
        let start_pos = self.position;

        let ttype = if let Some(char) = self.advance() {
            match char {
                '(' => TokenType::LParen,
                ')' => TokenType::RParen,
                '[' => TokenType::LBracket,
                ']' => TokenType::RBracket,
                '{' => TokenType::LBrace,
                '}' => TokenType::RBrace,
                ',' => TokenType::Comma,
                ':' => TokenType::Colon,
                '.' => TokenType::Dot,
                '+' => TokenType::Plus,
                '-' => TokenType::Minus,
                '%' => TokenType::Percent,
                '*' => self.double('*', TokenType::DoubleStar, TokenType::Star),
                '/' => self.double('/', TokenType::DoubleSlash, TokenType::Slash),
                '<' => self.double('=', TokenType::Le, TokenType::Lt),
                '>' => self.double('=', TokenType::Ge, TokenType::Gt),
                '=' => self.double('=', TokenType::EqEq, TokenType::Unknown),
                '!' => self.double('=', TokenType::NotEq, TokenType::Unknown),
                '\'' | '"' => self.read_string(char),
                c if c.is_whitespace() => self.read_whitespace(),
                c if c.is_ascii_alphabetic() || c == '_' => self.read_identifier(c),
                c if c.is_ascii_digit() => self.read_number(c),
                _ => TokenType::Unknown,
            }
        } else {
            TokenType::Eof
        };

        Token::new(ttype, start_pos, self.position)
    }

    /// The unconsumed remainder of the input.
    pub fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn advance(&mut self) -> Option<char> {
        let char = self.chars.next();
        if let Some(c) = char {
            self.position += c.len_utf8();
        }
        char
    }

    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    fn double(&mut self, second: char, matched: TokenType, single: TokenType) -> TokenType {
        if self.peek() == Some(&second) {
            self.advance();
            matched
        } else {
            single
        }
    }

    fn read_whitespace(&mut self) -> TokenType {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
        TokenType::Whitespace
    }

    fn read_string(&mut self, quote: char) -> TokenType {
        let triple = {
            let rest = self.rest();
            let mut it = rest.chars();
            it.next() == Some(quote) && it.next() == Some(quote)
        };
        if triple {
            self.advance();
            self.advance();
        }

        let mut value = String::new();
        while let Some(&c) = self.peek() {
            if c == quote {
                if !triple {
                    self.advance();
                    return TokenType::String(value);
                }
                let closing: String = std::iter::repeat(quote).take(3).collect();
                if self.rest().starts_with(&closing) {
                    self.advance();
                    self.advance();
                    self.advance();
                    return TokenType::String(value);
                }
                value.push(c);
                self.advance();
                continue;
            }

            if c == '\n' && !triple {
                return TokenType::Unknown;
            }

            self.advance();
            if c == '\\' {
                let Some(escaped_char) = self.advance() else {
                    return TokenType::Unknown; // Unclosed escape sequence
                };
                match escaped_char {
                    '\'' => value.push('\''),
                    '"' => value.push('"'),
                    '\\' => value.push('\\'),
                    'n' => value.push('\n'),
                    'r' => value.push('\r'),
                    't' => value.push('\t'),
                    '0' => value.push('\0'),
                    '\n' => {}
                    _ => {
                        value.push('\\');
                        value.push(escaped_char);
                    }
                }
            } else {
                value.push(c);
            }
        }
        TokenType::Unknown // Unclosed string
    }

    fn read_identifier(&mut self, first_char: char) -> TokenType {
        let mut ident = String::new();
        ident.push(first_char);

        while let Some(&c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }

        match ident.as_str() {
            "True" => TokenType::True,
            "False" => TokenType::False,
            "None" => TokenType::None,
            "and" => TokenType::And,
            "or" => TokenType::Or,
            "not" => TokenType::Not,
            "in" => TokenType::In,
            _ => TokenType::Identifier(ident),
        }
    }

    fn read_number(&mut self, first_char: char) -> TokenType {
        let mut number_str = String::new();
        number_str.push(first_char);
        let mut has_dot = false;
        let mut has_exponent = false;

        while let Some(&c) = self.peek() {
            if c.is_ascii_digit() {
                number_str.push(c);
                self.advance();
            } else if c == '.' && !has_dot && !has_exponent {
                has_dot = true;
                number_str.push(c);
                self.advance();
            } else if (c == 'e' || c == 'E') && !has_exponent {
                has_exponent = true;
                number_str.push(c);
                self.advance();
                // Check for optional sign after 'e' or 'E'
                if let Some(&sign_char) = self.peek() {
                    if sign_char == '+' || sign_char == '-' {
                        number_str.push(sign_char);
                        self.advance();
                    }
                }
            } else {
                break;
            }
        }

        if !has_dot && !has_exponent {
            return match number_str.parse::<i64>() {
                Ok(num) => TokenType::Int(num),
                Err(_) => TokenType::Unknown,
            };
        }
        match number_str.parse::<f64>() {
            Ok(num) => TokenType::Float(num),
            Err(_) => TokenType::Unknown,
        }
    }
}
