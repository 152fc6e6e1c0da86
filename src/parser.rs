use crate::analyzer::is_forbidden_name;
use crate::ast::*;
use crate::error::EvalError;
use crate::lexer::{Lexer, Token, TokenType};
use crate::value::Value;

/// A recursive descent parser for attribute expressions.
///
/// The grammar has no calls, lambdas or comprehensions, and rejects reserved
/// `__` names, so a parsed expression can only combine values it was given.
#[derive(Debug)]
pub struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    source_text: &'a str,
}

impl<'a> Parser<'a> {
    pub fn new(source_text: &'a str) -> Self {
        let mut lexer = Lexer::new(source_text);
        let tokens: Vec<Token> = lexer
            .lex()
            .into_iter()
            .filter(|t| !matches!(t.ttype, TokenType::Whitespace))
            .collect();

        Self {
            tokens,
            position: 0,
            source_text,
        }
    }

    /// Parses the whole input as one expression.
    pub fn parse_expression(&mut self) -> Result<Expr, EvalError> {
        let expr = self.parse_or()?;
        self.expect(TokenType::Eof)?;
        Ok(expr)
    }

    // === Precedence levels ===

    /// or_expr ::= and_expr ("or" and_expr)*
    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_and()?;
        while self.match_token(TokenType::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// and_expr ::= not_expr ("and" not_expr)*
    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_not()?;
        while self.match_token(TokenType::And) {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// not_expr ::= "not" not_expr | comparison
    fn parse_not(&mut self) -> Result<Expr, EvalError> {
        if self.match_token(TokenType::Not) {
            let inner = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.parse_comparison()
    }

    /// comparison ::= additive (compop additive)*
    fn parse_comparison(&mut self) -> Result<Expr, EvalError> {
        let first = self.parse_additive()?;
        let mut rest = Vec::new();
        while let Some(op) = self.match_compare_op() {
            rest.push((op, self.parse_additive()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn match_compare_op(&mut self) -> Option<CompareOp> {
        let op = match self.current_token().ttype {
            TokenType::EqEq => CompareOp::Eq,
            TokenType::NotEq => CompareOp::NotEq,
            TokenType::Lt => CompareOp::Lt,
            TokenType::Le => CompareOp::Le,
            TokenType::Gt => CompareOp::Gt,
            TokenType::Ge => CompareOp::Ge,
            TokenType::In => CompareOp::In,
            TokenType::Not if self.peek_is(TokenType::In) => {
                self.advance();
                CompareOp::NotIn
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    /// additive ::= term (("+" | "-") term)*
    fn parse_additive(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.current_token().ttype {
                TokenType::Plus => BinaryOp::Add,
                TokenType::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// term ::= unary (("*" | "/" | "//" | "%") unary)*
    fn parse_term(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current_token().ttype {
                TokenType::Star => BinaryOp::Mul,
                TokenType::Slash => BinaryOp::Div,
                TokenType::DoubleSlash => BinaryOp::FloorDiv,
                TokenType::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// unary ::= ("-" | "+") unary | power
    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        if self.match_token(TokenType::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        if self.match_token(TokenType::Plus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Pos, Box::new(inner)));
        }
        self.parse_power()
    }

    /// power ::= postfix ("**" unary)?
    fn parse_power(&mut self) -> Result<Expr, EvalError> {
        let base = self.parse_postfix()?;
        if self.match_token(TokenType::DoubleStar) {
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    /// postfix ::= atom ("." Identifier | "[" expr "]")*
    fn parse_postfix(&mut self) -> Result<Expr, EvalError> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.match_token(TokenType::Dot) {
                let name = self.parse_name("a member name after '.'")?;
                expr = Expr::Member(Box::new(expr), name);
            } else if self.match_token(TokenType::LBracket) {
                let index = self.parse_or()?;
                self.expect(TokenType::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    /// atom ::= literal | Identifier | "(" ... ")" | "[" ... "]" | "{" ... "}"
    fn parse_atom(&mut self) -> Result<Expr, EvalError> {
        let token = self.current_token().clone();
        let literal = match &token.ttype {
            TokenType::Int(i) => Some(Value::Int(*i)),
            TokenType::Float(f) => Some(Value::Float(*f)),
            TokenType::String(s) => Some(Value::Str(s.clone())),
            TokenType::True => Some(Value::Bool(true)),
            TokenType::False => Some(Value::Bool(false)),
            TokenType::None => Some(Value::None),
            _ => None,
        };
        if let Some(value) = literal {
            self.advance();
            return Ok(Expr::Literal(value));
        }

        match token.ttype {
            TokenType::Identifier(_) => Ok(Expr::Name(self.parse_name("a name")?)),
            TokenType::LParen => self.parse_paren(),
            TokenType::LBracket => {
                self.advance();
                let items = self.parse_sequence(TokenType::RBracket)?;
                Ok(Expr::List(items))
            }
            TokenType::LBrace => self.parse_dict(),
            TokenType::Unknown => {
                let text = &self.source_text[token.pos_start..token.pos_end];
                if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(EvalError::runtime(format!(
                        "integer literal `{text}` does not fit in 64 bits"
                    )));
                }
                self.err_unexpected("a value")
            }
            _ => self.err_unexpected("a value"),
        }
    }

    /// "(" expr ")" is grouping; "()" and "(" expr "," ... ")" are tuples.
    fn parse_paren(&mut self) -> Result<Expr, EvalError> {
        self.expect(TokenType::LParen)?;
        if self.match_token(TokenType::RParen) {
            return Ok(Expr::Tuple(Vec::new()));
        }
        let first = self.parse_or()?;
        if self.match_token(TokenType::RParen) {
            return Ok(first);
        }
        self.expect(TokenType::Comma)?;
        let mut items = vec![first];
        items.extend(self.parse_sequence(TokenType::RParen)?);
        Ok(Expr::Tuple(items))
    }

    /// Comma separated expressions up to and including `close`, trailing comma allowed.
    fn parse_sequence(&mut self, close: TokenType) -> Result<Vec<Expr>, EvalError> {
        let mut items = Vec::new();
        if !self.check(close.clone()) {
            loop {
                items.push(self.parse_or()?);
                if !self.match_token(TokenType::Comma) {
                    break;
                }
                if self.check(close.clone()) {
                    break; // Allow trailing comma
                }
            }
        }
        self.expect(close)?;
        Ok(items)
    }

    /// dict ::= "{" [ expr ":" expr { "," expr ":" expr } [ "," ] ] "}"
    fn parse_dict(&mut self) -> Result<Expr, EvalError> {
        self.expect(TokenType::LBrace)?;
        let mut pairs = Vec::new();
        if !self.check(TokenType::RBrace) {
            loop {
                let key = self.parse_or()?;
                self.expect(TokenType::Colon)?;
                let value = self.parse_or()?;
                pairs.push((key, value));
                if !self.match_token(TokenType::Comma) {
                    break;
                }
                if self.check(TokenType::RBrace) {
                    break;
                }
            }
        }
        self.expect(TokenType::RBrace)?;
        Ok(Expr::Dict(pairs))
    }

    fn parse_name(&mut self, expected: &str) -> Result<String, EvalError> {
        let token = self.current_token().clone();
        match token.ttype {
            TokenType::Identifier(name) => {
                if is_forbidden_name(&name) {
                    return Err(EvalError::ForbiddenConstruct(name));
                }
                self.advance();
                Ok(name)
            }
            _ => self.err_unexpected(expected),
        }
    }

    // === Tokenizer Helper Methods ===

    fn current_token(&self) -> &Token {
        // The lexer always terminates the stream with Eof and `advance` never passes it.
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.position + 1 < self.tokens.len() {
            self.position += 1;
        }
    }

    fn expect(&mut self, expected: TokenType) -> Result<(), EvalError> {
        if self.check(expected.clone()) {
            self.advance();
            Ok(())
        } else {
            self.err_unexpected(&format!("{expected:?}"))
        }
    }

    fn match_token(&mut self, ttype: TokenType) -> bool {
        if self.check(ttype) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, ttype: TokenType) -> bool {
        std::mem::discriminant(&self.current_token().ttype) == std::mem::discriminant(&ttype)
    }

    fn peek_is(&self, ttype: TokenType) -> bool {
        if let Some(token) = self.tokens.get(self.position + 1) {
            std::mem::discriminant(&token.ttype) == std::mem::discriminant(&ttype)
        } else {
            false
        }
    }

    fn err_unexpected<T>(&self, expected: &str) -> Result<T, EvalError> {
        let token = self.current_token();
        let found = if token.ttype == TokenType::Eof {
            "end of expression".to_string()
        } else {
            format!("`{}`", &self.source_text[token.pos_start..token.pos_end])
        };
        Err(EvalError::ExpressionSyntax(format!(
            "expected {expected} at offset {}, found {found}",
            token.pos_start
        )))
    }
}

/// Parses `source` as a complete expression.
pub fn parse(source: &str) -> Result<Expr, EvalError> {
    Parser::new(source).parse_expression()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Expr {
        match parse(source) {
            Ok(expr) => expr,
            Err(err) => panic!("{source}: {err}"),
        }
    }

    fn name(n: &str) -> Box<Expr> {
        Box::new(Expr::Name(n.to_string()))
    }

    fn int(i: i64) -> Box<Expr> {
        Box::new(Expr::Literal(Value::Int(i)))
    }

    #[test]
    fn test_precedence() {
        let expr = parse_ok("__x0 + __x1 * 2");
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Add,
                name("__x0"),
                Box::new(Expr::Binary(BinaryOp::Mul, name("__x1"), int(2)))
            )
        );
    }

    #[test]
    fn test_power_binds_tighter_than_unary_minus() {
        let expr = parse_ok("-2 ** 2");
        assert_eq!(
            expr,
            Expr::Unary(
                UnaryOp::Neg,
                Box::new(Expr::Binary(BinaryOp::Pow, int(2), int(2)))
            )
        );
    }

    #[test]
    fn test_chained_comparison_and_not_in() {
        let expr = parse_ok("1 < __x0 <= 3 and __x1 not in __x2");
        let Expr::And(left, right) = expr else {
            panic!("expected and");
        };
        assert!(matches!(*left, Expr::Compare(_, ref ops) if ops.len() == 2));
        assert!(matches!(*right, Expr::Compare(_, ref ops) if ops[0].0 == CompareOp::NotIn));
    }

    #[test]
    fn test_collections() {
        assert_eq!(parse_ok("()"), Expr::Tuple(vec![]));
        assert_eq!(parse_ok("(1)"), *int(1));
        assert_eq!(parse_ok("(1,)"), Expr::Tuple(vec![*int(1)]));
        assert_eq!(parse_ok("[1, 2,]"), Expr::List(vec![*int(1), *int(2)]));
        assert!(matches!(parse_ok("{'a': 1, 2: [3]}"), Expr::Dict(ref p) if p.len() == 2));
    }

    #[test]
    fn test_member_and_index() {
        let expr = parse_ok("__x0.width[1]");
        assert_eq!(
            expr,
            Expr::Index(
                Box::new(Expr::Member(name("__x0"), "width".to_string())),
                int(1)
            )
        );
    }

    #[test]
    fn test_literal_value() {
        assert_eq!(
            parse_ok("[-1, 'a', (True, None)]").literal_value(),
            Some(Value::List(vec![
                Value::Int(-1),
                Value::Str("a".into()),
                Value::Tuple(vec![Value::Bool(true), Value::None]),
            ]))
        );
        assert_eq!(parse_ok("1 + 2").literal_value(), None);
        assert_eq!(parse_ok("__x0").literal_value(), None);
    }

    #[test]
    fn test_integer_literal_out_of_range() {
        assert_eq!(
            parse("1 + 99999999999999999999"),
            Err(EvalError::ExpressionRuntimeError(
                "integer literal `99999999999999999999` does not fit in 64 bits".to_string()
            ))
        );
        assert_eq!(parse_ok("1.5e300").literal_value(), Some(Value::Float(1.5e300)));
    }

    #[test]
    fn test_calls_are_not_grammar() {
        assert!(matches!(parse("__x0(1)"), Err(EvalError::ExpressionSyntax(_))));
    }

    #[test]
    fn test_reserved_names_are_forbidden() {
        assert_eq!(
            parse("__import__"),
            Err(EvalError::ForbiddenConstruct("__import__".to_string()))
        );
        assert_eq!(
            parse("__x0.__class__"),
            Err(EvalError::ForbiddenConstruct("__class__".to_string()))
        );
    }

    #[test]
    fn test_trailing_garbage() {
        let err = parse("1 2").unwrap_err();
        assert!(err.to_string().contains("offset 2"));
    }
}
