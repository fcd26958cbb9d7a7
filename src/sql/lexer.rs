//! SQL lexer for tokenizing SELECT query patterns.

use std::iter::Peekable;
use std::str::Chars;

/// SQL token types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    // Keywords
    Select,
    Distinct,
    From,
    Join,
    Inner,
    Left,
    Right,
    Full,
    Outer,
    Cross,
    On,
    As,
    Where,
    And,
    Or,
    Not,
    Is,
    Null,
    In,
    Like,
    Between,
    Order,
    Group,
    Having,
    By,
    Asc,
    Desc,
    Limit,
    Offset,

    // Identifiers and literals
    Ident(String),
    Str(String),
    Num(String),
    /// Bind parameter: `?`, `$1`, `:name`
    Param,

    // Symbols
    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,
    Star,
    Eq,
    /// Comparison other than equality: `<`, `>`, `<=`, `>=`, `<>`, `!=`
    Cmp(String),

    // End of input
    Eof,
}

/// SQL lexer.
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    current_char: Option<char>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut chars = input.chars().peekable();
        let current_char = chars.next();
        Self {
            chars,
            current_char,
        }
    }

    fn advance(&mut self) {
        self.current_char = self.chars.next();
    }

    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.current_char {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.current_char {
            if c == '\n' {
                self.advance();
                break;
            }
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) {
        self.advance(); // skip *
        while let Some(c) = self.current_char {
            if c == '*' {
                self.advance();
                if self.current_char == Some('/') {
                    self.advance();
                    break;
                }
            } else {
                self.advance();
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.current_char {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        ident
    }

    fn read_quoted_identifier(&mut self, quote: char) -> String {
        self.advance(); // skip opening quote
        let mut ident = String::new();
        while let Some(c) = self.current_char {
            if c == quote {
                // Doubled quote is an escaped quote
                if self.peek() == Some(&quote) {
                    ident.push(c);
                    self.advance();
                    self.advance();
                } else {
                    self.advance();
                    break;
                }
            } else {
                ident.push(c);
                self.advance();
            }
        }
        ident
    }

    fn read_string(&mut self) -> String {
        self.advance(); // skip opening quote
        let mut s = String::new();
        while let Some(c) = self.current_char {
            if c == '\'' {
                if self.peek() == Some(&'\'') {
                    s.push(c);
                    self.advance();
                    self.advance();
                } else {
                    self.advance();
                    break;
                }
            } else if c == '\\' {
                self.advance();
                if let Some(escaped) = self.current_char {
                    s.push(escaped);
                    self.advance();
                }
            } else {
                s.push(c);
                self.advance();
            }
        }
        s
    }

    fn read_number(&mut self) -> String {
        let mut num = String::new();
        let mut has_dot = false;

        if self.current_char == Some('-') {
            num.push('-');
            self.advance();
        }

        while let Some(c) = self.current_char {
            if c.is_ascii_digit() {
                num.push(c);
                self.advance();
            } else if c == '.' && !has_dot {
                has_dot = true;
                num.push(c);
                self.advance();
            } else {
                break;
            }
        }
        num
    }

    fn read_comparison(&mut self, first: char) -> Token {
        self.advance();
        match (first, self.current_char) {
            ('<', Some('=')) | ('>', Some('=')) | ('<', Some('>')) | ('!', Some('=')) => {
                let second = self.current_char.unwrap_or_default();
                self.advance();
                Token::Cmp(format!("{}{}", first, second))
            }
            _ => Token::Cmp(first.to_string()),
        }
    }

    fn keyword_or_ident(&self, s: &str) -> Token {
        match s.to_uppercase().as_str() {
            "SELECT" => Token::Select,
            "DISTINCT" => Token::Distinct,
            "FROM" => Token::From,
            "JOIN" => Token::Join,
            "INNER" => Token::Inner,
            "LEFT" => Token::Left,
            "RIGHT" => Token::Right,
            "FULL" => Token::Full,
            "OUTER" => Token::Outer,
            "CROSS" => Token::Cross,
            "ON" => Token::On,
            "AS" => Token::As,
            "WHERE" => Token::Where,
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "IS" => Token::Is,
            "NULL" => Token::Null,
            "IN" => Token::In,
            "LIKE" | "ILIKE" => Token::Like,
            "BETWEEN" => Token::Between,
            "ORDER" => Token::Order,
            "GROUP" => Token::Group,
            "HAVING" => Token::Having,
            "BY" => Token::By,
            "ASC" => Token::Asc,
            "DESC" => Token::Desc,
            "LIMIT" => Token::Limit,
            "OFFSET" => Token::Offset,
            _ => Token::Ident(s.to_string()),
        }
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            self.skip_whitespace();

            match self.current_char {
                None => return Token::Eof,

                Some('-') => {
                    if self.peek() == Some(&'-') {
                        self.skip_line_comment();
                        continue;
                    } else if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                        return Token::Num(self.read_number());
                    } else {
                        self.advance();
                        continue; // arithmetic is irrelevant to the access shape
                    }
                }

                Some('/') => {
                    if self.peek() == Some(&'*') {
                        self.advance();
                        self.skip_block_comment();
                    } else {
                        self.advance();
                    }
                    continue;
                }

                Some('(') => {
                    self.advance();
                    return Token::LParen;
                }
                Some(')') => {
                    self.advance();
                    return Token::RParen;
                }
                Some(',') => {
                    self.advance();
                    return Token::Comma;
                }
                Some(';') => {
                    self.advance();
                    return Token::Semicolon;
                }
                Some('.') => {
                    self.advance();
                    return Token::Dot;
                }
                Some('*') => {
                    self.advance();
                    return Token::Star;
                }
                Some('=') => {
                    self.advance();
                    // `==` is accepted as equality
                    if self.current_char == Some('=') {
                        self.advance();
                    }
                    return Token::Eq;
                }
                Some(c @ ('<' | '>' | '!')) => {
                    return self.read_comparison(c);
                }

                Some('?') => {
                    self.advance();
                    return Token::Param;
                }
                Some('$') => {
                    if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                        self.advance();
                        self.read_number();
                        return Token::Param;
                    }
                    self.advance();
                    continue;
                }
                Some(':') => {
                    self.advance();
                    if self.current_char == Some(':') {
                        // `::type` cast; the cast target is skipped with the next identifier
                        self.advance();
                        self.read_identifier();
                        continue;
                    }
                    if self
                        .current_char
                        .is_some_and(|c| c.is_alphabetic() || c == '_')
                    {
                        self.read_identifier();
                        return Token::Param;
                    }
                    continue;
                }

                Some('"') => {
                    return Token::Ident(self.read_quoted_identifier('"'));
                }
                Some('`') => {
                    return Token::Ident(self.read_quoted_identifier('`'));
                }
                Some('[') => {
                    // SQL Server style [identifier]
                    self.advance();
                    let mut ident = String::new();
                    while let Some(c) = self.current_char {
                        if c == ']' {
                            self.advance();
                            break;
                        }
                        ident.push(c);
                        self.advance();
                    }
                    return Token::Ident(ident);
                }

                Some('\'') => {
                    return Token::Str(self.read_string());
                }

                Some(c) if c.is_ascii_digit() => {
                    return Token::Num(self.read_number());
                }

                Some(c) if c.is_alphabetic() || c == '_' => {
                    let ident = self.read_identifier();
                    return self.keyword_or_ident(&ident);
                }

                Some(_) => {
                    self.advance();
                    continue;
                }
            }
        }
    }

    /// Collect all tokens.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            if token == Token::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(sql: &str) -> Vec<Token> {
        Lexer::new(sql).tokenize()
    }

    #[test]
    fn test_simple_select() {
        let tokens = lex("SELECT u.* FROM users u WHERE u.user_id = ?");

        assert_eq!(tokens[0], Token::Select);
        assert_eq!(tokens[1], Token::Ident("u".to_string()));
        assert_eq!(tokens[2], Token::Dot);
        assert_eq!(tokens[3], Token::Star);
        assert_eq!(tokens[4], Token::From);
        assert_eq!(tokens[5], Token::Ident("users".to_string()));
        assert_eq!(tokens[7], Token::Where);
        assert_eq!(tokens[11], Token::Eq);
        assert_eq!(tokens[12], Token::Param);
        assert_eq!(tokens[13], Token::Eof);
    }

    #[test]
    fn test_placeholder_styles() {
        let tokens = lex("a = $1 AND b = :name AND c = ?");
        let params = tokens.iter().filter(|t| **t == Token::Param).count();
        assert_eq!(params, 3);
    }

    #[test]
    fn test_comparisons() {
        let tokens = lex("a >= 1 AND b <> 2 AND c < 3 AND d != 4");
        assert!(tokens.contains(&Token::Cmp(">=".to_string())));
        assert!(tokens.contains(&Token::Cmp("<>".to_string())));
        assert!(tokens.contains(&Token::Cmp("<".to_string())));
        assert!(tokens.contains(&Token::Cmp("!=".to_string())));
    }

    #[test]
    fn test_quoted_identifiers_and_comments() {
        let tokens = lex(r#"SELECT "Order Id" /* block */ FROM `orders` -- trailing"#);
        assert_eq!(tokens[1], Token::Ident("Order Id".to_string()));
        assert_eq!(tokens[2], Token::From);
        assert_eq!(tokens[3], Token::Ident("orders".to_string()));
        assert_eq!(tokens[4], Token::Eof);
    }

    #[test]
    fn test_dollar_without_digits_is_skipped() {
        assert_eq!(
            lex("a = $$ AND b = $2"),
            vec![
                Token::Ident("a".to_string()),
                Token::Eq,
                Token::And,
                Token::Ident("b".to_string()),
                Token::Eq,
                Token::Param,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_cast_is_skipped() {
        let tokens = lex("WHERE a.id = $1::uuid");
        assert_eq!(tokens.last(), Some(&Token::Eof));
        assert_eq!(tokens[tokens.len() - 2], Token::Param);
    }
}
