//! Tokenizer and recursive descent parser for query strings.
//!
//! Grammar:
//! ```text
//! query      = or_expr
//! or_expr    = and_expr ("OR" and_expr)*
//! and_expr   = unary_expr+
//! unary_expr = "-" atom | atom
//! atom       = field_expr | "(" query ")" | bare_text
//! field_expr = "tag:" (value | "(" value ("OR" value)* ")")
//!            | "property:" key [op value]
//!            | "date:" [date] ".." [date]
//!            | "tasks:" ("pending" | "done" | "none" | "any")
//!            | "path:" STRING_MATCHER
//!            | "content:" STRING_MATCHER
//! bare_text  = STRING_MATCHER  (→ Content predicate)
//! ```

use crate::error::VaultError;
use crate::parser::frontmatter::parse_date_str;
use crate::query::types::*;
use chrono::NaiveDate;
use regex::Regex;

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// A plain word (unquoted, no special chars).
    Word(String),
    /// A double-quoted string literal.
    QuotedString(String),
    /// A regex literal: /pattern/
    RegexLiteral(String),
    /// A field prefix like "tag:" (stored without the colon).
    FieldPrefix(String),
    OpenParen,
    CloseParen,
    /// The literal keyword "OR".
    Or,
    /// Negation prefix (a leading `-`).
    Not,
    /// Comparison operator for property values.
    ComparisonOp(String),
}

// ============================================================================
// Tokenizer
// ============================================================================

const KNOWN_FIELDS: &[&str] = &["tag", "property", "date", "tasks", "path", "content"];

fn query_error(msg: impl Into<String>) -> VaultError {
    VaultError::QueryError(msg.into())
}

fn tokenize(input: &str) -> Result<Vec<Token>, VaultError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        let ch = chars[i];

        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        if ch == '(' {
            tokens.push(Token::OpenParen);
            i += 1;
            continue;
        }
        if ch == ')' {
            tokens.push(Token::CloseParen);
            i += 1;
            continue;
        }

        // Negation: a leading `-` not followed by whitespace or end
        if ch == '-' && (i + 1 < len && !chars[i + 1].is_whitespace()) {
            tokens.push(Token::Not);
            i += 1;
            continue;
        }

        if ch == '"' {
            i += 1;
            let mut s = String::new();
            let mut closed = false;
            while i < len {
                match chars[i] {
                    '"' => {
                        closed = true;
                        i += 1;
                        break;
                    }
                    '\\' if i + 1 < len => {
                        i += 1;
                        s.push(chars[i]);
                    }
                    c => s.push(c),
                }
                i += 1;
            }
            if !closed {
                return Err(query_error("Unterminated quoted string"));
            }
            tokens.push(Token::QuotedString(s));
            continue;
        }

        // Regex literal: /pattern/
        if ch == '/' {
            i += 1;
            let mut pattern = String::new();
            let mut closed = false;
            while i < len {
                match chars[i] {
                    '/' => {
                        closed = true;
                        i += 1;
                        break;
                    }
                    '\\' if i + 1 < len && chars[i + 1] == '/' => {
                        i += 1;
                        pattern.push('/');
                    }
                    c => pattern.push(c),
                }
                i += 1;
            }
            if !closed {
                return Err(query_error("Unterminated regex literal"));
            }
            Regex::new(&pattern).map_err(|e| query_error(format!("Invalid regex: {}", e)))?;
            tokens.push(Token::RegexLiteral(pattern));
            continue;
        }

        // Comparison operators: !=, <=, >=, <, >, =
        let two: String = chars[i..len.min(i + 2)].iter().collect();
        if matches!(two.as_str(), "!=" | "<=" | ">=") {
            tokens.push(Token::ComparisonOp(two));
            i += 2;
            continue;
        }
        if matches!(ch, '<' | '>' | '=') {
            tokens.push(Token::ComparisonOp(ch.to_string()));
            i += 1;
            continue;
        }

        if is_word_char(ch) {
            let start = i;
            while i < len && is_word_char(chars[i]) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();

            if word == "OR" {
                tokens.push(Token::Or);
                continue;
            }

            // Field prefix: a known field name followed by a colon
            if i < len && chars[i] == ':' {
                let lower = word.to_lowercase();
                if KNOWN_FIELDS.contains(&lower.as_str()) {
                    i += 1;
                    tokens.push(Token::FieldPrefix(lower));
                    continue;
                }
                return Err(query_error(format!(
                    "Unknown field '{}' (expected one of: {})",
                    word,
                    KNOWN_FIELDS.join(", ")
                )));
            }

            tokens.push(Token::Word(word));
            continue;
        }

        return Err(query_error(format!("Unexpected character '{}' at offset {}", ch, i)));
    }

    Ok(tokens)
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.' | '/' | '#')
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), VaultError> {
        match self.advance() {
            Some(ref tok) if tok == expected => Ok(()),
            Some(tok) => Err(query_error(format!(
                "Expected {:?}, got {:?} at position {}",
                expected, tok, self.pos
            ))),
            None => Err(query_error(format!("Expected {:?}, got end of input", expected))),
        }
    }

    /// A word or quoted string.
    fn expect_value(&mut self, what: &str) -> Result<String, VaultError> {
        match self.advance() {
            Some(Token::Word(w)) => Ok(w),
            Some(Token::QuotedString(s)) => Ok(s),
            Some(tok) => Err(query_error(format!("Expected {}, got {:?}", what, tok))),
            None => Err(query_error(format!("Expected {}, got end of input", what))),
        }
    }

    fn parse_query(&mut self) -> Result<Query, VaultError> {
        self.parse_or_expr()
    }

    /// or_expr = and_expr ("OR" and_expr)*
    fn parse_or_expr(&mut self) -> Result<Query, VaultError> {
        let mut children = vec![self.parse_and_expr()?];

        while self.peek() == Some(&Token::Or) {
            self.advance();
            children.push(self.parse_and_expr()?);
        }

        Ok(collapse(children, |children| Query::Or { children }))
    }

    /// and_expr = unary_expr+
    fn parse_and_expr(&mut self) -> Result<Query, VaultError> {
        let mut children = vec![self.parse_unary_expr()?];

        while let Some(tok) = self.peek() {
            match tok {
                Token::Or | Token::CloseParen => break,
                _ => children.push(self.parse_unary_expr()?),
            }
        }

        Ok(collapse(children, |children| Query::And { children }))
    }

    /// unary_expr = "-" atom | atom
    fn parse_unary_expr(&mut self) -> Result<Query, VaultError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let child = self.parse_atom()?;
            Ok(Query::Not { child: Box::new(child) })
        } else {
            self.parse_atom()
        }
    }

    /// atom = field_expr | "(" query ")" | bare_text
    fn parse_atom(&mut self) -> Result<Query, VaultError> {
        match self.peek() {
            Some(Token::FieldPrefix(_)) => self.parse_field_expr(),
            Some(Token::OpenParen) => {
                self.advance();
                let query = self.parse_query()?;
                self.expect(&Token::CloseParen)?;
                Ok(query)
            }
            Some(Token::Word(_)) | Some(Token::QuotedString(_)) | Some(Token::RegexLiteral(_)) => {
                let matcher = self.parse_string_matcher()?;
                Ok(Query::Field(Predicate::Content { matcher }))
            }
            Some(tok) => Err(query_error(format!("Unexpected token {:?} at position {}", tok, self.pos))),
            None => Err(query_error("Unexpected end of input")),
        }
    }

    fn parse_field_expr(&mut self) -> Result<Query, VaultError> {
        let Some(Token::FieldPrefix(field)) = self.advance() else {
            return Err(query_error("Expected field prefix"));
        };

        match field.as_str() {
            "tag" => self.parse_tag_expr(),
            "property" => self.parse_property_expr(),
            "date" => self.parse_date_expr(),
            "tasks" => self.parse_tasks_expr(),
            "path" => {
                let matcher = self.parse_string_matcher()?;
                Ok(Query::Field(Predicate::Path { matcher }))
            }
            "content" => {
                let matcher = self.parse_string_matcher()?;
                Ok(Query::Field(Predicate::Content { matcher }))
            }
            _ => Err(query_error(format!("Unknown field: {}", field))),
        }
    }

    /// property:key or property:key=value or property:key<value etc.
    fn parse_property_expr(&mut self) -> Result<Query, VaultError> {
        let key = self.expect_value("property key")?;

        let Some(Token::ComparisonOp(op_str)) = self.peek().cloned() else {
            return Ok(Query::Field(Predicate::Property {
                key,
                op: PropertyOp::Exists,
                value: None,
            }));
        };
        self.advance();

        let op = match op_str.as_str() {
            "=" => PropertyOp::Eq,
            "!=" => PropertyOp::NotEq,
            "<" => PropertyOp::Lt,
            ">" => PropertyOp::Gt,
            "<=" => PropertyOp::Lte,
            ">=" => PropertyOp::Gte,
            _ => return Err(query_error(format!("Unknown operator: {}", op_str))),
        };
        let value = self.expect_value("property value")?;

        Ok(Query::Field(Predicate::Property {
            key,
            op,
            value: Some(value),
        }))
    }

    /// tag:value or tag:(value1 OR value2)
    fn parse_tag_expr(&mut self) -> Result<Query, VaultError> {
        if self.peek() != Some(&Token::OpenParen) {
            let value = self.expect_value("tag value")?;
            return Ok(tag_predicate(value));
        }

        self.advance();
        let mut children = vec![tag_predicate(self.expect_value("tag value")?)];
        while self.peek() == Some(&Token::Or) {
            self.advance();
            children.push(tag_predicate(self.expect_value("tag value after OR")?));
        }
        self.expect(&Token::CloseParen)?;

        Ok(collapse(children, |children| Query::Or { children }))
    }

    /// date:FROM..TO, either end may be omitted.
    fn parse_date_expr(&mut self) -> Result<Query, VaultError> {
        let range = self.expect_value("date range")?;
        let Some((from, to)) = range.split_once("..") else {
            return Err(query_error(format!("Expected date range FROM..TO, got '{}'", range)));
        };
        let from = parse_range_end(from)?;
        let to = parse_range_end(to)?;
        if from.is_none() && to.is_none() {
            return Err(query_error("Date range needs at least one end"));
        }
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(query_error(format!("Date range is reversed: {}..{}", f, t)));
            }
        }
        Ok(Query::Field(Predicate::DateRange { from, to }))
    }

    /// tasks:pending | done | none | any
    fn parse_tasks_expr(&mut self) -> Result<Query, VaultError> {
        let value = self.expect_value("task state")?;
        let state = match value.to_lowercase().as_str() {
            "pending" => TaskState::Pending,
            "done" => TaskState::Done,
            "none" => TaskState::None,
            "any" => TaskState::Any,
            _ => {
                return Err(query_error(format!(
                    "Unknown task state '{}' (expected pending, done, none or any)",
                    value
                )))
            }
        };
        Ok(Query::Field(Predicate::Tasks { state }))
    }

    /// Parse a string matcher: quoted string, regex, or word.
    fn parse_string_matcher(&mut self) -> Result<StringMatcher, VaultError> {
        match self.advance() {
            Some(Token::QuotedString(s)) => Ok(StringMatcher::Exact { value: s }),
            Some(Token::RegexLiteral(p)) => Ok(StringMatcher::Regex { pattern: p }),
            Some(Token::Word(w)) => Ok(StringMatcher::Contains { value: w }),
            Some(tok) => Err(query_error(format!(
                "Expected string, quoted string, or regex; got {:?}",
                tok
            ))),
            None => Err(query_error("Expected string value, got end of input")),
        }
    }
}

fn collapse(mut children: Vec<Query>, wrap: impl FnOnce(Vec<Query>) -> Query) -> Query {
    if children.len() == 1 {
        children.remove(0)
    } else {
        wrap(children)
    }
}

fn tag_predicate(value: String) -> Query {
    let value = value.strip_prefix('#').map(str::to_string).unwrap_or(value);
    Query::Field(Predicate::Tag { value })
}

fn parse_range_end(s: &str) -> Result<Option<NaiveDate>, VaultError> {
    if s.is_empty() {
        return Ok(None);
    }
    parse_date_str(s)
        .map(Some)
        .ok_or_else(|| query_error(format!("Invalid date '{}'", s)))
}

// ============================================================================
// Public API
// ============================================================================

/// Parse a query string into a [`Query`] AST.
pub fn parse_query(input: &str) -> Result<Query, VaultError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(query_error("Empty query"));
    }

    let tokens = tokenize(trimmed)?;
    if tokens.is_empty() {
        return Err(query_error("Empty query"));
    }

    let mut parser = Parser::new(tokens);
    let query = parser.parse_query()?;

    if parser.pos < parser.tokens.len() {
        return Err(query_error(format!(
            "Unexpected token {:?} at position {}",
            parser.tokens[parser.pos], parser.pos
        )));
    }

    Ok(query)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(value: &str) -> Query {
        Query::Field(Predicate::Tag {
            value: value.to_string(),
        })
    }

    // -- Tokenizer tests --

    #[test]
    fn test_tokenize_field_prefix() {
        let tokens = tokenize("tag:project").unwrap();
        assert_eq!(
            tokens,
            vec![Token::FieldPrefix("tag".to_string()), Token::Word("project".to_string())]
        );
    }

    #[test]
    fn test_tokenize_negation_and_hyphenated_words() {
        let tokens = tokenize("-tag:trip-planning").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Not,
                Token::FieldPrefix("tag".to_string()),
                Token::Word("trip-planning".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_comparison_ops() {
        let tokens = tokenize("property:due<=2024-03-01").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::FieldPrefix("property".to_string()),
                Token::Word("due".to_string()),
                Token::ComparisonOp("<=".to_string()),
                Token::Word("2024-03-01".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_escaped_quote() {
        let tokens = tokenize("\"hello \\\"world\\\"\"").unwrap();
        assert_eq!(tokens, vec![Token::QuotedString("hello \"world\"".to_string())]);
    }

    #[test]
    fn test_tokenize_rejects_unknown_field() {
        assert!(matches!(tokenize("status:done"), Err(VaultError::QueryError(_))));
    }

    // -- Parser tests --

    #[test]
    fn test_parse_bare_word() {
        let q = parse_query("lisbon").unwrap();
        assert_eq!(
            q,
            Query::Field(Predicate::Content {
                matcher: StringMatcher::Contains {
                    value: "lisbon".to_string()
                }
            })
        );
    }

    #[test]
    fn test_parse_implicit_and_and_or() {
        let q = parse_query("tag:trip tag:business OR tag:travel").unwrap();
        assert_eq!(
            q,
            Query::Or {
                children: vec![
                    Query::And {
                        children: vec![tag("trip"), tag("business")]
                    },
                    tag("travel"),
                ]
            }
        );
    }

    #[test]
    fn test_parse_tag_group_and_hash() {
        let q = parse_query("tag:(#trip OR work)").unwrap();
        assert_eq!(q, Query::Or { children: vec![tag("trip"), tag("work")] });
    }

    #[test]
    fn test_parse_not_group() {
        let q = parse_query("-(tag:a OR tag:b)").unwrap();
        assert!(matches!(q, Query::Not { child } if matches!(*child, Query::Or { .. })));
    }

    #[test]
    fn test_parse_property() {
        let q = parse_query("property:status!=done").unwrap();
        assert_eq!(
            q,
            Query::Field(Predicate::Property {
                key: "status".to_string(),
                op: PropertyOp::NotEq,
                value: Some("done".to_string()),
            })
        );

        let q = parse_query("property:status").unwrap();
        assert!(matches!(
            q,
            Query::Field(Predicate::Property {
                op: PropertyOp::Exists,
                value: None,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_date_range() {
        let q = parse_query("date:2026-03-01..2026-03-31").unwrap();
        assert_eq!(
            q,
            Query::Field(Predicate::DateRange {
                from: NaiveDate::from_ymd_opt(2026, 3, 1),
                to: NaiveDate::from_ymd_opt(2026, 3, 31),
            })
        );

        let q = parse_query("date:..2026-01-01").unwrap();
        assert!(matches!(q, Query::Field(Predicate::DateRange { from: None, to: Some(_) })));
    }

    #[test]
    fn test_parse_tasks() {
        assert_eq!(
            parse_query("tasks:pending").unwrap(),
            Query::Field(Predicate::Tasks {
                state: TaskState::Pending
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        let bad = [
            "",
            "   ",
            "(tag:a",
            "tag:",
            "tag:a)",
            "property:x=",
            "date:2026-01-01",
            "date:2026-02-01..2026-01-01",
            "date:soon..later",
            "tasks:maybe",
            "\"unterminated",
            "/[unclosed/",
            "a & b",
        ];
        for input in bad {
            assert!(
                matches!(parse_query(input), Err(VaultError::QueryError(_))),
                "expected QueryError for {input:?}"
            );
        }
    }
}
