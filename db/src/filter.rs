//! WHERE-clause sanitizing.
//!
//! Caller-supplied filter text is never spliced into a statement as is.
//! [`parameterize`] tokenizes it, rejects anything that could end the
//! statement or start a new one, and moves every literal into a bound
//! parameter.
//!
//! # Example
//!
//! ```
//! use rusqlite::types::Value;
//! use tablemap_db::filter::parameterize;
//!
//! let filter = parameterize("WHERE Name = 'Ada' AND Age > 30").unwrap();
//! assert_eq!(filter.clause, "WHERE Name = ?1 AND Age > ?2");
//! assert_eq!(filter.params, vec![Value::Text("Ada".into()), Value::Integer(30)]);
//!
//! assert!(parameterize("ID = 1; DROP TABLE Person").is_err());
//! ```

use std::sync::LazyLock;

use regex::Regex;
use rusqlite::types::Value;

use crate::error::{DatabaseError, Result};

/// Keywords that can only appear in a filter as part of another statement.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "ALTER", "ATTACH", "BEGIN", "COMMIT", "CREATE", "DELETE", "DETACH", "DROP", "EXEC",
    "EXECUTE", "INSERT", "PRAGMA", "REINDEX", "RELEASE", "REPLACE", "ROLLBACK", "SAVEPOINT",
    "SELECT", "UNION", "UPDATE", "VACUUM",
];

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?:(?P<space>\s+)|(?P<string>'(?:[^']|'')*')|(?P<quoted>"(?:[^"]|"")*")|(?P<number>(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)|(?P<ident>[A-Za-z_][A-Za-z0-9_]*)|(?P<op>==|!=|<>|<=|>=|\|\||[=<>+\-*/%(),.]))"#,
    )
    .expect("static regex must compile")
});

/// A sanitized WHERE clause and the values bound to its placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// `WHERE ...` (or a bare `ORDER BY` / `LIMIT` tail) with `?N`
    /// placeholders, or empty for no filter.
    pub clause: String,
    pub params: Vec<Value>,
}

impl Filter {
    /// A filter matching every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// `WHERE "column" = ?1` bound to `value`.
    pub fn by_column(column: &str, value: Value) -> Self {
        Self {
            clause: format!("WHERE {} = ?1", quote_identifier(column)),
            params: vec![value],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clause.is_empty()
    }
}

/// Double-quotes an identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Sanitizes caller filter text into a parameterized WHERE clause.
///
/// A leading `WHERE` is optional. Blank text yields [`Filter::all`].
///
/// # Errors
///
/// Returns [`DatabaseError::SqlInjection`] for statement separators,
/// comments, unterminated literals, unbalanced parentheses, characters
/// outside the filter grammar, or keywords that begin another statement.
pub fn parameterize(text: &str) -> Result<Filter> {
    let mut parts: Vec<String> = Vec::new();
    let mut params = Vec::new();
    let mut depth = 0usize;
    let mut rest = text;

    while !rest.is_empty() {
        if rest.starts_with("--") || rest.starts_with("/*") {
            return Err(reject(text, "comments are not allowed"));
        }
        let Some(caps) = TOKEN_RE.captures(rest) else {
            return Err(match rest.chars().next() {
                Some(';') => reject(text, "statement separator ';' is not allowed"),
                Some('\'' | '"') => reject(text, "unterminated literal"),
                Some(other) => reject(text, &format!("unexpected character '{other}'")),
                None => reject(text, "unexpected end of input"),
            });
        };
        let Some(token) = caps.get(0) else {
            break;
        };
        rest = &rest[token.end()..];

        if caps.name("space").is_some() {
            continue;
        }
        if let Some(string) = caps.name("string") {
            let raw = string.as_str();
            let inner = &raw[1..raw.len() - 1];
            params.push(Value::Text(inner.replace("''", "'")));
            parts.push(format!("?{}", params.len()));
        } else if let Some(number) = caps.name("number") {
            params.push(parse_number(text, number.as_str())?);
            parts.push(format!("?{}", params.len()));
        } else if let Some(ident) = caps.name("ident") {
            let word = ident.as_str();
            if FORBIDDEN_KEYWORDS
                .iter()
                .any(|keyword| keyword.eq_ignore_ascii_case(word))
            {
                return Err(reject(text, &format!("keyword {word} is not allowed")));
            }
            if parts.is_empty() && word.eq_ignore_ascii_case("WHERE") {
                continue;
            }
            parts.push(word.to_string());
        } else if let Some(quoted) = caps.name("quoted") {
            parts.push(quoted.as_str().to_string());
        } else if let Some(op) = caps.name("op") {
            match op.as_str() {
                "(" => depth += 1,
                ")" => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| reject(text, "unbalanced parentheses"))?;
                }
                _ => {}
            }
            parts.push(op.as_str().to_string());
        }
    }

    if depth != 0 {
        return Err(reject(text, "unbalanced parentheses"));
    }
    if parts.is_empty() {
        return Ok(Filter::all());
    }
    let body = join_tokens(&parts);
    let ordering_only = ["ORDER", "LIMIT"]
        .iter()
        .any(|keyword| parts[0].eq_ignore_ascii_case(keyword));
    Ok(Filter {
        clause: if ordering_only {
            body
        } else {
            format!("WHERE {body}")
        },
        params,
    })
}

fn join_tokens(parts: &[String]) -> String {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        let tight = matches!(part.as_str(), ")" | "," | ".")
            || (i > 0 && matches!(parts[i - 1].as_str(), "(" | "."));
        if i > 0 && !tight {
            out.push(' ');
        }
        out.push_str(part);
    }
    out
}

fn parse_number(text: &str, literal: &str) -> Result<Value> {
    if let Ok(integer) = literal.parse::<i64>() {
        return Ok(Value::Integer(integer));
    }
    literal
        .parse::<f64>()
        .map(Value::Real)
        .map_err(|_| reject(text, &format!("malformed number {literal}")))
}

fn reject(text: &str, reason: &str) -> DatabaseError {
    DatabaseError::SqlInjection(format!("{reason} in filter \"{text}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_rejected(text: &str) {
        match parameterize(text) {
            Err(DatabaseError::SqlInjection(_)) => {}
            other => panic!("expected rejection of {text:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_where_keyword_is_optional() {
        let with = parameterize("WHERE ID == 1").unwrap();
        let without = parameterize("ID == 1").unwrap();
        assert_eq!(with, without);
        assert_eq!(with.clause, "WHERE ID == ?1");
        assert_eq!(with.params, vec![Value::Integer(1)]);
    }

    #[test]
    fn test_blank_text_matches_everything() {
        assert!(parameterize("").unwrap().is_empty());
        assert!(parameterize("   ").unwrap().is_empty());
        assert!(parameterize("where").unwrap().is_empty());
    }

    #[test]
    fn test_string_escapes_and_numbers() {
        let filter = parameterize("Name = 'O''Brien' OR Score >= 2.5").unwrap();
        assert_eq!(filter.clause, "WHERE Name = ?1 OR Score >= ?2");
        assert_eq!(
            filter.params,
            vec![Value::Text("O'Brien".into()), Value::Real(2.5)]
        );
    }

    #[test]
    fn test_literal_contents_are_not_scanned() {
        let filter = parameterize("Note = 'a; DROP TABLE x -- y'").unwrap();
        assert_eq!(
            filter.params,
            vec![Value::Text("a; DROP TABLE x -- y".into())]
        );
    }

    #[test]
    fn test_functions_lists_and_ordering() {
        let filter =
            parameterize("lower(\"Full Name\") IN ('a', 'b') ORDER BY ID DESC LIMIT 5").unwrap();
        assert_eq!(
            filter.clause,
            "WHERE lower (\"Full Name\") IN (?1, ?2) ORDER BY ID DESC LIMIT ?3"
        );
        assert_eq!(filter.params.len(), 3);
    }

    #[test]
    fn test_ordering_without_predicate() {
        let filter = parameterize("ORDER BY Name DESC LIMIT 2").unwrap();
        assert_eq!(filter.clause, "ORDER BY Name DESC LIMIT ?1");
        assert_eq!(filter.params, vec![Value::Integer(2)]);
    }

    #[test]
    fn test_rejects_statement_separator() {
        assert_rejected("ID = 1; DROP TABLE Person");
        assert_rejected("ID = 1;");
    }

    #[test]
    fn test_rejects_comments() {
        assert_rejected("ID = 1 -- trailing");
        assert_rejected("ID = 1 /* block */");
    }

    #[test]
    fn test_rejects_statement_keywords() {
        assert_rejected("ID IN (SELECT ID FROM Other)");
        assert_rejected("ID = 1 UNION ALL");
        assert_rejected("drop");
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert_rejected("Name = 'open");
        assert_rejected("\"Name = 1");
        assert_rejected("(ID = 1");
        assert_rejected("ID = 1)");
        assert_rejected("ID = ?");
        assert_rejected("ID = @p");
    }

    #[test]
    fn test_by_column_quotes_identifier() {
        let filter = Filter::by_column("Parent\"ID", Value::Integer(4));
        assert_eq!(filter.clause, "WHERE \"Parent\"\"ID\" = ?1");
        assert_eq!(filter.params, vec![Value::Integer(4)]);
    }
}
