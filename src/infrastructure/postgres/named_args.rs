//! Named query parameters.
//!
//! Queries are written with `@name` placeholders and rewritten into
//! PostgreSQL's positional `$n` form right before execution. The scanner
//! leaves string literals, quoted identifiers, comments and dollar-quoted
//! bodies untouched. A name used several times maps to a single positional
//! parameter. A name without a value binds `NULL`; values whose name never
//! appears in the SQL are dropped.

use std::collections::HashMap;

use super::value::SqlValue;

/// Query arguments keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedArgs {
    values: HashMap<String, SqlValue>,
}

impl NamedArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. A repeated name replaces the previous value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for NamedArgs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut args = NamedArgs::new();
        for (k, v) in iter {
            args.insert(k, v);
        }
        args
    }
}

/// SQL rewritten to positional placeholders, with parameters in bind order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl BoundQuery {
    /// Rewrite `sql` and move the matching values out of `args`.
    pub fn new(sql: &str, mut args: NamedArgs) -> Self {
        let mut out = String::with_capacity(sql.len());
        let mut names: Vec<String> = Vec::new();
        let chars: Vec<char> = sql.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '\'' | '"' => {
                    let end = skip_quoted(&chars, i, c, is_escape_string(&chars, i));
                    out.extend(&chars[i..end]);
                    i = end;
                }
                '-' if chars.get(i + 1) == Some(&'-') => {
                    let end = chars[i..]
                        .iter()
                        .position(|&ch| ch == '\n')
                        .map_or(chars.len(), |p| i + p + 1);
                    out.extend(&chars[i..end]);
                    i = end;
                }
                '/' if chars.get(i + 1) == Some(&'*') => {
                    let end = skip_block_comment(&chars, i);
                    out.extend(&chars[i..end]);
                    i = end;
                }
                '$' => match dollar_tag(&chars, i) {
                    Some(tag_len) => {
                        let end = skip_dollar_quoted(&chars, i, tag_len);
                        out.extend(&chars[i..end]);
                        i = end;
                    }
                    None => {
                        out.push(c);
                        i += 1;
                    }
                },
                '@' if chars.get(i + 1).is_some_and(|&ch| is_ident_start(ch)) => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && is_ident_char(chars[end]) {
                        end += 1;
                    }
                    let name: String = chars[start..end].iter().collect();
                    let position = match names.iter().position(|n| *n == name) {
                        Some(p) => p + 1,
                        None => {
                            names.push(name);
                            names.len()
                        }
                    };
                    out.push('$');
                    out.push_str(&position.to_string());
                    i = end;
                }
                _ => {
                    out.push(c);
                    i += 1;
                }
            }
        }

        let params = names
            .iter()
            .map(|name| args.values.remove(name).unwrap_or(SqlValue::Null))
            .collect();

        Self { sql: out, params }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// `E'...'` literals treat backslash as an escape character.
fn is_escape_string(chars: &[char], quote_at: usize) -> bool {
    chars[quote_at] == '\''
        && quote_at > 0
        && matches!(chars[quote_at - 1], 'E' | 'e')
        && (quote_at < 2 || !is_ident_char(chars[quote_at - 2]))
}

/// Index one past the closing quote; doubled quotes are escapes.
fn skip_quoted(chars: &[char], start: usize, quote: char, backslash_escapes: bool) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if backslash_escapes && chars[i] == '\\' {
            i += 2;
            continue;
        }
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

/// Block comments nest in PostgreSQL.
fn skip_block_comment(chars: &[char], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < chars.len() {
        match (chars[i], chars[i + 1]) {
            ('/', '*') => {
                depth += 1;
                i += 2;
            }
            ('*', '/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    chars.len()
}

/// Length of a `$tag$` opener starting at `start`, if there is one.
/// `$1` style positional references are not tags.
fn dollar_tag(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    while i < chars.len() {
        match chars[i] {
            '$' => return Some(i - start + 1),
            c if is_ident_char(c) => i += 1,
            _ => return None,
        }
    }
    None
}

fn skip_dollar_quoted(chars: &[char], start: usize, tag_len: usize) -> usize {
    let tag = &chars[start..start + tag_len];
    let mut i = start + tag_len;
    while i + tag_len <= chars.len() {
        if &chars[i..i + tag_len] == tag {
            return i + tag_len;
        }
        i += 1;
    }
    chars.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_names_in_order_of_appearance() {
        let args = NamedArgs::new()
            .with("email", "a@b.cz")
            .with("name", "Ada")
            .with("uuid", "x");
        let q = BoundQuery::new(
            "INSERT INTO client (email, name, uuid) values(@email, @name, @uuid::UUID)",
            args,
        );

        assert_eq!(
            q.sql,
            "INSERT INTO client (email, name, uuid) values($1, $2, $3::UUID)"
        );
        assert_eq!(
            q.params,
            vec![
                SqlValue::Text("a@b.cz".to_string()),
                SqlValue::Text("Ada".to_string()),
                SqlValue::Text("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_repeated_name_reuses_placeholder() {
        let q = BoundQuery::new(
            "SELECT * FROM t WHERE a = @v OR b = @v",
            NamedArgs::new().with("v", 1i64),
        );
        assert_eq!(q.sql, "SELECT * FROM t WHERE a = $1 OR b = $1");
        assert_eq!(q.params, vec![SqlValue::Int(1)]);
    }

    #[test]
    fn test_missing_value_binds_null_and_unused_is_dropped() {
        let q = BoundQuery::new(
            "SELECT @present, @absent",
            NamedArgs::new().with("present", true).with("unused", 3i64),
        );
        assert_eq!(q.sql, "SELECT $1, $2");
        assert_eq!(q.params, vec![SqlValue::Bool(true), SqlValue::Null]);
    }

    #[test]
    fn test_literals_and_comments_are_left_alone() {
        let sql = "SELECT 'mail@example.com', \"col@x\", $$ @body $$, $tag$ @t $tag$ \
                   -- @comment\n /* @block /* @nested */ */ @real";
        let q = BoundQuery::new(sql, NamedArgs::new().with("real", 1i64));

        assert!(q.sql.contains("'mail@example.com'"));
        assert!(q.sql.contains("\"col@x\""));
        assert!(q.sql.contains("$$ @body $$"));
        assert!(q.sql.contains("$tag$ @t $tag$"));
        assert!(q.sql.contains("-- @comment\n"));
        assert!(q.sql.contains("/* @block /* @nested */ */"));
        assert!(q.sql.ends_with("$1"));
        assert_eq!(q.params.len(), 1);
    }

    #[test]
    fn test_escaped_quote_and_operators() {
        let q = BoundQuery::new(
            "SELECT 'it''s @x' , tags @> @tags, 1 @ 2",
            NamedArgs::new().with("tags", serde_json::json!(["a"])),
        );
        assert_eq!(q.sql, "SELECT 'it''s @x' , tags @> $1, 1 @ 2");
        assert_eq!(q.params.len(), 1);
    }

    #[test]
    fn test_backslash_escape_in_e_string() {
        let q = BoundQuery::new(
            r"SELECT E'it\'s @x', e'\\', 'plain\', @y",
            NamedArgs::new().with("y", 1i64),
        );
        assert_eq!(q.sql, r"SELECT E'it\'s @x', e'\\', 'plain\', $1");
        assert_eq!(q.params, vec![SqlValue::Int(1)]);
    }

    #[test]
    fn test_positional_dollar_is_not_a_tag() {
        let q = BoundQuery::new("SELECT $1, @a", NamedArgs::new().with("a", 2i64));
        assert_eq!(q.sql, "SELECT $1, $1");
    }

    #[test]
    fn test_from_iterator() {
        let args: NamedArgs = [("a", 1i64), ("b", 2i64)].into_iter().collect();
        assert_eq!(args.len(), 2);
        assert_eq!(args.get("b"), Some(&SqlValue::Int(2)));
    }
}
