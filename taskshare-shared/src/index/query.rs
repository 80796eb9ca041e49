/// Index query grammar
///
/// Queries are strings in a restricted, RediSearch-compatible grammar:
///
/// ```text
/// query     := union
/// union     := intersect ( '|' intersect )*
/// intersect := atom ( atom )*                     (juxtaposition = AND)
/// atom      := '*'
///            | '(' union ')'
///            | '@' field ':' '{' tag ( '|' tag )* '}'
///            | '@' field ':' word
///            | '@' field ':' '(' word+ ')'
/// ```
///
/// Inside tag braces every character outside `[A-Za-z0-9]` must be escaped
/// with a backslash, except the `|` separating alternatives. Dynamic values
/// are therefore never interpolated by hand: build a [`Predicate`] and
/// [`Predicate::render`] it, which routes every value through
/// [`escape_query_value`].
///
/// # Example
///
/// ```
/// use taskshare_shared::index::query::{parse_query, Predicate};
///
/// let q = Predicate::tag("ownerId", "user:1-a").or(Predicate::tag("sharedUserId", "user:1-a"));
/// let rendered = q.render();
/// assert_eq!(rendered, r"@ownerId:{user\:1\-a} | @sharedUserId:{user\:1\-a}");
/// assert_eq!(parse_query(&rendered).unwrap(), q);
/// ```
use thiserror::Error;

/// Marker placed before every reserved character
pub const ESCAPE_MARKER: char = '\\';

/// Query parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryParseError {
    #[error("Unexpected end of query")]
    UnexpectedEnd,

    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("Unescaped character '{ch}' in tag value at position {pos}")]
    UnescapedCharacter { ch: char, pos: usize },

    #[error("Empty value at position {pos}")]
    EmptyValue { pos: usize },
}

/// Parsed query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches every indexed document
    All,

    /// Field equals any of the values exactly
    Tag { field: String, values: Vec<String> },

    /// Field contains every term (lowercase tokens)
    Text { field: String, terms: Vec<String> },

    And(Vec<Predicate>),

    Or(Vec<Predicate>),
}

impl Predicate {
    /// Exact match on a single value
    pub fn tag(field: impl Into<String>, value: impl Into<String>) -> Self {
        Predicate::Tag {
            field: field.into(),
            values: vec![value.into()],
        }
    }

    /// Word match; `text` is tokenized the same way documents are
    pub fn text(field: impl Into<String>, text: &str) -> Self {
        Predicate::Text {
            field: field.into(),
            terms: tokenize(text),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut parts) => {
                parts.push(other);
                Predicate::And(parts)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut parts) => {
                parts.push(other);
                Predicate::Or(parts)
            }
            first => Predicate::Or(vec![first, other]),
        }
    }

    /// Renders the predicate as a query string, escaping every value
    pub fn render(&self) -> String {
        match self {
            Predicate::All => "*".to_string(),
            Predicate::Tag { field, values } => {
                let escaped: Vec<String> = values.iter().map(|v| escape_query_value(v)).collect();
                format!("@{}:{{{}}}", field, escaped.join("|"))
            }
            Predicate::Text { field, terms } => {
                let escaped: Vec<String> = terms.iter().map(|t| escape_query_value(t)).collect();
                if escaped.len() == 1 {
                    format!("@{}:{}", field, escaped[0])
                } else {
                    format!("@{}:({})", field, escaped.join(" "))
                }
            }
            Predicate::And(parts) => parts
                .iter()
                .map(Predicate::render_grouped)
                .collect::<Vec<_>>()
                .join(" "),
            Predicate::Or(parts) => parts
                .iter()
                .map(Predicate::render_grouped)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }

    fn render_grouped(&self) -> String {
        match self {
            Predicate::And(_) | Predicate::Or(_) => format!("({})", self.render()),
            _ => self.render(),
        }
    }
}

/// Escapes a dynamic value for interpolation into a query
///
/// Every character outside the ASCII alphanumeric set gets a preceding
/// backslash, so identifiers such as `user:1`, `a-b` or `me@example.com`
/// are matched literally and can never close a tag or add alternatives.
pub fn escape_query_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() * 2);
    for ch in raw.chars() {
        if !ch.is_ascii_alphanumeric() {
            out.push(ESCAPE_MARKER);
        }
        out.push(ch);
    }
    out
}

/// Splits text into lowercase alphanumeric tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Parses a query string
///
/// # Errors
///
/// Returns [`QueryParseError`] when the string does not follow the grammar,
/// including any unescaped reserved character inside a tag value.
pub fn parse_query(query: &str) -> Result<Predicate, QueryParseError> {
    let mut parser = Parser {
        chars: query.chars().collect(),
        pos: 0,
    };
    let predicate = parser.union()?;
    parser.skip_ws();
    match parser.peek() {
        None => Ok(predicate),
        Some(ch) => Err(QueryParseError::UnexpectedChar {
            ch,
            pos: parser.pos,
        }),
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), QueryParseError> {
        match self.bump() {
            Some(ch) if ch == expected => Ok(()),
            Some(ch) => Err(QueryParseError::UnexpectedChar {
                ch,
                pos: self.pos - 1,
            }),
            None => Err(QueryParseError::UnexpectedEnd),
        }
    }

    fn union(&mut self) -> Result<Predicate, QueryParseError> {
        let mut parts = vec![self.intersect()?];
        loop {
            self.skip_ws();
            if self.peek() != Some('|') {
                break;
            }
            self.pos += 1;
            parts.push(self.intersect()?);
        }
        Ok(collapse(parts, Predicate::Or))
    }

    fn intersect(&mut self) -> Result<Predicate, QueryParseError> {
        let mut parts = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None | Some('|') | Some(')') => break,
                Some(_) => parts.push(self.atom()?),
            }
        }
        if parts.is_empty() {
            return match self.peek() {
                None => Err(QueryParseError::UnexpectedEnd),
                Some(ch) => Err(QueryParseError::UnexpectedChar { ch, pos: self.pos }),
            };
        }
        Ok(collapse(parts, Predicate::And))
    }

    fn atom(&mut self) -> Result<Predicate, QueryParseError> {
        let pos = self.pos;
        match self.bump() {
            Some('*') => Ok(Predicate::All),
            Some('(') => {
                let inner = self.union()?;
                self.skip_ws();
                self.expect(')')?;
                Ok(inner)
            }
            Some('@') => {
                let field = self.field_name()?;
                self.expect(':')?;
                match self.peek() {
                    Some('{') => {
                        self.pos += 1;
                        let values = self.tag_values()?;
                        Ok(Predicate::Tag { field, values })
                    }
                    Some('(') => {
                        self.pos += 1;
                        let mut terms = Vec::new();
                        loop {
                            self.skip_ws();
                            if self.peek() == Some(')') {
                                self.pos += 1;
                                break;
                            }
                            terms.extend(tokenize(&self.word()?));
                        }
                        Ok(Predicate::Text { field, terms })
                    }
                    _ => {
                        let terms = tokenize(&self.word()?);
                        Ok(Predicate::Text { field, terms })
                    }
                }
            }
            Some(ch) => Err(QueryParseError::UnexpectedChar { ch, pos }),
            None => Err(QueryParseError::UnexpectedEnd),
        }
    }

    fn field_name(&mut self) -> Result<String, QueryParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(QueryParseError::EmptyValue { pos: start });
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn tag_values(&mut self) -> Result<Vec<String>, QueryParseError> {
        let mut values = Vec::new();
        let mut current = String::new();
        let mut start = self.pos;

        loop {
            let pos = self.pos;
            match self.bump() {
                None => return Err(QueryParseError::UnexpectedEnd),
                Some(ESCAPE_MARKER) => match self.bump() {
                    Some(ch) => current.push(ch),
                    None => return Err(QueryParseError::UnexpectedEnd),
                },
                Some('|') | Some('}') if current.is_empty() => {
                    return Err(QueryParseError::EmptyValue { pos: start });
                }
                Some('|') => {
                    values.push(std::mem::take(&mut current));
                    start = self.pos;
                }
                Some('}') => {
                    values.push(current);
                    return Ok(values);
                }
                Some(ch) if ch.is_ascii_alphanumeric() => current.push(ch),
                Some(ch) => return Err(QueryParseError::UnescapedCharacter { ch, pos }),
            }
        }
    }

    fn word(&mut self) -> Result<String, QueryParseError> {
        let start = self.pos;
        let mut word = String::new();
        loop {
            match self.peek() {
                Some(ESCAPE_MARKER) => {
                    self.pos += 1;
                    match self.bump() {
                        Some(ch) => word.push(ch),
                        None => return Err(QueryParseError::UnexpectedEnd),
                    }
                }
                Some(ch) if ch.is_alphanumeric() => {
                    self.pos += 1;
                    word.push(ch);
                }
                _ => break,
            }
        }
        if word.is_empty() {
            return Err(QueryParseError::EmptyValue { pos: start });
        }
        Ok(word)
    }
}

fn collapse(mut parts: Vec<Predicate>, wrap: fn(Vec<Predicate>) -> Predicate) -> Predicate {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        wrap(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_reserved_characters() {
        assert_eq!(escape_query_value("abc123"), "abc123");
        assert_eq!(escape_query_value("user:1"), r"user\:1");
        assert_eq!(escape_query_value("a-b"), r"a\-b");
        assert_eq!(escape_query_value("me@example.com"), r"me\@example\.com");
        assert_eq!(escape_query_value("a b"), r"a\ b");
        assert_eq!(escape_query_value(r"\"), r"\\");
    }

    #[test]
    fn test_render_parse_roundtrip_for_hostile_ids() {
        let hostile = [
            "user:550e8400-e29b-41d4-a716-446655440000",
            "a}|@ownerId:{b",
            r"back\slash",
            "x y|z",
            "(*)",
            "ünïcode",
        ];
        for id in hostile {
            let predicate = Predicate::tag("ownerId", id);
            let parsed = parse_query(&predicate.render()).unwrap();
            assert_eq!(parsed, predicate, "roundtrip failed for {:?}", id);
        }
    }

    #[test]
    fn test_unescaped_reserved_character_is_rejected() {
        let err = parse_query("@email:{me@example.com}").unwrap_err();
        assert_eq!(err, QueryParseError::UnescapedCharacter { ch: '@', pos: 10 });

        assert!(parse_query("@ownerId:{user:1}").is_err());
    }

    #[test]
    fn test_injection_cannot_widen_query() {
        let crafted = "x} | @ownerId:{victim";
        let predicate = Predicate::tag("ownerId", crafted);
        match parse_query(&predicate.render()).unwrap() {
            Predicate::Tag { values, .. } => assert_eq!(values, vec![crafted.to_string()]),
            other => panic!("expected a single tag predicate, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_union_of_tags() {
        let parsed = parse_query(r"@ownerId:{user\:1} | @sharedUserId:{user\:1}").unwrap();
        assert_eq!(
            parsed,
            Predicate::Or(vec![
                Predicate::tag("ownerId", "user:1"),
                Predicate::tag("sharedUserId", "user:1"),
            ])
        );
    }

    #[test]
    fn test_parse_tag_alternatives_and_intersection() {
        let parsed = parse_query("@priority:{high|critical} @ownerId:{u1}").unwrap();
        assert_eq!(
            parsed,
            Predicate::And(vec![
                Predicate::Tag {
                    field: "priority".to_string(),
                    values: vec!["high".to_string(), "critical".to_string()],
                },
                Predicate::tag("ownerId", "u1"),
            ])
        );
    }

    #[test]
    fn test_parse_text_terms() {
        assert_eq!(
            parse_query("@username:Alice").unwrap(),
            Predicate::text("username", "alice")
        );
        assert_eq!(
            parse_query("@username:(alice smith)").unwrap(),
            Predicate::Text {
                field: "username".to_string(),
                terms: vec!["alice".to_string(), "smith".to_string()],
            }
        );
    }

    #[test]
    fn test_grouped_render() {
        let q = Predicate::tag("a", "1")
            .or(Predicate::tag("b", "2"))
            .and(Predicate::tag("c", "3"));
        let rendered = q.render();
        assert_eq!(rendered, "(@a:{1} | @b:{2}) @c:{3}");
        assert_eq!(parse_query(&rendered).unwrap(), q);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_query(""), Err(QueryParseError::UnexpectedEnd));
        assert!(parse_query("@ownerId:{}").is_err());
        assert!(parse_query("@ownerId:{abc").is_err());
        assert!(parse_query("ownerId:{abc}").is_err());
        assert_eq!(parse_query("*").unwrap(), Predicate::All);
    }
}
