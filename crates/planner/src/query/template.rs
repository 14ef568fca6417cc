//! Paginated query templates.
//!
//! A template names its two substitution points explicitly: `{limit}` is
//! bound once per session and `{offset}` is rendered per page. Literal
//! braces are written `{{` and `}}`.

use crate::query::error::TemplateError;
use std::fmt::Write;

const OFFSET: &str = "offset";
const LIMIT: &str = "limit";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Offset,
    Limit,
}

/// A parsed SQL template with exactly one `{offset}` and one `{limit}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    segments: Vec<Segment>,
}

impl QueryTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut offsets = 0;
        let mut limits = 0;
        let mut chars = source.char_indices().peekable();

        while let Some((pos, ch)) = chars.next() {
            match ch {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    text.push('{');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(TemplateError::Unclosed(pos));
                    }

                    let segment = match name.as_str() {
                        OFFSET => {
                            offsets += 1;
                            Segment::Offset
                        }
                        LIMIT => {
                            limits += 1;
                            Segment::Limit
                        }
                        _ => return Err(TemplateError::UnknownPlaceholder(name)),
                    };

                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(segment);
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    text.push('}');
                }
                '}' => return Err(TemplateError::UnmatchedBrace(pos)),
                _ => text.push(ch),
            }
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        check_count(OFFSET, offsets)?;
        check_count(LIMIT, limits)?;

        Ok(QueryTemplate { segments })
    }

    /// Embeds the page size as a literal limit. Done once per session.
    pub fn bind_limit(&self, limit: usize) -> BoundQuery {
        let mut segments: Vec<BoundSegment> = Vec::with_capacity(self.segments.len());
        let limit = limit.to_string();

        for segment in &self.segments {
            let literal = match segment {
                Segment::Text(text) => text.as_str(),
                Segment::Limit => limit.as_str(),
                Segment::Offset => {
                    segments.push(BoundSegment::Offset);
                    continue;
                }
            };

            match segments.last_mut() {
                Some(BoundSegment::Text(prev)) => prev.push_str(literal),
                _ => segments.push(BoundSegment::Text(literal.to_string())),
            }
        }

        BoundQuery { segments }
    }
}

fn check_count(name: &'static str, count: usize) -> Result<(), TemplateError> {
    match count {
        0 => Err(TemplateError::MissingPlaceholder(name)),
        1 => Ok(()),
        _ => Err(TemplateError::DuplicatePlaceholder(name)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BoundSegment {
    Text(String),
    Offset,
}

/// A template whose limit is fixed for the session; only the offset varies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundQuery {
    segments: Vec<BoundSegment>,
}

impl BoundQuery {
    /// SQL for the page window starting at `offset`.
    pub fn render(&self, offset: usize) -> String {
        let mut sql = String::new();
        for segment in &self.segments {
            match segment {
                BoundSegment::Text(text) => sql.push_str(text),
                BoundSegment::Offset => {
                    let _ = write!(sql, "{offset}");
                }
            }
        }
        sql
    }

    /// Session text with the offset still symbolic and literal braces
    /// re-escaped. Two sessions share this text exactly when they would
    /// render identical SQL for every offset.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                BoundSegment::Text(text) => out.push_str(&escape_braces(text)),
                BoundSegment::Offset => out.push_str("{offset}"),
            }
        }
        out
    }
}

/// Escapes literal braces so the text can be embedded in a template.
pub fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

/// Row count query used to size a partitioned run.
pub fn count_query(base_query: &str) -> String {
    format!(
        "SELECT COUNT(*) AS row_count FROM ({}) AS counted",
        base_query.trim().trim_end_matches(';')
    )
}
