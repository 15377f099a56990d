//! Extraction of JSON blobs embedded inside HTML / script documents.
//!
//! Each historical embedding convention is a [`Strategy`]; a document is
//! probed with an ordered list of strategies and the first one that yields
//! valid JSON wins.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::common::errors::{ResolveError, Result};

pub const WATCH_SOURCE: &str = "watch.html";

pub enum Boundary {
    Literal(&'static str),
    Pattern(Regex),
}

impl Boundary {
    /// Byte offset right after the first match of this boundary.
    fn end_of_match(&self, haystack: &str) -> Option<usize> {
        match self {
            Self::Literal(s) => haystack.find(s).map(|pos| pos + s.len()),
            Self::Pattern(re) => re.find(haystack).map(|m| m.end()),
        }
    }
}

/// One embedding convention: `left ... right`, optionally re-wrapped and
/// cut at the closing bracket matching the first opening one.
pub struct Strategy {
    pub left: Boundary,
    pub right: &'static str,
    pub prepend: &'static str,
    pub append: &'static str,
    pub cut_js: bool,
}

impl Strategy {
    const fn literal(left: &'static str, right: &'static str, append: &'static str) -> Self {
        Self {
            left: Boundary::Literal(left),
            right,
            prepend: "",
            append,
            cut_js: false,
        }
    }

    fn pattern(left: &str, right: &'static str) -> Self {
        Self {
            left: Boundary::Pattern(Regex::new(left).expect("static extraction pattern")),
            right,
            prepend: "{",
            append: "",
            cut_js: true,
        }
    }

    pub fn extract(&self, source_name: &str, field: &str, document: &str) -> Result<Value> {
        let raw = between(document, &self.left, self.right)
            .ok_or_else(|| ResolveError::not_found(source_name, field))?;
        let wrapped = format!("{}{}{}", self.prepend, raw, self.append);

        let json = if self.cut_js {
            cut_after_js(&wrapped).map_err(|e| ResolveError::parse(source_name, field, e))?
        } else {
            wrapped.as_str()
        };

        parse_json(source_name, field, json)
    }
}

/// Tries every strategy in order, returning the first success or the last failure.
pub fn first_success(
    strategies: &[Strategy],
    source_name: &str,
    field: &str,
    document: &str,
) -> Result<Value> {
    let mut last_err = ResolveError::not_found(source_name, field);
    for strategy in strategies {
        match strategy.extract(source_name, field, document) {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::trace!(source_name, field, "extraction strategy failed: {}", e);
                last_err = e;
            }
        }
    }
    Err(last_err)
}

static PLAYER_RESPONSE: LazyLock<Vec<Strategy>> = LazyLock::new(|| {
    vec![
        Strategy::literal("var ytInitialPlayerResponse = ", "}};", "}}"),
        Strategy::literal("var ytInitialPlayerResponse = ", ";var", ""),
        Strategy::literal("var ytInitialPlayerResponse = ", ";</script>", ""),
        Strategy::pattern(r"(?i)\bytInitialPlayerResponse\s*=\s*\{", "</script>"),
    ]
});

static LEGACY_CONFIG: LazyLock<Vec<Strategy>> =
    LazyLock::new(|| vec![Strategy::pattern(r"\bytplayer\.config\s*=\s*\{", "</script>")]);

static INITIAL_DATA: LazyLock<Vec<Strategy>> = LazyLock::new(|| {
    vec![
        Strategy::literal("var ytInitialData = ", "}};", "}}"),
        Strategy::literal("var ytInitialData = ", ";</script>", ""),
        Strategy::literal("window[\"ytInitialData\"] = ", "}};", "}}"),
        Strategy::literal("window[\"ytInitialData\"] = ", ";</script>", ""),
        Strategy::pattern(r#"(?i)\bytInitialData("\])?\s*=\s*\{"#, "</script>"),
    ]
});

/// Player response of a watch page, falling back to the legacy `ytplayer.config`.
pub fn extract_player_response(source_name: &str, document: &str) -> Result<Value> {
    match first_success(&PLAYER_RESPONSE, source_name, "player_response", document) {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::debug!("player response conventions exhausted ({}), trying legacy config", e);
            let config = first_success(&LEGACY_CONFIG, source_name, "player_response", document)?;
            player_response_from_config(source_name, &config)
        }
    }
}

pub fn extract_initial_data(source_name: &str, document: &str) -> Result<Value> {
    first_success(&INITIAL_DATA, source_name, "response", document)
}

fn player_response_from_config(source_name: &str, config: &Value) -> Result<Value> {
    let candidate = config
        .get("args")
        .and_then(|a| a.get("player_response"))
        .or_else(|| config.get("player_response"))
        .or_else(|| config.get("playerResponse"))
        .or_else(|| config.get("embedded_player_response"))
        .ok_or_else(|| ResolveError::not_found(source_name, "player_response"))?;

    match candidate {
        Value::String(s) => parse_json(source_name, "player_response", s),
        Value::Object(_) => Ok(candidate.clone()),
        _ => Err(ResolveError::not_found(source_name, "player_response")),
    }
}

/// Parses JSON after stripping anti-hijacking prefixes such as `)]}'`.
pub fn parse_json(source_name: &str, field: &str, json: &str) -> Result<Value> {
    let trimmed =
        json.trim_start_matches(|c: char| matches!(c, ')' | ']' | '}' | '\'') || c.is_whitespace());
    serde_json::from_str(trimmed).map_err(|e| ResolveError::parse(source_name, field, e))
}

/// Text between the first match of `left` and the next occurrence of `right`.
pub fn between<'a>(haystack: &'a str, left: &Boundary, right: &str) -> Option<&'a str> {
    let start = left.end_of_match(haystack)?;
    let rest = &haystack[start..];
    let end = rest.find(right)?;
    Some(&rest[..end])
}

/// Cuts `mixed` right after the bracket closing its leading `{` or `[`,
/// skipping over string, template and regex literals.
pub fn cut_after_js(mixed: &str) -> std::result::Result<&str, String> {
    let (open, close) = match mixed.chars().next() {
        Some('[') => ('[', ']'),
        Some('{') => ('{', '}'),
        other => {
            return Err(format!(
                "can't cut unsupported JSON (need to begin with [ or {{) but got: {:?}",
                other
            ));
        }
    };

    let mut literal_end: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0usize;

    for (i, c) in mixed.char_indices() {
        if !escaped {
            if let Some(end) = literal_end {
                if c == end {
                    literal_end = None;
                    continue;
                }
            } else if matches!(c, '"' | '\'' | '`') || (c == '/' && regex_may_start(&mixed[..i])) {
                literal_end = Some(c);
                continue;
            }
        }

        escaped = c == '\\' && !escaped;
        if literal_end.is_some() {
            continue;
        }

        if c == open {
            depth += 1;
        } else if c == close {
            depth = depth.saturating_sub(1);
        }

        if depth == 0 {
            return Ok(&mixed[..i + c.len_utf8()]);
        }
    }

    Err("can't cut unsupported JSON (no matching closing bracket found)".to_string())
}

/// A `/` opens a regex literal only after an operator-like character.
fn regex_may_start(before: &str) -> bool {
    let mut rev = before.chars().rev();
    let mut last = rev.next();
    if last.is_some_and(char::is_whitespace) {
        last = rev.next();
    }
    match last {
        None => true,
        Some(c) => matches!(c, '[' | '{' | ':' | ';' | ',' | '/'),
    }
}
