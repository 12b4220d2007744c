//! URI template compilation, expansion and extraction.
//!
//! A template is a sequence of literal runs and placeholders of the form
//! `{name[:type][flag]}` where type is one of `int`, `float`, `bool`,
//! `pattern:GLOB` (absent means string) and the flag suffix is `?`
//! (optional) or `=default` (default value, implies optional). Optional
//! placeholders must form the tail of the template.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::glob::Glob;

lazy_static! {
    static ref NAME_PATTERN: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*$").unwrap();
}

/// Errors raised while compiling or expanding a template. All of them map
/// to the invalid-params wire code.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TemplateError {
    #[error("unbalanced braces in template")]
    UnbalancedBraces,

    #[error("placeholder name cannot be empty")]
    EmptyName,

    #[error("invalid placeholder name '{0}'")]
    InvalidName(String),

    #[error("duplicate placeholder name '{0}'")]
    DuplicateName(String),

    #[error("unknown placeholder type '{0}'")]
    UnknownType(String),

    #[error("malformed glob pattern: {0}")]
    MalformedGlob(String),

    #[error("optional placeholder '{0}' must be at the tail of the template")]
    NonTailOptional(String),

    #[error("missing parameter '{0}'")]
    MissingParam(String),

    #[error("parameter '{name}' is not compatible with type {expected}")]
    IncompatibleValue { name: String, expected: String },
}

impl From<TemplateError> for crate::error::PolyMcpError {
    fn from(err: TemplateError) -> Self {
        crate::error::PolyMcpError::invalid_params(err.to_string())
    }
}

/// Declared type of a placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaceholderKind {
    Str,
    Int,
    Float,
    Bool,
    Pattern(Glob),
}

impl PlaceholderKind {
    fn display_name(&self) -> &'static str {
        match self {
            PlaceholderKind::Str => "string",
            PlaceholderKind::Int => "int",
            PlaceholderKind::Float => "float",
            PlaceholderKind::Bool => "bool",
            PlaceholderKind::Pattern(_) => "pattern",
        }
    }
}

/// A single `{...}` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placeholder {
    pub name: String,
    pub kind: PlaceholderKind,
    pub optional: bool,
    pub default: Option<String>,
}

/// One segment of a compiled template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// A typed value captured from (or fed into) a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl TemplateValue {
    /// Render the value the way expansion writes it into a URI.
    pub fn render(&self) -> String {
        match self {
            TemplateValue::Str(s) => s.clone(),
            TemplateValue::Int(n) => n.to_string(),
            TemplateValue::Float(f) => f.to_string(),
            TemplateValue::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        }
    }

    pub fn as_json(&self) -> Value {
        match self {
            TemplateValue::Str(s) => Value::String(s.clone()),
            TemplateValue::Int(n) => Value::from(*n),
            TemplateValue::Float(f) => Value::from(*f),
            TemplateValue::Bool(b) => Value::Bool(*b),
        }
    }
}

/// Ordered name → value set produced by extraction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateParams {
    entries: Vec<(String, TemplateValue)>,
}

impl TemplateParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: TemplateValue) {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&TemplateValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, TemplateValue)> {
        self.entries.iter()
    }

    /// JSON object view, insertion-ordered by serde_json's map.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (name, value) in &self.entries {
            map.insert(name.clone(), value.as_json());
        }
        Value::Object(map)
    }
}

impl FromIterator<(String, TemplateValue)> for TemplateParams {
    fn from_iter<T: IntoIterator<Item = (String, TemplateValue)>>(iter: T) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

/// A compiled URI template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl CompiledTemplate {
    /// Compile a template string into its segment list.
    pub fn compile(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut names: Vec<String> = Vec::new();
        let mut chars = template.char_indices();

        while let Some((_, ch)) = chars.next() {
            match ch {
                '{' => {
                    let mut body = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        match inner {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(TemplateError::UnbalancedBraces),
                            other => body.push(other),
                        }
                    }
                    if !closed {
                        return Err(TemplateError::UnbalancedBraces);
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    let placeholder = parse_placeholder(&body)?;
                    if names.contains(&placeholder.name) {
                        return Err(TemplateError::DuplicateName(placeholder.name));
                    }
                    names.push(placeholder.name.clone());
                    segments.push(Segment::Placeholder(placeholder));
                }
                '}' => return Err(TemplateError::UnbalancedBraces),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        // Optional placeholders must be the tail: once one appears, every
        // later segment must be an optional placeholder too.
        let mut saw_optional: Option<&str> = None;
        for segment in &segments {
            match segment {
                Segment::Placeholder(p) if p.optional => saw_optional = Some(p.name.as_str()),
                _ => {
                    if let Some(name) = saw_optional {
                        return Err(TemplateError::NonTailOptional(name.to_string()));
                    }
                }
            }
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(p) => Some(p),
            Segment::Literal(_) => None,
        })
    }

    /// Expand the template into a URI using the given parameters.
    pub fn expand(&self, params: &TemplateParams) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => out.push_str(lit),
                Segment::Placeholder(ph) => match params.get(&ph.name) {
                    Some(value) => out.push_str(&render_typed(ph, value)?),
                    None => {
                        if let Some(default) = &ph.default {
                            out.push_str(default);
                        } else if !ph.optional {
                            return Err(TemplateError::MissingParam(ph.name.clone()));
                        }
                    }
                },
            }
        }
        Ok(out)
    }

    /// Match a URI against the template, extracting typed parameters.
    /// Returns `None` when the URI does not fit.
    pub fn extract(&self, uri: &str) -> Option<TemplateParams> {
        let mut params = TemplateParams::new();
        let mut pos = 0usize;

        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(lit) => {
                    if uri[pos..].starts_with(lit.as_str()) {
                        pos += lit.len();
                    } else {
                        return None;
                    }
                }
                Segment::Placeholder(ph) => {
                    let end = match self.terminator_for(index) {
                        Terminator::Char(c) => uri[pos..]
                            .find(c)
                            .map(|offset| pos + offset)
                            .unwrap_or(uri.len()),
                        Terminator::End => uri.len(),
                    };
                    let captured = &uri[pos..end];
                    if captured.is_empty() {
                        if !ph.optional {
                            return None;
                        }
                        if let Some(default) = &ph.default {
                            params.insert(ph.name.clone(), typed_default(ph, default)?);
                        }
                    } else {
                        params.insert(ph.name.clone(), capture_typed(ph, captured)?);
                    }
                    pos = end;
                }
            }
        }

        if pos == uri.len() {
            Some(params)
        } else {
            None
        }
    }

    /// What ends the capture for the placeholder at `index`: the first
    /// character of the next literal, a path-segment boundary when another
    /// placeholder follows directly, or the end of the URI.
    fn terminator_for(&self, index: usize) -> Terminator {
        match self.segments.get(index + 1) {
            Some(Segment::Literal(lit)) => lit
                .chars()
                .next()
                .map(Terminator::Char)
                .unwrap_or(Terminator::End),
            Some(Segment::Placeholder(_)) => Terminator::Char('/'),
            None => Terminator::End,
        }
    }
}

enum Terminator {
    Char(char),
    End,
}

fn parse_placeholder(body: &str) -> Result<Placeholder, TemplateError> {
    let (name_part, type_part) = match body.find(':') {
        Some(colon) => (&body[..colon], Some(&body[colon + 1..])),
        None => (body, None),
    };

    let (name, mut optional, mut default) = match type_part {
        // No type part: the flag suffix hangs off the name itself.
        None => {
            let (name, optional, default) = split_flag(name_part);
            (name, optional, default)
        }
        Some(_) => (name_part, false, None),
    };

    if name.is_empty() {
        return Err(TemplateError::EmptyName);
    }
    if !NAME_PATTERN.is_match(name) {
        return Err(TemplateError::InvalidName(name.to_string()));
    }

    let kind = match type_part {
        None => PlaceholderKind::Str,
        Some(spec) => {
            if let Some(glob_part) = spec.strip_prefix("pattern:") {
                let (glob_src, opt, dflt) = split_flag(glob_part);
                optional = opt;
                default = dflt;
                let glob = Glob::compile(glob_src)
                    .map_err(TemplateError::MalformedGlob)?;
                PlaceholderKind::Pattern(glob)
            } else {
                let (type_name, opt, dflt) = split_flag(spec);
                optional = opt;
                default = dflt;
                match type_name {
                    "int" => PlaceholderKind::Int,
                    "float" => PlaceholderKind::Float,
                    "bool" => PlaceholderKind::Bool,
                    other => return Err(TemplateError::UnknownType(other.to_string())),
                }
            }
        }
    };

    // A default value implies optional for matching purposes.
    if default.is_some() {
        optional = true;
    }

    Ok(Placeholder {
        name: name.to_string(),
        kind,
        optional,
        default,
    })
}

/// Split a trailing `?` or `=default` flag off a placeholder fragment.
fn split_flag(fragment: &str) -> (&str, bool, Option<String>) {
    if let Some(eq) = fragment.find('=') {
        let (head, tail) = fragment.split_at(eq);
        (head, true, Some(tail[1..].to_string()))
    } else if let Some(head) = fragment.strip_suffix('?') {
        (head, true, None)
    } else {
        (fragment, false, None)
    }
}

fn render_typed(ph: &Placeholder, value: &TemplateValue) -> Result<String, TemplateError> {
    let incompatible = || TemplateError::IncompatibleValue {
        name: ph.name.clone(),
        expected: ph.kind.display_name().to_string(),
    };
    match (&ph.kind, value) {
        (PlaceholderKind::Int, TemplateValue::Int(_)) => Ok(value.render()),
        (PlaceholderKind::Int, _) => Err(incompatible()),
        (PlaceholderKind::Float, TemplateValue::Float(_) | TemplateValue::Int(_)) => {
            Ok(value.render())
        }
        (PlaceholderKind::Float, _) => Err(incompatible()),
        (PlaceholderKind::Bool, TemplateValue::Bool(_)) => Ok(value.render()),
        (PlaceholderKind::Bool, _) => Err(incompatible()),
        (PlaceholderKind::Str, _) => Ok(value.render()),
        (PlaceholderKind::Pattern(glob), _) => {
            let rendered = value.render();
            if glob.matches(&rendered) {
                Ok(rendered)
            } else {
                Err(incompatible())
            }
        }
    }
}

fn capture_typed(ph: &Placeholder, captured: &str) -> Option<TemplateValue> {
    match &ph.kind {
        PlaceholderKind::Str => Some(TemplateValue::Str(captured.to_string())),
        PlaceholderKind::Int => parse_int(captured).map(TemplateValue::Int),
        PlaceholderKind::Float => {
            let parsed: f64 = captured.parse().ok()?;
            if parsed.is_finite() && looks_numeric(captured) {
                Some(TemplateValue::Float(parsed))
            } else {
                None
            }
        }
        PlaceholderKind::Bool => match captured {
            "true" => Some(TemplateValue::Bool(true)),
            "false" => Some(TemplateValue::Bool(false)),
            _ => None,
        },
        PlaceholderKind::Pattern(glob) => {
            if glob.matches(captured) {
                Some(TemplateValue::Str(captured.to_string()))
            } else {
                None
            }
        }
    }
}

/// Interpret a literal default through the placeholder's type. Defaults are
/// author-supplied and are not re-validated against pattern globs.
fn typed_default(ph: &Placeholder, default: &str) -> Option<TemplateValue> {
    match &ph.kind {
        PlaceholderKind::Str | PlaceholderKind::Pattern(_) => {
            Some(TemplateValue::Str(default.to_string()))
        }
        _ => capture_typed(ph, default),
    }
}

/// Entire span must be ASCII digits with an optional leading '-'.
fn parse_int(span: &str) -> Option<i64> {
    let digits = span.strip_prefix('-').unwrap_or(span);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    span.parse().ok()
}

/// Guard against the exotic spellings `f64::from_str` accepts ("inf",
/// "NaN", leading '+$' is fine) that a URI span should not.
fn looks_numeric(span: &str) -> bool {
    span.bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(template: &str) -> CompiledTemplate {
        CompiledTemplate::compile(template).expect("compile")
    }

    #[test]
    fn test_compile_rejects_malformed_templates() {
        assert_eq!(
            CompiledTemplate::compile("a://{user"),
            Err(TemplateError::UnbalancedBraces)
        );
        assert_eq!(
            CompiledTemplate::compile("a://user}"),
            Err(TemplateError::UnbalancedBraces)
        );
        assert_eq!(
            CompiledTemplate::compile("a://{}"),
            Err(TemplateError::EmptyName)
        );
        assert_eq!(
            CompiledTemplate::compile("a://{x}/{x}"),
            Err(TemplateError::DuplicateName("x".to_string()))
        );
        assert_eq!(
            CompiledTemplate::compile("a://{x:datetime}"),
            Err(TemplateError::UnknownType("datetime".to_string()))
        );
        assert!(matches!(
            CompiledTemplate::compile("a://{x:pattern:}"),
            Err(TemplateError::MalformedGlob(_))
        ));
        assert_eq!(
            CompiledTemplate::compile("a://{x?}/{y}"),
            Err(TemplateError::NonTailOptional("x".to_string()))
        );
        assert!(matches!(
            CompiledTemplate::compile("a://{9lives}"),
            Err(TemplateError::InvalidName(_))
        ));
    }

    #[test]
    fn test_extract_simple() {
        let template = compile("example://{user}/posts/{post_id:int}");
        let params = template
            .extract("example://john/posts/42")
            .expect("should match");
        assert_eq!(
            params.get("user"),
            Some(&TemplateValue::Str("john".to_string()))
        );
        assert_eq!(params.get("post_id"), Some(&TemplateValue::Int(42)));

        assert!(template.extract("example://john/posts/abc").is_none());
        assert!(template.extract("example://john/comments/42").is_none());
    }

    #[test]
    fn test_int_validation_edges() {
        let template = compile("n://{x:int}");
        assert!(template.extract("n://12a").is_none());
        assert_eq!(
            template.extract("n://-0").expect("match").get("x"),
            Some(&TemplateValue::Int(0))
        );
        assert_eq!(
            template.extract("n://-17").expect("match").get("x"),
            Some(&TemplateValue::Int(-17))
        );
        assert!(template.extract("n://-").is_none());
    }

    #[test]
    fn test_float_and_bool_validation() {
        let template = compile("m://{f:float}/{b:bool}");
        let params = template.extract("m://-2.5e2/true").expect("match");
        assert_eq!(params.get("f"), Some(&TemplateValue::Float(-250.0)));
        assert_eq!(params.get("b"), Some(&TemplateValue::Bool(true)));

        assert!(template.extract("m://inf/true").is_none());
        assert!(template.extract("m://1.0/yes").is_none());
    }

    #[test]
    fn test_pattern_placeholder_with_default() {
        let template =
            compile("scheme://{user}/settings/{setting:pattern:theme*=light}");
        let params = template
            .extract("scheme://amy/settings/theme-dark")
            .expect("match");
        assert_eq!(
            params.get("setting"),
            Some(&TemplateValue::Str("theme-dark".to_string()))
        );

        // Omitted tail: the default is applied.
        let params = template.extract("scheme://amy/settings/").expect("match");
        assert_eq!(
            params.get("setting"),
            Some(&TemplateValue::Str("light".to_string()))
        );

        // A non-matching span is rejected by the glob.
        assert!(template.extract("scheme://amy/settings/color-red").is_none());
    }

    #[test]
    fn test_optional_tail_placeholder() {
        let template = compile("s://{user}/files/{name?}");
        let params = template.extract("s://bob/files/").expect("match");
        assert!(params.get("name").is_none());

        let params = template.extract("s://bob/files/a.txt").expect("match");
        assert_eq!(
            params.get("name"),
            Some(&TemplateValue::Str("a.txt".to_string()))
        );

        // Empty capture for a required placeholder never matches.
        let required = compile("s://{user}/files/{name}");
        assert!(required.extract("s://bob/files/").is_none());
    }

    #[test]
    fn test_expand_round_trip() {
        let template = compile("example://{user}/posts/{post_id:int}");
        let uri = "example://john/posts/42";
        let params = template.extract(uri).expect("match");
        assert_eq!(template.expand(&params).expect("expand"), uri);
    }

    #[test]
    fn test_expand_with_defaults_and_missing() {
        let template = compile("s://{user}/settings/{setting:pattern:theme*=light}");
        let mut params = TemplateParams::new();
        params.insert("user", TemplateValue::Str("amy".to_string()));
        assert_eq!(
            template.expand(&params).expect("expand"),
            "s://amy/settings/light"
        );

        let required = compile("s://{user}");
        assert_eq!(
            required.expand(&TemplateParams::new()),
            Err(TemplateError::MissingParam("user".to_string()))
        );
    }

    #[test]
    fn test_expand_type_checks_values() {
        let template = compile("n://{x:int}");
        let mut params = TemplateParams::new();
        params.insert("x", TemplateValue::Str("not-a-number".to_string()));
        assert!(matches!(
            template.expand(&params),
            Err(TemplateError::IncompatibleValue { .. })
        ));

        let mut params = TemplateParams::new();
        params.insert("x", TemplateValue::Int(-7));
        assert_eq!(template.expand(&params).expect("expand"), "n://-7");
    }

    #[test]
    fn test_adjacent_placeholders_split_on_slash() {
        let template = compile("p://{a}{b:int}");
        // `a` captures up to the next '/', so adjacent placeholders only
        // match when the first spans the whole remaining path segment.
        assert!(template.extract("p://x7/").is_none());
        let params = template.extract("p://x/7");
        // `a` = "x", then literal-free boundary: b captures "7"? The '/'
        // byte is consumed by no literal, so this cannot match.
        assert!(params.is_none());
    }

    #[test]
    fn test_params_order_preserved() {
        let template = compile("o://{first}/{second}/{third}");
        let params = template.extract("o://1/2/3").expect("match");
        let names: Vec<&str> = params.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }
}
