//! Restricted glob patterns for `pattern:`-typed template placeholders.
//!
//! The language is deliberately tiny: `*` matches any run (possibly empty)
//! of non-`/` characters, every other character matches itself. There are no
//! other metacharacters.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum GlobToken {
    Literal(String),
    Star,
}

/// A compiled restricted glob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Glob {
    source: String,
    tokens: Vec<GlobToken>,
}

impl Glob {
    /// Compile a glob. Fails on an empty pattern or characters that cannot
    /// appear inside a single URI path segment (`/`, `{`, `}`).
    pub fn compile(pattern: &str) -> Result<Self, String> {
        if pattern.is_empty() {
            return Err("glob pattern cannot be empty".to_string());
        }
        let mut tokens = Vec::new();
        let mut literal = String::new();
        for ch in pattern.chars() {
            match ch {
                '*' => {
                    if !literal.is_empty() {
                        tokens.push(GlobToken::Literal(std::mem::take(&mut literal)));
                    }
                    // Consecutive stars collapse to one.
                    if tokens.last() != Some(&GlobToken::Star) {
                        tokens.push(GlobToken::Star);
                    }
                }
                '/' | '{' | '}' => {
                    return Err(format!("glob pattern contains invalid character '{ch}'"));
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            tokens.push(GlobToken::Literal(literal));
        }
        Ok(Self {
            source: pattern.to_string(),
            tokens,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the whole of `input` matches the pattern.
    pub fn matches(&self, input: &str) -> bool {
        if input.contains('/') {
            return false;
        }
        Self::match_tokens(&self.tokens, input)
    }

    fn match_tokens(tokens: &[GlobToken], input: &str) -> bool {
        match tokens.split_first() {
            None => input.is_empty(),
            Some((GlobToken::Literal(lit), rest)) => input
                .strip_prefix(lit.as_str())
                .is_some_and(|tail| Self::match_tokens(rest, tail)),
            Some((GlobToken::Star, rest)) => {
                // Try every split point, shortest first; star never crosses '/'
                // (already excluded above).
                for split in 0..=input.len() {
                    if !input.is_char_boundary(split) {
                        continue;
                    }
                    if Self::match_tokens(rest, &input[split..]) {
                        return true;
                    }
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_only() {
        let glob = Glob::compile("theme").expect("compile");
        assert!(glob.matches("theme"));
        assert!(!glob.matches("themes"));
        assert!(!glob.matches("them"));
    }

    #[test]
    fn test_star_prefix_suffix() {
        let glob = Glob::compile("theme*").expect("compile");
        assert!(glob.matches("theme"));
        assert!(glob.matches("theme-dark"));
        assert!(!glob.matches("dark-theme-x")); // prefix must match

        let glob = Glob::compile("*rc").expect("compile");
        assert!(glob.matches("vimrc"));
        assert!(glob.matches("rc"));
        assert!(!glob.matches("rcfile"));
    }

    #[test]
    fn test_star_never_crosses_slash() {
        let glob = Glob::compile("a*b").expect("compile");
        assert!(glob.matches("aXXb"));
        assert!(!glob.matches("a/b"));
    }

    #[test]
    fn test_inner_star() {
        let glob = Glob::compile("v*-rel").expect("compile");
        assert!(glob.matches("v1.2-rel"));
        assert!(glob.matches("v-rel"));
        assert!(!glob.matches("v1.2-dev"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(Glob::compile("").is_err());
        assert!(Glob::compile("a/b").is_err());
        assert!(Glob::compile("a{b").is_err());
    }

    #[test]
    fn test_consecutive_stars_collapse() {
        let glob = Glob::compile("a**b").expect("compile");
        assert!(glob.matches("ab"));
        assert!(glob.matches("aXb"));
    }
}
