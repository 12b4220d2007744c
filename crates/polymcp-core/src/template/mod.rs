//! URI template engine: compilation, expansion, matching, caching.

pub mod cache;
pub mod compile;
pub mod glob;

pub use cache::{
    global, TemplateEngine, DEFAULT_MATCH_CACHE_CAPACITY, DEFAULT_MATCH_TTL,
    DEFAULT_TEMPLATE_CACHE_CAPACITY,
};
pub use compile::{
    CompiledTemplate, Placeholder, PlaceholderKind, Segment, TemplateError, TemplateParams,
    TemplateValue,
};
pub use glob::Glob;
