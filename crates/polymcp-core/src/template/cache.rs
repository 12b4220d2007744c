//! Compiled-template and match-result caches.
//!
//! Both caches live behind a [`TemplateEngine`] handle constructed once at
//! program start and passed to the components that need it. A process-wide
//! singleton is kept only as a convenience wrapper around one handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lazy_static::lazy_static;
use tokio::time::Instant;
use tracing::debug;

use super::compile::{CompiledTemplate, TemplateError, TemplateParams};

/// Default capacity of the template-string → compiled-form cache.
pub const DEFAULT_TEMPLATE_CACHE_CAPACITY: usize = 128;
/// Default capacity of the `(uri, template)` → params cache.
pub const DEFAULT_MATCH_CACHE_CAPACITY: usize = 1024;
/// Default time-to-live of a cached match result.
pub const DEFAULT_MATCH_TTL: Duration = Duration::from_secs(60);

/// LRU cache of compiled templates keyed by the exact template string.
struct TemplateCache {
    entries: HashMap<String, (Arc<CompiledTemplate>, u64)>,
    capacity: usize,
    tick: u64,
}

impl TemplateCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            tick: 0,
        }
    }

    fn get(&mut self, template: &str) -> Option<Arc<CompiledTemplate>> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(template).map(|(compiled, used)| {
            *used = tick;
            Arc::clone(compiled)
        })
    }

    fn insert(&mut self, template: String, compiled: Arc<CompiledTemplate>) {
        self.tick += 1;
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&template) {
            // Evict the least-recently-used entry.
            if let Some(victim) = self
                .entries
                .iter()
                .min_by_key(|(_, (_, used))| *used)
                .map(|(key, _)| key.clone())
            {
                debug!(template = %victim, "evicting compiled template");
                self.entries.remove(&victim);
            }
        }
        self.entries.insert(template, (compiled, self.tick));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct MatchEntry {
    params: Option<TemplateParams>,
    expires_at: Instant,
}

/// TTL-expiring cache of extraction results keyed by `(uri, template)`.
struct MatchCache {
    entries: HashMap<(String, String), MatchEntry>,
    capacity: usize,
    ttl: Duration,
}

impl MatchCache {
    fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    fn get(&mut self, uri: &str, template: &str) -> Option<Option<TemplateParams>> {
        let key = (uri.to_string(), template.to_string());
        match self.entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.params.clone()),
            Some(_) => {
                self.entries.remove(&key);
                None
            }
            None => None,
        }
    }

    fn insert(&mut self, uri: String, template: String, params: Option<TemplateParams>) {
        if self.entries.len() >= self.capacity {
            let now = Instant::now();
            self.entries.retain(|_, entry| entry.expires_at > now);
        }
        if self.entries.len() >= self.capacity {
            // Still full: evict the entry closest to expiry.
            if let Some(victim) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(key, _)| key.clone())
            {
                self.entries.remove(&victim);
            }
        }
        self.entries.insert(
            (uri, template),
            MatchEntry {
                params,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Owning handle over the template caches.
///
/// Compilation itself is pure; the handle only guards the shared caches, so
/// it is cheap to clone and share across tasks.
#[derive(Clone)]
pub struct TemplateEngine {
    templates: Arc<Mutex<TemplateCache>>,
    matches: Arc<Mutex<MatchCache>>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new(
            DEFAULT_TEMPLATE_CACHE_CAPACITY,
            DEFAULT_MATCH_CACHE_CAPACITY,
            DEFAULT_MATCH_TTL,
        )
    }
}

impl TemplateEngine {
    pub fn new(template_capacity: usize, match_capacity: usize, match_ttl: Duration) -> Self {
        Self {
            templates: Arc::new(Mutex::new(TemplateCache::new(template_capacity))),
            matches: Arc::new(Mutex::new(MatchCache::new(match_capacity, match_ttl))),
        }
    }

    /// Compile a template, reusing the cached form when available.
    pub fn compile(&self, template: &str) -> Result<Arc<CompiledTemplate>, TemplateError> {
        {
            let mut cache = self.templates.lock().expect("template cache poisoned");
            if let Some(compiled) = cache.get(template) {
                return Ok(compiled);
            }
        }
        let compiled = Arc::new(CompiledTemplate::compile(template)?);
        let mut cache = self.templates.lock().expect("template cache poisoned");
        cache.insert(template.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Match `uri` against `template`, consulting the match cache first.
    /// `Ok(None)` is a definitive no-match (also cached).
    pub fn extract(
        &self,
        uri: &str,
        template: &str,
    ) -> Result<Option<TemplateParams>, TemplateError> {
        {
            let mut cache = self.matches.lock().expect("match cache poisoned");
            if let Some(hit) = cache.get(uri, template) {
                return Ok(hit);
            }
        }
        let compiled = self.compile(template)?;
        let extracted = compiled.extract(uri);
        let mut cache = self.matches.lock().expect("match cache poisoned");
        cache.insert(uri.to_string(), template.to_string(), extracted.clone());
        Ok(extracted)
    }

    /// Expand `template` with `params` into a URI.
    pub fn expand(&self, template: &str, params: &TemplateParams) -> Result<String, TemplateError> {
        self.compile(template)?.expand(params)
    }

    pub fn cached_templates(&self) -> usize {
        self.templates.lock().expect("template cache poisoned").len()
    }

    pub fn cached_matches(&self) -> usize {
        self.matches.lock().expect("match cache poisoned").len()
    }
}

lazy_static! {
    static ref GLOBAL_ENGINE: TemplateEngine = TemplateEngine::default();
}

/// Process-wide convenience engine. Prefer constructing and passing a
/// [`TemplateEngine`] handle; this exists for call sites without one.
pub fn global() -> &'static TemplateEngine {
    &GLOBAL_ENGINE
}
