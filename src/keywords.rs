//! Maps normalized keyword name → callable with parameter conventions
//! (§4.10).

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::OpticsError;

/// Normalizes a keyword name: lowercase, spaces to underscores (§4.7.2
/// step 1).
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// A single positional/keyword argument resolved for one invocation.
#[derive(Debug, Clone)]
pub enum Arg {
    Positional(String),
    Keyword(String, String),
}

/// A keyword implementation. Kept as a trait object so the registry can
/// hold heterogeneous callables behind one map, mirroring the source's
/// "scan an instance's public methods" registration.
#[async_trait]
pub trait KeywordFn: Send + Sync {
    async fn call(&self, args: &[Arg]) -> Result<(), OpticsError>;
}

#[async_trait]
impl<F, Fut> KeywordFn for F
where
    F: Fn(Vec<Arg>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), OpticsError>> + Send,
{
    async fn call(&self, args: &[Arg]) -> Result<(), OpticsError> {
        (self)(args.to_vec()).await
    }
}

/// A keyword metadata record: the callable, its declared parameter names
/// (for the public catalog), and the set of parameter indices that must
/// never be variable-substituted (§4.7.3).
pub struct Keyword {
    pub name: String,
    pub callable: Arc<dyn KeywordFn>,
    pub param_names: Vec<String>,
    pub raw_indices: HashSet<usize>,
}

impl Keyword {
    pub fn new(name: impl Into<String>, callable: Arc<dyn KeywordFn>) -> Self {
        Self {
            name: name.into(),
            callable,
            param_names: Vec::new(),
            raw_indices: HashSet::new(),
        }
    }

    pub fn with_params(mut self, names: Vec<&str>) -> Self {
        self.param_names = names.into_iter().map(str::to_string).collect();
        self
    }

    pub fn with_raw_indices(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.raw_indices = indices.into_iter().collect();
        self
    }

    pub fn is_raw(&self, index: usize) -> bool {
        self.raw_indices.contains(&index)
    }
}

/// Global, read-only-after-start registry of keyword implementations.
/// Registering a name a second time logs a warning and keeps the newest
/// registration (§4.10).
#[derive(Default)]
pub struct KeywordRegistry {
    keywords: std::sync::RwLock<HashMap<String, Arc<Keyword>>>,
}

impl KeywordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, keyword: Keyword) {
        let normalized = normalize(&keyword.name);
        let mut map = self.keywords.write().unwrap();
        if map.contains_key(&normalized) {
            tracing::warn!(keyword = %normalized, "duplicate keyword registration, keeping the newest");
        }
        map.insert(normalized, Arc::new(keyword));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Keyword>> {
        self.keywords.read().unwrap().get(&normalize(name)).cloned()
    }

    /// The public keyword catalog: name plus declared parameter names, for
    /// the `/v1/keywords` surface (§6.2, contract only).
    pub fn catalog(&self) -> Vec<(String, Vec<String>)> {
        self.keywords
            .read()
            .unwrap()
            .values()
            .map(|k| (k.name.clone(), k.param_names.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_replaces_spaces() {
        assert_eq!(normalize("Press Element"), "press_element");
        assert_eq!(normalize("  Sleep  "), "sleep");
    }

    #[tokio::test]
    async fn register_and_lookup_by_normalized_name() {
        let registry = KeywordRegistry::new();
        registry.register(Keyword::new("Press Element", Arc::new(|_args: Vec<Arg>| async { Ok(()) })));

        let found = registry.get("press_element").expect("should find by exact normalized name");
        assert_eq!(found.name, "Press Element");

        let found_display = registry.get("Press Element").expect("should find via normalization at lookup time");
        assert_eq!(found_display.name, "Press Element");

        assert!(registry.get("missing_keyword").is_none());
    }

    #[tokio::test]
    async fn duplicate_registration_keeps_the_last() {
        let registry = KeywordRegistry::new();
        registry.register(Keyword::new("sleep", Arc::new(|_: Vec<Arg>| async { Err(OpticsError::new(crate::error::Code::E0801, "first")) })));
        registry.register(Keyword::new("sleep", Arc::new(|_: Vec<Arg>| async { Ok(()) })));

        let kw = registry.get("sleep").unwrap();
        assert!(kw.callable.call(&[]).await.is_ok());
    }
}
