//! Named locators with ordered fallback values, and the module definitions
//! parsed out of a suite file (§4.3).

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Code, OpticsError};

static VARIABLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$\{([^}]+)\}$").unwrap());

/// Returns `Some(name)` if `s` is exactly a `${name}` reference.
pub fn variable_name(s: &str) -> Option<&str> {
    VARIABLE_RE.captures(s).map(|c| c.get(1).unwrap().as_str())
}

/// `name → ordered list of string values`. Insertion order encodes fallback
/// priority; the Scheduler tries them in order when resolving `${name}`.
#[derive(Debug, Default, Clone)]
pub struct ElementStore {
    elements: HashMap<String, Vec<String>>,
}

impl ElementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.elements.entry(name.into()).or_default().push(value.into());
    }

    pub fn remove(&mut self, name: &str) {
        self.elements.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.elements.get(name).map(|v| v.as_slice())
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.elements.get(name).and_then(|v| v.first()).map(|s| s.as_str())
    }

    /// Try resolving each stored value for `name` via `resolver` until one
    /// succeeds. On each failure, `on_error(err, value)` is invoked if
    /// given, and resolution continues to the next value.
    ///
    /// Returns `E0201` if `name` is not a known key, or `X0201` if every
    /// value was tried and none succeeded.
    pub fn resolve_with_fallback<T>(
        &self,
        name: &str,
        mut resolver: impl FnMut(&str) -> Result<T, OpticsError>,
        mut on_error: Option<impl FnMut(&OpticsError, &str)>,
        max_attempts: Option<usize>,
    ) -> Result<T, OpticsError> {
        let values = self
            .get(name)
            .ok_or_else(|| OpticsError::new(Code::E0201, format!("Element not found: {name}")))?;

        let cap = max_attempts.unwrap_or(values.len());
        let mut attempts = 0usize;
        let mut last: Option<OpticsError> = None;

        for v in values.iter() {
            if attempts >= cap {
                break;
            }
            attempts += 1;
            match resolver(v) {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if let Some(cb) = on_error.as_mut() {
                        cb(&e, v);
                    }
                    last = Some(e);
                }
            }
        }

        Err(OpticsError::new(
            Code::X0201,
            format!(
                "Element '{name}' not found after attempting {attempts} value(s); last error: {}",
                last.map(|e| e.message).unwrap_or_else(|| "none".into())
            ),
        ))
    }
}

/// An ordered `(keyword, positional params)` definition for one module, as
/// parsed from a suite file.
pub type ModuleStep = (String, Vec<String>);

/// `module name → ordered list of (keyword, params)` (§3.1).
#[derive(Debug, Default, Clone)]
pub struct ModuleData {
    modules: HashMap<String, Vec<ModuleStep>>,
}

impl ModuleData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module_definition(&mut self, name: impl Into<String>, definition: Vec<ModuleStep>) {
        self.modules.insert(name.into(), definition);
    }

    pub fn remove_module_definition(&mut self, name: &str) {
        self.modules.remove(name);
    }

    pub fn get_module_definition(&self, name: &str) -> Option<&[ModuleStep]> {
        self.modules.get(name).map(|v| v.as_slice())
    }
}

/// `name → file path`, used by image-based strategies (§3.1).
#[derive(Debug, Default, Clone)]
pub struct TemplateData {
    templates: HashMap<String, String>,
}

impl TemplateData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_template(&mut self, name: impl Into<String>, path: impl Into<String>) {
        self.templates.insert(name.into(), path.into());
    }

    pub fn remove_template(&mut self, name: &str) {
        self.templates.remove(name);
    }

    pub fn get_template_path(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_name_matches_exact_form() {
        assert_eq!(variable_name("${login_btn}"), Some("login_btn"));
        assert_eq!(variable_name("not a var"), None);
        assert_eq!(variable_name("prefix${x}suffix"), None);
    }

    #[test]
    fn resolve_with_fallback_returns_first_success() {
        let mut store = ElementStore::new();
        store.add("login_btn", "//nonexistent");
        store.add("login_btn", "100,200");

        let mut tried = vec![];
        let result = store.resolve_with_fallback(
            "login_btn",
            |v| {
                tried.push(v.to_string());
                if v == "100,200" {
                    Ok(v.to_string())
                } else {
                    Err(OpticsError::new(Code::E0201, "not found"))
                }
            },
            None::<fn(&OpticsError, &str)>,
            None,
        );

        assert_eq!(result.unwrap(), "100,200");
        assert_eq!(tried, vec!["//nonexistent".to_string(), "100,200".to_string()]);
    }

    #[test]
    fn resolve_with_fallback_exhausts_to_x0201() {
        let mut store = ElementStore::new();
        store.add("missing", "a");
        store.add("missing", "b");
        store.add("missing", "c");

        let result = store.resolve_with_fallback(
            "missing",
            |_| Err::<(), _>(OpticsError::new(Code::E0201, "not found")),
            None::<fn(&OpticsError, &str)>,
            None,
        );

        let err = result.unwrap_err();
        assert_eq!(err.code, Code::X0201);
        assert!(err.message.contains("3 value"));
    }

    #[test]
    fn resolve_with_fallback_missing_key_is_e0201() {
        let store = ElementStore::new();
        let result = store.resolve_with_fallback(
            "nope",
            |_| Ok::<(), OpticsError>(()),
            None::<fn(&OpticsError, &str)>,
            None,
        );
        assert_eq!(result.unwrap_err().code, Code::E0201);
    }

    #[test]
    fn cap_at_20_via_max_attempts() {
        let mut store = ElementStore::new();
        for i in 0..25 {
            store.add("x", format!("v{i}"));
        }
        let mut count = 0;
        let result = store.resolve_with_fallback(
            "x",
            |_| {
                count += 1;
                Err::<(), _>(OpticsError::new(Code::E0201, "not found"))
            },
            None::<fn(&OpticsError, &str)>,
            Some(20),
        );
        assert!(result.is_err());
        assert_eq!(count, 20);
    }
}
