//! YAML suite reader (§4.11, §6.1): `Test Cases` and `Modules` are ordered
//! lists of single-key mappings (`{name: [steps]}`); `Elements` is a single
//! mapping of name to one value or a list of fallback values.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

use crate::error::{Code, OpticsError};

use super::SuiteReader;

pub struct YamlSuiteReader;

static EMBEDDED_VAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{[^{}]+\}").unwrap());

fn parse_document(contents: &str) -> Result<Value, OpticsError> {
    serde_yaml::from_str(contents).map_err(|e| OpticsError::new(Code::E0501, format!("invalid suite YAML: {e}")))
}

/// Walks an ordered list of single-key mappings, yielding `(name, steps)`
/// pairs in document order. Entries with a blank name or empty step list
/// are skipped, matching the source's `if not name or not steps: continue`.
fn ordered_name_steps(list: &Value) -> Vec<(String, Vec<String>)> {
    let Value::Sequence(items) = list else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for item in items {
        let Value::Mapping(map) = item else { continue };
        for (key, steps) in map {
            let Some(name) = key.as_str() else { continue };
            let name = name.trim();
            let Value::Sequence(step_values) = steps else { continue };
            let steps: Vec<String> = step_values
                .iter()
                .filter_map(|s| s.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if name.is_empty() || steps.is_empty() {
                continue;
            }
            out.push((name.to_string(), steps));
        }
    }
    out
}

/// Splits one module step into `(keyword, params)`. Parameters start at the
/// first `${...}` token in the step; everything before it is the keyword
/// name, everything from there on is whitespace-split into param tokens.
/// A step with no `${...}` token is a bare keyword with no params.
fn parse_module_step(step: &str) -> (String, Vec<String>) {
    let step = step.trim();
    if step.is_empty() {
        return (String::new(), Vec::new());
    }
    let Some(first) = EMBEDDED_VAR_RE.find(step) else {
        return (step.to_string(), Vec::new());
    };
    let keyword = step[..first.start()].trim().to_string();
    let params = step[first.start()..]
        .split_whitespace()
        .map(str::to_string)
        .collect();
    (keyword, params)
}

impl SuiteReader for YamlSuiteReader {
    fn read_test_cases(&self, contents: &str) -> Result<HashMap<String, Vec<String>>, OpticsError> {
        let doc = parse_document(contents)?;
        let Value::Mapping(map) = &doc else {
            return Err(OpticsError::new(Code::E0501, "suite YAML must be a mapping"));
        };
        let Some(list) = map.get(Value::String("Test Cases".to_string())) else {
            return Ok(HashMap::new());
        };
        Ok(ordered_name_steps(list).into_iter().collect())
    }

    fn read_modules(&self, contents: &str) -> Result<HashMap<String, Vec<(String, Vec<String>)>>, OpticsError> {
        let doc = parse_document(contents)?;
        let Value::Mapping(map) = &doc else {
            return Err(OpticsError::new(Code::E0501, "suite YAML must be a mapping"));
        };
        let Some(list) = map.get(Value::String("Modules".to_string())) else {
            return Ok(HashMap::new());
        };
        let mut out = HashMap::new();
        for (name, steps) in ordered_name_steps(list) {
            let parsed: Vec<(String, Vec<String>)> = steps
                .iter()
                .map(|s| parse_module_step(s))
                .filter(|(keyword, _)| !keyword.is_empty())
                .collect();
            out.insert(name, parsed);
        }
        Ok(out)
    }

    /// Accepts either a single scalar or a list under each element name,
    /// normalizing both into a fallback list (§6.1).
    fn read_elements(&self, contents: &str) -> Result<HashMap<String, Vec<String>>, OpticsError> {
        let doc = parse_document(contents)?;
        let Value::Mapping(map) = &doc else {
            return Err(OpticsError::new(Code::E0501, "suite YAML must be a mapping"));
        };
        let Some(Value::Mapping(elements)) = map.get(Value::String("Elements".to_string())) else {
            return Ok(HashMap::new());
        };

        let mut out = HashMap::new();
        for (key, value) in elements {
            let Some(name) = key.as_str() else { continue };
            let name = name.trim();
            let values = scalar_or_list(value);
            if !name.is_empty() && !values.is_empty() {
                out.insert(name.to_string(), values);
            }
        }
        Ok(out)
    }
}

fn scalar_or_list(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(items) => items.iter().filter_map(value_to_string).collect(),
        Value::Null => Vec::new(),
        other => value_to_string(other).into_iter().collect(),
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cases_preserve_order_and_skip_blank_entries() {
        let yaml = r#"
Test Cases:
  - login: ["open_app", "press_login"]
  - logout: ["open_app"]
  - empty: []
"#;
        let out = YamlSuiteReader.read_test_cases(yaml).unwrap();
        assert_eq!(out["login"], vec!["open_app".to_string(), "press_login".to_string()]);
        assert_eq!(out["logout"], vec!["open_app".to_string()]);
        assert!(!out.contains_key("empty"));
    }

    #[test]
    fn modules_split_keyword_from_embedded_params() {
        let yaml = r#"
Modules:
  - open_app:
      - "press_element ${login_btn} extra"
      - "launch_app"
"#;
        let out = YamlSuiteReader.read_modules(yaml).unwrap();
        assert_eq!(
            out["open_app"],
            vec![
                ("press_element".to_string(), vec!["${login_btn}".to_string(), "extra".to_string()]),
                ("launch_app".to_string(), Vec::new()),
            ]
        );
    }

    #[test]
    fn elements_normalize_scalar_and_list_to_fallback_vec() {
        let yaml = r#"
Elements:
  login_btn:
    - "//nonexistent"
    - 100
  submit_btn: 200
"#;
        let out = YamlSuiteReader.read_elements(yaml).unwrap();
        assert_eq!(out["login_btn"], vec!["//nonexistent".to_string(), "100".to_string()]);
        assert_eq!(out["submit_btn"], vec!["200".to_string()]);
    }

    #[test]
    fn missing_top_level_key_yields_empty_map() {
        let out = YamlSuiteReader.read_elements("Test Cases: []\n").unwrap();
        assert!(out.is_empty());
    }
}
