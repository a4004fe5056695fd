//! Parses suite files (CSV or YAML) into the tree + element/module data the
//! rest of the crate runs against (§4.11, §6.1). Format is identified by
//! content shape, never by file extension.

pub mod csv;
pub mod yaml;

use std::collections::HashMap;

use crate::elements::{ElementStore, ModuleData, ModuleStep, TemplateData};
use crate::error::{Code, OpticsError};
use crate::tree::{KeywordNode, ModuleNode, TestCaseNode, TestSuite};

use self::csv::CsvSuiteReader;
use self::yaml::YamlSuiteReader;

/// The parsed, in-memory form of one suite (test cases, module
/// definitions, elements, templates), before it becomes a `Session`'s
/// `TestSuiteHandle`.
#[derive(Debug, Default, Clone)]
pub struct ParsedSuite {
    pub test_cases: TestSuite,
    pub modules: ModuleData,
    pub elements: ElementStore,
    pub templates: TemplateData,
}

/// Decodes a suite cell's escape convention: `\n`, `\t`, `\r`, `\\` become
/// the corresponding real characters (§6.1, §8 round-trip law).
pub fn decode_cell(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('n') => {
                    out.push('\n');
                    chars.next();
                }
                Some('t') => {
                    out.push('\t');
                    chars.next();
                }
                Some('r') => {
                    out.push('\r');
                    chars.next();
                }
                Some('\\') => {
                    out.push('\\');
                    chars.next();
                }
                _ => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// The inverse of `decode_cell`: real control characters and backslashes
/// are escaped back to their two-character form.
pub fn encode_cell(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out
}

/// A data source for one suite component (test cases, modules, or
/// elements), implemented by the CSV and YAML readers.
pub trait SuiteReader {
    fn read_test_cases(&self, contents: &str) -> Result<std::collections::HashMap<String, Vec<String>>, OpticsError>;
    fn read_modules(
        &self,
        contents: &str,
    ) -> Result<std::collections::HashMap<String, Vec<(String, Vec<String>)>>, OpticsError>;
    fn read_elements(&self, contents: &str) -> Result<std::collections::HashMap<String, Vec<String>>, OpticsError>;
}

/// The detected shape of a suite file, by header/key content rather than
/// extension (§6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteFileKind {
    TestCases,
    Modules,
    Elements,
    Config,
}

/// Detects a CSV file's role from its header row.
pub fn detect_csv_kind(header: &str) -> Result<SuiteFileKind, OpticsError> {
    let cols: Vec<&str> = header.split(',').map(|c| c.trim()).collect();
    if cols.contains(&"test_case") && cols.contains(&"test_step") {
        Ok(SuiteFileKind::TestCases)
    } else if cols.contains(&"module_name") && cols.contains(&"module_step") {
        Ok(SuiteFileKind::Modules)
    } else if cols.contains(&"Element_Name") && cols.iter().any(|c| c.starts_with("Element_ID")) {
        Ok(SuiteFileKind::Elements)
    } else {
        Err(OpticsError::new(Code::E0501, "unrecognized CSV header shape"))
    }
}

/// Detects a YAML document's role from its top-level keys.
pub fn detect_yaml_kind(doc: &serde_yaml::Value) -> Result<SuiteFileKind, OpticsError> {
    let serde_yaml::Value::Mapping(map) = doc else {
        return Err(OpticsError::new(Code::E0501, "suite YAML must be a mapping"));
    };
    let has = |k: &str| map.contains_key(serde_yaml::Value::String(k.to_string()));
    if has("driver_sources") && (has("elements_sources") || has("element_sources")) {
        Ok(SuiteFileKind::Config)
    } else if has("Test Cases") {
        Ok(SuiteFileKind::TestCases)
    } else if has("Modules") {
        Ok(SuiteFileKind::Modules)
    } else if has("Elements") {
        Ok(SuiteFileKind::Elements)
    } else {
        Err(OpticsError::new(Code::E0501, "unrecognized suite YAML shape"))
    }
}

/// One file's contribution to a suite, after format (CSV/YAML) and role
/// have both been decided from content.
pub enum SuiteFragment {
    TestCases(HashMap<String, Vec<String>>),
    Modules(HashMap<String, Vec<ModuleStep>>),
    Elements(HashMap<String, Vec<String>>),
}

/// Reads one suite file's contents. Format is decided first: content that
/// parses as a YAML mapping is read as YAML, anything else as CSV (§6.1 —
/// neither format nor role is decided by file extension).
pub fn read_suite_fragment(contents: &str) -> Result<SuiteFragment, OpticsError> {
    if let Ok(serde_yaml::Value::Mapping(map)) = serde_yaml::from_str::<serde_yaml::Value>(contents) {
        let doc = serde_yaml::Value::Mapping(map);
        match detect_yaml_kind(&doc)? {
            SuiteFileKind::TestCases => Ok(SuiteFragment::TestCases(YamlSuiteReader.read_test_cases(contents)?)),
            SuiteFileKind::Modules => Ok(SuiteFragment::Modules(YamlSuiteReader.read_modules(contents)?)),
            SuiteFileKind::Elements => Ok(SuiteFragment::Elements(YamlSuiteReader.read_elements(contents)?)),
            SuiteFileKind::Config => Err(OpticsError::new(Code::E0501, "expected a suite file, found a config file")),
        }
    } else {
        let header = contents.lines().next().unwrap_or_default();
        match detect_csv_kind(header)? {
            SuiteFileKind::TestCases => Ok(SuiteFragment::TestCases(CsvSuiteReader.read_test_cases(contents)?)),
            SuiteFileKind::Modules => Ok(SuiteFragment::Modules(CsvSuiteReader.read_modules(contents)?)),
            SuiteFileKind::Elements => Ok(SuiteFragment::Elements(CsvSuiteReader.read_elements(contents)?)),
            SuiteFileKind::Config => Err(OpticsError::new(Code::E0501, "expected a suite file, found a config file")),
        }
    }
}

/// Accumulates fragments from any number of files before assembling the
/// final tree (§4.11: a test case's modules, or a module's elements, may
/// be split across several suite files).
#[derive(Debug, Default)]
pub struct RawSuiteData {
    pub test_cases: HashMap<String, Vec<String>>,
    pub modules: HashMap<String, Vec<ModuleStep>>,
    pub elements: HashMap<String, Vec<String>>,
}

impl RawSuiteData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_fragment(&mut self, fragment: SuiteFragment) {
        match fragment {
            SuiteFragment::TestCases(m) => self.test_cases.extend(m),
            SuiteFragment::Modules(m) => self.modules.extend(m),
            SuiteFragment::Elements(m) => {
                for (name, values) in m {
                    self.elements.entry(name).or_default().extend(values);
                }
            }
        }
    }

    /// Expands the flat test-case/module maps into the tree the Scheduler
    /// walks. Test cases are ordered by name for determinism, since the
    /// source maps carry no cross-name ordering of their own; steps within
    /// a test case or module keep the order they were parsed in.
    pub fn assemble_test_suite(&self, max_attempts: u32) -> Result<TestSuite, OpticsError> {
        let modules = self.build_module_data();

        let mut suite = TestSuite::new();
        let mut case_names: Vec<&String> = self.test_cases.keys().collect();
        case_names.sort();
        for case_name in case_names {
            let mut test_case = TestCaseNode::new(case_name.clone());
            for module_name in &self.test_cases[case_name] {
                let definition = modules.get_module_definition(module_name).ok_or_else(|| {
                    OpticsError::new(Code::E0601, format!("Module not found: {module_name}"))
                })?;
                let mut module_node = ModuleNode::new(module_name.clone());
                for (keyword, params) in definition {
                    let mut keyword_node = KeywordNode::new(keyword.clone(), params.clone());
                    keyword_node.info.max_attempts = max_attempts;
                    module_node.add_keyword(keyword_node);
                }
                test_case.add_module(module_node);
            }
            suite.add_test_case(test_case);
        }
        Ok(suite)
    }

    pub fn build_element_store(&self) -> ElementStore {
        let mut store = ElementStore::new();
        for (name, values) in &self.elements {
            for value in values {
                store.add(name.clone(), value.clone());
            }
        }
        store
    }

    pub fn build_module_data(&self) -> ModuleData {
        let mut modules = ModuleData::new();
        for (name, steps) in &self.modules {
            modules.add_module_definition(name.clone(), steps.clone());
        }
        modules
    }

    /// Reads all fragments and assembles the final `ParsedSuite` in one
    /// step.
    pub fn into_parsed_suite(&self, max_attempts: u32) -> Result<ParsedSuite, OpticsError> {
        Ok(ParsedSuite {
            test_cases: self.assemble_test_suite(max_attempts)?,
            modules: self.build_module_data(),
            elements: self.build_element_store(),
            templates: TemplateData::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_round_trips_through_encode_decode() {
        let raw = "line one\nline\ttwo\\r\rend";
        assert_eq!(decode_cell(&encode_cell(raw)), raw);
    }

    #[test]
    fn detect_csv_kind_by_header() {
        assert_eq!(detect_csv_kind("test_case,test_step").unwrap(), SuiteFileKind::TestCases);
        assert_eq!(detect_csv_kind("module_name,module_step,param_1").unwrap(), SuiteFileKind::Modules);
        assert_eq!(detect_csv_kind("Element_Name,Element_ID,Element_ID_2").unwrap(), SuiteFileKind::Elements);
        assert!(detect_csv_kind("foo,bar").is_err());
    }

    #[test]
    fn read_suite_fragment_picks_format_by_content_not_extension() {
        let csv = "test_case,test_step\nlogin,open_app\n";
        assert!(matches!(read_suite_fragment(csv).unwrap(), SuiteFragment::TestCases(_)));

        let yaml = "Modules:\n  - open_app: [\"launch_app\"]\n";
        assert!(matches!(read_suite_fragment(yaml).unwrap(), SuiteFragment::Modules(_)));
    }

    #[test]
    fn assemble_test_suite_links_test_cases_through_modules_to_keywords() {
        let mut data = RawSuiteData::new();
        data.add_fragment(read_suite_fragment("test_case,test_step\nlogin,open_app\n").unwrap());
        data.add_fragment(
            read_suite_fragment("module_name,module_step,param_1\nopen_app,launch_app,${login_btn}\n").unwrap(),
        );
        data.add_fragment(read_suite_fragment("Element_Name,Element_ID\nlogin_btn,100\n").unwrap());

        let parsed = data.into_parsed_suite(3).unwrap();
        let test_case = parsed.test_cases.get_test_case("login").unwrap();
        let module = test_case.get_module("open_app").unwrap();
        let keyword = module.get_keyword("launch_app").unwrap();
        assert_eq!(keyword.params, vec!["${login_btn}".to_string()]);
        assert_eq!(keyword.info.max_attempts, 3);
        assert_eq!(parsed.elements.get_first("login_btn"), Some("100"));
    }

    #[test]
    fn assemble_test_suite_reports_missing_module_as_e0601() {
        let mut data = RawSuiteData::new();
        data.add_fragment(read_suite_fragment("test_case,test_step\nlogin,missing_module\n").unwrap());
        let err = data.assemble_test_suite(3).unwrap_err();
        assert_eq!(err.code, Code::E0601);
    }
}
