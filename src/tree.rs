//! The test-case → module → keyword tree: a singly linked list of
//! TestCases, each with a linked list of Modules, each with a linked list
//! of Keywords (§3.1). Parent references are ids, never owning pointers
//! (§9 Design Notes).

use uuid::Uuid;

/// Per-node lifecycle state (§4.7.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    NotRun,
    Running,
    CompletedPassed,
    CompletedFailed,
    Retrying,
    Skipped,
    Error,
}

/// Fields shared by every tree node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: Uuid,
    pub name: String,
    pub state: State,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub last_failure_reason: Option<String>,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            state: State::NotRun,
            attempt_count: 0,
            max_attempts: 3,
            last_failure_reason: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeywordNode {
    pub info: NodeInfo,
    pub params: Vec<String>,
}

impl KeywordNode {
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            info: NodeInfo::new(name),
            params,
        }
    }
}

/// A module's ordered keyword list. Modeled as an owning `Vec` rather than
/// a hand-rolled `Option<Box<Node>>` chain: it holds the same fallback
/// ordering and next/remove/get operations as the source's linked list,
/// expressed the way idiomatic Rust represents an owned ordered sequence.
#[derive(Debug, Clone, Default)]
pub struct ModuleNode {
    pub info: NodeInfo,
    pub keywords: Vec<KeywordNode>,
}

impl ModuleNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            info: NodeInfo::new(name),
            keywords: Vec::new(),
        }
    }

    pub fn add_keyword(&mut self, keyword: KeywordNode) {
        self.keywords.push(keyword);
    }

    pub fn remove_keyword(&mut self, name: &str) {
        self.keywords.retain(|k| k.info.name != name);
    }

    pub fn get_keyword(&self, name: &str) -> Option<&KeywordNode> {
        self.keywords.iter().find(|k| k.info.name == name)
    }
}

impl Default for NodeInfo {
    fn default() -> Self {
        Self::new("")
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestCaseNode {
    pub info: NodeInfo,
    pub modules: Vec<ModuleNode>,
}

impl TestCaseNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            info: NodeInfo::new(name),
            modules: Vec::new(),
        }
    }

    pub fn add_module(&mut self, module: ModuleNode) {
        self.modules.push(module);
    }

    pub fn remove_module(&mut self, name: &str) {
        self.modules.retain(|m| m.info.name != name);
    }

    pub fn get_module(&self, name: &str) -> Option<&ModuleNode> {
        self.modules.iter().find(|m| m.info.name == name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestSuite {
    pub test_cases: Vec<TestCaseNode>,
}

impl TestSuite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_test_case(&mut self, test_case: TestCaseNode) {
        self.test_cases.push(test_case);
    }

    pub fn remove_test_case(&mut self, name: &str) {
        self.test_cases.retain(|tc| tc.info.name != name);
    }

    pub fn get_test_case(&self, name: &str) -> Option<&TestCaseNode> {
        self.test_cases.iter().find(|tc| tc.info.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_get_remove_round_trip() {
        let mut suite = TestSuite::new();
        let mut tc = TestCaseNode::new("login_flow");
        let mut module = ModuleNode::new("open_app");
        module.add_keyword(KeywordNode::new("launch_app", vec![]));
        tc.add_module(module);
        suite.add_test_case(tc);

        assert!(suite.get_test_case("login_flow").is_some());
        assert!(suite
            .get_test_case("login_flow")
            .unwrap()
            .get_module("open_app")
            .unwrap()
            .get_keyword("launch_app")
            .is_some());

        suite.remove_test_case("login_flow");
        assert!(suite.get_test_case("login_flow").is_none());
    }
}
