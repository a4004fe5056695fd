//! Walks a `TestSuite` tree, resolving each keyword's parameters and
//! invoking its registered callable, publishing lifecycle events and
//! polling for retry commands at each suspension point (§4.7).

use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::elements::{variable_name, ElementStore};
use crate::error::{Code, OpticsError};
use crate::events::{Command, CommandKind, EntityType, Event, EventBus, EventStatus};
use crate::keywords::{normalize, Arg, KeywordRegistry};
use crate::tree::{KeywordNode, ModuleNode, State, TestCaseNode, TestSuite};

/// Cartesian product of a keyword's parameter candidates is capped here
/// (§4.7.2 step 3, invariant 2 in §8).
const MAX_COMBINATIONS: usize = 20;

static EMBEDDED_VAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// Runs a suite's tree against a keyword registry and element store,
/// publishing events to a session's bus. One Scheduler per Session.
pub struct Scheduler {
    pub event_bus: Arc<EventBus>,
    pub keywords: Arc<KeywordRegistry>,
    pub dry_run: bool,
}

impl Scheduler {
    pub fn new(event_bus: Arc<EventBus>, keywords: Arc<KeywordRegistry>) -> Self {
        Self {
            event_bus,
            keywords,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Walks every test case in order (§4.7.1). A failing keyword fails its
    /// module and its test case; the walk moves on to the next test case.
    pub async fn run(&self, suite: &mut TestSuite, elements: &ElementStore) {
        for test_case in suite.test_cases.iter_mut() {
            self.run_test_case(test_case, elements).await;
        }
    }

    async fn run_test_case(&self, test_case: &mut TestCaseNode, elements: &ElementStore) {
        let id = test_case.info.id.to_string();
        let start = Utc::now();
        test_case.info.state = State::Running;
        self.event_bus
            .publish_event(Event::new(EntityType::TestCase, id.clone(), test_case.info.name.clone(), EventStatus::Running))
            .await;

        let mut failed = false;
        for module in test_case.modules.iter_mut() {
            let passed = self.run_module(module, &id, elements).await;
            if !passed {
                failed = true;
                break;
            }
        }

        let end = Utc::now();
        test_case.info.state = if failed { State::CompletedFailed } else { State::CompletedPassed };
        let status = if failed { EventStatus::Fail } else { EventStatus::Pass };
        self.event_bus
            .publish_event(
                Event::new(EntityType::TestCase, id, test_case.info.name.clone(), status).with_elapsed(start, end),
            )
            .await;
    }

    /// Returns whether the module passed. Stops at the first failing
    /// keyword (§4.7.1).
    async fn run_module(&self, module: &mut ModuleNode, parent_id: &str, elements: &ElementStore) -> bool {
        let id = module.info.id.to_string();
        module.info.state = State::Running;
        self.event_bus
            .publish_event(
                Event::new(EntityType::Module, id.clone(), module.info.name.clone(), EventStatus::Running)
                    .with_parent(parent_id.to_string()),
            )
            .await;

        let mut passed = true;
        for keyword in module.keywords.iter_mut() {
            if !self.run_keyword(keyword, &id, elements).await {
                passed = false;
                break;
            }
        }

        module.info.state = if passed { State::CompletedPassed } else { State::CompletedFailed };
        let status = if passed { EventStatus::Pass } else { EventStatus::Fail };
        self.event_bus
            .publish_event(
                Event::new(EntityType::Module, id, module.info.name.clone(), status).with_parent(parent_id.to_string()),
            )
            .await;
        passed
    }

    /// Runs one keyword through the execution algorithm (§4.7.2), retrying
    /// whenever a pending `Retry` command targets it after a terminal
    /// status (§4.7.2 step 5). Returns whether it ultimately passed.
    async fn run_keyword(&self, keyword: &mut KeywordNode, parent_id: &str, elements: &ElementStore) -> bool {
        loop {
            keyword.info.attempt_count += 1;
            let id = keyword.info.id.to_string();
            keyword.info.state = State::Running;
            self.event_bus
                .publish_event(
                    Event::new(EntityType::Keyword, id.clone(), keyword.info.name.clone(), EventStatus::Running)
                        .with_parent(parent_id.to_string()),
                )
                .await;

            let start = Utc::now();
            let outcome = self.execute_keyword(keyword, elements).await;
            let end = Utc::now();

            let passed = outcome.is_ok();
            keyword.info.state = if passed { State::CompletedPassed } else { State::CompletedFailed };
            if let Err(e) = &outcome {
                keyword.info.last_failure_reason = Some(e.message.clone());
            }

            let status = if passed { EventStatus::Pass } else { EventStatus::Fail };
            let mut event = Event::new(EntityType::Keyword, id, keyword.info.name.clone(), status)
                .with_parent(parent_id.to_string())
                .with_elapsed(start, end);
            if let Err(e) = &outcome {
                event = event.with_message(e.message.clone());
            }
            self.event_bus.publish_event(event).await;

            if passed {
                return true;
            }

            match self.pending_retry(&keyword.info.id.to_string()).await {
                Some(_) if keyword.info.attempt_count < keyword.info.max_attempts => {
                    keyword.info.state = State::NotRun;
                    continue;
                }
                _ => return false,
            }
        }
    }

    async fn pending_retry(&self, keyword_id: &str) -> Option<Command> {
        let command = self.event_bus.get_command().await?;
        if command.kind == CommandKind::Retry && command.entity_id == keyword_id {
            Some(command)
        } else {
            None
        }
    }

    /// The keyword execution algorithm itself (§4.7.2 steps 1-4), with no
    /// retry-command handling — that happens one layer up in `run_keyword`.
    async fn execute_keyword(&self, keyword: &KeywordNode, elements: &ElementStore) -> Result<(), OpticsError> {
        let callable = self
            .keywords
            .get(&keyword.info.name)
            .ok_or_else(|| OpticsError::new(Code::E0402, format!("Keyword not found: {}", keyword.info.name)))?;

        let candidates = build_candidates(&keyword.params, &callable, elements)?;
        let combinations = cartesian_capped(&candidates, MAX_COMBINATIONS);

        let mut last_error: Option<OpticsError> = None;
        for combo in &combinations {
            if self.dry_run {
                return Ok(());
            }

            let resolved = match resolve_embedded(combo, &callable, elements) {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            };
            let args = split_args(&resolved);

            match callable.callable.call(&args).await {
                Ok(()) => return Ok(()),
                Err(e) if e.retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        let exhausted_code = match &last_error {
            Some(e) if e.retryable() => Code::X0201,
            _ => Code::X0401,
        };
        Err(OpticsError::new(
            exhausted_code,
            format!("'{}' failed after {} attempt(s)", keyword.info.name, combinations.len()),
        ))
    }
}

/// Step 2: a singleton candidate list for literal params and raw-index
/// params, or the full fallback list from the Element Store for `${name}`
/// params (§4.7.2, §4.7.3).
fn build_candidates(
    params: &[String],
    keyword: &crate::keywords::Keyword,
    elements: &ElementStore,
) -> Result<Vec<Vec<String>>, OpticsError> {
    let mut candidates = Vec::with_capacity(params.len());
    for (i, param) in params.iter().enumerate() {
        if keyword.is_raw(i) {
            candidates.push(vec![param.clone()]);
            continue;
        }
        if let Some(name) = variable_name(param) {
            let values = elements
                .get(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| OpticsError::new(Code::E0201, format!("Element not found: {name}")))?;
            candidates.push(values.to_vec());
        } else {
            candidates.push(vec![param.clone()]);
        }
    }
    Ok(candidates)
}

/// Deterministic mixed-radix enumeration of the Cartesian product, capped
/// at `cap` combinations (§4.7.2 step 3, §8 invariant 2).
fn cartesian_capped(candidates: &[Vec<String>], cap: usize) -> Vec<Vec<String>> {
    if candidates.is_empty() {
        return vec![Vec::new()];
    }

    let mut out = Vec::new();
    let mut indices = vec![0usize; candidates.len()];
    loop {
        if out.len() >= cap {
            break;
        }
        out.push(
            indices
                .iter()
                .enumerate()
                .map(|(i, &idx)| candidates[i][idx].clone())
                .collect(),
        );

        let mut pos = candidates.len();
        loop {
            if pos == 0 {
                return out;
            }
            pos -= 1;
            indices[pos] += 1;
            if indices[pos] < candidates[pos].len() {
                break;
            }
            indices[pos] = 0;
            if pos == 0 {
                return out;
            }
        }
    }
    out
}

/// Step 3b: re-resolves any `${...}` occurring inside an already-chosen
/// combination value via `get_first`, skipping raw-index positions.
fn resolve_embedded(
    combo: &[String],
    keyword: &crate::keywords::Keyword,
    elements: &ElementStore,
) -> Result<Vec<String>, OpticsError> {
    let mut out = Vec::with_capacity(combo.len());
    for (i, value) in combo.iter().enumerate() {
        if keyword.is_raw(i) || !value.contains("${") {
            out.push(value.clone());
            continue;
        }
        let mut error = None;
        let replaced = EMBEDDED_VAR_RE.replace_all(value, |caps: &regex::Captures| {
            let name = &caps[1];
            match elements.get_first(name) {
                Some(v) => v.to_string(),
                None => {
                    error = Some(OpticsError::new(Code::E0201, format!("Element not found: {name}")));
                    String::new()
                }
            }
        });
        if let Some(e) = error {
            return Err(e);
        }
        out.push(replaced.into_owned());
    }
    Ok(out)
}

/// Step 3a: a token containing `=` that does not begin with `/`, `//` or
/// `(` is a keyword argument; everything else is positional.
fn split_args(values: &[String]) -> Vec<Arg> {
    values
        .iter()
        .map(|v| {
            let looks_like_locator = v.starts_with('/') || v.starts_with('(');
            if !looks_like_locator {
                if let Some(eq) = v.find('=') {
                    let (key, rest) = v.split_at(eq);
                    return Arg::Keyword(key.to_string(), rest[1..].to_string());
                }
            }
            Arg::Positional(v.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::ElementStore;
    use crate::keywords::{Keyword, KeywordRegistry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_scheduler() -> (Scheduler, Arc<KeywordRegistry>, Arc<EventBus>) {
        let bus = EventBus::new();
        let keywords = Arc::new(KeywordRegistry::new());
        let scheduler = Scheduler::new(bus.clone(), keywords.clone());
        (scheduler, keywords, bus)
    }

    #[tokio::test]
    async fn s1_single_keyword_with_coordinate_fallback() {
        let (scheduler, keywords, bus) = make_scheduler();
        keywords.register(Keyword::new(
            "press_element",
            Arc::new(|args: Vec<Arg>| async move {
                match &args[0] {
                    Arg::Positional(v) if v == "//nonexistent" => Err(OpticsError::new(Code::E0201, "not found")),
                    Arg::Positional(v) if v == "100,200" => Ok(()),
                    _ => Err(OpticsError::new(Code::E0801, "unexpected")),
                }
            }),
        ));

        let mut elements = ElementStore::new();
        elements.add("login_btn", "//nonexistent");
        elements.add("login_btn", "100,200");

        let mut suite = TestSuite::new();
        let mut tc = TestCaseNode::new("login");
        let mut module = ModuleNode::new("open_app");
        module.add_keyword(KeywordNode::new("press_element", vec!["${login_btn}".into()]));
        tc.add_module(module);
        suite.add_test_case(tc);

        scheduler.run(&mut suite, &elements).await;

        let tc = &suite.test_cases[0];
        assert_eq!(tc.info.state, State::CompletedPassed);
        assert_eq!(tc.modules[0].keywords[0].info.attempt_count, 1);
        let _ = bus;
    }

    #[tokio::test]
    async fn s2_absent_element_exhausts_fallbacks() {
        let (scheduler, keywords, _bus) = make_scheduler();
        keywords.register(Keyword::new(
            "press_element",
            Arc::new(|_args: Vec<Arg>| async move { Err(OpticsError::new(Code::E0201, "not found")) }),
        ));

        let mut elements = ElementStore::new();
        elements.add("missing", "a");
        elements.add("missing", "b");
        elements.add("missing", "c");

        let mut suite = TestSuite::new();
        let mut tc = TestCaseNode::new("tc");
        let mut module = ModuleNode::new("m");
        module.add_keyword(KeywordNode::new("press_element", vec!["${missing}".into()]));
        tc.add_module(module);
        suite.add_test_case(tc);

        scheduler.run(&mut suite, &elements).await;

        let tc = &suite.test_cases[0];
        assert_eq!(tc.info.state, State::CompletedFailed);
        let reason = tc.modules[0].keywords[0].info.last_failure_reason.as_deref().unwrap();
        assert!(reason.contains("after 3 attempt"), "got: {reason}");
    }

    #[tokio::test]
    async fn s5_retry_command_re_executes_a_failed_keyword_once() {
        let (scheduler, keywords, bus) = make_scheduler();
        let call_count = Arc::new(AtomicUsize::new(0));
        let counter = call_count.clone();
        keywords.register(Keyword::new(
            "flaky",
            Arc::new(move |_args: Vec<Arg>| {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err(OpticsError::new(Code::E0801, "boom"))
                    } else {
                        Ok(())
                    }
                }
            }),
        ));

        let elements = ElementStore::new();
        let mut suite = TestSuite::new();
        let mut tc = TestCaseNode::new("tc");
        let mut module = ModuleNode::new("m");
        let keyword = KeywordNode::new("flaky", vec![]);
        let keyword_id = keyword.info.id.to_string();
        module.add_keyword(keyword);
        tc.add_module(module);
        suite.add_test_case(tc);

        bus.publish_command(Command {
            kind: CommandKind::Retry,
            entity_id: keyword_id,
            params: vec![],
            parent_id: None,
        })
        .await;

        scheduler.run(&mut suite, &elements).await;

        let tc = &suite.test_cases[0];
        assert_eq!(tc.info.state, State::CompletedPassed);
        assert_eq!(tc.modules[0].keywords[0].info.attempt_count, 2);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn s6_variable_list_with_cap() {
        let (scheduler, keywords, _bus) = make_scheduler();
        let call_count = Arc::new(AtomicUsize::new(0));
        let counter = call_count.clone();
        keywords.register(Keyword::new(
            "press_element",
            Arc::new(move |_args: Vec<Arg>| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(OpticsError::new(Code::E0201, "not found"))
                }
            }),
        ));

        let mut elements = ElementStore::new();
        for i in 0..25 {
            elements.add("x", format!("v{i}"));
        }

        let mut suite = TestSuite::new();
        let mut tc = TestCaseNode::new("tc");
        let mut module = ModuleNode::new("m");
        module.add_keyword(KeywordNode::new("press_element", vec!["${x}".into()]));
        tc.add_module(module);
        suite.add_test_case(tc);

        scheduler.run(&mut suite, &elements).await;

        assert!(call_count.load(Ordering::SeqCst) <= 20);
        let tc = &suite.test_cases[0];
        assert_eq!(tc.info.state, State::CompletedFailed);
        let reason = tc.modules[0].keywords[0].info.last_failure_reason.as_deref().unwrap();
        assert!(reason.contains("20 attempt"), "got: {reason}");
    }

    #[test]
    fn split_args_distinguishes_keyword_and_positional() {
        let args = split_args(&["x=1".to_string(), "//node".to_string(), "plain".to_string()]);
        assert!(matches!(&args[0], Arg::Keyword(k, v) if k == "x" && v == "1"));
        assert!(matches!(&args[1], Arg::Positional(v) if v == "//node"));
        assert!(matches!(&args[2], Arg::Positional(v) if v == "plain"));
    }

    #[test]
    fn cartesian_capped_respects_cap() {
        let candidates = vec![(0..25).map(|i| format!("v{i}")).collect::<Vec<_>>()];
        let combos = cartesian_capped(&candidates, 20);
        assert_eq!(combos.len(), 20);
    }
}
