//! Builds the nested `<testsuites><testsuite><testcase><kw>...` document for
//! one session as its bus delivers events, and serializes it on flush
//! (§4.8). The nested `<kw>` shape does not fit `quick_junit`'s flat
//! testsuite/testcase model, so the tree is built by hand and written with
//! `quick-xml`'s event writer — see DESIGN.md.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use debug_ignore::DebugIgnore;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event as XmlEvent};
use quick_xml::Writer;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::events::{Event, EventStatus, EventSubscriber};
use crate::logging::redact;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("error creating directory {dir}")]
    Fs {
        dir: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("error writing JUnit output to {file}")]
    Write {
        file: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("error building JUnit XML")]
    Xml(#[source] quick_xml::Error),
}

/// One `<kw>` element: a module (`type="setup"`) or a keyword, each event
/// for it producing one element (matching the source's append-not-update
/// behavior for keyword events; module events update the same element in
/// place).
#[derive(Debug, Clone, Default)]
struct KwElement {
    name: String,
    kind: Option<&'static str>,
    status: String,
    starttime: Option<String>,
    endtime: Option<String>,
    elapsed: Option<String>,
    arguments: Vec<String>,
    logs: Vec<String>,
    children: Vec<KwElement>,
}

impl KwElement {
    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), quick_xml::Error> {
        let mut start = BytesStart::new("kw");
        start.push_attribute(("name", self.name.as_str()));
        if let Some(kind) = self.kind {
            start.push_attribute(("type", kind));
        }
        start.push_attribute(("status", self.status.as_str()));
        if let Some(v) = &self.starttime {
            start.push_attribute(("starttime", v.as_str()));
        }
        if let Some(v) = &self.endtime {
            start.push_attribute(("endtime", v.as_str()));
        }
        if let Some(v) = &self.elapsed {
            start.push_attribute(("elapsed", v.as_str()));
        }
        writer.write_event(XmlEvent::Start(start))?;

        if !self.arguments.is_empty() {
            writer.write_event(XmlEvent::Start(BytesStart::new("arguments")))?;
            for arg in &self.arguments {
                writer.write_event(XmlEvent::Start(BytesStart::new("arg")))?;
                writer.write_event(XmlEvent::Text(BytesText::new(&redact(arg))))?;
                writer.write_event(XmlEvent::End(BytesEnd::new("arg")))?;
            }
            writer.write_event(XmlEvent::End(BytesEnd::new("arguments")))?;
        }

        for log in &self.logs {
            writer.write_event(XmlEvent::Start(BytesStart::new("log")))?;
            writer.write_event(XmlEvent::Text(BytesText::new(log)))?;
            writer.write_event(XmlEvent::End(BytesEnd::new("log")))?;
        }

        for child in &self.children {
            child.write(writer)?;
        }

        writer.write_event(XmlEvent::End(BytesEnd::new("kw")))
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Failure(String),
    Error(String),
    Skipped,
}

#[derive(Debug, Clone, Default)]
struct TestCaseElement {
    name: String,
    id: String,
    classname: String,
    time: f64,
    status: String,
    outcome: Option<Outcome>,
    modules: Vec<KwElement>,
}

impl TestCaseElement {
    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), quick_xml::Error> {
        let mut start = BytesStart::new("testcase");
        start.push_attribute(("name", self.name.as_str()));
        start.push_attribute(("id", self.id.as_str()));
        start.push_attribute(("classname", self.classname.as_str()));
        let time = format!("{:.2}", self.time);
        start.push_attribute(("time", time.as_str()));
        start.push_attribute(("status", self.status.as_str()));
        writer.write_event(XmlEvent::Start(start))?;

        for module in &self.modules {
            module.write(writer)?;
        }

        match &self.outcome {
            Some(Outcome::Failure(message)) => {
                let mut el = BytesStart::new("failure");
                el.push_attribute(("message", message.as_str()));
                el.push_attribute(("type", "Failure"));
                writer.write_event(XmlEvent::Start(el))?;
                writer.write_event(XmlEvent::Text(BytesText::new(message)))?;
                writer.write_event(XmlEvent::End(BytesEnd::new("failure")))?;
            }
            Some(Outcome::Error(message)) => {
                let mut el = BytesStart::new("error");
                el.push_attribute(("message", message.as_str()));
                el.push_attribute(("type", "Error"));
                writer.write_event(XmlEvent::Start(el))?;
                writer.write_event(XmlEvent::Text(BytesText::new(message)))?;
                writer.write_event(XmlEvent::End(BytesEnd::new("error")))?;
            }
            Some(Outcome::Skipped) => {
                writer.write_event(XmlEvent::Empty(BytesStart::new("skipped")))?;
            }
            None => {}
        }

        writer.write_event(XmlEvent::End(BytesEnd::new("testcase")))
    }
}

#[derive(Default)]
struct WriterState {
    testcases: Vec<TestCaseElement>,
    testcase_index: HashMap<String, usize>,
    module_index: HashMap<String, (usize, usize)>,
    start_times: HashMap<String, DateTime<Utc>>,
    tests: u32,
    failures: u32,
    errors: u32,
    skipped: u32,
    time: f64,
}

/// Subscribes to one session's bus and accumulates a JUnit-shaped XML tree
/// in memory, flushing it to disk on session terminate (§4.8, §4.6).
pub struct JunitReportWriter {
    session_id: String,
    path: PathBuf,
    state: DebugIgnore<Mutex<WriterState>>,
}

impl JunitReportWriter {
    pub fn new(session_id: String, path: PathBuf) -> Self {
        Self {
            session_id,
            path,
            state: DebugIgnore(Mutex::new(WriterState::default())),
        }
    }

    async fn handle_test_case(&self, event: &Event) {
        let mut state = self.state.0.lock().await;
        match event.status {
            EventStatus::Running => {
                let idx = state.testcases.len();
                state.testcases.push(TestCaseElement {
                    name: event.name.clone(),
                    id: event.entity_id.clone(),
                    classname: format!("session_{}", self.session_id),
                    time: 0.0,
                    status: "RUNNING".to_string(),
                    outcome: None,
                    modules: Vec::new(),
                });
                state.testcase_index.insert(event.entity_id.clone(), idx);
                state.start_times.insert(event.entity_id.clone(), event.timestamp);
                state.tests += 1;
            }
            EventStatus::Pass | EventStatus::Fail | EventStatus::Error | EventStatus::Skipped => {
                let Some(&idx) = state.testcase_index.get(&event.entity_id) else {
                    return;
                };
                let start = state
                    .start_times
                    .get(&event.entity_id)
                    .copied()
                    .unwrap_or(event.timestamp);
                let elapsed = (event.timestamp - start).num_milliseconds() as f64 / 1000.0;
                let status_str = status_label(event.status);

                match event.status {
                    EventStatus::Fail => state.failures += 1,
                    EventStatus::Error => state.errors += 1,
                    EventStatus::Skipped => state.skipped += 1,
                    _ => {}
                }
                state.time += elapsed;

                let tc = &mut state.testcases[idx];
                tc.time = elapsed;
                tc.status = status_str.to_string();
                tc.outcome = match event.status {
                    EventStatus::Fail => Some(Outcome::Failure(event.message.clone().unwrap_or_default())),
                    EventStatus::Error => Some(Outcome::Error(event.message.clone().unwrap_or_default())),
                    EventStatus::Skipped => Some(Outcome::Skipped),
                    _ => None,
                };
            }
            EventStatus::NotRun | EventStatus::Retrying => {}
        }
    }

    async fn handle_module(&self, event: &Event) {
        let Some(parent_id) = &event.parent_id else {
            return;
        };
        let mut state = self.state.0.lock().await;
        match event.status {
            EventStatus::Running => {
                let Some(&tc_idx) = state.testcase_index.get(parent_id) else {
                    return;
                };
                let module = KwElement {
                    name: event.name.clone(),
                    kind: Some("setup"),
                    status: "RUNNING".to_string(),
                    ..Default::default()
                };
                let m_idx = state.testcases[tc_idx].modules.len();
                state.testcases[tc_idx].modules.push(module);
                state.module_index.insert(event.entity_id.clone(), (tc_idx, m_idx));
            }
            EventStatus::Pass | EventStatus::Fail | EventStatus::Error | EventStatus::Skipped => {
                if let Some(&(tc_idx, m_idx)) = state.module_index.get(&event.entity_id) {
                    state.testcases[tc_idx].modules[m_idx].status = status_label(event.status).to_string();
                }
            }
            EventStatus::NotRun | EventStatus::Retrying => {}
        }
    }

    async fn handle_keyword(&self, event: &Event) {
        let Some(module_id) = &event.parent_id else {
            return;
        };
        let mut state = self.state.0.lock().await;
        let Some(&(tc_idx, m_idx)) = state.module_index.get(module_id) else {
            return;
        };

        let mut kw = KwElement {
            name: event.name.clone(),
            kind: None,
            status: status_label(event.status).to_string(),
            ..Default::default()
        };
        if let Some(start) = event.start_time {
            kw.starttime = Some(start.format("%Y%m%d %H:%M:%S").to_string());
        }
        if let Some(end) = event.end_time {
            kw.endtime = Some(end.format("%Y%m%d %H:%M:%S").to_string());
        }
        if let Some(elapsed) = event.elapsed {
            kw.elapsed = Some(format!("{elapsed:.2}"));
        }
        if let Some(args) = &event.args {
            kw.arguments = args.iter().map(|a| redact(a)).collect();
        }
        if let Some(logs) = &event.logs {
            kw.logs = logs.clone();
        }

        state.testcases[tc_idx].modules[m_idx].children.push(kw);
    }

    /// Serializes the accumulated tree to the configured path, pretty
    /// printed, creating parent directories as needed. Safe to call more
    /// than once; each call rewrites the file from the current state.
    pub async fn flush(&self) -> Result<(), ReportError> {
        let xml = {
            let state = self.state.0.lock().await;
            self.render(&state).map_err(ReportError::Xml)?
        };

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|error| ReportError::Fs { dir: dir.to_path_buf(), error })?;
        }
        tokio::fs::write(&self.path, xml)
            .await
            .map_err(|error| ReportError::Write { file: self.path.clone(), error })
    }

    fn render(&self, state: &WriterState) -> Result<Vec<u8>, quick_xml::Error> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(XmlEvent::Start(BytesStart::new("testsuites")))?;

        let mut suite = BytesStart::new("testsuite");
        let name = format!("session_{}", self.session_id);
        suite.push_attribute(("name", name.as_str()));
        let tests = state.tests.to_string();
        let failures = state.failures.to_string();
        let errors = state.errors.to_string();
        let skipped = state.skipped.to_string();
        let time = format!("{:.2}", state.time);
        suite.push_attribute(("tests", tests.as_str()));
        suite.push_attribute(("failures", failures.as_str()));
        suite.push_attribute(("errors", errors.as_str()));
        suite.push_attribute(("skipped", skipped.as_str()));
        suite.push_attribute(("time", time.as_str()));
        writer.write_event(XmlEvent::Start(suite))?;

        for tc in &state.testcases {
            tc.write(&mut writer)?;
        }

        writer.write_event(XmlEvent::End(BytesEnd::new("testsuite")))?;
        writer.write_event(XmlEvent::End(BytesEnd::new("testsuites")))?;
        Ok(writer.into_inner())
    }
}

fn status_label(status: EventStatus) -> &'static str {
    match status {
        EventStatus::NotRun => "NOT_RUN",
        EventStatus::Running => "RUNNING",
        EventStatus::Pass => "PASS",
        EventStatus::Fail => "FAIL",
        EventStatus::Error => "ERROR",
        EventStatus::Skipped => "SKIPPED",
        EventStatus::Retrying => "RETRYING",
    }
}

#[async_trait]
impl EventSubscriber for JunitReportWriter {
    async fn on_event(&self, event: &Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        use crate::events::EntityType;
        match event.entity_type {
            EntityType::TestCase => self.handle_test_case(event).await,
            EntityType::Module => self.handle_module(event).await,
            EntityType::Keyword => self.handle_keyword(event).await,
            EntityType::Execution => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EntityType;

    #[tokio::test]
    async fn builds_nested_tree_for_one_passing_keyword() {
        let writer = JunitReportWriter::new("abc".into(), PathBuf::from("/tmp/does-not-matter.xml"));

        let tc_id = "tc-1";
        let mod_id = "mod-1";
        writer
            .on_event(&Event::new(EntityType::TestCase, tc_id, "login_flow", EventStatus::Running))
            .await
            .unwrap();
        writer
            .on_event(
                &Event::new(EntityType::Module, mod_id, "open_app", EventStatus::Running).with_parent(tc_id),
            )
            .await
            .unwrap();
        writer
            .on_event(
                &Event::new(EntityType::Keyword, "kw-1", "launch_app", EventStatus::Running).with_parent(mod_id),
            )
            .await
            .unwrap();
        writer
            .on_event(
                &Event::new(EntityType::Keyword, "kw-1", "launch_app", EventStatus::Pass)
                    .with_parent(mod_id)
                    .with_args(vec!["@:token".into(), "visible".into()]),
            )
            .await
            .unwrap();
        writer
            .on_event(
                &Event::new(EntityType::Module, mod_id, "open_app", EventStatus::Pass).with_parent(tc_id),
            )
            .await
            .unwrap();
        writer
            .on_event(&Event::new(EntityType::TestCase, tc_id, "login_flow", EventStatus::Pass))
            .await
            .unwrap();

        let state = writer.state.0.lock().await;
        let xml = writer.render(&state).unwrap();
        let xml = String::from_utf8(xml).unwrap();
        assert!(xml.contains("session_abc"));
        assert!(xml.contains("launch_app"));
        assert!(xml.contains("****"));
        assert!(!xml.contains("@:token"));
    }
}
