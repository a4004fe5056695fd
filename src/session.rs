//! Owns one driver + backend set + element store + event bus + report
//! writer (§4.6).

use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::backend::BackendRegistry;
use crate::config::Config;
use crate::elements::{ElementStore, ModuleData, TemplateData};
use crate::error::StartupError;
use crate::events::EventBus;
use crate::keywords::KeywordRegistry;
use crate::report::JunitReportWriter;
use crate::strategy::StrategyManager;

pub struct TestSuiteHandle {
    pub test_cases: crate::tree::TestSuite,
    pub modules: ModuleData,
    pub elements: ElementStore,
    pub templates: TemplateData,
}

/// One Session per active test run. Created by the `SessionManager`;
/// never shares its driver or element store across sessions (invariant 3).
pub struct Session {
    pub session_id: Uuid,
    pub config: Config,
    pub backends: BackendRegistry,
    pub strategies: StrategyManager,
    pub elements: ElementStore,
    pub modules: ModuleData,
    pub test_cases: crate::tree::TestSuite,
    pub templates: TemplateData,
    pub keywords: Arc<KeywordRegistry>,
    pub event_bus: Arc<EventBus>,
    pub report_writer: Option<Arc<JunitReportWriter>>,
    pub output_dir: PathBuf,
}

impl Session {
    /// Builds a session from a parsed suite and resolved config. The
    /// primary driver is the first enabled `Drive` instance; if none are
    /// enabled, construction fails outright (mirrors the source's
    /// `ValueError("No enabled drivers found in configuration")`).
    pub async fn create(
        config: Config,
        backends: BackendRegistry,
        keywords: Arc<KeywordRegistry>,
        suite: TestSuiteHandle,
    ) -> Result<Self, StartupError> {
        if backends.primary_driver().is_none() {
            return Err(StartupError::NoEnabledDrivers);
        }

        let session_id = Uuid::new_v4();
        let strategies = StrategyManager::from_registry(&backends);
        let event_bus = EventBus::new();

        let output_dir = config
            .execution_output_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("execution_output"))
            .join(session_id.to_string());

        let report_writer = if config.json_log {
            let junit_path = output_dir.join(format!("junit_output_{session_id}.xml"));
            let writer = Arc::new(JunitReportWriter::new(session_id.to_string(), junit_path));
            event_bus.subscribe("junit", writer.clone()).await;
            Some(writer)
        } else {
            None
        };

        Ok(Self {
            session_id,
            config,
            backends,
            strategies,
            elements: suite.elements,
            modules: suite.modules,
            test_cases: suite.test_cases,
            templates: suite.templates,
            keywords,
            event_bus,
            report_writer,
            output_dir,
        })
    }

    /// Releases the driver, stops background tasks, flushes the report
    /// writer. Idempotent at the bus level; safe to call once per session.
    pub async fn terminate(&self) -> Result<(), crate::error::OpticsError> {
        if let Some(driver) = self.backends.primary_driver() {
            driver.terminate().await?;
        }
        self.event_bus.shutdown().await;
        if let Some(writer) = &self.report_writer {
            if let Err(e) = writer.flush().await {
                return Err(crate::error::OpticsError::new(crate::error::Code::E0801, e.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendRegistry, NullDriver};

    #[tokio::test]
    async fn create_fails_without_enabled_drivers() {
        let backends = BackendRegistry::new(vec![], vec![], vec![], vec![]);
        let suite = TestSuiteHandle {
            test_cases: crate::tree::TestSuite::default(),
            modules: ModuleData::new(),
            elements: ElementStore::new(),
            templates: TemplateData::new(),
        };
        let result = Session::create(
            Config::default(),
            backends,
            Arc::new(KeywordRegistry::new()),
            suite,
        )
        .await;
        assert!(matches!(result, Err(StartupError::NoEnabledDrivers)));
    }

    #[tokio::test]
    async fn create_succeeds_with_one_driver() {
        let backends = BackendRegistry::new(vec![Arc::new(NullDriver)], vec![], vec![], vec![]);
        let suite = TestSuiteHandle {
            test_cases: crate::tree::TestSuite::default(),
            modules: ModuleData::new(),
            elements: ElementStore::new(),
            templates: TemplateData::new(),
        };
        let session = Session::create(
            Config::default(),
            backends,
            Arc::new(KeywordRegistry::new()),
            suite,
        )
        .await
        .unwrap();
        session.terminate().await.unwrap();
    }
}
