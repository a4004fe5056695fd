//! In-memory table of active sessions, keyed by session id (§4.9). Owns no
//! process-wide state: template discovery and output-path bookkeeping live
//! on each `Session`, not as globals (§9 Design Notes).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::backend::BackendRegistry;
use crate::config::Config;
use crate::error::{OpticsError, StartupError};
use crate::keywords::KeywordRegistry;
use crate::session::{Session, TestSuiteHandle};

/// Manages sessions for a single process. One instance is enough for both
/// a CLI run and a long-lived server embedding this crate.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_session(
        &self,
        config: Config,
        backends: BackendRegistry,
        keywords: Arc<KeywordRegistry>,
        suite: TestSuiteHandle,
    ) -> Result<Arc<Session>, StartupError> {
        let session = Arc::new(Session::create(config, backends, keywords, suite).await?);
        self.sessions.write().await.insert(session.session_id, session.clone());
        Ok(session)
    }

    pub async fn get_session(&self, session_id: Uuid) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    /// Removes the session from the table and releases its resources.
    /// A second call for the same id is a no-op (mirrors the source's
    /// `dict.pop(id, None)`).
    pub async fn terminate_session(&self, session_id: Uuid) -> Result<(), OpticsError> {
        let session = self.sessions.write().await.remove(&session_id);
        if let Some(session) = session {
            session.terminate().await?;
        }
        Ok(())
    }

    pub async fn active_session_ids(&self) -> Vec<Uuid> {
        self.sessions.read().await.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullDriver;
    use crate::elements::{ElementStore, ModuleData, TemplateData};

    fn empty_suite() -> TestSuiteHandle {
        TestSuiteHandle {
            test_cases: crate::tree::TestSuite::default(),
            modules: ModuleData::new(),
            elements: ElementStore::new(),
            templates: TemplateData::new(),
        }
    }

    #[tokio::test]
    async fn create_get_terminate_round_trip() {
        let manager = SessionManager::new();
        let backends = BackendRegistry::new(vec![Arc::new(NullDriver)], vec![], vec![], vec![]);
        let session = manager
            .create_session(Config::default(), backends, Arc::new(KeywordRegistry::new()), empty_suite())
            .await
            .unwrap();
        let id = session.session_id;

        assert!(manager.get_session(id).await.is_some());
        manager.terminate_session(id).await.unwrap();
        assert!(manager.get_session(id).await.is_none());

        // second terminate is a no-op, not an error
        manager.terminate_session(id).await.unwrap();
    }
}
