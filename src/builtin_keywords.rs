//! A small built-in keyword set bridging the Session's driver and Strategy
//! Manager into the Keyword Registry, for suites that only need session
//! lifecycle, timing, and presence assertions. Keywords that perform a
//! driver-specific action (tap, type, swipe) need a concrete action
//! surface this crate deliberately leaves to the driver implementation
//! (§1 Non-goals: this crate is not a GUI automation driver).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Code, OpticsError};
use crate::keywords::{Arg, Keyword, KeywordFn, KeywordRegistry};
use crate::session::Session;
use crate::strategy::{classify, AssertRule};

fn positional_args(args: &[Arg]) -> Vec<String> {
    args.iter()
        .filter_map(|a| match a {
            Arg::Positional(v) => Some(v.clone()),
            Arg::Keyword(_, _) => None,
        })
        .collect()
}

struct LaunchApp(Arc<Session>);

#[async_trait]
impl KeywordFn for LaunchApp {
    async fn call(&self, _args: &[Arg]) -> Result<(), OpticsError> {
        let driver = self
            .0
            .backends
            .primary_driver()
            .ok_or_else(|| OpticsError::new(Code::E0101, "Driver not initialized"))?;
        driver.launch().await
    }
}

struct CloseAndTerminateApp(Arc<Session>);

#[async_trait]
impl KeywordFn for CloseAndTerminateApp {
    async fn call(&self, _args: &[Arg]) -> Result<(), OpticsError> {
        let driver = self
            .0
            .backends
            .primary_driver()
            .ok_or_else(|| OpticsError::new(Code::E0101, "Driver not initialized"))?;
        driver.terminate().await
    }
}

struct Sleep;

#[async_trait]
impl KeywordFn for Sleep {
    async fn call(&self, args: &[Arg]) -> Result<(), OpticsError> {
        let values = positional_args(args);
        let seconds: f64 = values
            .first()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| OpticsError::new(Code::E0403, "'sleep' requires a numeric seconds argument"))?;
        tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
        Ok(())
    }
}

struct AssertPresence(Arc<Session>);

#[async_trait]
impl KeywordFn for AssertPresence {
    async fn call(&self, args: &[Arg]) -> Result<(), OpticsError> {
        let elements = positional_args(args);
        let Some(first) = elements.first() else {
            return Err(OpticsError::new(Code::E0403, "'assert_presence' requires at least one element"));
        };
        let (kind, _) = classify(first);
        let present = self
            .0
            .strategies
            .assert_presence(&elements, kind, Duration::from_secs(10), AssertRule::Any)
            .await?;
        if present {
            Ok(())
        } else {
            Err(OpticsError::new(Code::E0201, "None of the elements were present"))
        }
    }
}

/// Registers the keywords this crate can implement purely from its own
/// core, against an already-created `Session` (§4.14). The registry is
/// read-only once the Scheduler starts walking the tree, so this must run
/// before that point.
pub fn register_builtin_keywords(registry: &KeywordRegistry, session: Arc<Session>) {
    registry.register(Keyword::new("launch_app", Arc::new(LaunchApp(session.clone()))));
    registry.register(Keyword::new(
        "close_and_terminate_app",
        Arc::new(CloseAndTerminateApp(session.clone())),
    ));
    registry.register(Keyword::new("sleep", Arc::new(Sleep)).with_params(vec!["seconds"]));
    registry.register(
        Keyword::new("assert_presence", Arc::new(AssertPresence(session))).with_params(vec!["elements"]),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendRegistry, NullDriver};
    use crate::config::Config;
    use crate::elements::{ElementStore, ModuleData, TemplateData};
    use crate::keywords::KeywordRegistry as Registry;
    use crate::session::TestSuiteHandle;

    async fn test_session() -> Arc<Session> {
        let backends = BackendRegistry::new(vec![Arc::new(NullDriver)], vec![], vec![], vec![]);
        let suite = TestSuiteHandle {
            test_cases: crate::tree::TestSuite::default(),
            modules: ModuleData::new(),
            elements: ElementStore::new(),
            templates: TemplateData::new(),
        };
        Arc::new(
            Session::create(Config::default(), backends, Arc::new(Registry::new()), suite)
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn launch_and_sleep_keywords_run_against_a_null_driver() {
        let session = test_session().await;
        let registry = Registry::new();
        register_builtin_keywords(&registry, session);

        registry.get("launch_app").unwrap().callable.call(&[]).await.unwrap();
        registry
            .get("sleep")
            .unwrap()
            .callable
            .call(&[Arg::Positional("0".to_string())])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sleep_without_a_numeric_argument_is_e0403() {
        let session = test_session().await;
        let registry = Registry::new();
        register_builtin_keywords(&registry, session);

        let err = registry
            .get("sleep")
            .unwrap()
            .callable
            .call(&[Arg::Positional("soon".to_string())])
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::E0403);
    }
}
