//! Thin entry point: load config and suite files, build one session, drive
//! it to completion, print a summary (§4.14).

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use optics_core::args::Arguments;
use optics_core::backend::{BackendRegistry, NullDriver};
use optics_core::builtin_keywords::register_builtin_keywords;
use optics_core::config::Config;
use optics_core::error::{Code, OpticsError};
use optics_core::keywords::KeywordRegistry;
use optics_core::logging::init_logging;
use optics_core::printer::Printer;
use optics_core::scheduler::Scheduler;
use optics_core::session::{Session, TestSuiteHandle};
use optics_core::suite::{read_suite_fragment, RawSuiteData};
use optics_core::tree::TestSuite;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Arguments::from_args();

    match run(args).await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("{}", err.render());
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Arguments) -> Result<usize, OpticsError> {
    let config = load_config(&args).await?;
    init_logging(args.log_level.as_deref().unwrap_or(&config.log_level));

    let mut raw = RawSuiteData::new();
    for path in &args.suite_files {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| io_error(path, e))?;
        raw.add_fragment(read_suite_fragment(&contents)?);
    }
    let parsed = raw.into_parsed_suite(config.max_attempts)?;
    let mut test_tree: TestSuite = parsed.test_cases;

    let backends = BackendRegistry::new(vec![Arc::new(NullDriver)], vec![], vec![], vec![]);
    let keywords = Arc::new(KeywordRegistry::new());
    let suite_handle = TestSuiteHandle {
        test_cases: TestSuite::default(),
        modules: parsed.modules,
        elements: parsed.elements,
        templates: parsed.templates,
    };

    let session = Session::create(config, backends, keywords.clone(), suite_handle)
        .await
        .map_err(|e| OpticsError::new(Code::E0101, e.to_string()))?;
    let session = Arc::new(session);
    register_builtin_keywords(&keywords, session.clone());

    let scheduler = Scheduler::new(session.event_bus.clone(), keywords.clone()).dry_run(args.dry_run);
    scheduler.run(&mut test_tree, &session.elements).await;

    let mut printer = Printer::new(args.color.should_colorize());
    let failed = printer
        .print_summary(&test_tree)
        .map_err(|e| OpticsError::new(Code::E0801, e.to_string()))?;

    session.terminate().await?;
    Ok(failed)
}

fn io_error(path: &Path, error: std::io::Error) -> OpticsError {
    OpticsError::new(Code::E0501, format!("could not read suite file {}: {error}", path.display()))
}

/// Built-in defaults, layered with an auto-created global config file
/// (§6.4), an optional project config, and the `TEST_SESSION_ENV_VARIABLES`
/// override (§4.12).
async fn load_config(args: &Arguments) -> Result<Config, OpticsError> {
    let mut config = Config::default();

    if let Some(home) = dirs::home_dir() {
        let global_path = home.join(".optics").join("global_config.yaml");
        if let Some(parent) = global_path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        match tokio::fs::read_to_string(&global_path).await {
            Ok(raw) => config = config.merged_with(Config::from_yaml_str(&raw)?),
            Err(_) => {
                let _ = tokio::fs::write(&global_path, serde_yaml::to_string(&config).unwrap_or_default()).await;
            }
        }
    }

    if let Some(project_path) = &args.config {
        let raw = tokio::fs::read_to_string(project_path).await.map_err(|e| io_error(project_path, e))?;
        config = config.merged_with(Config::from_yaml_str(&raw)?);
    }

    if let Some(output) = &args.output {
        config.execution_output_path = Some(output.clone());
    }

    let env_override = std::env::var("TEST_SESSION_ENV_VARIABLES").ok();
    Ok(config.apply_env_override(env_override.as_deref()))
}
