//! Tool loading integration tests
//!
//! Drives discovery, adapter dispatch, tool invocation, and teardown end to
//! end with in-process adapters.

use std::fs;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

use toolhost::error::{Result, ToolhostError};
use toolhost::resources::ResourceStack;
use toolhost::session::{ExecutionContext, InMemoryContext, Message, SessionProxy};
use toolhost::tools::{self, Tool, ToolAdapter, ToolConfig, ToolCreationResult, ToolFactory};

/// Tool that echoes its arguments back
struct Echo {
    name: String,
}

#[async_trait]
impl Tool for Echo {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Echo arguments"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn invoke(&self, arguments: Value) -> Result<Value> {
        Ok(arguments)
    }
}

/// Adapter that opens one fake connection per config and records its release
struct EchoAdapter {
    released: Arc<Mutex<Vec<String>>>,
    fail_release_for: Option<String>,
}

#[async_trait]
impl ToolAdapter for EchoAdapter {
    async fn create(&self, config: &ToolConfig, resources: &mut ResourceStack) -> Result<ToolCreationResult> {
        let released = Arc::clone(&self.released);
        let id = config.id.clone();
        let fail = self.fail_release_for.as_deref() == Some(config.id.as_str());
        resources.callback(format!("echo:{}", id), move || {
            released.lock().unwrap().push(id.clone());
            if fail {
                Err(ToolhostError::Connection(format!("{} refused to close", id)))
            } else {
                Ok(())
            }
        });

        let names = config.requested_functions();
        let mut result = ToolCreationResult::default();
        result.tools = names
            .iter()
            .map(|name| Box::new(Echo { name: name.clone() }) as Box<dyn Tool>)
            .collect();
        result.found_functions = names.clone();
        result.requested_functions = names;
        Ok(result)
    }
}

fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn fixture_files(dir: &TempDir) -> Vec<std::path::PathBuf> {
    vec![
        write(
            dir,
            "paths.json",
            r#"{"id": "paths", "type": "native", "module_path": "fs.path", "functions": ["exists", "bogus_fn"]}"#,
        ),
        write(dir, "first.yaml", "id: first\ntype: echo\nfunctions: [alpha]\n"),
        write(dir, "broken.json", "{ not json"),
        write(dir, "off.json", r#"{"id": "off", "type": "echo", "disabled": true}"#),
        write(dir, "second.yml", "id: second\ntype: echo\nfunctions: [beta, gamma]\n"),
        write(dir, "mystery.json", r#"{"id": "mystery", "type": "a2a"}"#),
    ]
}

#[tokio::test]
async fn test_discover_create_invoke_and_teardown() {
    let dir = TempDir::new().unwrap();
    let files = fixture_files(&dir);

    let (configs, discovery) = tools::discover(&files);
    assert_eq!(discovery.total_files_scanned, 6);
    assert_eq!(discovery.successful_configs.len() + discovery.failed_configs.len(), 6);
    assert_eq!(discovery.failed_configs.len(), 1);
    assert_eq!(configs.len(), 5);

    let released = Arc::new(Mutex::new(Vec::new()));
    let mut factory = ToolFactory::default();
    factory
        .register(
            "echo",
            Box::new(EchoAdapter {
                released: Arc::clone(&released),
                fail_release_for: Some("first".to_string()),
            }),
        )
        .unwrap();

    let mut resources = ResourceStack::new();
    let results = factory.create_tools(&configs, &mut resources).await;

    // the disabled config produces no result
    assert_eq!(results.len(), 4);

    let native = &results[0];
    assert!(native.error.is_none());
    assert_eq!(native.found_functions, vec!["exists"]);
    assert_eq!(native.missing_functions, vec!["bogus_fn"]);

    assert!(results[3].error.as_deref().unwrap().contains("a2a"));
    assert_eq!(resources.labels(), vec!["echo:first", "echo:second"]);

    let loaded = tools::collect_tools(results);
    let names: Vec<&str> = loaded.iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["exists", "alpha", "beta", "gamma"]);

    let existing = dir.path().join("paths.json");
    let exists = loaded[0].invoke(json!({"path": existing.to_string_lossy()})).await.unwrap();
    assert_eq!(exists, json!(true));
    assert_eq!(loaded[2].invoke(json!({"x": 1})).await.unwrap(), json!({"x": 1}));

    let teardown = resources.close().unwrap_err();
    assert_eq!(*released.lock().unwrap(), vec!["second", "first"]);
    assert_eq!(teardown.failures.len(), 1);
    assert_eq!(teardown.failures[0].label, "echo:first");
}

#[tokio::test]
async fn test_dropped_stack_still_releases() {
    let released = Arc::new(Mutex::new(Vec::new()));
    let mut factory = ToolFactory::default();
    factory
        .register(
            "echo",
            Box::new(EchoAdapter {
                released: Arc::clone(&released),
                fail_release_for: None,
            }),
        )
        .unwrap();

    let mut config = ToolConfig::new("only", "echo");
    config.functions = Some(vec!["one".to_string()]);
    {
        let mut resources = ResourceStack::new();
        let result = factory.create_tools_from_config(&config, &mut resources).await;
        assert_eq!(result.tools.len(), 1);
    }
    assert_eq!(*released.lock().unwrap(), vec!["only"]);
}

#[test]
fn test_empty_discovery_loads_nothing() {
    let (configs, discovery) = tools::discover::<&str>(&[]);
    assert!(configs.is_empty());
    assert_eq!(discovery.total_files_scanned, 0);
}

#[test]
fn test_session_proxy_round_trip() -> Result<()> {
    let home = TempDir::new()?;
    let context: Arc<dyn ExecutionContext> = Arc::new(InMemoryContext::new());

    let mut proxy = SessionProxy::new(Some("integration"), Some(home.path().to_path_buf()));
    proxy.initialize(&context);
    assert!(proxy.is_active());
    proxy.append_message(&Message::user("list the tools"));
    proxy.append_message(&Message::assistant("exists, alpha, beta, gamma"));

    let restored: Arc<dyn ExecutionContext> = Arc::new(InMemoryContext::new());
    let mut reopened = SessionProxy::new(Some("integration"), Some(home.path().to_path_buf()));
    reopened.initialize(&restored);
    assert_eq!(restored.messages().len(), 2);
    assert_eq!(reopened.list_sessions(), vec!["integration"]);
    Ok(())
}
