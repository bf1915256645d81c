//! Native function adapter
//!
//! In-process functions are grouped into `NativeModule`s and registered in a
//! `ModuleCatalog` under dotted paths such as `fs.path`. A `native` config
//! names a module and, optionally, which of its functions to expose.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::config::ToolConfig;
use super::factory::ToolAdapter;
use super::{Tool, ToolCreationResult};
use crate::error::{Result, ToolhostError};
use crate::resources::ResourceStack;

/// Handler signature for a native function
pub type NativeFn = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// A callable member of a native module
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    handler: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction").field("name", &self.name).finish()
    }
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: json!({"type": "object", "properties": {}}),
            handler: Arc::new(handler),
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn call(&self, arguments: Value) -> Result<Value> {
        (self.handler)(arguments)
    }
}

/// An ordered set of native functions under one dotted path
#[derive(Debug, Clone)]
pub struct NativeModule {
    pub path: String,
    functions: Vec<NativeFunction>,
}

impl NativeModule {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            functions: Vec::new(),
        }
    }

    pub fn with_function(mut self, function: NativeFunction) -> Self {
        self.functions.push(function);
        self
    }

    pub fn function(&self, name: &str) -> Option<&NativeFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn functions(&self) -> &[NativeFunction] {
        &self.functions
    }
}

/// Registry of native modules keyed by dotted path
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    modules: HashMap<String, NativeModule>,
}

impl ModuleCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with the built-in `fs.path` module
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register(fs_path_module());
        catalog
    }

    /// Register a module, replacing any module at the same path
    pub fn register(&mut self, module: NativeModule) {
        let path = module.path.clone();
        if self.modules.insert(path.clone(), module).is_some() {
            log::warn!("Replaced native module '{}'", path);
        }
    }

    pub fn module(&self, path: &str) -> Option<&NativeModule> {
        self.modules.get(path)
    }

    /// Resolve a fully dotted name like `fs.path.exists`
    pub fn resolve(&self, dotted: &str) -> Option<&NativeFunction> {
        let (module, member) = dotted.rsplit_once('.')?;
        self.module(module)?.function(member)
    }

    /// Sorted module paths
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

struct NativeTool {
    function: NativeFunction,
}

#[async_trait]
impl Tool for NativeTool {
    fn name(&self) -> &str {
        &self.function.name
    }

    fn description(&self) -> &str {
        &self.function.description
    }

    fn input_schema(&self) -> Value {
        self.function.input_schema.clone()
    }

    async fn invoke(&self, arguments: Value) -> Result<Value> {
        self.function.call(arguments)
    }
}

/// Adapter for `native` configs
pub struct NativeFunctionAdapter {
    catalog: Arc<ModuleCatalog>,
}

impl NativeFunctionAdapter {
    pub fn new(catalog: Arc<ModuleCatalog>) -> Self {
        Self { catalog }
    }

    fn build(&self, config: &ToolConfig) -> ToolCreationResult {
        let Some(module_path) = config.module_path.as_deref().filter(|p| !p.is_empty()) else {
            return ToolCreationResult::failed(
                config,
                format!("Tool config '{}' is missing required field 'module_path'", config.id),
            );
        };

        let Some(module) = self.catalog.module(module_path) else {
            let err = ToolhostError::Resolution(format!("Native module '{}' not found", module_path));
            return ToolCreationResult::failed(config, err.to_string());
        };

        let mut result = ToolCreationResult::default();

        if !config.has_allow_list() {
            for function in module.functions() {
                result.found_functions.push(function.name.clone());
                result.tools.push(Box::new(NativeTool {
                    function: function.clone(),
                }));
            }
            return result;
        }

        result.requested_functions = config.requested_functions();
        for spec in &result.requested_functions {
            let dotted = format!("{}.{}", module_path, spec);
            match self.catalog.resolve(&dotted) {
                Some(function) => {
                    result.found_functions.push(spec.clone());
                    result.tools.push(Box::new(NativeTool {
                        function: function.clone(),
                    }));
                }
                None => {
                    log::warn!("Function '{}' not found for tool config '{}'", dotted, config.id);
                    result.missing_functions.push(spec.clone());
                }
            }
        }
        result
    }
}

#[async_trait]
impl ToolAdapter for NativeFunctionAdapter {
    async fn create(&self, config: &ToolConfig, _resources: &mut ResourceStack) -> Result<ToolCreationResult> {
        Ok(self.build(config))
    }
}

fn path_argument(arguments: &Value) -> Result<&Path> {
    arguments
        .get("path")
        .and_then(Value::as_str)
        .map(Path::new)
        .ok_or_else(|| ToolhostError::Config("missing string argument 'path'".to_string()))
}

fn path_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "path": {"type": "string", "description": description}
        },
        "required": ["path"]
    })
}

fn fs_path_module() -> NativeModule {
    let schema = path_schema("Filesystem path");
    NativeModule::new("fs.path")
        .with_function(
            NativeFunction::new("exists", "Check whether a path exists", |args| {
                Ok(json!(path_argument(&args)?.exists()))
            })
            .with_schema(schema.clone()),
        )
        .with_function(
            NativeFunction::new("is_file", "Check whether a path is a regular file", |args| {
                Ok(json!(path_argument(&args)?.is_file()))
            })
            .with_schema(schema.clone()),
        )
        .with_function(
            NativeFunction::new("is_dir", "Check whether a path is a directory", |args| {
                Ok(json!(path_argument(&args)?.is_dir()))
            })
            .with_schema(schema.clone()),
        )
        .with_function(
            NativeFunction::new("file_name", "Final component of a path", |args| {
                let name = path_argument(&args)?.file_name().map(|n| n.to_string_lossy().into_owned());
                Ok(json!(name))
            })
            .with_schema(schema.clone()),
        )
        .with_function(
            NativeFunction::new("parent", "Parent directory of a path", |args| {
                let parent = path_argument(&args)?.parent().map(|p| p.to_string_lossy().into_owned());
                Ok(json!(parent))
            })
            .with_schema(schema),
        )
}
