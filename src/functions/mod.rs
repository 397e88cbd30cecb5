// Module: Functions
// Prefix-addressed libraries of string functions callable from expressions.

pub mod builtin;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::errors::EngineError;

/// Prefix of the library every registry starts with.
pub const CORE_PREFIX: &str = "citrus";

/// Contract for any function callable as `prefix:name(args)`.
///
/// Arguments arrive fully resolved. Implementations may read the context
/// but never mutate its bindings.
pub trait Function: Send + Sync {
    fn execute(&self, args: &[String], context: &Context) -> Result<String, EngineError>;
}

impl<F> Function for F
where
    F: Fn(&[String], &Context) -> Result<String, EngineError> + Send + Sync,
{
    fn execute(&self, args: &[String], context: &Context) -> Result<String, EngineError> {
        self(args, context)
    }
}

/// A named set of functions sharing one prefix.
#[derive(Clone)]
pub struct FunctionLibrary {
    name: String,
    prefix: String,
    members: HashMap<String, Arc<dyn Function>>,
}

impl FunctionLibrary {
    /// Creates an empty library. A trailing `:` on the prefix is dropped.
    pub fn new(name: impl Into<String>, prefix: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.as_ref().trim_end_matches(':').to_string(),
            members: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Adds or replaces a function.
    pub fn register(&mut self, name: impl Into<String>, function: Arc<dyn Function>) {
        self.members.insert(name.into(), function);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_function(mut self, name: impl Into<String>, function: impl Function + 'static) -> Self {
        self.register(name, Arc::new(function));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Function>> {
        self.members.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Member names, sorted.
    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.members.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl fmt::Debug for FunctionLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionLibrary")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("members", &self.function_names())
            .finish()
    }
}

/// Libraries visible to a context, keyed by prefix.
///
/// Stateless once built, so one registry can be shared through an `Arc`
/// by any number of contexts.
#[derive(Debug, Default, Clone)]
pub struct FunctionRegistry {
    libraries: HashMap<String, FunctionLibrary>,
}

impl FunctionRegistry {
    /// Registry with no libraries at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding only the core library.
    pub fn with_core() -> Self {
        let mut registry = Self::new();
        registry.libraries.insert(CORE_PREFIX.to_string(), builtin::core_library());
        registry
    }

    /// Adds a library. Prefixes must be unique.
    pub fn register(&mut self, library: FunctionLibrary) -> Result<(), EngineError> {
        if self.libraries.contains_key(library.prefix()) {
            return Err(EngineError::DuplicatePrefix(library.prefix().to_string()));
        }
        tracing::debug!(
            library = %library.name(),
            prefix = %library.prefix(),
            functions = library.len(),
            "Function library registered"
        );
        self.libraries.insert(library.prefix().to_string(), library);
        Ok(())
    }

    pub fn library(&self, prefix: &str) -> Option<&FunctionLibrary> {
        self.libraries.get(prefix)
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.libraries.contains_key(prefix)
    }

    /// Finds `prefix:name`, failing with `UnknownFunction` when either part is missing.
    pub fn lookup(&self, prefix: &str, name: &str) -> Result<&Arc<dyn Function>, EngineError> {
        self.libraries
            .get(prefix)
            .and_then(|library| library.get(name))
            .ok_or_else(|| EngineError::UnknownFunction {
                prefix: prefix.to_string(),
                name: name.to_string(),
            })
    }

    /// Registered prefixes, sorted.
    pub fn prefixes(&self) -> Vec<&str> {
        let mut prefixes: Vec<&str> = self.libraries.keys().map(String::as_str).collect();
        prefixes.sort_unstable();
        prefixes
    }
}
