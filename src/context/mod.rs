// Module: Context
// Holds the variable bindings of one test execution and the function libraries it can call.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::EngineError;
use crate::expression::{Parser, Part};
use crate::functions::FunctionRegistry;
use crate::limits::ExecutionLimits;

/// Execution state of one test: variables plus a shared view of the function registry.
///
/// A context is owned by exactly one execution. The registry is shared
/// read-only, so parallel executions clone the `Arc` and keep their own
/// bindings.
#[derive(Debug, Clone)]
pub struct Context {
    pub variables: HashMap<String, String>,
    functions: Arc<FunctionRegistry>,
    limits: ExecutionLimits,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Arc::new(FunctionRegistry::with_core()))
    }
}

impl Context {
    /// Creates an empty context over the given registry.
    pub fn new(functions: Arc<FunctionRegistry>) -> Self {
        Self {
            variables: HashMap::new(),
            functions,
            limits: ExecutionLimits::default(),
        }
    }

    /// Replaces the limits applied while parsing expressions.
    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Binds a variable, overwriting any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Bulk insert of variables.
    pub fn extend(&mut self, entries: &HashMap<String, String>) {
        for (k, v) in entries {
            self.variables.insert(k.clone(), v.clone());
        }
    }

    /// Binds JSON configuration values. Strings bind verbatim, other values as JSON text.
    pub fn extend_json(&mut self, entries: &HashMap<String, Value>) {
        for (k, v) in entries {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            self.variables.insert(k.clone(), value);
        }
    }

    /// Retrieves a variable from the context.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    /// Retrieves a variable, failing with `UndefinedVariable` when unbound.
    pub fn variable(&self, key: &str) -> Result<&str, EngineError> {
        self.get(key).ok_or_else(|| EngineError::UndefinedVariable {
            name: key.to_string(),
        })
    }

    /// Resolves every `${name}` and `prefix:fn(...)` token in `input`.
    pub fn resolve(&self, input: &str) -> Result<String, EngineError> {
        let template = Parser::new(input, &self.limits).parse()?;
        template.evaluate(self)
    }

    /// Name of the variable an extraction writes into.
    ///
    /// A value side that is exactly one `${name}` token targets `name` itself
    /// and is not resolved. Anything else is resolved and its text is the name.
    pub fn target_variable(&self, expression: &str) -> Result<String, EngineError> {
        let template = Parser::new(expression.trim(), &self.limits).parse()?;
        let name = match template.parts() {
            [Part::Variable(name)] => name.clone(),
            _ => template.evaluate(self)?.trim().to_string(),
        };

        if name.is_empty() || name.contains(['$', '{', '}']) {
            return Err(EngineError::InvalidTargetVariable(name));
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_overwrites() {
        let mut ctx = Context::default();
        ctx.set("variable", "initial");
        ctx.set("variable", "text-value");
        assert_eq!(ctx.get("variable"), Some("text-value"));
    }

    #[test]
    fn test_extend_json_stringifies_primitives() {
        let mut ctx = Context::default();
        let mut entries = HashMap::new();
        entries.insert("name".to_string(), json!("text"));
        entries.insert("count".to_string(), json!(42));
        entries.insert("enabled".to_string(), json!(true));
        ctx.extend_json(&entries);

        assert_eq!(ctx.get("name"), Some("text"));
        assert_eq!(ctx.get("count"), Some("42"));
        assert_eq!(ctx.get("enabled"), Some("true"));
    }

    #[test]
    fn test_variable_missing() {
        let ctx = Context::default();
        assert!(matches!(
            ctx.variable("missing"),
            Err(EngineError::UndefinedVariable { name }) if name == "missing"
        ));
    }

    #[test]
    fn test_target_variable_from_bare_token() {
        let mut ctx = Context::default();
        ctx.set("variableA", "initial");
        assert_eq!(ctx.target_variable("${variableA}").unwrap(), "variableA");
        assert_eq!(ctx.target_variable(" ${unbound} ").unwrap(), "unbound");
    }

    #[test]
    fn test_target_variable_resolved() {
        let mut ctx = Context::default();
        ctx.set("suffix", "A");
        assert_eq!(ctx.target_variable("captured").unwrap(), "captured");
        assert_eq!(
            ctx.target_variable("citrus:concat('variable', ${suffix})").unwrap(),
            "variableA"
        );
        assert!(matches!(
            ctx.target_variable("   "),
            Err(EngineError::InvalidTargetVariable(_))
        ));
    }

    #[test]
    fn test_contexts_share_registry() {
        let registry = Arc::new(FunctionRegistry::with_core());
        let mut first = Context::new(Arc::clone(&registry));
        let second = Context::new(Arc::clone(&registry));

        first.set("only_here", "1");
        assert!(second.get("only_here").is_none());
        assert!(second.functions().has_prefix("citrus"));
    }
}
