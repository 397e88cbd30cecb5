//! # Módulo de Protocolo - Formato das Suítes e Relatórios
//!
//! Estruturas serde do arquivo de suíte (entrada do Runner) e do
//! relatório de execução (saída).
//!
//! ## Exemplo de suíte:
//!
//! ```json
//! {
//!   "spec_version": "0.1",
//!   "meta": { "id": "hello", "name": "Hello service" },
//!   "config": {
//!     "variables": { "letter": "B" },
//!     "function_libraries": [
//!       { "name": "functionLib", "prefix": "lib", "functions": { "randomNr": "randomNumber" } }
//!     ]
//!   },
//!   "cases": [
//!     {
//!       "id": "greeting",
//!       "message": { "payload": "<root>...</root>", "headers": { "operation": "sayHello" } },
//!       "validate_body": { "//root/element": "${expected}" },
//!       "extract_header": { "operation": "${operation}" }
//!     }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::{EntryResult, Expectations};
use crate::errors::EngineError;
use crate::functions::{builtin, FunctionLibrary, FunctionRegistry, CORE_PREFIX};
use crate::message::Message;

// ============================================================================
// SUÍTE
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Suite {
    pub spec_version: String,
    pub meta: Meta,
    #[serde(default)]
    pub config: SuiteConfig,
    pub cases: Vec<TestCase>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Meta {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SuiteConfig {
    /// Variáveis pré-definidas; strings entram como estão, o resto como texto JSON.
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    /// Bibliotecas extras, montadas a partir do catálogo embutido.
    #[serde(default)]
    pub function_libraries: Vec<LibraryConfig>,
}

/// Biblioteca declarada na suíte: cada alias aponta para uma função do catálogo.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryConfig {
    pub name: String,
    pub prefix: String,
    #[serde(default)]
    pub functions: IndexMap<String, String>,
}

impl LibraryConfig {
    /// Monta a biblioteca; alias para função fora do catálogo falha com `UnknownFunction`.
    pub fn build(&self) -> Result<FunctionLibrary, EngineError> {
        let mut library = FunctionLibrary::new(&self.name, &self.prefix);
        for (alias, target) in &self.functions {
            let function = builtin::builtin(target).ok_or_else(|| EngineError::UnknownFunction {
                prefix: CORE_PREFIX.to_string(),
                name: target.clone(),
            })?;
            library.register(alias, function);
        }
        Ok(library)
    }
}

impl SuiteConfig {
    /// Registry com a biblioteca principal mais as bibliotecas da suíte.
    pub fn build_registry(&self) -> Result<FunctionRegistry, EngineError> {
        let mut registry = FunctionRegistry::with_core();
        for library in &self.function_libraries {
            registry.register(library.build()?)?;
        }
        Ok(registry)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestCase {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub message: MessageSource,
    #[serde(flatten)]
    pub expectations: Expectations,
}

/// Mensagem de um caso. `payload_file` é relativo ao arquivo da suíte e
/// é carregado pelo loader.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MessageSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_file: Option<PathBuf>,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

impl MessageSource {
    pub fn to_message(&self) -> Message {
        Message {
            payload: self.payload.clone().unwrap_or_default(),
            headers: self.headers.clone(),
        }
    }
}

// ============================================================================
// RELATÓRIO
// ============================================================================

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Passed,
    Failed,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaseResult {
    pub case_id: String,
    pub status: CaseStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<EntryResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExecutionReport {
    pub execution_id: String,
    pub suite_id: String,
    pub status: CaseStatus,
    pub start_time: String,
    pub end_time: String,
    pub cases: Vec<CaseResult>,
    /// Variáveis ao fim da execução, ordenadas por nome.
    pub variables: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: &str = r#"{
        "spec_version": "0.1",
        "meta": { "id": "suite", "name": "Variable support" },
        "config": {
            "variables": { "letter": "B", "count": 3 },
            "function_libraries": [
                { "name": "functionLib", "prefix": "lib", "functions": { "randomNr": "randomNumber", "concat": "concat" } }
            ]
        },
        "cases": [
            {
                "id": "case-1",
                "message": { "payload": "<root/>", "headers": { "operation": "sayHello" } },
                "validate_header": { "operation": "sayHello" },
                "extract_header": { "operation": "${op}" }
            }
        ]
    }"#;

    #[test]
    fn test_parse_suite() {
        let suite: Suite = serde_json::from_str(SUITE).unwrap();
        assert_eq!(suite.meta.id, "suite");
        assert_eq!(suite.cases.len(), 1);

        let case = &suite.cases[0];
        assert_eq!(case.expectations.validate_header.len(), 1);
        assert_eq!(case.expectations.extract_header["operation"], "${op}");
        assert!(case.expectations.validate_body.is_empty());
        assert_eq!(case.message.to_message().header("operation"), Some("sayHello"));
    }

    #[test]
    fn test_build_registry() {
        let suite: Suite = serde_json::from_str(SUITE).unwrap();
        let registry = suite.config.build_registry().unwrap();

        assert_eq!(registry.prefixes(), vec![CORE_PREFIX, "lib"]);
        assert!(registry.lookup("lib", "randomNr").is_ok());
        assert!(registry.lookup("lib", "randomNumber").is_err());
    }

    #[test]
    fn test_build_registry_errors() {
        let unknown = SuiteConfig {
            function_libraries: vec![LibraryConfig {
                name: "broken".to_string(),
                prefix: "b".to_string(),
                functions: [("x".to_string(), "doesNotExist".to_string())].into_iter().collect(),
            }],
            ..Default::default()
        };
        assert!(matches!(
            unknown.build_registry(),
            Err(EngineError::UnknownFunction { name, .. }) if name == "doesNotExist"
        ));

        let duplicate = SuiteConfig {
            function_libraries: vec![LibraryConfig {
                name: "shadow".to_string(),
                prefix: CORE_PREFIX.to_string(),
                functions: IndexMap::new(),
            }],
            ..Default::default()
        };
        assert!(matches!(duplicate.build_registry(), Err(EngineError::DuplicatePrefix(_))));
    }

    #[test]
    fn test_case_status_serialization() {
        assert_eq!(serde_json::to_string(&CaseStatus::Passed).unwrap(), "\"passed\"");
        assert_eq!(serde_json::to_string(&CaseStatus::Failed).unwrap(), "\"failed\"");
    }
}
