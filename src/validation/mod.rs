//! # Módulo de Validação de Suítes
//!
//! Valida suítes antes da execução para encontrar erros de escrita sem
//! precisar de nenhuma mensagem.
//!
//! ## Para todos entenderem:
//!
//! Uma expressão como `citrus:concat('a'` (sem parêntese de fechamento) ou
//! `lib:custom(...)` sem a biblioteca `lib` registrada só falharia no meio
//! da execução. Este módulo lê todas as expressões da suíte antes e
//! reporta TODOS os problemas de uma vez.
//!
//! ## Validações realizadas:
//!
//! 1. **spec_version**: versão do formato suportada
//! 2. **Suíte não vazia**: pelo menos um caso
//! 3. **IDs de caso**: não vazios e únicos
//! 4. **Bibliotecas**: prefixo válido e único, aliases apontando para o catálogo
//! 5. **Expressões**: sintaxe válida e funções conhecidas, nos dois lados de cada entrada
//! 6. **XPath**: caminhos fixos de body com sintaxe suportada
//! 7. **Limites**: número de casos e tamanho dos mapas
//!
//! ## Exemplo de uso:
//!
//! ```ignore
//! let suite = loader::load_suite_from_file("suite.json")?;
//!
//! match validate_suite(&suite, &ExecutionLimits::default()) {
//!     Ok(()) => println!("Suíte válida!"),
//!     Err(errors) => {
//!         for err in errors {
//!             eprintln!("Erro: {}", err);
//!         }
//!     }
//! }
//! ```

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::engine::Mode;
use crate::expression::{FunctionCall, Parser, Template};
use crate::functions::{builtin, FunctionRegistry};
use crate::limits::{validate_limits, ExecutionLimits};
use crate::locator::{LocationKind, XPath};
use crate::protocol::{LibraryConfig, Suite, TestCase};

// ============================================================================
// TIPOS DE ERRO
// ============================================================================

/// Problemas encontrados na suíte antes da execução.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Suíte com spec_version '{version}' não suportada. Versão esperada: {expected}")]
    UnsupportedSpecVersion { version: String, expected: String },

    #[error("Suíte vazia: nenhum caso definido")]
    EmptySuite,

    #[error("Caso #{index}: ID vazio não é permitido")]
    EmptyCaseId { index: usize },

    #[error("Caso '{case_id}': ID duplicado")]
    DuplicateCaseId { case_id: String },

    #[error("Biblioteca '{library}': prefixo '{prefix}' inválido")]
    InvalidPrefix { library: String, prefix: String },

    #[error("Biblioteca '{library}': prefixo '{prefix}' já usado por outra biblioteca")]
    DuplicatePrefix { library: String, prefix: String },

    #[error("Biblioteca '{library}': alias '{alias}' aponta para função desconhecida '{target}'")]
    UnknownBuiltin {
        library: String,
        alias: String,
        target: String,
    },

    #[error("Caso '{case_id}' ({mode}): expressão inválida em '{location}': {message}")]
    InvalidExpression {
        case_id: String,
        mode: Mode,
        location: String,
        message: String,
    },

    #[error("Caso '{case_id}' ({mode}): função '{function}' não registrada")]
    UnknownFunction {
        case_id: String,
        mode: Mode,
        function: String,
    },

    #[error("Caso '{case_id}' ({mode}): {message}")]
    InvalidPath {
        case_id: String,
        mode: Mode,
        message: String,
    },

    #[error("Limite excedido: {message}")]
    LimitExceeded { message: String },
}

// ============================================================================
// CONSTANTES
// ============================================================================

/// Versão do formato de suíte suportada pelo Runner.
pub const SUPPORTED_SPEC_VERSION: &str = "0.1";

/// Prefixo de biblioteca: começa com letra, segue com letras, dígitos, `_`, `-` ou `.`.
static PREFIX_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_.\-]*$").expect("valid prefix regex")
});

pub type ValidationResult = Result<(), Vec<ValidationError>>;

// ============================================================================
// FUNÇÃO PRINCIPAL DE VALIDAÇÃO
// ============================================================================

/// Valida uma suíte completa, coletando TODOS os erros encontrados.
pub fn validate_suite(suite: &Suite, limits: &ExecutionLimits) -> ValidationResult {
    let mut errors = Vec::new();

    if suite.spec_version != SUPPORTED_SPEC_VERSION {
        errors.push(ValidationError::UnsupportedSpecVersion {
            version: suite.spec_version.clone(),
            expected: SUPPORTED_SPEC_VERSION.to_string(),
        });
    }

    if suite.cases.is_empty() {
        errors.push(ValidationError::EmptySuite);
        return Err(errors);
    }

    let largest_map = suite
        .cases
        .iter()
        .map(|case| case.expectations.largest_map())
        .max()
        .unwrap_or(0);
    let limit_check = validate_limits(suite.cases.len(), largest_map, limits);
    errors.extend(
        limit_check
            .violations
            .into_iter()
            .map(|v| ValidationError::LimitExceeded { message: v.message }),
    );

    let registry = validate_libraries(&suite.config.function_libraries, &mut errors);

    let mut seen_ids = HashSet::new();
    for (index, case) in suite.cases.iter().enumerate() {
        if case.id.trim().is_empty() {
            errors.push(ValidationError::EmptyCaseId { index });
        } else if !seen_ids.insert(case.id.as_str()) {
            errors.push(ValidationError::DuplicateCaseId {
                case_id: case.id.clone(),
            });
        }
        validate_case(case, &registry, limits, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ============================================================================
// BIBLIOTECAS
// ============================================================================

/// Valida as bibliotecas e devolve o registry com as que puderam ser montadas.
fn validate_libraries(libraries: &[LibraryConfig], errors: &mut Vec<ValidationError>) -> FunctionRegistry {
    let mut registry = FunctionRegistry::with_core();

    for config in libraries {
        let prefix = config.prefix.trim_end_matches(':');
        if !PREFIX_PATTERN.is_match(prefix) {
            errors.push(ValidationError::InvalidPrefix {
                library: config.name.clone(),
                prefix: config.prefix.clone(),
            });
            continue;
        }

        for (alias, target) in &config.functions {
            if builtin::builtin(target).is_none() {
                errors.push(ValidationError::UnknownBuiltin {
                    library: config.name.clone(),
                    alias: alias.clone(),
                    target: target.clone(),
                });
            }
        }

        if registry.has_prefix(prefix) {
            errors.push(ValidationError::DuplicatePrefix {
                library: config.name.clone(),
                prefix: prefix.to_string(),
            });
            continue;
        }

        // Aliases inválidos já foram reportados; o resto da biblioteca segue valendo.
        let valid = LibraryConfig {
            functions: config
                .functions
                .iter()
                .filter(|(_, target)| builtin::builtin(target).is_some())
                .map(|(alias, target)| (alias.clone(), target.clone()))
                .collect(),
            ..config.clone()
        };
        if let Ok(library) = valid.build() {
            // Prefixo já conferido acima.
            let _ = registry.register(library);
        }
    }

    registry
}

// ============================================================================
// CASOS
// ============================================================================

fn validate_case(
    case: &TestCase,
    registry: &FunctionRegistry,
    limits: &ExecutionLimits,
    errors: &mut Vec<ValidationError>,
) {
    for (mode, location, value) in case.expectations.entries() {
        let Some(location_template) = check_expression(case, mode, location, location, registry, limits, errors)
        else {
            continue;
        };

        check_expression(case, mode, location, value, registry, limits, errors);

        if mode.kind() == LocationKind::Body && location_template.is_literal() {
            if let Err(e) = XPath::parse(location) {
                errors.push(ValidationError::InvalidPath {
                    case_id: case.id.clone(),
                    mode,
                    message: e.to_string(),
                });
            }
        }
    }
}

/// Faz o parse de uma expressão e confere se todas as funções chamadas existem.
fn check_expression(
    case: &TestCase,
    mode: Mode,
    location: &str,
    expression: &str,
    registry: &FunctionRegistry,
    limits: &ExecutionLimits,
    errors: &mut Vec<ValidationError>,
) -> Option<Template> {
    let template = match Parser::new(expression, limits).parse() {
        Ok(template) => template,
        Err(e) => {
            errors.push(ValidationError::InvalidExpression {
                case_id: case.id.clone(),
                mode,
                location: location.to_string(),
                message: e.to_string(),
            });
            return None;
        }
    };

    template.visit_calls(&mut |call: &FunctionCall| {
        if registry.lookup(&call.prefix, &call.name).is_err() {
            errors.push(ValidationError::UnknownFunction {
                case_id: case.id.clone(),
                mode,
                function: format!("{}:{}", call.prefix, call.name),
            });
        }
    });

    Some(template)
}

// ============================================================================
// TESTES
// ============================================================================
