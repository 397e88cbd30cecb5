//! # Módulo de Limites de Execução
//!
//! Define limites para proteger o Runner contra suítes malformadas:
//! expressões gigantes, aninhamento sem fim de funções ou suítes enormes.
//!
//! ## Para todos entenderem:
//!
//! Uma expressão como `a:f(a:f(a:f(...)))` com milhares de níveis faria o
//! parser recursivo estourar a pilha. Em vez disso, o parser para no limite
//! configurado e devolve um erro claro.
//!
//! ## Limites configuráveis:
//!
//! | Limite                | Padrão | Descrição                               |
//! |-----------------------|--------|-----------------------------------------|
//! | max_cases             | 100    | Máximo de casos por suíte               |
//! | max_entries_per_map   | 200    | Máximo de entradas por mapa             |
//! | max_expression_depth  | 32     | Máximo de chamadas aninhadas            |
//! | max_expression_length | 8192   | Tamanho máximo de uma expressão (bytes) |

use serde::{Deserialize, Serialize};

// ============================================================================
// LIMITES PADRÃO (CONSTANTES)
// ============================================================================

/// Número máximo de casos em uma suíte.
pub const DEFAULT_MAX_CASES: usize = 100;

/// Número máximo de entradas em um único mapa de expectativas.
pub const DEFAULT_MAX_ENTRIES_PER_MAP: usize = 200;

/// Profundidade máxima de chamadas de função aninhadas.
pub const DEFAULT_MAX_EXPRESSION_DEPTH: usize = 32;

/// Tamanho máximo de uma expressão, em bytes.
pub const DEFAULT_MAX_EXPRESSION_LENGTH: usize = 8192;

// ============================================================================
// ESTRUTURA DE LIMITES
// ============================================================================

/// Configuração de limites de execução.
///
/// ## Exemplo de uso:
///
/// ```rust
/// use message_runner::limits::ExecutionLimits;
///
/// let limits = ExecutionLimits {
///     max_expression_depth: 8,
///     ..Default::default()
/// };
/// assert_eq!(limits.max_cases, 100);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Número máximo de casos na suíte.
    pub max_cases: usize,

    /// Número máximo de entradas por mapa de expectativas.
    pub max_entries_per_map: usize,

    /// Profundidade máxima de chamadas aninhadas em uma expressão.
    pub max_expression_depth: usize,

    /// Tamanho máximo, em bytes, de uma expressão.
    pub max_expression_length: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_cases: DEFAULT_MAX_CASES,
            max_entries_per_map: DEFAULT_MAX_ENTRIES_PER_MAP,
            max_expression_depth: DEFAULT_MAX_EXPRESSION_DEPTH,
            max_expression_length: DEFAULT_MAX_EXPRESSION_LENGTH,
        }
    }
}

impl ExecutionLimits {
    /// Cria limites a partir de variáveis de ambiente.
    ///
    /// Variáveis suportadas:
    /// - `RUNNER_MAX_CASES`
    /// - `RUNNER_MAX_ENTRIES_PER_MAP`
    /// - `RUNNER_MAX_EXPRESSION_DEPTH`
    /// - `RUNNER_MAX_EXPRESSION_LENGTH`
    ///
    /// Valores ausentes ou inválidos mantêm o padrão.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut limits = Self::default();
        let read = |key: &str, target: &mut usize| {
            if let Some(n) = lookup(key).and_then(|val| val.trim().parse().ok()) {
                *target = n;
            }
        };

        read("RUNNER_MAX_CASES", &mut limits.max_cases);
        read("RUNNER_MAX_ENTRIES_PER_MAP", &mut limits.max_entries_per_map);
        read("RUNNER_MAX_EXPRESSION_DEPTH", &mut limits.max_expression_depth);
        read("RUNNER_MAX_EXPRESSION_LENGTH", &mut limits.max_expression_length);

        limits
    }

    /// Limites restritivos para testes.
    pub fn strict() -> Self {
        Self {
            max_cases: 10,
            max_entries_per_map: 20,
            max_expression_depth: 4,
            max_expression_length: 512,
        }
    }

    /// Limites permissivos para desenvolvimento.
    pub fn relaxed() -> Self {
        Self {
            max_cases: 1000,
            max_entries_per_map: 2000,
            max_expression_depth: 128,
            max_expression_length: 65536,
        }
    }
}

// ============================================================================
// VALIDAÇÃO DE LIMITES
// ============================================================================

/// Resultado da validação de limites.
#[derive(Debug)]
pub struct LimitValidationResult {
    pub passed: bool,
    pub violations: Vec<LimitViolation>,
}

/// Violação de limite detectada.
#[derive(Debug, Clone)]
pub struct LimitViolation {
    /// Nome do limite violado.
    pub limit_name: String,
    /// Valor máximo permitido.
    pub limit_value: String,
    /// Valor encontrado na suíte.
    pub actual_value: String,
    /// Mensagem descritiva.
    pub message: String,
}

/// Valida o tamanho de uma suíte.
///
/// ## Parâmetros:
/// - `case_count`: Número de casos na suíte
/// - `largest_map`: Maior número de entradas em um mapa de qualquer caso
/// - `limits`: Configuração de limites
pub fn validate_limits(
    case_count: usize,
    largest_map: usize,
    limits: &ExecutionLimits,
) -> LimitValidationResult {
    let mut violations = Vec::new();

    if case_count > limits.max_cases {
        violations.push(LimitViolation {
            limit_name: "max_cases".to_string(),
            limit_value: limits.max_cases.to_string(),
            actual_value: case_count.to_string(),
            message: format!(
                "Suíte tem {} casos, máximo permitido é {}",
                case_count, limits.max_cases
            ),
        });
    }

    if largest_map > limits.max_entries_per_map {
        violations.push(LimitViolation {
            limit_name: "max_entries_per_map".to_string(),
            limit_value: limits.max_entries_per_map.to_string(),
            actual_value: largest_map.to_string(),
            message: format!(
                "Mapa com {} entradas, máximo permitido é {}",
                largest_map, limits.max_entries_per_map
            ),
        });
    }

    LimitValidationResult {
        passed: violations.is_empty(),
        violations,
    }
}

// ============================================================================
// TESTES
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_limits() {
        let limits = ExecutionLimits::default();
        assert_eq!(limits.max_cases, 100);
        assert_eq!(limits.max_expression_depth, 32);
        assert_eq!(limits.max_expression_length, 8192);
    }

    #[test]
    fn test_strict_limits() {
        let limits = ExecutionLimits::strict();
        assert_eq!(limits.max_cases, 10);
        assert_eq!(limits.max_expression_depth, 4);
    }

    #[test]
    fn test_from_lookup_overrides_and_ignores_garbage() {
        let env: HashMap<&str, &str> = [
            ("RUNNER_MAX_CASES", "7"),
            ("RUNNER_MAX_EXPRESSION_DEPTH", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let limits = ExecutionLimits::from_lookup(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(limits.max_cases, 7);
        assert_eq!(limits.max_expression_depth, DEFAULT_MAX_EXPRESSION_DEPTH);
    }

    #[test]
    fn test_validate_limits_ok() {
        let result = validate_limits(50, 20, &ExecutionLimits::default());
        assert!(result.passed);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_validate_limits_cases_exceeded() {
        let result = validate_limits(150, 20, &ExecutionLimits::default());
        assert!(!result.passed);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].limit_name, "max_cases");
    }

    #[test]
    fn test_validate_limits_entries_exceeded() {
        let result = validate_limits(1, 21, &ExecutionLimits::strict());
        assert!(!result.passed);
        assert_eq!(result.violations[0].limit_name, "max_entries_per_map");
    }
}
