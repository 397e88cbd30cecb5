//! # Módulo de Códigos de Erro Estruturados
//!
//! Define a taxonomia de erros do motor de expressões e de validação/extração,
//! junto com códigos estáveis para integração com CI/CD e relatórios.
//!
//! ## Para todos entenderem:
//!
//! Quando uma expectativa falha, este módulo diz exatamente o que aconteceu:
//! uma variável não definida, uma função desconhecida, um caminho que não
//! existe na mensagem ou um valor diferente do esperado.
//!
//! ## Categorias de Erro
//!
//! | Faixa  | Categoria       | Descrição                              |
//! |--------|-----------------|----------------------------------------|
//! | E1xxx  | Expressão       | Sintaxe ou variável da expressão       |
//! | E2xxx  | Função          | Função desconhecida ou mal utilizada   |
//! | E3xxx  | Assertion       | Localização ausente ou valor diferente |
//! | E4xxx  | Configuração    | Biblioteca, suíte ou documento inválido |
//! | E5xxx  | Interno         | Bug no próprio Runner                  |
//!
//! ## Exemplo:
//!
//! ```text
//! [E3001] validate-body '//root/element/sub-elementA': Validação falhou em '//root/element/sub-elementA': esperado 'x', obtido 'text-value'
//! ```

use std::fmt;
use std::num::ParseFloatError;

use thiserror::Error;

use crate::engine::Mode;
use crate::locator::LocationKind;

// ============================================================================
// CÓDIGO DE ERRO
// ============================================================================

/// Código de erro estruturado com categoria e número.
///
/// O código é um número de 4 dígitos onde:
/// - Primeiro dígito: categoria (1-5)
/// - Últimos 3 dígitos: erro específico (001-999)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(u16);

impl ErrorCode {
    // ========================================================================
    // E1xxx: Expressões
    // ========================================================================

    /// Variável referenciada com `${nome}` não está no contexto.
    pub const UNDEFINED_VARIABLE: Self = Self(1001);

    /// Expressão com sintaxe inválida (aspas ou parênteses sem fechamento).
    pub const MALFORMED_EXPRESSION: Self = Self(1002);

    /// Chamadas de função aninhadas além do limite configurado.
    pub const EXPRESSION_TOO_DEEP: Self = Self(1003);

    /// Nome da variável de destino de uma extração é inválido.
    pub const INVALID_TARGET_VARIABLE: Self = Self(1004);

    // ========================================================================
    // E2xxx: Funções
    // ========================================================================

    /// Prefixo de biblioteca ou nome de função não registrado.
    pub const UNKNOWN_FUNCTION: Self = Self(2001);

    /// Quantidade ou formato de argumentos inválido.
    pub const INVALID_FUNCTION_USAGE: Self = Self(2002);

    /// Argumento numérico não pôde ser convertido.
    pub const NUMERIC_PARSE: Self = Self(2003);

    // ========================================================================
    // E3xxx: Assertions
    // ========================================================================

    /// Valor na localização difere do esperado.
    pub const VALIDATION_FAILURE: Self = Self(3001);

    /// Caminho no body não encontrou nenhum nó.
    pub const BODY_LOCATION_NOT_FOUND: Self = Self(3002);

    /// Header não existe na mensagem.
    pub const HEADER_NOT_FOUND: Self = Self(3003);

    /// Expressão XPath com sintaxe inválida.
    pub const INVALID_PATH: Self = Self(3004);

    // ========================================================================
    // E4xxx: Configuração
    // ========================================================================

    /// Payload da mensagem não é XML válido.
    pub const MALFORMED_DOCUMENT: Self = Self(4001);

    /// Duas bibliotecas com o mesmo prefixo.
    pub const DUPLICATE_PREFIX: Self = Self(4002);

    // ========================================================================
    // E5xxx: Erros Internos
    // ========================================================================

    /// Erro interno inesperado.
    pub const INTERNAL_ERROR: Self = Self(5001);

    // ========================================================================
    // MÉTODOS
    // ========================================================================

    /// Retorna o código numérico.
    pub fn code(&self) -> u16 {
        self.0
    }

    /// Retorna o código formatado com prefixo "E".
    ///
    /// Exemplo: ErrorCode::UNDEFINED_VARIABLE.formatted() == "E1001"
    pub fn formatted(&self) -> String {
        format!("E{:04}", self.0)
    }

    /// Retorna a categoria do erro baseado no primeiro dígito.
    pub fn category(&self) -> ErrorCategory {
        match self.0 / 1000 {
            1 => ErrorCategory::Expression,
            2 => ErrorCategory::Function,
            3 => ErrorCategory::Assertion,
            4 => ErrorCategory::Configuration,
            5 => ErrorCategory::Internal,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Retorna uma descrição curta do erro.
    pub fn description(&self) -> &'static str {
        match self.0 {
            1001 => "Variável não definida",
            1002 => "Expressão malformada",
            1003 => "Expressão aninhada demais",
            1004 => "Variável de destino inválida",
            2001 => "Função desconhecida",
            2002 => "Uso inválido de função",
            2003 => "Argumento não numérico",
            3001 => "Validação falhou",
            3002 => "Localização não encontrada no body",
            3003 => "Header não encontrado",
            3004 => "XPath inválido",
            4001 => "Documento XML inválido",
            4002 => "Prefixo de biblioteca duplicado",
            5001 => "Erro interno",
            _ => "Erro desconhecido",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

// ============================================================================
// CATEGORIA DE ERRO
// ============================================================================

/// Categoria de erro baseada no primeiro dígito do código.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Erros de expressão (E1xxx).
    Expression,
    /// Erros de função (E2xxx).
    Function,
    /// Erros de assertion (E3xxx).
    Assertion,
    /// Erros de configuração (E4xxx).
    Configuration,
    /// Erros internos (E5xxx).
    Internal,
    /// Código fora das faixas conhecidas.
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expression => write!(f, "Expressão"),
            Self::Function => write!(f, "Função"),
            Self::Assertion => write!(f, "Assertion"),
            Self::Configuration => write!(f, "Configuração"),
            Self::Internal => write!(f, "Interno"),
            Self::Unknown => write!(f, "Desconhecido"),
        }
    }
}

// ============================================================================
// TIPOS DE ERRO
// ============================================================================

/// Erros do motor de resolução e de validação/extração.
///
/// Cada variante representa um tipo específico de problema.
/// O atributo `#[error(...)]` define a mensagem que será exibida.
#[derive(Debug, Error)]
pub enum EngineError {
    /// `${nome}` usado mas `nome` nunca foi definido nem extraído.
    #[error("Variável '{name}' não definida no contexto")]
    UndefinedVariable { name: String },

    /// Prefixo ou função não registrados.
    #[error("Função desconhecida '{prefix}:{name}'")]
    UnknownFunction { prefix: String, name: String },

    /// Pré-condição de argumentos da função violada.
    #[error("Uso inválido da função '{function}': {message}")]
    InvalidFunctionUsage { function: String, message: String },

    /// Argumento que deveria ser numérico não é, ou não é finito (`NaN`, `inf`).
    #[error("Argumento '{value}' da função '{function}' não é numérico")]
    NumericParse {
        function: String,
        value: String,
        #[source]
        source: Option<ParseFloatError>,
    },

    /// Caminho do body ou nome de header sem correspondência.
    #[error("Localização '{location}' não encontrada no {kind}")]
    LocationNotFound { kind: LocationKind, location: String },

    /// Valor real diferente do esperado.
    #[error("Validação falhou em '{location}': esperado '{expected}', obtido '{actual}'")]
    ValidationFailure {
        location: String,
        expected: String,
        actual: String,
    },

    /// Sintaxe inválida na expressão.
    #[error("Expressão malformada '{expression}' (posição {position}): {message}")]
    MalformedExpression {
        expression: String,
        position: usize,
        message: String,
    },

    /// Aninhamento de chamadas acima do limite.
    #[error("Expressão '{expression}' excede a profundidade máxima de {limit} chamadas aninhadas")]
    ExpressionTooDeep { expression: String, limit: usize },

    /// XPath com sintaxe não suportada.
    #[error("XPath inválido '{path}': {message}")]
    InvalidPath { path: String, message: String },

    /// Payload não é XML bem formado.
    #[error("Documento XML inválido: {0}")]
    MalformedDocument(#[from] roxmltree::Error),

    /// Destino de extração vazio ou com caracteres inválidos.
    #[error("Nome de variável de destino inválido '{0}'")]
    InvalidTargetVariable(String),

    /// Prefixo de biblioteca registrado duas vezes.
    #[error("Biblioteca com prefixo '{0}' já registrada")]
    DuplicatePrefix(String),
}

impl EngineError {
    /// Código estruturado correspondente à variante.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UndefinedVariable { .. } => ErrorCode::UNDEFINED_VARIABLE,
            Self::UnknownFunction { .. } => ErrorCode::UNKNOWN_FUNCTION,
            Self::InvalidFunctionUsage { .. } => ErrorCode::INVALID_FUNCTION_USAGE,
            Self::NumericParse { .. } => ErrorCode::NUMERIC_PARSE,
            Self::LocationNotFound { kind: LocationKind::Body, .. } => {
                ErrorCode::BODY_LOCATION_NOT_FOUND
            }
            Self::LocationNotFound { kind: LocationKind::Header, .. } => {
                ErrorCode::HEADER_NOT_FOUND
            }
            Self::ValidationFailure { .. } => ErrorCode::VALIDATION_FAILURE,
            Self::MalformedExpression { .. } => ErrorCode::MALFORMED_EXPRESSION,
            Self::ExpressionTooDeep { .. } => ErrorCode::EXPRESSION_TOO_DEEP,
            Self::InvalidPath { .. } => ErrorCode::INVALID_PATH,
            Self::MalformedDocument(_) => ErrorCode::MALFORMED_DOCUMENT,
            Self::InvalidTargetVariable(_) => ErrorCode::INVALID_TARGET_VARIABLE,
            Self::DuplicatePrefix(_) => ErrorCode::DUPLICATE_PREFIX,
        }
    }

    /// Atalho para `InvalidFunctionUsage`.
    pub fn usage(function: &str, message: impl Into<String>) -> Self {
        Self::InvalidFunctionUsage {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

// ============================================================================
// FALHA DE ENTRADA
// ============================================================================

/// Primeira falha de um mapa de expectativas, com contexto completo.
///
/// Identifica o modo, a expressão de localização e a expressão de valor
/// da entrada que falhou, além da causa original.
#[derive(Debug, Error)]
#[error("[{}] {mode} '{location}': {cause}", .cause.code())]
pub struct EntryFailure {
    /// Modo do mapa onde a entrada estava.
    pub mode: Mode,
    /// Expressão de localização como escrita (não resolvida).
    pub location: String,
    /// Expressão de valor como escrita (não resolvida).
    pub expression: String,
    /// Causa original.
    #[source]
    pub cause: EngineError,
}

impl EntryFailure {
    pub fn new(
        mode: Mode,
        location: impl Into<String>,
        expression: impl Into<String>,
        cause: EngineError,
    ) -> Self {
        Self {
            mode,
            location: location.into(),
            expression: expression.into(),
            cause,
        }
    }

    /// Código estruturado da causa.
    pub fn code(&self) -> ErrorCode {
        self.cause.code()
    }
}
