//! # Módulo do Motor de Validação e Extração
//!
//! Aplica mapas de expectativas (localização → valor) sobre uma mensagem.
//!
//! ## Para todos entenderem:
//!
//! Cada entrada de um mapa tem dois lados, ambos expressões dinâmicas:
//!
//! ```text
//! "//root/element/sub-elementA"  →  "${variable}"
//!  └── onde olhar                    └── o que esperar (ou onde guardar)
//! ```
//!
//! Os quatro modos:
//!
//! | Modo              | Localização | Lado do valor              |
//! |-------------------|-------------|----------------------------|
//! | `validate-body`   | XPath       | Valor esperado             |
//! | `validate-header` | Nome        | Valor esperado             |
//! | `extract-body`    | XPath       | Variável de destino        |
//! | `extract-header`  | Nome        | Variável de destino        |
//!
//! ## Regras:
//!
//! - Todas as entradas de um mapa são avaliadas; a primeira falha é
//!   devolvida com modo, localização e expressão
//! - Extrações só gravam no contexto depois que o mapa inteiro foi lido,
//!   então nenhuma entrada enxerga o efeito de outra do mesmo mapa
//! - Em extração, `${nome}` sozinho no lado do valor grava em `nome`
//!   (não é resolvido)

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::Context;
use crate::errors::{EngineError, EntryFailure};
use crate::locator::{LocationKind, Locator};
use crate::message::Message;

// ============================================================================
// MODOS E MAPAS
// ============================================================================

/// Mapa de expectativas na ordem em que foi escrito.
pub type ExpectationMap = IndexMap<String, String>;

/// Modo de operação de um mapa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    ValidateBody,
    ValidateHeader,
    ExtractBody,
    ExtractHeader,
}

impl Mode {
    /// Ordem em que `run` aplica os mapas.
    pub const RUN_ORDER: [Mode; 4] = [
        Mode::ValidateBody,
        Mode::ValidateHeader,
        Mode::ExtractHeader,
        Mode::ExtractBody,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidateBody => "validate-body",
            Self::ValidateHeader => "validate-header",
            Self::ExtractBody => "extract-body",
            Self::ExtractHeader => "extract-header",
        }
    }

    /// Superfície da mensagem lida por este modo.
    pub fn kind(&self) -> LocationKind {
        match self {
            Self::ValidateBody | Self::ExtractBody => LocationKind::Body,
            Self::ValidateHeader | Self::ExtractHeader => LocationKind::Header,
        }
    }

    pub fn is_extract(&self) -> bool {
        matches!(self, Self::ExtractBody | Self::ExtractHeader)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Os quatro mapas de um caso; qualquer subconjunto pode estar vazio.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectations {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub validate_body: ExpectationMap,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub validate_header: ExpectationMap,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extract_body: ExpectationMap,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extract_header: ExpectationMap,
}

impl Expectations {
    pub fn map(&self, mode: Mode) -> &ExpectationMap {
        match mode {
            Mode::ValidateBody => &self.validate_body,
            Mode::ValidateHeader => &self.validate_header,
            Mode::ExtractBody => &self.extract_body,
            Mode::ExtractHeader => &self.extract_header,
        }
    }

    pub fn map_mut(&mut self, mode: Mode) -> &mut ExpectationMap {
        match mode {
            Mode::ValidateBody => &mut self.validate_body,
            Mode::ValidateHeader => &mut self.validate_header,
            Mode::ExtractBody => &mut self.extract_body,
            Mode::ExtractHeader => &mut self.extract_header,
        }
    }

    /// Builder: adiciona uma entrada ao mapa do modo.
    pub fn with(mut self, mode: Mode, location: impl Into<String>, value: impl Into<String>) -> Self {
        self.map_mut(mode).insert(location.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        Mode::RUN_ORDER.iter().all(|mode| self.map(*mode).is_empty())
    }

    /// Tamanho do maior mapa.
    pub fn largest_map(&self) -> usize {
        Mode::RUN_ORDER
            .iter()
            .map(|mode| self.map(*mode).len())
            .max()
            .unwrap_or(0)
    }

    /// Todas as entradas como `(modo, localização, valor)`, na ordem de `run`.
    pub fn entries(&self) -> impl Iterator<Item = (Mode, &str, &str)> {
        Mode::RUN_ORDER.into_iter().flat_map(move |mode| {
            self.map(mode)
                .iter()
                .map(move |(location, value)| (mode, location.as_str(), value.as_str()))
        })
    }
}

// ============================================================================
// RESULTADOS
// ============================================================================

/// Resultado de uma entrada, pronto para ir ao relatório.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryResult {
    pub mode: Mode,

    /// Localização como escrita no mapa.
    pub location: String,

    /// Localização depois de resolvida, se chegou a ser.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_location: Option<String>,

    /// Valor esperado (validação) ou variável de destino (extração).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,

    /// Valor lido da mensagem.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,

    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Código de erro estruturado (E3001, E1001, etc).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// Resultado de um ou mais mapas: todas as entradas mais a primeira falha.
#[derive(Debug, Default)]
pub struct Outcome {
    pub entries: Vec<EntryResult>,
    pub failure: Option<EntryFailure>,
}

impl Outcome {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }

    pub fn into_result(self) -> Result<Vec<EntryResult>, EntryFailure> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(self.entries),
        }
    }
}

/// Dados parciais de uma entrada, preenchidos conforme a avaliação avança.
#[derive(Default)]
struct Trace {
    resolved_location: Option<String>,
    expected: Option<String>,
    actual: Option<String>,
}

// ============================================================================
// MOTOR
// ============================================================================

/// Aplica mapas de expectativas sobre uma mensagem.
///
/// O motor não guarda estado entre chamadas: o único estado carregado é o
/// das variáveis do `Context`, alterado apenas pelas extrações.
pub struct ExpectationEngine<'m> {
    message: &'m Message,
}

impl<'m> ExpectationEngine<'m> {
    pub fn new(message: &'m Message) -> Self {
        Self { message }
    }

    pub fn validate_body(&self, map: &ExpectationMap, context: &mut Context) -> Result<(), EntryFailure> {
        self.apply(Mode::ValidateBody, map, context).into_result().map(drop)
    }

    pub fn validate_header(&self, map: &ExpectationMap, context: &mut Context) -> Result<(), EntryFailure> {
        self.apply(Mode::ValidateHeader, map, context).into_result().map(drop)
    }

    pub fn extract_body(&self, map: &ExpectationMap, context: &mut Context) -> Result<(), EntryFailure> {
        self.apply(Mode::ExtractBody, map, context).into_result().map(drop)
    }

    pub fn extract_header(&self, map: &ExpectationMap, context: &mut Context) -> Result<(), EntryFailure> {
        self.apply(Mode::ExtractHeader, map, context).into_result().map(drop)
    }

    /// Aplica os quatro mapas na ordem de [`Mode::RUN_ORDER`].
    ///
    /// Um mapa com falha interrompe os mapas seguintes.
    pub fn run(&self, expectations: &Expectations, context: &mut Context) -> Result<(), EntryFailure> {
        self.run_detailed(expectations, context).into_result().map(drop)
    }

    /// Como [`run`](Self::run), mas devolve o resultado de cada entrada avaliada.
    pub fn run_detailed(&self, expectations: &Expectations, context: &mut Context) -> Outcome {
        let mut outcome = Outcome::default();

        for mode in Mode::RUN_ORDER {
            let map = expectations.map(mode);
            if map.is_empty() {
                continue;
            }

            let partial = self.apply(mode, map, context);
            outcome.entries.extend(partial.entries);
            if partial.failure.is_some() {
                outcome.failure = partial.failure;
                break;
            }
        }

        outcome
    }

    /// Avalia um mapa inteiro em um modo.
    pub fn apply(&self, mode: Mode, map: &ExpectationMap, context: &mut Context) -> Outcome {
        let mut outcome = Outcome::default();
        if map.is_empty() {
            return outcome;
        }

        // O payload só é interpretado quando algum mapa de body é usado.
        let headers;
        let body;
        let locator: &dyn Locator = match mode.kind() {
            LocationKind::Header => {
                headers = self.message.header_locator();
                &headers
            }
            LocationKind::Body => match self.message.body() {
                Ok(parsed) => {
                    body = parsed;
                    &body
                }
                Err(cause) => {
                    return self.document_failure(mode, map, cause);
                }
            },
        };

        let mut bindings = Vec::new();
        for (location, value) in map {
            let mut trace = Trace::default();
            let result = self.evaluate(mode, locator, location, value, context, &mut trace);

            match result {
                Ok(()) => {
                    debug!(
                        mode = %mode,
                        location = %trace.resolved_location.as_deref().unwrap_or(location),
                        "Expectation passed"
                    );
                    if let (true, Some(target), Some(actual)) =
                        (mode.is_extract(), &trace.expected, &trace.actual)
                    {
                        bindings.push((target.clone(), actual.clone()));
                    }
                    outcome.entries.push(entry_result(mode, location, trace, None));
                }
                Err(cause) => {
                    warn!(
                        mode = %mode,
                        location = %location,
                        error_code = %cause.code(),
                        error = %cause,
                        "Expectation failed"
                    );
                    outcome.entries.push(entry_result(mode, location, trace, Some(&cause)));
                    if outcome.failure.is_none() {
                        outcome.failure = Some(EntryFailure::new(mode, location, value, cause));
                    }
                }
            }
        }

        for (target, actual) in bindings {
            debug!(variable = %target, "Variable extracted");
            context.set(target, actual);
        }

        outcome
    }

    fn evaluate(
        &self,
        mode: Mode,
        locator: &dyn Locator,
        location: &str,
        value: &str,
        context: &Context,
        trace: &mut Trace,
    ) -> Result<(), EngineError> {
        let resolved = context.resolve(location)?;
        trace.resolved_location = Some(resolved.clone());

        let actual = locator.read(&resolved)?;
        trace.actual = Some(actual.clone());

        if mode.is_extract() {
            trace.expected = Some(context.target_variable(value)?);
            return Ok(());
        }

        let expected = context.resolve(value)?;
        trace.expected = Some(expected.clone());

        if actual != expected {
            return Err(EngineError::ValidationFailure {
                location: resolved,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Payload inválido: todas as entradas do mapa falham com a mesma causa.
    fn document_failure(&self, mode: Mode, map: &ExpectationMap, cause: EngineError) -> Outcome {
        warn!(mode = %mode, error = %cause, "Payload is not a valid XML document");

        let entries = map
            .keys()
            .map(|location| entry_result(mode, location, Trace::default(), Some(&cause)))
            .collect();

        let failure = map
            .first()
            .map(|(location, value)| EntryFailure::new(mode, location.as_str(), value.as_str(), cause));

        Outcome { entries, failure }
    }
}

fn entry_result(mode: Mode, location: &str, trace: Trace, error: Option<&EngineError>) -> EntryResult {
    EntryResult {
        mode,
        location: location.to_string(),
        resolved_location: trace.resolved_location,
        expected: trace.expected,
        actual: trace.actual,
        success: error.is_none(),
        error: error.map(ToString::to_string),
        error_code: error.map(|e| e.code().formatted()),
    }
}

// ============================================================================
// TESTES
// ============================================================================
