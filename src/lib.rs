//! Motor de asserções sobre mensagens: resolve expressões `${var}` e
//! `prefixo:funcao(args)`, valida e extrai valores do body XML e dos
//! headers de uma mensagem.

pub mod context;
pub mod engine;
pub mod errors;
pub mod expression;
pub mod functions;
pub mod limits;
pub mod loader;
pub mod locator;
pub mod message;
pub mod protocol;
pub mod telemetry;
pub mod validation;

pub use context::Context;
pub use engine::{ExpectationEngine, ExpectationMap, Expectations, Mode};
pub use errors::{EngineError, EntryFailure, ErrorCode};
pub use functions::{Function, FunctionLibrary, FunctionRegistry};
pub use message::Message;
