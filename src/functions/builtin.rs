//! # Funções Embutidas
//!
//! Biblioteca padrão registrada sob o prefixo `citrus`.
//!
//! ## Para todos entenderem:
//!
//! Cada função recebe uma lista de textos já resolvidos e devolve um texto.
//! Exemplos:
//!
//! ```text
//! citrus:concat('text', '-', 'value')   → "text-value"
//! citrus:upperCase('a')                 → "A"
//! citrus:max(3, 1, 4, 1, 5, 9, 2, 6)    → "9.0"
//! citrus:randomNumber(5)                → "48213"
//! ```
//!
//! Números seguem a forma decimal canônica: valores inteiros saem com uma
//! casa decimal (`9.0`), os demais com a menor representação exata (`0.1`).

use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;

use super::{Function, FunctionLibrary, CORE_PREFIX};
use crate::context::Context;
use crate::errors::EngineError;

/// Maior tamanho aceito por `randomNumber` e `randomString`.
pub const MAX_RANDOM_LENGTH: usize = 4096;

/// Formato padrão de `currentDate`.
pub const DEFAULT_DATE_FORMAT: &str = "%d.%m.%Y";

/// Monta a biblioteca padrão com todas as funções do catálogo.
pub fn core_library() -> FunctionLibrary {
    let mut library = FunctionLibrary::new("core", CORE_PREFIX);
    for name in CATALOG {
        if let Some(function) = builtin(name) {
            library.register(*name, function);
        }
    }
    library
}

/// Nomes aceitos por [`builtin`].
pub const CATALOG: &[&str] = &[
    "concat",
    "upperCase",
    "lowerCase",
    "max",
    "min",
    "sum",
    "average",
    "absolute",
    "round",
    "floor",
    "ceiling",
    "substring",
    "substringBefore",
    "substringAfter",
    "stringLength",
    "translate",
    "randomNumber",
    "randomString",
    "randomEnumValue",
    "randomUUID",
    "currentDate",
];

/// Cria uma função embutida pelo nome do catálogo.
///
/// Usado também para montar bibliotecas declaradas na configuração,
/// onde cada alias aponta para um nome deste catálogo.
pub fn builtin(name: &str) -> Option<Arc<dyn Function>> {
    let function: Arc<dyn Function> = match name {
        "concat" => Arc::new(Concat),
        "upperCase" => Arc::new(UpperCase),
        "lowerCase" => Arc::new(LowerCase),
        "max" => Arc::new(Aggregate::Max),
        "min" => Arc::new(Aggregate::Min),
        "sum" => Arc::new(Aggregate::Sum),
        "average" => Arc::new(Aggregate::Average),
        "absolute" => Arc::new(Rounding::Absolute),
        "round" => Arc::new(Rounding::Round),
        "floor" => Arc::new(Rounding::Floor),
        "ceiling" => Arc::new(Rounding::Ceiling),
        "substring" => Arc::new(Substring),
        "substringBefore" => Arc::new(SubstringBefore),
        "substringAfter" => Arc::new(SubstringAfter),
        "stringLength" => Arc::new(StringLength),
        "translate" => Arc::new(Translate),
        "randomNumber" => Arc::new(RandomNumber),
        "randomString" => Arc::new(RandomString),
        "randomEnumValue" => Arc::new(RandomEnumValue),
        "randomUUID" => Arc::new(RandomUuid),
        "currentDate" => Arc::new(CurrentDate),
        _ => return None,
    };
    Some(function)
}

// ============================================================================
// AUXILIARES
// ============================================================================

fn expect_arity(
    function: &str,
    args: &[String],
    min: usize,
    max: Option<usize>,
) -> Result<(), EngineError> {
    if args.len() < min {
        return Err(EngineError::usage(
            function,
            format!("espera ao menos {} argumento(s), recebeu {}", min, args.len()),
        ));
    }
    if let Some(max) = max {
        if args.len() > max {
            return Err(EngineError::usage(
                function,
                format!("espera no máximo {} argumento(s), recebeu {}", max, args.len()),
            ));
        }
    }
    Ok(())
}

/// Aceita apenas números finitos: `NaN`, `inf` e `infinity` são rejeitados.
fn parse_number(function: &str, value: &str) -> Result<f64, EngineError> {
    let number = value
        .trim()
        .parse::<f64>()
        .map_err(|source| EngineError::NumericParse {
            function: function.to_string(),
            value: value.to_string(),
            source: Some(source),
        })?;
    if !number.is_finite() {
        return Err(EngineError::NumericParse {
            function: function.to_string(),
            value: value.to_string(),
            source: None,
        });
    }
    Ok(number)
}

fn parse_count(function: &str, value: &str) -> Result<usize, EngineError> {
    let number = parse_number(function, value)?;
    if number < 0.0 || number.fract() != 0.0 {
        return Err(EngineError::usage(
            function,
            format!("'{}' não é um inteiro não negativo", value),
        ));
    }
    Ok(number as usize)
}

fn parse_length(function: &str, value: &str) -> Result<usize, EngineError> {
    let length = parse_count(function, value)?;
    if length > MAX_RANDOM_LENGTH {
        return Err(EngineError::usage(
            function,
            format!("tamanho {} excede o máximo de {}", value.trim(), MAX_RANDOM_LENGTH),
        ));
    }
    Ok(length)
}

fn parse_flag(function: &str, value: &str) -> Result<bool, EngineError> {
    match value.trim().to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(EngineError::usage(
            function,
            format!("'{}' não é um booleano (true/false)", value),
        )),
    }
}

/// Forma decimal canônica de um número.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

// ============================================================================
// TEXTO
// ============================================================================

/// `concat(a, b, ...)`: junta todos os argumentos.
pub struct Concat;

impl Function for Concat {
    fn execute(&self, args: &[String], _context: &Context) -> Result<String, EngineError> {
        expect_arity("concat", args, 1, None)?;
        Ok(args.concat())
    }
}

/// `upperCase(s)`.
pub struct UpperCase;

impl Function for UpperCase {
    fn execute(&self, args: &[String], _context: &Context) -> Result<String, EngineError> {
        expect_arity("upperCase", args, 1, Some(1))?;
        Ok(args[0].to_uppercase())
    }
}

/// `lowerCase(s)`.
pub struct LowerCase;

impl Function for LowerCase {
    fn execute(&self, args: &[String], _context: &Context) -> Result<String, EngineError> {
        expect_arity("lowerCase", args, 1, Some(1))?;
        Ok(args[0].to_lowercase())
    }
}

/// `substring(s, begin[, end])`, índices em caracteres.
pub struct Substring;

impl Function for Substring {
    fn execute(&self, args: &[String], _context: &Context) -> Result<String, EngineError> {
        expect_arity("substring", args, 2, Some(3))?;
        let chars: Vec<char> = args[0].chars().collect();
        let begin = parse_count("substring", &args[1])?;
        let end = match args.get(2) {
            Some(end) => parse_count("substring", end)?,
            None => chars.len(),
        };
        if begin > end || end > chars.len() {
            return Err(EngineError::usage(
                "substring",
                format!("intervalo [{}, {}) fora do texto de {} caracteres", begin, end, chars.len()),
            ));
        }
        Ok(chars[begin..end].iter().collect())
    }
}

/// `substringBefore(s, separador)`.
pub struct SubstringBefore;

impl Function for SubstringBefore {
    fn execute(&self, args: &[String], _context: &Context) -> Result<String, EngineError> {
        expect_arity("substringBefore", args, 2, Some(2))?;
        Ok(args[0]
            .split_once(args[1].as_str())
            .map(|(before, _)| before.to_string())
            .unwrap_or_default())
    }
}

/// `substringAfter(s, separador)`.
pub struct SubstringAfter;

impl Function for SubstringAfter {
    fn execute(&self, args: &[String], _context: &Context) -> Result<String, EngineError> {
        expect_arity("substringAfter", args, 2, Some(2))?;
        Ok(args[0]
            .split_once(args[1].as_str())
            .map(|(_, after)| after.to_string())
            .unwrap_or_default())
    }
}

/// `stringLength(s)`, em caracteres.
pub struct StringLength;

impl Function for StringLength {
    fn execute(&self, args: &[String], _context: &Context) -> Result<String, EngineError> {
        expect_arity("stringLength", args, 1, Some(1))?;
        Ok(args[0].chars().count().to_string())
    }
}

/// `translate(s, regex, substituto)`: troca todas as ocorrências.
pub struct Translate;

impl Function for Translate {
    fn execute(&self, args: &[String], _context: &Context) -> Result<String, EngineError> {
        expect_arity("translate", args, 3, Some(3))?;
        let re = Regex::new(&args[1]).map_err(|e| {
            EngineError::usage("translate", format!("regex inválida '{}': {}", args[1], e))
        })?;
        Ok(re.replace_all(&args[0], args[2].as_str()).into_owned())
    }
}

// ============================================================================
// NÚMEROS
// ============================================================================

/// Agregações variádicas sobre números de ponto flutuante.
#[derive(Debug, Clone, Copy)]
pub enum Aggregate {
    Max,
    Min,
    Sum,
    Average,
}

impl Aggregate {
    fn name(&self) -> &'static str {
        match self {
            Self::Max => "max",
            Self::Min => "min",
            Self::Sum => "sum",
            Self::Average => "average",
        }
    }
}

impl Function for Aggregate {
    fn execute(&self, args: &[String], _context: &Context) -> Result<String, EngineError> {
        let name = self.name();
        if args.is_empty() {
            return Err(EngineError::usage(name, "parâmetros não podem ser vazios"));
        }

        let numbers = args
            .iter()
            .map(|arg| parse_number(name, arg))
            .collect::<Result<Vec<f64>, EngineError>>()?;

        let result = match self {
            Self::Max => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Sum => numbers.iter().sum(),
            Self::Average => numbers.iter().sum::<f64>() / numbers.len() as f64,
        };
        if !result.is_finite() {
            return Err(EngineError::usage(name, "resultado fora do intervalo numérico"));
        }

        Ok(format_number(result))
    }
}

/// Operações unárias de arredondamento.
#[derive(Debug, Clone, Copy)]
pub enum Rounding {
    Absolute,
    Round,
    Floor,
    Ceiling,
}

impl Function for Rounding {
    fn execute(&self, args: &[String], _context: &Context) -> Result<String, EngineError> {
        let name = match self {
            Self::Absolute => "absolute",
            Self::Round => "round",
            Self::Floor => "floor",
            Self::Ceiling => "ceiling",
        };
        expect_arity(name, args, 1, Some(1))?;
        let value = parse_number(name, &args[0])?;

        Ok(match self {
            Self::Absolute => format_number(value.abs()),
            Self::Round => format!("{:.0}", round_half_up(value)),
            Self::Floor => format_number(value.floor()),
            Self::Ceiling => format_number(value.ceil()),
        })
    }
}

/// Meio arredonda para cima, inclusive em negativos (-2.5 → -2).
fn round_half_up(value: f64) -> f64 {
    let floor = value.floor();
    let rounded = if value - floor >= 0.5 { floor + 1.0 } else { floor };
    // Normaliza -0.0.
    rounded + 0.0
}

// ============================================================================
// ALEATÓRIOS
// ============================================================================

/// `randomNumber(tamanho[, padding])`.
///
/// Sem padding o primeiro dígito nunca é zero.
pub struct RandomNumber;

impl Function for RandomNumber {
    fn execute(&self, args: &[String], _context: &Context) -> Result<String, EngineError> {
        expect_arity("randomNumber", args, 1, Some(2))?;
        let length = parse_length("randomNumber", &args[0])?;
        let padding = match args.get(1) {
            Some(flag) => parse_flag("randomNumber", flag)?,
            None => false,
        };
        if length == 0 {
            return Err(EngineError::usage("randomNumber", "tamanho deve ser maior que zero"));
        }

        let mut rng = rand::thread_rng();
        let mut digits = String::with_capacity(length);
        for index in 0..length {
            let lower = if index == 0 && !padding { 1 } else { 0 };
            let digit: u32 = rng.gen_range(lower..10);
            digits.push(char::from_digit(digit, 10).unwrap_or('0'));
        }
        Ok(digits)
    }
}

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";

/// `randomString(tamanho[, notação[, incluirNúmeros]])`.
///
/// Notação: `UPPERCASE`, `LOWERCASE` ou `MIXED` (padrão).
pub struct RandomString;

impl Function for RandomString {
    fn execute(&self, args: &[String], _context: &Context) -> Result<String, EngineError> {
        expect_arity("randomString", args, 1, Some(3))?;
        let length = parse_length("randomString", &args[0])?;

        let mut alphabet: Vec<u8> = match args.get(1).map(|n| n.trim().to_uppercase()) {
            None => [UPPER, LOWER].concat(),
            Some(notation) => match notation.as_str() {
                "UPPERCASE" => UPPER.to_vec(),
                "LOWERCASE" => LOWER.to_vec(),
                "MIXED" => [UPPER, LOWER].concat(),
                other => {
                    return Err(EngineError::usage(
                        "randomString",
                        format!("notação desconhecida '{}'", other),
                    ))
                }
            },
        };
        if let Some(flag) = args.get(2) {
            if parse_flag("randomString", flag)? {
                alphabet.extend_from_slice(DIGITS);
            }
        }

        let mut rng = rand::thread_rng();
        Ok((0..length)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
            .collect())
    }
}

/// `randomEnumValue(a, b, ...)`: sorteia um dos argumentos.
pub struct RandomEnumValue;

impl Function for RandomEnumValue {
    fn execute(&self, args: &[String], _context: &Context) -> Result<String, EngineError> {
        args.choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| EngineError::usage("randomEnumValue", "parâmetros não podem ser vazios"))
    }
}

/// `randomUUID()`.
pub struct RandomUuid;

impl Function for RandomUuid {
    fn execute(&self, args: &[String], _context: &Context) -> Result<String, EngineError> {
        expect_arity("randomUUID", args, 0, Some(0))?;
        Ok(uuid::Uuid::new_v4().to_string())
    }
}

// ============================================================================
// DATAS
// ============================================================================

/// `currentDate([formato])` no horário local, formato `strftime`.
pub struct CurrentDate;

impl Function for CurrentDate {
    fn execute(&self, args: &[String], _context: &Context) -> Result<String, EngineError> {
        expect_arity("currentDate", args, 0, Some(1))?;
        let format = args.first().map(String::as_str).unwrap_or(DEFAULT_DATE_FORMAT);

        let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
        if items.iter().any(|item| matches!(item, Item::Error)) {
            return Err(EngineError::usage(
                "currentDate",
                format!("formato de data inválido '{}'", format),
            ));
        }

        Ok(Local::now().format_with_items(items.into_iter()).to_string())
    }
}
