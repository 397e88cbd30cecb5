//! # Módulo de Expressões Dinâmicas
//!
//! Converte textos com `${variavel}` e `prefixo:funcao(args)` em texto literal.
//!
//! ## Para todos entenderem:
//!
//! Valores esperados e localizações não são textos fixos. Eles podem usar
//! variáveis definidas antes (ou extraídas de mensagens anteriores) e chamar
//! funções, inclusive com outras funções como argumento:
//!
//! ```text
//! ${variable}                                 → "text-value"
//! citrus:concat(${text}, '-', 'value')        → "text-value"
//! citrus:concat('//sub-element', ${letter})   → "//sub-elementB"
//! citrus:upperCase(citrus:concat('a', 'b'))   → "AB"
//! ```
//!
//! ## Como funciona:
//!
//! 1. **Parser**: lê o texto uma única vez e monta uma árvore
//!    (`Template` → `Part` → `FunctionCall` → argumentos `Template`)
//! 2. **Avaliação**: percorre a árvore de dentro para fora; cada argumento é
//!    resolvido antes de ser entregue à função
//!
//! Como os argumentos são separados na árvore *antes* de qualquer
//! substituição, o valor de uma variável com vírgula ou parêntese nunca
//! altera a divisão dos argumentos.
//!
//! ## Regras de sintaxe:
//!
//! | Onde               | Texto              | Significado                     |
//! |--------------------|--------------------|---------------------------------|
//! | Qualquer lugar     | `${nome}`          | Valor da variável `nome`        |
//! | Qualquer lugar     | `pre:nome(...)`    | Chamada de função               |
//! | Fora de argumentos | `'...'`, `,`, `)`  | Texto literal (ex.: XPath)      |
//! | Em argumentos      | `'...'`            | Literal sem as aspas            |
//! | Em argumentos      | texto solto        | Literal sem espaços nas pontas  |

use crate::context::Context;
use crate::errors::EngineError;
use crate::limits::ExecutionLimits;

// ============================================================================
// ÁRVORE
// ============================================================================

/// Sequência de partes que, avaliadas em ordem e concatenadas, formam o texto final.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    parts: Vec<Part>,
}

/// Um pedaço de um `Template`.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// Texto usado como está.
    Literal(String),
    /// `${nome}`.
    Variable(String),
    /// `prefixo:nome(args)`.
    Call(FunctionCall),
}

/// Chamada `prefixo:nome(arg, ...)`; cada argumento é um `Template` próprio.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub prefix: String,
    pub name: String,
    pub args: Vec<Template>,
}

impl Template {
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Verdadeiro quando não há variáveis nem chamadas.
    pub fn is_literal(&self) -> bool {
        self.parts.iter().all(|part| matches!(part, Part::Literal(_)))
    }

    /// Avalia o template no contexto.
    pub fn evaluate(&self, context: &Context) -> Result<String, EngineError> {
        let mut result = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => result.push_str(text),
                Part::Variable(name) => result.push_str(context.variable(name)?),
                Part::Call(call) => result.push_str(&call.evaluate(context)?),
            }
        }
        Ok(result)
    }

    /// Visita todas as chamadas, inclusive as aninhadas em argumentos.
    pub fn visit_calls<F: FnMut(&FunctionCall)>(&self, visitor: &mut F) {
        for part in &self.parts {
            if let Part::Call(call) = part {
                visitor(call);
                for arg in &call.args {
                    arg.visit_calls(visitor);
                }
            }
        }
    }
}

impl FunctionCall {
    /// Resolve os argumentos e executa a função registrada.
    pub fn evaluate(&self, context: &Context) -> Result<String, EngineError> {
        let function = context.functions().lookup(&self.prefix, &self.name)?;

        let args = self
            .args
            .iter()
            .map(|arg| arg.evaluate(context))
            .collect::<Result<Vec<String>, EngineError>>()?;

        let result = function.execute(&args, context)?;
        tracing::trace!(
            function = %format!("{}:{}", self.prefix, self.name),
            args = ?args,
            result = %result,
            "Function evaluated"
        );
        Ok(result)
    }
}

// ============================================================================
// PARSER
// ============================================================================

/// Parser descendente recursivo.
///
/// Todos os delimitadores são ASCII, então a varredura é feita por bytes
/// e os cortes sempre caem em fronteiras de caractere UTF-8.
pub struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    limits: &'a ExecutionLimits,
}

/// Onde o parser está: no texto principal ou dentro de um argumento.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    TopLevel,
    Argument,
}

/// Parte de argumento antes da limpeza de espaços.
enum Piece {
    Bare(String),
    Quoted(String),
    Token(Part),
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str, limits: &'a ExecutionLimits) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            limits,
        }
    }

    /// Lê o texto inteiro.
    pub fn parse(mut self) -> Result<Template, EngineError> {
        if self.input.len() > self.limits.max_expression_length {
            return Err(self.error(
                0,
                format!(
                    "tamanho {} excede o máximo de {}",
                    self.input.len(),
                    self.limits.max_expression_length
                ),
            ));
        }

        let pieces = self.parse_sequence(Scope::TopLevel, 0)?;
        let parts = pieces
            .into_iter()
            .map(|piece| match piece {
                Piece::Bare(text) | Piece::Quoted(text) => Part::Literal(text),
                Piece::Token(part) => part,
            })
            .collect();

        Ok(Template { parts })
    }

    fn parse_sequence(&mut self, scope: Scope, depth: usize) -> Result<Vec<Piece>, EngineError> {
        let mut pieces = Vec::new();
        let mut buffer = String::new();
        // Parênteses soltos abertos dentro do argumento atual.
        let mut nesting = 0usize;

        while self.pos < self.bytes.len() {
            let byte = self.bytes[self.pos];

            if scope == Scope::Argument && nesting == 0 && (byte == b',' || byte == b')') {
                break;
            }

            let token = if self.bytes[self.pos..].starts_with(b"${") {
                Some(Piece::Token(self.parse_variable()?))
            } else if scope == Scope::Argument && byte == b'\'' {
                Some(Piece::Quoted(self.parse_quoted()?))
            } else if let Some(call) = self.try_parse_call(depth)? {
                Some(Piece::Token(Part::Call(call)))
            } else {
                None
            };

            match token {
                Some(piece) => {
                    if !buffer.is_empty() {
                        pieces.push(Piece::Bare(std::mem::take(&mut buffer)));
                    }
                    pieces.push(piece);
                }
                None => {
                    // Avança um caractere inteiro, não um byte.
                    if let Some(ch) = self.input[self.pos..].chars().next() {
                        if scope == Scope::Argument {
                            match ch {
                                '(' => nesting += 1,
                                ')' => nesting -= 1,
                                _ => {}
                            }
                        }
                        buffer.push(ch);
                        self.pos += ch.len_utf8();
                    }
                }
            }
        }

        if !buffer.is_empty() {
            pieces.push(Piece::Bare(buffer));
        }
        Ok(pieces)
    }

    fn parse_variable(&mut self) -> Result<Part, EngineError> {
        let start = self.pos;
        let name_start = start + 2;
        let close = self.input[name_start..]
            .find('}')
            .ok_or_else(|| self.error(start, "variável sem '}' de fechamento"))?;

        let name = self.input[name_start..name_start + close].trim();
        if name.is_empty() {
            return Err(self.error(start, "nome de variável vazio"));
        }

        self.pos = name_start + close + 1;
        Ok(Part::Variable(name.to_string()))
    }

    fn parse_quoted(&mut self) -> Result<String, EngineError> {
        let start = self.pos;
        let content_start = start + 1;
        let close = self.input[content_start..]
            .find('\'')
            .ok_or_else(|| self.error(start, "aspas simples sem fechamento"))?;

        self.pos = content_start + close + 1;
        Ok(self.input[content_start..content_start + close].to_string())
    }

    /// Reconhece `prefixo:nome(` na posição atual; caso contrário não consome nada.
    fn try_parse_call(&mut self, depth: usize) -> Result<Option<FunctionCall>, EngineError> {
        let start = self.pos;
        if !self.bytes[start].is_ascii_alphabetic() {
            return Ok(None);
        }
        if start > 0 && (is_prefix_byte(self.bytes[start - 1]) || self.bytes[start - 1] == b':') {
            return Ok(None);
        }

        let prefix_end = scan(self.bytes, start, is_prefix_byte);
        if self.bytes.get(prefix_end) != Some(&b':') {
            return Ok(None);
        }
        let name_start = prefix_end + 1;
        if !self
            .bytes
            .get(name_start)
            .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_')
        {
            return Ok(None);
        }
        let name_end = scan(self.bytes, name_start, is_name_byte);
        if self.bytes.get(name_end) != Some(&b'(') {
            return Ok(None);
        }

        if depth + 1 > self.limits.max_expression_depth {
            return Err(EngineError::ExpressionTooDeep {
                expression: self.input.to_string(),
                limit: self.limits.max_expression_depth,
            });
        }

        self.pos = name_end + 1;
        let args = self.parse_arguments(start, depth + 1)?;

        Ok(Some(FunctionCall {
            prefix: self.input[start..prefix_end].to_string(),
            name: self.input[name_start..name_end].to_string(),
            args,
        }))
    }

    fn parse_arguments(&mut self, call_start: usize, depth: usize) -> Result<Vec<Template>, EngineError> {
        self.skip_whitespace();
        if self.bytes.get(self.pos) == Some(&b')') {
            self.pos += 1;
            return Ok(Vec::new());
        }

        let mut args = Vec::new();
        loop {
            let pieces = self.parse_sequence(Scope::Argument, depth)?;
            args.push(trim_argument(pieces));

            match self.bytes.get(self.pos) {
                Some(b',') => self.pos += 1,
                Some(b')') => {
                    self.pos += 1;
                    return Ok(args);
                }
                _ => return Err(self.error(call_start, "chamada de função sem ')' de fechamento")),
            }
        }
    }

    fn skip_whitespace(&mut self) {
        self.pos = scan(self.bytes, self.pos, |b| b.is_ascii_whitespace());
    }

    fn error(&self, position: usize, message: impl Into<String>) -> EngineError {
        EngineError::MalformedExpression {
            expression: self.input.to_string(),
            position,
            message: message.into(),
        }
    }
}

/// Lê o texto inteiro com os limites padrão.
pub fn parse(input: &str) -> Result<Template, EngineError> {
    Parser::new(input, &ExecutionLimits::default()).parse()
}

fn scan(bytes: &[u8], from: usize, accept: impl Fn(u8) -> bool) -> usize {
    let mut end = from;
    while end < bytes.len() && accept(bytes[end]) {
        end += 1;
    }
    end
}

fn is_prefix_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.')
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Remove espaços das pontas soltas de um argumento; trechos entre aspas ficam intactos.
fn trim_argument(mut pieces: Vec<Piece>) -> Template {
    if let Some(Piece::Bare(text)) = pieces.first_mut() {
        *text = text.trim_start().to_string();
    }
    if let Some(Piece::Bare(text)) = pieces.last_mut() {
        *text = text.trim_end().to_string();
    }

    let parts = pieces
        .into_iter()
        .filter_map(|piece| match piece {
            Piece::Bare(text) if text.is_empty() => None,
            Piece::Bare(text) | Piece::Quoted(text) => Some(Part::Literal(text)),
            Piece::Token(part) => Some(part),
        })
        .collect();

    Template { parts }
}

// ============================================================================
// TESTES
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{FunctionLibrary, FunctionRegistry};
    use std::sync::Arc;

    fn context() -> Context {
        let mut ctx = Context::default();
        ctx.set("variable", "text-value");
        ctx.set("text", "text");
        ctx.set("x", "text");
        ctx.set("letter", "B");
        ctx
    }

    fn literal(text: &str) -> Template {
        Template {
            parts: vec![Part::Literal(text.to_string())],
        }
    }

    // ------------------------------------------------------------------------
    // Parser
    // ------------------------------------------------------------------------

    #[test]
    fn test_parse_plain_text_is_literal() {
        let template = parse("//root/element[@a='x']/text()").unwrap();
        assert!(template.is_literal());
        assert_eq!(template, literal("//root/element[@a='x']/text()"));
    }

    #[test]
    fn test_parse_empty() {
        let template = parse("").unwrap();
        assert!(template.parts().is_empty());
    }

    #[test]
    fn test_parse_variables_and_literals() {
        let template = parse("id-${a}/${b}").unwrap();
        assert_eq!(
            template.parts(),
            &[
                Part::Literal("id-".to_string()),
                Part::Variable("a".to_string()),
                Part::Literal("/".to_string()),
                Part::Variable("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_nested_call_arguments() {
        let template = parse("citrus:concat(${x}, ' , ', lib:inner('a', 'b'), 12 )").unwrap();
        let [Part::Call(call)] = template.parts() else {
            panic!("expected a single call, got {:?}", template.parts());
        };

        assert_eq!(call.prefix, "citrus");
        assert_eq!(call.name, "concat");
        assert_eq!(call.args.len(), 4);
        assert_eq!(call.args[0].parts(), &[Part::Variable("x".to_string())]);
        assert_eq!(call.args[1], literal(" , "));
        assert!(matches!(&call.args[2].parts()[0], Part::Call(inner) if inner.args.len() == 2));
        assert_eq!(call.args[3], literal("12"));
    }

    #[test]
    fn test_parse_empty_argument_list() {
        let template = parse("citrus:max()").unwrap();
        let [Part::Call(call)] = template.parts() else {
            panic!("expected a single call");
        };
        assert!(call.args.is_empty());
    }

    #[test]
    fn test_parse_bare_parentheses_stay_inside_argument() {
        let template = parse("citrus:concat('a', (b), count(x, y))").unwrap();
        let [Part::Call(call)] = template.parts() else {
            panic!("expected a single call, got {:?}", template.parts());
        };
        assert_eq!(call.args.len(), 3);
        assert_eq!(call.args[1], literal("(b)"));
        assert_eq!(call.args[2], literal("count(x, y)"));

        assert!(matches!(
            parse("citrus:concat('a', (b, 'c')"),
            Err(EngineError::MalformedExpression { .. })
        ));
    }

    #[test]
    fn test_parse_does_not_treat_urls_or_qnames_as_calls() {
        assert!(parse("http://host:8080/path(1)").unwrap().is_literal());
        assert!(parse("//ns:item/text()").unwrap().is_literal());
        assert!(parse("a-b:c d(").unwrap().is_literal());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse("${open"), Err(EngineError::MalformedExpression { .. })));
        assert!(matches!(parse("${}"), Err(EngineError::MalformedExpression { .. })));
        assert!(matches!(
            parse("citrus:concat('a'"),
            Err(EngineError::MalformedExpression { .. })
        ));
        assert!(matches!(
            parse("citrus:concat('a, 'b')x"),
            Err(EngineError::MalformedExpression { .. })
        ));
    }

    #[test]
    fn test_parse_depth_limit() {
        let limits = ExecutionLimits {
            max_expression_depth: 2,
            ..ExecutionLimits::default()
        };
        assert!(Parser::new("a:b(a:b('x'))", &limits).parse().is_ok());
        assert!(matches!(
            Parser::new("a:b(a:b(a:b('x')))", &limits).parse(),
            Err(EngineError::ExpressionTooDeep { limit: 2, .. })
        ));
    }

    #[test]
    fn test_parse_length_limit() {
        let limits = ExecutionLimits {
            max_expression_length: 4,
            ..ExecutionLimits::default()
        };
        assert!(matches!(
            Parser::new("abcdef", &limits).parse(),
            Err(EngineError::MalformedExpression { .. })
        ));
    }

    #[test]
    fn test_visit_calls_reaches_nested() {
        let template = parse("a:one(b:two(c:three()), ${v})").unwrap();
        let mut names = Vec::new();
        template.visit_calls(&mut |call: &FunctionCall| names.push(format!("{}:{}", call.prefix, call.name)));
        assert_eq!(names, vec!["a:one", "b:two", "c:three"]);
    }

    // ------------------------------------------------------------------------
    // Resolução
    // ------------------------------------------------------------------------

    #[test]
    fn test_resolve_literal_is_identity() {
        let ctx = context();
        for input in ["", "plain", "//root/element/sub-elementA", "a, b) 'c'"] {
            assert_eq!(ctx.resolve(input).unwrap(), input);
        }
    }

    #[test]
    fn test_resolve_variable() {
        let ctx = context();
        assert_eq!(ctx.resolve("${variable}").unwrap(), "text-value");
        assert_eq!(ctx.resolve("[${letter}|${letter}]").unwrap(), "[B|B]");
    }

    #[test]
    fn test_resolve_undefined_variable_fails() {
        let ctx = context();
        assert!(matches!(
            ctx.resolve("value: ${missing}"),
            Err(EngineError::UndefinedVariable { name }) if name == "missing"
        ));
    }

    #[test]
    fn test_resolve_functions() {
        let ctx = context();
        assert_eq!(ctx.resolve("citrus:concat('a','b','c')").unwrap(), "abc");
        assert_eq!(
            ctx.resolve("citrus:concat(${x}, '-', 'value')").unwrap(),
            "text-value"
        );
        assert_eq!(ctx.resolve("citrus:max(3,1,4,1,5,9,2,6)").unwrap(), "9.0");
        assert_eq!(
            ctx.resolve("citrus:concat('//sub-element', ${letter})").unwrap(),
            "//sub-elementB"
        );
    }

    #[test]
    fn test_resolve_nested_calls() {
        let ctx = context();
        assert_eq!(
            ctx.resolve("citrus:upperCase(citrus:concat(${text}, '-', citrus:lowerCase('VALUE')))")
                .unwrap(),
            "TEXT-VALUE"
        );
    }

    #[test]
    fn test_resolve_call_inside_text() {
        let ctx = context();
        assert_eq!(
            ctx.resolve("Hello citrus:upperCase('x') and ${letter}!").unwrap(),
            "Hello X and B!"
        );
    }

    #[test]
    fn test_resolve_bare_parentheses_in_argument() {
        let ctx = context();
        assert_eq!(ctx.resolve("citrus:concat('a', (b), 'c')").unwrap(), "a(b)c");
    }

    #[test]
    fn test_variable_value_with_separators_does_not_split_arguments() {
        let mut ctx = context();
        ctx.set("tricky", "a, b), ('c'");
        assert_eq!(
            ctx.resolve("citrus:concat(${tricky}, '!')").unwrap(),
            "a, b), ('c'!"
        );
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let mut ctx = context();
        ctx.set("template", "${variable}");
        assert_eq!(ctx.resolve("${template}").unwrap(), "${variable}");
    }

    #[test]
    fn test_resolve_function_errors() {
        let ctx = context();
        assert!(matches!(
            ctx.resolve("citrus:max()"),
            Err(EngineError::InvalidFunctionUsage { .. })
        ));
        assert!(matches!(
            ctx.resolve("citrus:max('1', 'x')"),
            Err(EngineError::NumericParse { .. })
        ));
        assert!(matches!(
            ctx.resolve("nope:concat('a')"),
            Err(EngineError::UnknownFunction { prefix, .. }) if prefix == "nope"
        ));
        assert!(matches!(
            ctx.resolve("citrus:nope('a')"),
            Err(EngineError::UnknownFunction { name, .. }) if name == "nope"
        ));
        assert!(matches!(
            ctx.resolve("citrus:concat(${missing})"),
            Err(EngineError::UndefinedVariable { .. })
        ));
    }

    #[test]
    fn test_resolve_with_custom_library() {
        let mut registry = FunctionRegistry::with_core();
        registry
            .register(FunctionLibrary::new("functionLib", "lib").with_function(
                "custom",
                |args: &[String], _: &Context| -> Result<String, EngineError> {
                    Ok(format!("Hello {}!", args.join(" ")))
                },
            ))
            .unwrap();

        let mut ctx = Context::new(Arc::new(registry));
        ctx.set("who", "Citrus");
        assert_eq!(ctx.resolve("lib:custom(${who})").unwrap(), "Hello Citrus!");
        assert_eq!(
            ctx.resolve("lib:custom(citrus:upperCase('x'))").unwrap(),
            "Hello X!"
        );
    }
}
