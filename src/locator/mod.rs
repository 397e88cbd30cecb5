//! # Módulo de Localização
//!
//! Lê o valor real de uma mensagem em uma localização já resolvida.
//!
//! ## Para todos entenderem:
//!
//! Uma mensagem tem duas superfícies endereçáveis:
//!
//! | Superfície | Localização                 | Exemplo                        |
//! |------------|-----------------------------|--------------------------------|
//! | Body       | Caminho XPath sobre o XML   | `//root/element/sub-elementA`  |
//! | Header     | Nome exato do header        | `header-valueA`                |
//!
//! Qual superfície usar é decidido pelo mapa de onde a entrada veio,
//! nunca pelo formato do texto: `element` é um nome de header válido e
//! também um XPath relativo válido.

pub mod xpath;

use std::fmt;

use indexmap::IndexMap;
use roxmltree::Document;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

pub use xpath::{XPath, XmlNode};

/// Superfície da mensagem endereçada por uma localização.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Body,
    Header,
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Body => write!(f, "body"),
            Self::Header => write!(f, "header"),
        }
    }
}

/// Leitura de valores em uma superfície da mensagem.
pub trait Locator {
    /// Superfície lida por este locator.
    fn kind(&self) -> LocationKind;

    /// Valor na localização, ou `LocationNotFound` quando não há correspondência.
    fn read(&self, location: &str) -> Result<String, EngineError>;

    /// Erro padrão de localização ausente.
    fn not_found(&self, location: &str) -> EngineError {
        EngineError::LocationNotFound {
            kind: self.kind(),
            location: location.to_string(),
        }
    }
}

// ============================================================================
// BODY
// ============================================================================

/// Locator sobre o payload XML da mensagem.
///
/// Quando o caminho casa com mais de um nó, vale o primeiro em ordem de
/// documento.
pub struct BodyLocator<'input> {
    document: Document<'input>,
}

impl<'input> BodyLocator<'input> {
    /// Faz o parse do payload; falha com `MalformedDocument`.
    pub fn parse(payload: &'input str) -> Result<Self, EngineError> {
        let document = Document::parse(payload)?;
        Ok(Self { document })
    }

    pub fn document(&self) -> &Document<'input> {
        &self.document
    }

    /// Todos os valores selecionados pelo caminho, em ordem de documento.
    pub fn read_all(&self, location: &str) -> Result<Vec<String>, EngineError> {
        let path = XPath::parse(location)?;
        Ok(path
            .select(&self.document)
            .iter()
            .map(XmlNode::string_value)
            .collect())
    }
}

impl Locator for BodyLocator<'_> {
    fn kind(&self) -> LocationKind {
        LocationKind::Body
    }

    fn read(&self, location: &str) -> Result<String, EngineError> {
        let path = XPath::parse(location)?;
        path.select_first(&self.document)
            .map(|node| node.string_value())
            .ok_or_else(|| self.not_found(location))
    }
}

// ============================================================================
// HEADER
// ============================================================================

/// Locator sobre os headers da mensagem. A busca é pelo nome exato.
pub struct HeaderLocator<'m> {
    headers: &'m IndexMap<String, String>,
}

impl<'m> HeaderLocator<'m> {
    pub fn new(headers: &'m IndexMap<String, String>) -> Self {
        Self { headers }
    }
}

impl Locator for HeaderLocator<'_> {
    fn kind(&self) -> LocationKind {
        LocationKind::Header
    }

    fn read(&self, location: &str) -> Result<String, EngineError> {
        self.headers
            .get(location)
            .cloned()
            .ok_or_else(|| self.not_found(location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;

    const PAYLOAD: &str = "<root><element attributeA='attribute-value'>\
        <sub-elementA>text-value</sub-elementA>\
        <sub-elementB>text-value</sub-elementB>\
        </element></root>";

    #[test]
    fn test_body_read() {
        let body = BodyLocator::parse(PAYLOAD).unwrap();
        assert_eq!(body.read("//root/element/sub-elementA").unwrap(), "text-value");
        assert_eq!(body.read("//element/@attributeA").unwrap(), "attribute-value");
        assert_eq!(body.read_all("//element/*").unwrap().len(), 2);
    }

    #[test]
    fn test_body_not_found() {
        let body = BodyLocator::parse(PAYLOAD).unwrap();
        let err = body.read("//root/element/sub-elementZ").unwrap_err();
        assert_eq!(err.code(), ErrorCode::BODY_LOCATION_NOT_FOUND);
        assert!(err.to_string().contains("sub-elementZ"));
    }

    #[test]
    fn test_body_invalid_path_and_document() {
        let body = BodyLocator::parse(PAYLOAD).unwrap();
        assert!(matches!(body.read("//root["), Err(EngineError::InvalidPath { .. })));
        assert!(matches!(
            BodyLocator::parse("<root><open></root>"),
            Err(EngineError::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_header_exact_lookup() {
        let mut headers = IndexMap::new();
        headers.insert("header-valueA".to_string(), "A".to_string());
        let locator = HeaderLocator::new(&headers);

        assert_eq!(locator.read("header-valueA").unwrap(), "A");
        let err = locator.read("Header-ValueA").unwrap_err();
        assert_eq!(err.code(), ErrorCode::HEADER_NOT_FOUND);
    }

    #[test]
    fn test_location_kind_display() {
        assert_eq!(LocationKind::Body.to_string(), "body");
        assert_eq!(LocationKind::Header.to_string(), "header");
    }
}
