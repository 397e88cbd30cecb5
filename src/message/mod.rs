// Module: Message
// Inbound message under test: an XML payload plus flat headers. Never mutated by the engine.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::locator::{BodyLocator, HeaderLocator};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

impl Message {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            headers: IndexMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Parses the payload for body lookups.
    pub fn body(&self) -> Result<BodyLocator<'_>, EngineError> {
        BodyLocator::parse(&self.payload)
    }

    pub fn header_locator(&self) -> HeaderLocator<'_> {
        HeaderLocator::new(&self.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::Locator;

    #[test]
    fn test_builder() {
        let message = Message::new("<root/>")
            .with_header("operation", "sayHello")
            .with_header("header-valueA", "A");

        assert_eq!(message.header("operation"), Some("sayHello"));
        assert_eq!(message.header("missing"), None);
        assert_eq!(message.header_locator().read("header-valueA").unwrap(), "A");
        assert!(message.body().is_ok());
    }

    #[test]
    fn test_deserialize_keeps_header_order() {
        let raw = r#"{ "payload": "<root/>", "headers": { "z": "1", "a": "2" } }"#;
        let message: Message = serde_json::from_str(raw).unwrap();

        let names: Vec<&str> = message.headers.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["z", "a"]);
    }

    #[test]
    fn test_empty_payload_is_not_a_document() {
        let message = Message::default();
        assert!(matches!(message.body(), Err(EngineError::MalformedDocument(_))));
    }
}
