//! Subconjunto de XPath 1.0 usado para localizar valores no body.
//!
//! Suporta caminhos absolutos (`/a/b`), descendentes (`//a`), relativos
//! (`a/b`), `*`, `.`, `..`, atributos (`@id`, `@*`), `text()` e `node()`.
//! Nomes com prefixo (`ns:item`) casam pelo nome local.
//!
//! Predicados suportados:
//!
//! | Predicado        | Significado                                   |
//! |------------------|-----------------------------------------------|
//! | `[2]`            | Segundo candidato do passo                    |
//! | `[last()]`       | Último candidato do passo                     |
//! | `[@a]`           | Possui o atributo `a`                         |
//! | `[@a='v']`       | Atributo `a` igual a `v`                      |
//! | `[filho='v']`    | Algum filho `filho` com valor `v`             |
//! | `[text()='v']`   | Algum nó de texto filho igual a `v`           |
//! | `[.='v']`        | Valor do próprio nó igual a `v`               |

use std::collections::HashSet;

use roxmltree::{Document, Node};

use crate::errors::EngineError;

// ============================================================================
// ÁRVORE DO CAMINHO
// ============================================================================

/// Caminho compilado, pronto para ser avaliado contra qualquer documento.
#[derive(Debug, Clone, PartialEq)]
pub struct XPath {
    source: String,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    DescendantOrSelf,
    SelfNode,
    Parent,
    Attribute,
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    /// Nome local.
    Name(String),
    /// `*`
    Wildcard,
    /// `text()`
    Text,
    /// `node()`
    AnyNode,
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Position(usize),
    Last,
    HasAttribute(String),
    AttributeEquals(String, String),
    ChildEquals(String, String),
    TextEquals(String),
    SelfEquals(String),
}

// ============================================================================
// NÓS
// ============================================================================

/// Nó selecionado: um nó da árvore ou um atributo de um elemento.
///
/// O roxmltree guarda atributos como dados do elemento, não como nós
/// navegáveis, então o atributo é identificado pelo pai e pela posição.
#[derive(Debug, Clone, Copy)]
pub enum XmlNode<'a, 'input> {
    Tree(Node<'a, 'input>),
    Attribute { parent: Node<'a, 'input>, index: usize },
}

impl<'a, 'input> XmlNode<'a, 'input> {
    /// Chave de ordem de documento; o elemento vem antes dos seus atributos.
    fn order_key(&self) -> (u64, usize) {
        match self {
            Self::Tree(node) => (node.id().get() as u64, 0),
            Self::Attribute { parent, index } => (parent.id().get() as u64, index + 1),
        }
    }

    /// Valor textual do nó, como o `string()` do XPath.
    pub fn string_value(&self) -> String {
        match self {
            Self::Tree(node) if node.is_element() || node.is_root() => node
                .descendants()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect(),
            Self::Tree(node) => node.text().unwrap_or_default().to_string(),
            Self::Attribute { parent, index } => parent
                .attributes()
                .nth(*index)
                .map(|attr| attr.value().to_string())
                .unwrap_or_default(),
        }
    }

    fn tree(&self) -> Option<Node<'a, 'input>> {
        match self {
            Self::Tree(node) => Some(*node),
            Self::Attribute { .. } => None,
        }
    }
}

// ============================================================================
// AVALIAÇÃO
// ============================================================================

impl XPath {
    /// Compila um caminho.
    pub fn parse(path: &str) -> Result<Self, EngineError> {
        PathParser::new(path).parse()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Todos os nós selecionados, em ordem de documento e sem repetições.
    ///
    /// Caminhos relativos partem do nó documento, assim como os absolutos.
    pub fn select<'a, 'input>(&self, document: &'a Document<'input>) -> Vec<XmlNode<'a, 'input>> {
        let mut current = vec![XmlNode::Tree(document.root())];

        for step in &self.steps {
            let mut seen = HashSet::new();
            let mut next = Vec::new();

            for context in &current {
                let candidates = step.candidates(*context);
                for node in step.filter(candidates) {
                    if seen.insert(node.order_key()) {
                        next.push(node);
                    }
                }
            }

            next.sort_by_key(XmlNode::order_key);
            current = next;
            if current.is_empty() {
                break;
            }
        }

        current
    }

    /// Primeiro nó selecionado em ordem de documento.
    pub fn select_first<'a, 'input>(&self, document: &'a Document<'input>) -> Option<XmlNode<'a, 'input>> {
        self.select(document).into_iter().next()
    }
}

impl Step {
    fn candidates<'a, 'input>(&self, context: XmlNode<'a, 'input>) -> Vec<XmlNode<'a, 'input>> {
        let node = match (self.axis, context) {
            (Axis::SelfNode, _) => return self.keep_matching(std::iter::once(context)),
            (Axis::Parent, XmlNode::Attribute { parent, .. }) => {
                return self.keep_matching(std::iter::once(XmlNode::Tree(parent)))
            }
            (_, XmlNode::Attribute { .. }) => return Vec::new(),
            (_, XmlNode::Tree(node)) => node,
        };

        match self.axis {
            Axis::Child => self.keep_matching(node.children().map(XmlNode::Tree)),
            Axis::DescendantOrSelf => self.keep_matching(node.descendants().map(XmlNode::Tree)),
            Axis::Parent => self.keep_matching(node.parent().map(XmlNode::Tree).into_iter()),
            Axis::Attribute if node.is_element() => self.keep_matching(
                (0..node.attributes().count()).map(move |index| XmlNode::Attribute { parent: node, index }),
            ),
            _ => Vec::new(),
        }
    }

    fn keep_matching<'a, 'input>(
        &self,
        nodes: impl Iterator<Item = XmlNode<'a, 'input>>,
    ) -> Vec<XmlNode<'a, 'input>> {
        nodes.filter(|node| self.matches(node)).collect()
    }

    fn matches(&self, node: &XmlNode<'_, '_>) -> bool {
        match node {
            XmlNode::Attribute { parent, index } => {
                let Some(attr) = parent.attributes().nth(*index) else {
                    return false;
                };
                match &self.test {
                    NodeTest::Name(name) => attr.name() == name,
                    NodeTest::Wildcard | NodeTest::AnyNode => true,
                    NodeTest::Text => false,
                }
            }
            XmlNode::Tree(n) => match &self.test {
                NodeTest::Name(name) => n.is_element() && n.tag_name().name() == name,
                NodeTest::Wildcard => n.is_element(),
                NodeTest::Text => n.is_text(),
                NodeTest::AnyNode => true,
            },
        }
    }

    /// Aplica os predicados em sequência; posições são relativas ao nó de contexto.
    fn filter<'a, 'input>(&self, mut nodes: Vec<XmlNode<'a, 'input>>) -> Vec<XmlNode<'a, 'input>> {
        for predicate in &self.predicates {
            nodes = match predicate {
                Predicate::Position(n) => nodes.into_iter().nth(n - 1).into_iter().collect(),
                Predicate::Last => nodes.pop().into_iter().collect(),
                other => nodes.into_iter().filter(|node| other.holds(node)).collect(),
            };
        }
        nodes
    }
}

impl Predicate {
    fn holds(&self, node: &XmlNode<'_, '_>) -> bool {
        match self {
            Self::SelfEquals(value) => node.string_value() == *value,
            Self::Position(_) | Self::Last => true,
            _ => {
                let Some(element) = node.tree() else {
                    return false;
                };
                match self {
                    Self::HasAttribute(name) => attribute(element, name).is_some(),
                    Self::AttributeEquals(name, value) => attribute(element, name) == Some(value.as_str()),
                    Self::ChildEquals(name, value) => element.children().any(|child| {
                        child.is_element()
                            && child.tag_name().name() == name
                            && XmlNode::Tree(child).string_value() == *value
                    }),
                    Self::TextEquals(value) => element
                        .children()
                        .any(|child| child.is_text() && child.text() == Some(value.as_str())),
                    _ => true,
                }
            }
        }
    }
}

/// Atributo pelo nome local, ignorando namespace.
fn attribute<'a>(element: Node<'a, '_>, name: &str) -> Option<&'a str> {
    element
        .attributes()
        .find(|attr| attr.name() == name)
        .map(|attr| attr.value())
}

// ============================================================================
// PARSER
// ============================================================================

struct PathParser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> PathParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<XPath, EngineError> {
        self.skip_whitespace();
        if self.at_end() {
            return Err(self.error("caminho vazio"));
        }

        let mut steps = Vec::new();
        let mut expect_step = true;

        if self.eat("//") {
            steps.push(descendant_or_self());
        } else if self.eat("/") {
            // `/` sozinho seleciona o nó documento.
            expect_step = !self.at_end();
        }

        while expect_step {
            steps.push(self.parse_step()?);
            self.skip_whitespace();

            if self.at_end() {
                break;
            }
            if self.eat("//") {
                steps.push(descendant_or_self());
            } else if !self.eat("/") {
                return Err(self.error(format!("caractere inesperado '{}'", self.chars[self.pos])));
            }
        }

        Ok(XPath {
            source: self.source.to_string(),
            steps,
        })
    }

    fn parse_step(&mut self) -> Result<Step, EngineError> {
        self.skip_whitespace();

        if self.eat("..") {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }
        if self.eat(".") {
            return Ok(Step {
                axis: Axis::SelfNode,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
        }

        let (axis, test) = if self.eat("@") {
            let test = if self.eat("*") {
                NodeTest::Wildcard
            } else {
                NodeTest::Name(self.parse_name()?)
            };
            (Axis::Attribute, test)
        } else if self.eat("*") {
            (Axis::Child, NodeTest::Wildcard)
        } else if self.eat("text()") {
            (Axis::Child, NodeTest::Text)
        } else if self.eat("node()") {
            (Axis::Child, NodeTest::AnyNode)
        } else {
            (Axis::Child, NodeTest::Name(self.parse_name()?))
        };

        let mut predicates = Vec::new();
        loop {
            self.skip_whitespace();
            if !self.eat("[") {
                break;
            }
            predicates.push(self.parse_predicate()?);
            self.skip_whitespace();
            if !self.eat("]") {
                return Err(self.error("predicado sem ']' de fechamento"));
            }
        }

        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_predicate(&mut self) -> Result<Predicate, EngineError> {
        self.skip_whitespace();

        if self.peek().is_some_and(|c| c.is_ascii_digit()) {
            let start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
            let digits: String = self.chars[start..self.pos].iter().collect();
            return match digits.parse::<usize>() {
                Ok(n) if n > 0 => Ok(Predicate::Position(n)),
                _ => Err(self.error(format!("posição inválida '{}'", digits))),
            };
        }

        if self.eat("last()") {
            return Ok(Predicate::Last);
        }

        if self.eat("@") {
            let name = self.parse_name()?;
            return Ok(match self.parse_comparison()? {
                Some(value) => Predicate::AttributeEquals(name, value),
                None => Predicate::HasAttribute(name),
            });
        }

        if self.eat("text()") {
            let value = self.require_comparison()?;
            return Ok(Predicate::TextEquals(value));
        }

        if self.eat(".") {
            let value = self.require_comparison()?;
            return Ok(Predicate::SelfEquals(value));
        }

        let name = self.parse_name()?;
        let value = self.require_comparison()?;
        Ok(Predicate::ChildEquals(name, value))
    }

    fn require_comparison(&mut self) -> Result<String, EngineError> {
        self.parse_comparison()?
            .ok_or_else(|| self.error("esperado '=' seguido de literal"))
    }

    /// `= 'literal'` ou `= "literal"`, se presente.
    fn parse_comparison(&mut self) -> Result<Option<String>, EngineError> {
        self.skip_whitespace();
        if !self.eat("=") {
            return Ok(None);
        }
        self.skip_whitespace();

        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("esperado literal entre aspas")),
        };
        self.pos += 1;

        let start = self.pos;
        while self.peek().is_some_and(|c| c != quote) {
            self.pos += 1;
        }
        if self.at_end() {
            return Err(self.error("literal sem aspas de fechamento"));
        }
        let value: String = self.chars[start..self.pos].iter().collect();
        self.pos += 1;
        Ok(Some(value))
    }

    /// Nome qualificado; devolve só a parte local.
    fn parse_name(&mut self) -> Result<String, EngineError> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' => self.pos += 1,
            Some(c) => return Err(self.error(format!("nome esperado, encontrado '{}'", c))),
            None => return Err(self.error("nome esperado no fim do caminho")),
        }
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
        {
            self.pos += 1;
        }

        let qname: String = self.chars[start..self.pos].iter().collect();
        let local = qname.rsplit(':').next().unwrap_or_default();
        if local.is_empty() {
            return Err(self.error(format!("nome inválido '{}'", qname)));
        }
        Ok(local.to_string())
    }

    fn eat(&mut self, token: &str) -> bool {
        let len = token.chars().count();
        let matches = self.pos + len <= self.chars.len()
            && self.chars[self.pos..self.pos + len].iter().copied().eq(token.chars());
        if matches {
            self.pos += len;
        }
        matches
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> EngineError {
        EngineError::InvalidPath {
            path: self.source.to_string(),
            message: format!("{} (posição {})", message.into(), self.pos),
        }
    }
}

fn descendant_or_self() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::AnyNode,
        predicates: Vec::new(),
    }
}

// ============================================================================
// TESTES
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<root xmlns:ns="urn:test">
        <element attributeA="attribute-value" attributeB="attribute-value">
            <sub-elementA attribute="A">text-value</sub-elementA>
            <sub-elementB attribute="B">text-value</sub-elementB>
            <sub-elementC attribute="C">text-value</sub-elementC>
        </element>
        <list>
            <item id="1"><name>first</name></item>
            <item id="2"><name>second</name></item>
            <ns:item id="3"><name>third</name></ns:item>
        </list>
    </root>"#;

    fn first(path: &str) -> Option<String> {
        let doc = Document::parse(DOC).unwrap();
        XPath::parse(path)
            .unwrap()
            .select_first(&doc)
            .map(|node| node.string_value())
    }

    fn count(path: &str) -> usize {
        let doc = Document::parse(DOC).unwrap();
        XPath::parse(path).unwrap().select(&doc).len()
    }

    #[test]
    fn test_absolute_and_descendant_paths() {
        assert_eq!(first("/root/element/sub-elementA").as_deref(), Some("text-value"));
        assert_eq!(first("//root/element/sub-elementA").as_deref(), Some("text-value"));
        assert_eq!(first("//sub-elementB").as_deref(), Some("text-value"));
        assert_eq!(first("root/element/sub-elementC/text()").as_deref(), Some("text-value"));
    }

    #[test]
    fn test_attributes() {
        assert_eq!(first("//element/@attributeA").as_deref(), Some("attribute-value"));
        assert_eq!(first("//sub-elementB/@attribute").as_deref(), Some("B"));
        assert_eq!(count("//element/@*"), 2);
        assert_eq!(first("//element/@missing"), None);
    }

    #[test]
    fn test_predicates() {
        assert_eq!(first("//item[2]/name").as_deref(), Some("second"));
        assert_eq!(first("//item[last()]/name").as_deref(), Some("third"));
        assert_eq!(first("//item[@id='3']/name").as_deref(), Some("third"));
        assert_eq!(first("//item[name=\"first\"]/@id").as_deref(), Some("1"));
        assert_eq!(first("//name[text()='second']/../@id").as_deref(), Some("2"));
        assert_eq!(first("//name[.='third']/../@id").as_deref(), Some("3"));
        assert_eq!(count("//*[@attribute]"), 3);
    }

    #[test]
    fn test_positional_predicate_is_per_parent() {
        // Cada <item> tem um único <name>, então `name[1]` casa os três.
        assert_eq!(count("//item/name[1]"), 3);
        assert_eq!(count("//name[1]"), 3);
    }

    #[test]
    fn test_prefixed_names_match_local_name() {
        assert_eq!(count("/root/list/item"), 3);
        assert_eq!(count("//ns:item"), 3);
        assert_eq!(first("//ns:item[@id='3']/name").as_deref(), Some("third"));
    }

    #[test]
    fn test_first_match_in_document_order() {
        assert_eq!(first("//item/name").as_deref(), Some("first"));
        assert_eq!(first("//element/*/@attribute").as_deref(), Some("A"));
    }

    #[test]
    fn test_element_string_value_concatenates_text() {
        assert_eq!(first("//list/item[1]").as_deref(), Some("first"));
        let doc = Document::parse("<a>x<b>y</b>z</a>").unwrap();
        let node = XPath::parse("/a").unwrap().select_first(&doc).unwrap();
        assert_eq!(node.string_value(), "xyz");
    }

    #[test]
    fn test_self_and_root() {
        assert_eq!(count("/"), 1);
        assert_eq!(first("//sub-elementA/.").as_deref(), Some("text-value"));
        assert_eq!(count("//sub-elementA/node()"), 1);
    }

    #[test]
    fn test_no_match() {
        assert_eq!(first("//missing"), None);
        assert_eq!(first("/element"), None);
        assert_eq!(first("//item[9]"), None);
    }

    #[test]
    fn test_invalid_paths() {
        for path in ["", "//", "/root/", "//item[", "//item[0]", "//item[@id=3]", "//a!b", "//item[name]"] {
            assert!(
                matches!(XPath::parse(path), Err(EngineError::InvalidPath { .. })),
                "expected invalid path: {:?}",
                path
            );
        }
    }
}
