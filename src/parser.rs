//! Parsing of rule-definition XML into [`RequestConfig`]s.
//!
//! ```xml
//! <request name="lsr_order">
//!   <rule name="ameritech" applyOn="header">
//!     <xpath>/header/Supplier/@value = 'Ameritech'</xpath>
//!     <output>
//!       <Gateway value="ameritech-gw"/>
//!       <Queue>lsr.ameritech</Queue>
//!     </output>
//!   </rule>
//! </request>
//! ```

use crate::matcher::{MatcherError, XPathCondition};
use crate::repository::MetaData;
use crate::rule::{ApplyOn, OutputProperties, RequestConfig, RuleConfig};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use tracing::trace;

const RULE_ELEMENT: &str = "rule";
const XPATH_ELEMENT: &str = "xpath";
const OUTPUT_ELEMENT: &str = "output";
const NAME_ATTR: &str = "name";
const APPLY_ON_ATTR: &str = "applyOn";
const VALUE_ATTR: &str = "value";

/// Parses rule-definition files.
pub struct ConfigParser;

impl ConfigParser {
    /// Parse one repository file.
    pub fn parse(file: &MetaData) -> Result<RequestConfig, ParseError> {
        Self::parse_str(&file.name, &file.content)
    }

    /// Parse rule-definition XML. `file_name` names the request when the
    /// root element carries no `name` attribute.
    pub fn parse_str(file_name: &str, xml: &str) -> Result<RequestConfig, ParseError> {
        let root = read_tree(xml).map_err(|message| ParseError::Xml {
            file: file_name.to_string(),
            message,
        })?;

        let request_name = match root.attr(NAME_ATTR).map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => file_stem(file_name),
        };

        let rules = root
            .children
            .iter()
            .filter(|child| child.name == RULE_ELEMENT)
            .enumerate()
            .map(|(index, element)| parse_rule(file_name, index, element))
            .collect::<Result<Vec<_>, _>>()?;

        trace!(
            file = %file_name,
            request = %request_name,
            rules = rules.len(),
            "Parsed request config"
        );

        Ok(RequestConfig::new(&request_name, file_name, rules))
    }
}

fn parse_rule(file: &str, index: usize, element: &XmlElement) -> Result<RuleConfig, ParseError> {
    let name = element
        .attr(NAME_ATTR)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("rule-{}", index + 1));

    let apply_on = match element.attr(APPLY_ON_ATTR) {
        Some(value) => value
            .parse::<ApplyOn>()
            .map_err(|message| ParseError::InvalidApplyOn {
                file: file.to_string(),
                rule: name.clone(),
                message,
            })?,
        None => ApplyOn::default(),
    };

    let expression = element
        .child(XPATH_ELEMENT)
        .map(|x| x.text.trim())
        .filter(|x| !x.is_empty())
        .ok_or_else(|| ParseError::MissingXPath {
            file: file.to_string(),
            rule: name.clone(),
        })?;

    let condition =
        XPathCondition::compile(expression).map_err(|source| ParseError::InvalidXPath {
            file: file.to_string(),
            rule: name.clone(),
            source,
        })?;

    let mut outputs = OutputProperties::new();
    if let Some(output) = element.child(OUTPUT_ELEMENT) {
        for property in &output.children {
            let value = property
                .attr(VALUE_ATTR)
                .map(str::to_string)
                .unwrap_or_else(|| property.text.trim().to_string());
            outputs.insert(property.name.clone(), value);
        }
    }

    Ok(RuleConfig::new(
        name,
        apply_on,
        condition.expression(),
        outputs,
    ))
}

fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string())
}

/// Minimal element tree built from reader events.
#[derive(Debug, Default)]
struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, String> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();

        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| format!("bad attribute on <{name}>: {e}"))?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| format!("bad attribute value on <{name}>: {e}"))?
                .into_owned();
            attributes.push((key, value));
        }

        Ok(Self {
            name,
            attributes,
            ..Default::default()
        })
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }
}

fn read_tree(xml: &str) -> Result<XmlElement, String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(XmlElement::from_start(&start)?),
            Ok(Event::Empty(start)) => {
                let element = XmlElement::from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let element = stack.pop().ok_or("unbalanced end tag")?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(text)) => {
                if let Some(current) = stack.last_mut() {
                    let text = text
                        .unescape()
                        .map_err(|e| format!("bad text in <{}>: {e}", current.name))?;
                    current.text.push_str(&text);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(format!("at byte {}: {e}", reader.buffer_position())),
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unexpected end of document inside <{}>", open.name));
    }

    root.ok_or_else(|| "document has no root element".to_string())
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), String> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        Ok(())
    } else if root.is_none() {
        *root = Some(element);
        Ok(())
    } else {
        Err(format!("unexpected second root element <{}>", element.name))
    }
}

/// Errors raised while parsing rule-definition files.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed rule file {file}: {message}")]
    Xml { file: String, message: String },

    #[error("Rule '{rule}' in {file} has no <xpath> condition")]
    MissingXPath { file: String, rule: String },

    #[error("Rule '{rule}' in {file} has an invalid applyOn: {message}")]
    InvalidApplyOn {
        file: String,
        rule: String,
        message: String,
    },

    #[error("Rule '{rule}' in {file}: {source}")]
    InvalidXPath {
        file: String,
        rule: String,
        #[source]
        source: MatcherError,
    },
}
