//! XML documents as plain nested values
//!
//! No schema is applied. The document is mapped with the usual conventions:
//! - each element becomes a key holding its content
//! - attributes become `@name` keys
//! - text next to attributes or child elements goes under `#text`
//! - an element holding only text becomes that string
//! - an empty element becomes `null`
//! - repeated sibling elements are collected into an array

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use crate::error::ConvertError;

struct Element {
    name: String,
    children: Map<String, Value>,
    text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self, ConvertError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut children = Map::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| ConvertError::Xml(e.to_string()))?;
            let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
            let value = attr
                .unescape_value()
                .map_err(|e| ConvertError::Xml(e.to_string()))?;
            children.insert(key, Value::String(value.into_owned()));
        }
        Ok(Self {
            name,
            children,
            text: String::new(),
        })
    }

    fn close(self) -> (String, Value) {
        let text = self.text.trim();
        let value = if self.children.is_empty() {
            if text.is_empty() {
                Value::Null
            } else {
                Value::String(text.to_string())
            }
        } else {
            let mut children = self.children;
            if !text.is_empty() {
                children.insert("#text".to_string(), Value::String(text.to_string()));
            }
            Value::Object(children)
        };
        (self.name, value)
    }

    fn push_child(&mut self, name: String, value: Value) {
        match self.children.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.children.insert(name, value);
            }
        }
    }
}

fn junk_after_root(reader: &Reader<&[u8]>) -> ConvertError {
    ConvertError::Xml(format!(
        "at position {}: junk after document element",
        reader.buffer_position()
    ))
}

fn text_outside_root(reader: &Reader<&[u8]>) -> ConvertError {
    ConvertError::Xml(format!(
        "at position {}: text outside the document element",
        reader.buffer_position()
    ))
}

/// Convert an XML document into nested objects, arrays and strings
pub fn xml_to_value(contents: &str) -> Result<Value, ConvertError> {
    let mut reader = Reader::from_str(contents);
    reader.config_mut().trim_text(true);

    let mut document = Element {
        name: String::new(),
        children: Map::new(),
        text: String::new(),
    };
    let mut stack: Vec<Element> = Vec::new();
    let mut root_closed = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            ConvertError::Xml(format!("at position {}: {}", reader.buffer_position(), e))
        })?;
        match event {
            Event::Start(start) => {
                if root_closed {
                    return Err(junk_after_root(&reader));
                }
                stack.push(Element::open(&start)?);
            }
            Event::Empty(start) => {
                if root_closed {
                    return Err(junk_after_root(&reader));
                }
                let (name, value) = Element::open(&start)?.close();
                stack.last_mut().unwrap_or(&mut document).push_child(name, value);
                root_closed = stack.is_empty();
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ConvertError::Xml("unexpected closing tag".to_string()))?;
                let (name, value) = element.close();
                stack.last_mut().unwrap_or(&mut document).push_child(name, value);
                root_closed = stack.is_empty();
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| ConvertError::Xml(e.to_string()))?;
                match stack.last_mut() {
                    Some(element) => element.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(text_outside_root(&reader)),
                }
            }
            Event::CData(data) => match stack.last_mut() {
                Some(element) => {
                    element.text.push_str(&String::from_utf8_lossy(&data.into_inner()))
                }
                None => return Err(text_outside_root(&reader)),
            },
            Event::Eof => break,
            // Declarations, comments and processing instructions carry no data
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ConvertError::Xml(format!("unclosed element <{}>", open.name)));
    }
    if document.children.is_empty() {
        return Err(ConvertError::Xml("document has no root element".to_string()));
    }
    Ok(Value::Object(document.children))
}
