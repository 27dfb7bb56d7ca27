//! XML response tree and item-list writer.
//!
//! # Design
//! Responses are decoded into a small ordered `Element` tree rather than
//! straight into typed records. Absent elements stay distinguishable from
//! empty ones, which is how list operations tell "no list" from "empty list".
//! Namespace prefixes are dropped so lookups use the service's local names.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{ApiError, Result};
use crate::types::Record;

/// One XML element with its text content and child elements in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Parse a document and return its root element.
    pub fn parse(xml: &str) -> Result<Element> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => stack.push(Element::new(local_name(&start))),
                Ok(Event::Empty(start)) => {
                    attach(&mut stack, &mut root, Element::new(local_name(&start)))?;
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| ApiError::Xml("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(text)) => {
                    if let Some(current) = stack.last_mut() {
                        let text = text.unescape().map_err(|e| ApiError::Xml(e.to_string()))?;
                        current.text.push_str(&text);
                    }
                }
                Ok(Event::CData(data)) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(ApiError::Xml(format!(
                        "at position {}: {e}",
                        reader.buffer_position()
                    )))
                }
            }
        }

        if !stack.is_empty() {
            return Err(ApiError::Xml("unexpected end of document".to_string()));
        }
        root.ok_or_else(|| ApiError::Xml("document has no root element".to_string()))
    }

    /// First child named `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children named `name`, in document order.
    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Leaf children as name/value pairs. Nested elements are skipped and
    /// repeated children each keep their value.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        for child in self.children.iter().filter(|c| c.is_leaf()) {
            record.push(child.name.clone(), child.text.clone());
        }
        record
    }
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(ApiError::Xml("multiple root elements".to_string())),
    }
    Ok(())
}

/// Render items as the `<ItemList>` document `Collection.AddItem` uploads.
pub fn write_item_list(items: &[Record]) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    write(&mut writer, Event::Decl(BytesDecl::new("1.0", None, None)))?;
    write(&mut writer, Event::Start(BytesStart::new("ItemList")))?;
    for item in items {
        write(&mut writer, Event::Start(BytesStart::new("Item")))?;
        for (name, value) in item.iter() {
            if name.is_empty() {
                return Err(ApiError::Serialization("item field with empty name".to_string()));
            }
            write(&mut writer, Event::Start(BytesStart::new(name)))?;
            write(&mut writer, Event::Text(BytesText::new(value)))?;
            write(&mut writer, Event::End(BytesEnd::new(name)))?;
        }
        write(&mut writer, Event::End(BytesEnd::new("Item")))?;
    }
    write(&mut writer, Event::End(BytesEnd::new("ItemList")))?;
    String::from_utf8(writer.into_inner()).map_err(|e| ApiError::Serialization(e.to_string()))
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| ApiError::Serialization(e.to_string()))
}
