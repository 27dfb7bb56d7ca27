use std::fmt;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// True when `name` can be written as an element name.
pub fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Response body builder. The first invalid name or write error is kept and
/// reported by `finish`; later calls are ignored.
pub struct XmlBody {
    writer: Writer<Vec<u8>>,
    error: Option<String>,
}

impl Default for XmlBody {
    fn default() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
            error: None,
        }
    }
}

impl fmt::Debug for XmlBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlBody")
            .field("len", &self.writer.get_ref().len())
            .field("error", &self.error)
            .finish()
    }
}

impl XmlBody {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&mut self, event: Event<'_>) {
        if self.error.is_none() {
            if let Err(err) = self.writer.write_event(event) {
                self.error = Some(err.to_string());
            }
        }
    }

    fn check(&mut self, name: &str) -> bool {
        if self.error.is_none() && !valid_name(name) {
            self.error = Some(format!("invalid element name {name:?}"));
        }
        self.error.is_none()
    }

    pub fn leaf(&mut self, name: &str, value: impl ToString) -> &mut Self {
        if self.check(name) {
            let value = value.to_string();
            self.write(Event::Start(BytesStart::new(name)));
            self.write(Event::Text(BytesText::new(&value)));
            self.write(Event::End(BytesEnd::new(name)));
        }
        self
    }

    pub fn open(&mut self, name: &str) -> &mut Self {
        if self.check(name) {
            self.write(Event::Start(BytesStart::new(name)));
        }
        self
    }

    pub fn close(&mut self, name: &str) -> &mut Self {
        if self.check(name) {
            self.write(Event::End(BytesEnd::new(name)));
        }
        self
    }

    /// Append an already serialized fragment as is.
    pub fn raw(&mut self, xml: &str) -> &mut Self {
        self.write(Event::Text(BytesText::from_escaped(xml)));
        self
    }

    /// The written document, or the first error met while building it.
    pub fn finish(&mut self) -> Result<String, String> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        let bytes = std::mem::take(self.writer.get_mut());
        String::from_utf8(bytes).map_err(|e| e.to_string())
    }
}

/// Wrap `body` in the response envelope for `operation`, e.g.
/// `Agent.Get` becomes `<AgentGetResponse>`.
pub fn envelope(operation: &str, result: &str, body: &str) -> Result<String, String> {
    let root = format!("{}Response", operation.replace('.', ""));
    let mut xml = XmlBody::new();
    xml.write(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)));
    if xml.check(&root) {
        xml.write(Event::Start(BytesStart::new(root.as_str()).with_attributes([("xmlns:xsi", XSI)])));
    }
    xml.leaf("Result", result).raw(body).close(&root).finish()
}

/// Read the `<ItemList>` upload sent with `Collection.AddItem`.
pub fn parse_item_list(xml: &str) -> Result<Vec<Vec<(String, String)>>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut item: Option<Vec<(String, String)>> = None;
    let mut field: Option<String> = None;
    let mut value = String::new();

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                if item.is_some() {
                    field = Some(name);
                    value.clear();
                } else if name == "Item" {
                    item = Some(Vec::new());
                }
            }
            Event::Empty(start) => {
                if let Some(item) = item.as_mut() {
                    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                    item.push((name, String::new()));
                }
            }
            Event::Text(text) => {
                if field.is_some() {
                    value.push_str(&text.unescape().map_err(|e| e.to_string())?);
                }
            }
            Event::End(end) => {
                if let Some(name) = field.take() {
                    if let Some(item) = item.as_mut() {
                        item.push((name, std::mem::take(&mut value)));
                    }
                } else if end.local_name().as_ref() == b"Item" {
                    if let Some(done) = item.take() {
                        items.push(done);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_names_root_after_operation() {
        let xml = envelope("Agent.Get", "Success", "<AgentID>1</AgentID>").unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("<AgentGetResponse xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">"));
        assert!(xml.ends_with("<Result>Success</Result><AgentID>1</AgentID></AgentGetResponse>"));
    }

    #[test]
    fn envelope_rejects_unusable_operation_names() {
        assert!(envelope("<Agent>.Get", "Error", "").is_err());
        assert!(envelope("Agent Get", "Error", "").is_err());
    }

    #[test]
    fn leaf_escapes_text() {
        let body = XmlBody::new().leaf("Name", "A & <B>").finish().unwrap();
        assert_eq!(body, "<Name>A &amp; &lt;B&gt;</Name>");
    }

    #[test]
    fn invalid_element_names_fail_the_body() {
        let err = XmlBody::new()
            .open("ItemList")
            .leaf("Unit Price", 3)
            .leaf("Name", "x")
            .finish()
            .unwrap_err();
        assert!(err.contains("Unit Price"));
        assert!(XmlBody::new().leaf("", "x").finish().is_err());
        assert!(XmlBody::new().leaf("1st", "x").finish().is_err());
        assert!(XmlBody::new().leaf("Email.To", "x").finish().is_ok());
    }

    #[test]
    fn parses_uploaded_items() {
        let items = parse_item_list(
            "<?xml version=\"1.0\"?><ItemList>\
             <Item><Address>1 Main &amp; Co</Address><ZIP>90210</ZIP></Item>\
             <Item><Address>2 Main Street</Address><ZIP/></Item></ItemList>",
        )
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0][0], ("Address".to_string(), "1 Main & Co".to_string()));
        assert_eq!(items[1][1], ("ZIP".to_string(), String::new()));
    }
}
