use quick_xml::events::Event;
use quick_xml::Reader;

/// A fully materialized element. The supported dialects are attribute-heavy
/// and small (one document per file), so a plain tree is simpler to run
/// fallback chains over than streaming event dispatch.
#[derive(Debug, Clone)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
}

impl Element {
    fn new(name: String) -> Self {
        Self { name, attributes: Vec::new(), children: Vec::new() }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Builds the element tree for one document. Returns a message for malformed
/// markup; the caller wraps it into the fatal parse failure.
pub fn parse_tree(xml: &str) -> Result<Element, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                stack.push(element_from_start(e)?);
            }
            Ok(Event::Empty(ref e)) => {
                let el = element_from_start(e)?;
                attach(&mut stack, &mut root, el)?;
            }
            Ok(Event::End(_)) => {
                let el = stack.pop().ok_or_else(|| "unbalanced closing tag".to_string())?;
                attach(&mut stack, &mut root, el)?;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            // Text/CDATA/comments/PI carry no data in the supported dialects.
            Ok(_) => {}
        }
    }

    if !stack.is_empty() {
        return Err("unexpected end of document".to_string());
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

fn element_from_start(e: &quick_xml::events::BytesStart<'_>) -> Result<Element, String> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut el = Element::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| e.to_string())?
            .into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn attach(
    stack: &mut Vec<Element>,
    root: &mut Option<Element>,
    el: Element,
) -> Result<(), String> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(el);
    } else if root.is_none() {
        *root = Some(el);
    } else {
        return Err("multiple root elements".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_tree_with_attributes() {
        let tree = parse_tree(
            r#"<Doc Number="42"><Items><Item Name="a"/><Item Name="b"/></Items></Doc>"#,
        )
        .unwrap();
        assert_eq!(tree.name, "Doc");
        assert_eq!(tree.attr("Number"), Some("42"));
        let items = tree.child("Items").unwrap();
        assert_eq!(items.children.len(), 2);
        assert_eq!(items.children[1].attr("Name"), Some("b"));
    }

    #[test]
    fn unescapes_attribute_values() {
        let tree = parse_tree(r#"<Doc Sender="A &amp; B"/>"#).unwrap();
        assert_eq!(tree.attr("Sender"), Some("A & B"));
    }

    #[test]
    fn rejects_malformed_markup() {
        assert!(parse_tree("<Doc><Items></Doc>").is_err());
        assert!(parse_tree("not xml at all").is_err());
    }
}
