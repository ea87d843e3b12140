//! XML parse events.
//!
//! [`parse_document`] turns a document into the SAX-like event sequence the
//! chunk accumulator consumes. Attribute namespaces are resolved so callers
//! can pick out the reserved indexing attributes.

use quick_xml::{
    NsReader,
    events::Event,
    name::{Namespace, ResolveResult},
};

use crate::error::{Error, Result};

/// Namespace of the attributes that steer indexing.
pub const XTF_NAMESPACE: &str = "http://cdlib.org/xtf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Resolved namespace URI, `None` for unqualified attributes.
    pub namespace: Option<String>,
    pub local_name: String,
    pub value: String,
}

impl Attribute {
    /// Build an attribute in the reserved namespace.
    pub fn xtf(local_name: &str, value: &str) -> Self {
        Self {
            namespace: Some(XTF_NAMESPACE.to_string()),
            local_name: local_name.to_string(),
            value: value.to_string(),
        }
    }

    /// Build an unqualified attribute.
    pub fn plain(local_name: &str, value: &str) -> Self {
        Self {
            namespace: None,
            local_name: local_name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn is_xtf(&self) -> bool {
        self.namespace.as_deref() == Some(XTF_NAMESPACE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    StartDocument,
    StartElement {
        name: String,
        attributes: Vec<Attribute>,
    },
    Characters(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
    EndElement {
        name: String,
    },
    EndDocument,
}

/// Parse `xml` and feed every event to `handler`, stopping at the first
/// error from either side.
///
/// CDATA sections arrive as characters, empty elements as a start and an
/// end, and comments, declarations and doctypes are skipped. Text outside
/// the root element is dropped.
///
/// # Examples
///
/// ```
/// use proxindex::xml_source::{ParseEvent, parse_document};
///
/// let mut names = Vec::new();
/// parse_document("<doc><p/></doc>", |event| {
///     if let ParseEvent::StartElement { name, .. } = event {
///         names.push(name);
///     }
///     Ok(())
/// })
/// .unwrap();
/// assert_eq!(names, ["doc", "p"]);
/// ```
pub fn parse_document<F>(xml: &str, mut handler: F) -> Result<()>
where
    F: FnMut(ParseEvent) -> Result<()>,
{
    let mut reader = NsReader::from_str(xml);
    reader.trim_text(false);
    reader.expand_empty_elements(true);
    reader.check_end_names(true);

    handler(ParseEvent::StartDocument)?;
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let local = e.local_name();
                let name = reader.decoder().decode(local.as_ref())?;
                let mut attributes = Vec::new();
                for attr in e.attributes() {
                    let attr = attr.map_err(quick_xml::Error::from)?;
                    if attr.key.as_namespace_binding().is_some() {
                        continue;
                    }
                    let (ns, local) = reader.resolve_attribute(attr.key);
                    let namespace = match ns {
                        ResolveResult::Bound(Namespace(uri)) => {
                            Some(reader.decoder().decode(uri)?.into_owned())
                        }
                        _ => None,
                    };
                    attributes.push(Attribute {
                        namespace,
                        local_name: reader
                            .decoder()
                            .decode(local.as_ref())?
                            .into_owned(),
                        value: attr.unescape_value()?.into_owned(),
                    });
                }
                depth += 1;
                handler(ParseEvent::StartElement {
                    name: name.into_owned(),
                    attributes,
                })?;
            }
            Event::End(e) => {
                let local = e.local_name();
                let name = reader.decoder().decode(local.as_ref())?;
                depth = depth.saturating_sub(1);
                handler(ParseEvent::EndElement {
                    name: name.into_owned(),
                })?;
            }
            Event::Text(e) if depth > 0 => {
                handler(ParseEvent::Characters(e.unescape()?.into_owned()))?;
            }
            Event::CData(e) if depth > 0 => {
                let text = reader.decoder().decode(&e)?;
                handler(ParseEvent::Characters(text.into_owned()))?;
            }
            Event::PI(e) => {
                let content = reader.decoder().decode(&e)?;
                let (target, data) = content
                    .split_once(char::is_whitespace)
                    .unwrap_or((content.as_ref(), ""));
                handler(ParseEvent::ProcessingInstruction {
                    target: target.to_string(),
                    data: data.trim_start().to_string(),
                })?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(Error::Malformed(format!(
            "document ended with {depth} unclosed element(s)"
        )));
    }
    handler(ParseEvent::EndDocument)
}
