//! Extraction of health topics from MedlinePlus search responses.
//!
//! A response looks roughly like:
//!
//! ```xml
//! <nlmSearchResult>
//!   <list num="2" start="0" per="10">
//!     <document rank="0" url="https://medlineplus.gov/cough.html">
//!       <content name="title">Cough</content>
//!       <content name="FullSummary">A cough is a reflex ...</content>
//!     </document>
//!   </list>
//! </nlmSearchResult>
//! ```
//!
//! Every `document` element becomes one [`ResultRecord`], in document order.
//! Missing titles, summaries or urls become empty strings.

use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

use crate::models::ResultRecord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed XML: {0}")]
    MalformedXml(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Summary,
}

impl Field {
    fn from_content(element: &BytesStart<'_>) -> Option<Self> {
        match attribute(element, b"name")?.as_str() {
            "title" => Some(Self::Title),
            "FullSummary" => Some(Self::Summary),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct DocumentBuilder {
    depth: usize,
    url: String,
    title: Option<String>,
    summary: Option<String>,
}

impl DocumentBuilder {
    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Title => &mut self.title,
            Field::Summary => &mut self.summary,
        }
    }

    fn wants(&mut self, field: Field) -> bool {
        self.slot(field).is_none()
    }

    fn finish(self) -> ResultRecord {
        ResultRecord {
            title: self.title.unwrap_or_default(),
            summary: self.summary.unwrap_or_default(),
            url: self.url,
        }
    }
}

/// Text being collected for one `content` element.
///
/// Only text that precedes the element's first child counts.
#[derive(Debug)]
struct Capture {
    field: Field,
    depth: usize,
    text: String,
    closed: bool,
}

impl Capture {
    fn push(&mut self, text: &str) {
        if !self.closed {
            self.text.push_str(text);
        }
    }
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

fn malformed(err: impl std::fmt::Display, reader: &Reader<&[u8]>) -> ParseError {
    ParseError::MalformedXml(format!("{err} (at byte {})", reader.buffer_position()))
}

/// Parses a MedlinePlus XML document into result records.
///
/// # Errors
///
/// Returns [`ParseError::MalformedXml`] when the input is not well-formed XML
/// or has no root element.
pub fn parse_search_results(xml: &str) -> Result<Vec<ResultRecord>, ParseError> {
    let mut reader = Reader::from_str(xml);

    let mut records = Vec::new();
    let mut document: Option<DocumentBuilder> = None;
    let mut capture: Option<Capture> = None;
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        match reader.read_event().map_err(|e| malformed(e, &reader))? {
            Event::Start(element) => {
                if depth == 0 && saw_root {
                    return Err(malformed("more than one root element", &reader));
                }
                depth += 1;
                saw_root = true;

                if let Some(capture) = capture.as_mut() {
                    capture.closed = true;
                } else if let Some(doc) = document.as_mut() {
                    if element.local_name().as_ref() == b"content"
                        && let Some(field) = Field::from_content(&element)
                        && doc.wants(field)
                    {
                        capture = Some(Capture {
                            field,
                            depth,
                            text: String::new(),
                            closed: false,
                        });
                    }
                } else if element.local_name().as_ref() == b"document" {
                    document = Some(DocumentBuilder {
                        depth,
                        url: attribute(&element, b"url").unwrap_or_default(),
                        ..Default::default()
                    });
                }
            }
            Event::Empty(element) => {
                if depth == 0 && saw_root {
                    return Err(malformed("more than one root element", &reader));
                }
                saw_root = true;

                if let Some(capture) = capture.as_mut() {
                    capture.closed = true;
                } else if let Some(doc) = document.as_mut() {
                    if element.local_name().as_ref() == b"content"
                        && let Some(field) = Field::from_content(&element)
                        && doc.wants(field)
                    {
                        *doc.slot(field) = Some(String::new());
                    }
                } else if element.local_name().as_ref() == b"document" {
                    records.push(ResultRecord {
                        url: attribute(&element, b"url").unwrap_or_default(),
                        ..Default::default()
                    });
                }
            }
            Event::Text(text) => {
                if depth == 0 {
                    if !text.iter().all(u8::is_ascii_whitespace) {
                        return Err(malformed("text outside the root element", &reader));
                    }
                } else if let Some(capture) = capture.as_mut() {
                    capture.push(&text.decode().map_err(|e| malformed(e, &reader))?);
                }
            }
            Event::CData(data) => {
                if depth == 0 {
                    return Err(malformed("CDATA outside the root element", &reader));
                }
                if let Some(capture) = capture.as_mut() {
                    capture.push(&data.decode().map_err(|e| malformed(e, &reader))?);
                }
            }
            Event::GeneralRef(reference) => {
                if depth == 0 {
                    return Err(malformed("reference outside the root element", &reader));
                }

                // Undefined entities are errors even outside captured content.
                let resolved = if let Some(ch) = reference
                    .resolve_char_ref()
                    .map_err(|e| malformed(e, &reader))?
                {
                    ch.to_string()
                } else {
                    let name = reference.decode().map_err(|e| malformed(e, &reader))?;
                    resolve_predefined_entity(&name)
                        .ok_or_else(|| malformed(format!("unknown entity &{name};"), &reader))?
                        .to_string()
                };

                if let Some(capture) = capture.as_mut() {
                    capture.push(&resolved);
                }
            }
            Event::End(_) => {
                if capture.as_ref().is_some_and(|c| c.depth == depth)
                    && let Some(finished) = capture.take()
                    && let Some(doc) = document.as_mut()
                {
                    *doc.slot(finished.field) = Some(finished.text);
                }

                if document.as_ref().is_some_and(|d| d.depth == depth)
                    && let Some(doc) = document.take()
                {
                    records.push(doc.finish());
                }

                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(ParseError::MalformedXml("document has no root element".to_string()));
    }
    if depth != 0 {
        return Err(ParseError::MalformedXml(format!(
            "unexpected end of document with {depth} unclosed element(s)"
        )));
    }

    Ok(records)
}
