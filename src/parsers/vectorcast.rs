/// Parser for VectorCAST coverage XML documents.
///
/// Document structure:
///   <report>
///     <version value="2"/>
///     <combined-coverage type="statement, %" value="42% (23 / 55)"/>
///     <coverage type="statement, %" value="23/55"/>
///     <environment name="...">
///       <coverage type="..." value="..."/>
///       <unit name="...">
///         <coverage type="..." value="..."/>
///         <subprogram name="...">
///           <coverage type="..." value="..."/>
///         </subprogram>
///       </unit>
///     </environment>
///   </report>
///
/// The version may also be given as a `version` attribute on the root
/// element. It must be known before the first coverage or hierarchy element.
use std::collections::HashMap;
use std::str;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{CovError, Result};
use crate::model::*;
use crate::parsers::Parser;

/// The only document version this parser understands.
pub const SUPPORTED_VERSION: &str = "2";

pub struct VectorCastParser;

impl Parser for VectorCastParser {
    fn parse(&self, input: &[u8]) -> Result<CoverageDocument> {
        parse(input)
    }
}

pub fn parse(input: &[u8]) -> Result<CoverageDocument> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);

    let mut doc = CoverageDocument::new();
    let mut buf = Vec::new();

    // Element depth; the root element sits at depth 1.
    let mut depth: usize = 0;
    // Depths at which the currently open hierarchy elements started.
    let mut open_scopes: Vec<usize> = Vec::new();
    let mut version_checked = false;

    loop {
        let event = reader.read_event_into(&mut buf);
        let is_start_event = matches!(&event, Ok(Event::Start(_)));
        match event {
            Err(e) => {
                return Err(CovError::Xml {
                    source: e,
                    position: reader.buffer_position(),
                })
            }
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                depth += 1;
                let local = e.local_name().as_ref().to_vec();

                if depth == 1 {
                    if let Some(version) = attr_map(e).remove("version") {
                        doc.version = Some(version);
                    }
                } else {
                    match local.as_slice() {
                        b"version" => {
                            if let Some(value) = attr_map(e).remove("value") {
                                doc.version = Some(value);
                            }
                        }
                        b"coverage" | b"combined-coverage" => {
                            ensure_version(&doc, &mut version_checked)?;
                            let combined = local.as_slice() == b"combined-coverage";
                            // Combined figures only count as direct children of the root
                            if !combined || depth == 2 {
                                doc.events.push(coverage_event(e, combined)?);
                            }
                        }
                        b"environment" | b"unit" | b"subprogram" => {
                            ensure_version(&doc, &mut version_checked)?;
                            let scope = match local.as_slice() {
                                b"environment" => Scope::Environment,
                                b"unit" => Scope::Unit,
                                _ => Scope::Subprogram,
                            };
                            let name = attr_map(e).remove("name").unwrap_or_default();
                            doc.events.push(DocumentEvent::Enter { scope, name });
                            if is_start_event {
                                open_scopes.push(depth);
                            } else {
                                doc.events.push(DocumentEvent::Leave);
                            }
                        }
                        _ => {}
                    }
                }

                // Self-closing elements have no matching End event
                if !is_start_event {
                    depth -= 1;
                }
            }
            Ok(Event::End(_)) => {
                if open_scopes.last() == Some(&depth) {
                    open_scopes.pop();
                    doc.events.push(DocumentEvent::Leave);
                }
                depth = depth.saturating_sub(1);
            }
            _ => {}
        }
        buf.clear();
    }

    // Handle unclosed hierarchy elements
    for _ in open_scopes.drain(..) {
        doc.events.push(DocumentEvent::Leave);
    }

    ensure_version(&doc, &mut version_checked)?;

    Ok(doc)
}

/// Build the event for a `coverage` / `combined-coverage` element.
/// An unknown `type` aborts the document; an unreadable `value` does not.
fn coverage_event(e: &BytesStart, combined: bool) -> Result<DocumentEvent> {
    let mut attrs = attr_map(e);
    let type_attr = attrs.remove("type").unwrap_or_default();
    let kind = MetricKind::from_type_attr(&type_attr)?;
    let raw = attrs.remove("value").unwrap_or_default();

    Ok(match Ratio::parse(&raw) {
        Some(value) if combined => DocumentEvent::Combined { kind, value },
        Some(value) => DocumentEvent::Coverage { kind, value },
        None => DocumentEvent::Malformed { kind, value: raw },
    })
}

fn ensure_version(doc: &CoverageDocument, checked: &mut bool) -> Result<()> {
    if *checked {
        return Ok(());
    }
    match doc.version.as_deref().map(str::trim) {
        Some(SUPPORTED_VERSION) => {
            *checked = true;
            Ok(())
        }
        other => Err(CovError::UnsupportedVersion {
            found: other.unwrap_or("undefined").to_string(),
            expected: SUPPORTED_VERSION.to_string(),
        }),
    }
}

/// Extract attributes from an XML element into a HashMap.
fn attr_map(e: &BytesStart) -> HashMap<String, String> {
    e.attributes()
        .filter_map(|a| {
            let attr = a.ok()?;
            let key = str::from_utf8(attr.key.local_name().into_inner())
                .ok()?
                .to_string();
            let value = attr.unescape_value().ok()?.to_string();
            Some((key, value))
        })
        .collect()
}
