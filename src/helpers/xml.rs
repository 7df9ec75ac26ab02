//! XML plumbing shared by the workbook, worksheet and drawing parsers.
//! Element matching is done on local names so `xdr:row` and `row` compare the same way.

use crate::error::BoqSheetError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;
use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum XmlError {
    #[error("Parse entity '{0}' failed")]
    ParseEntityError(String),

    #[error("Unexpected end of document inside '{0}'")]
    UnclosedElementError(String),
}

/// quick-xml reader configured for OOXML parts: empty elements are expanded so
/// every `Start` has a matching `End`.
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    pub(crate) fn new(buf_reader: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(buf_reader);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        config.expand_empty_elements = true;
        config.trim_text(false);

        XmlReader {
            reader,
            buffer: Vec::with_capacity(1024),
        }
    }

    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, BoqSheetError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer) {
            Ok(Event::Eof) => Ok(None),
            Ok(event) => Ok(Some(event)),
            Err(error) => Err(BoqSheetError::XmlError(error)),
        }
    }

    /// Collects the text content up to the end tag whose local name is `end`.
    pub(crate) fn read_text(&mut self, end: &[u8]) -> Result<String, BoqSheetError> {
        let mut text = String::new();
        loop {
            match self.next()? {
                Some(Event::End(event)) if event.local_name().as_ref() == end => break,
                Some(Event::Text(event)) => text.push_str(&event.xml_content()?),
                Some(Event::CData(event)) => text.push_str(&event.xml_content()?),
                Some(Event::GeneralRef(event)) => text.push_bytes_ref(&event)?,
                Some(_) => (),
                None => Err(XmlError::UnclosedElementError(String::from_utf8_lossy(end).into_owned()))?,
            }
        }
        Ok(text)
    }
}

pub(crate) trait XmlAttributeHelper<'a> {
    /// Unescaped attribute value
    fn get_value(&self) -> Result<Cow<'a, str>, BoqSheetError>;
}

impl<'a> XmlAttributeHelper<'a> for Attribute<'a> {
    fn get_value(&self) -> Result<Cow<'a, str>, BoqSheetError> {
        Ok(self.unescape_value()?)
    }
}

pub(crate) trait XmlNodeHelper<'a> {
    /// Attribute value by qualified name, e.g. `r` or `r:embed`.
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, BoqSheetError>;

    /// Attribute value by local name, ignoring whatever prefix the producer chose.
    fn get_local_attribute_value(&'a self, name: &[u8]) -> Result<Option<Cow<'a, str>>, BoqSheetError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, BoqSheetError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.get_value())
            .transpose()
    }

    fn get_local_attribute_value(&'a self, name: &[u8]) -> Result<Option<Cow<'a, str>>, BoqSheetError> {
        for result in self.attributes() {
            let attribute = result?;
            if attribute.key.local_name().as_ref() == name {
                return attribute.get_value().map(Some);
            }
        }
        Ok(None)
    }
}

pub(crate) trait XmlTextContextHelper {
    /// Appends an entity or character reference (`&amp;`, `&#10;`, `&#x41;`).
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), BoqSheetError>;
}

impl XmlTextContextHelper for String {
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), BoqSheetError> {
        let raw = bytes.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = match number.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16)?,
                None => number.parse::<u32>()?,
            };
            if let Some(character) = char::from_u32(code) {
                self.push(character);
            }
        } else if let Some(entity) = resolve_xml_entity(&raw) {
            self.push_str(entity);
        } else {
            Err(XmlError::ParseEntityError(raw.to_string()))?;
        }
        Ok(())
    }
}

#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_text_with_entities() {
        let mut reader = XmlReader::new(&b"<a><b>x &amp; y&#33;</b></a>"[..]);
        let mut text = None;
        loop {
            let is_b = match reader.next().unwrap() {
                Some(Event::Start(start)) => start.local_name().as_ref() == b"b",
                Some(_) => false,
                None => break,
            };
            if is_b {
                text = Some(reader.read_text(b"b").unwrap());
            }
        }
        assert_eq!(text.as_deref(), Some("x & y!"));
    }

    #[test]
    fn local_attribute_ignores_prefix() {
        let mut reader = XmlReader::new(&br#"<a:blip xmlns:r="urn:r" r:embed="rId7"/>"#[..]);
        match reader.next().unwrap() {
            Some(Event::Start(start)) => {
                let value = start.get_local_attribute_value(b"embed").unwrap();
                assert_eq!(value.as_deref(), Some("rId7"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
