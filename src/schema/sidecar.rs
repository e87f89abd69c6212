//! Metadata sidecar files.
//!
//! Each database stores its schema in an XML sidecar next to the store
//! file: `table.xml` enumerates the table's columns in order,
//! `index_<name>.xml` the key columns and bucket widths of an index.
//!
//! The dialect is a strict, attribute-only XML subset — two levels of
//! nested elements, double-quoted attributes, no text content — written
//! and parsed by hand so that the on-disk format is owned by this crate
//! and round-trips exactly. Anything outside the dialect is rejected with
//! [`Error::CorruptMetadata`].

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

use super::{
    Column, ElementCount, ElementType, INDEX_METADATA_VERSION, SCHEMA_VERSION, Schema,
};

// ------------------------------------------------------------------------------------------------
// Generic element tree
// ------------------------------------------------------------------------------------------------

/// One element of the sidecar dialect: a tag, ordered attributes, child
/// elements. No text content.
#[derive(Debug, PartialEq)]
struct XmlElement {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlElement>,
}

impl XmlElement {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.push((name.to_string(), value.into()));
        self
    }

    fn child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    fn get_attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn require_attr(&self, name: &str) -> Result<&str> {
        self.get_attr(name).ok_or_else(|| {
            Error::CorruptMetadata(format!(
                "element <{}> is missing attribute '{name}'",
                self.tag
            ))
        })
    }

    /// Render the element tree, two-space indented.
    fn render(&self, indent: usize, out: &mut String) {
        for _ in 0..indent {
            out.push_str("  ");
        }
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape(value));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>\n");
        } else {
            out.push_str(">\n");
            for child in &self.children {
                child.render(indent + 1, out);
            }
            for _ in 0..indent {
                out.push_str("  ");
            }
            out.push_str("</");
            out.push_str(&self.tag);
            out.push_str(">\n");
        }
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

// ------------------------------------------------------------------------------------------------
// Parser
// ------------------------------------------------------------------------------------------------

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn corrupt(&self, msg: &str) -> Error {
        Error::CorruptMetadata(format!("{msg} at byte {}", self.pos))
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, s: &str) -> Result<()> {
        if self.input[self.pos..].starts_with(s.as_bytes()) {
            self.pos += s.len();
            Ok(())
        } else {
            Err(self.corrupt(&format!("expected '{s}'")))
        }
    }

    fn read_name(&mut self) -> Result<String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_' || c == b'-')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.corrupt("expected a name"));
        }
        // names are restricted to ASCII by the loop above
        String::from_utf8(self.input[start..self.pos].to_vec())
            .map_err(|_| self.corrupt("non-UTF-8 name"))
    }

    fn read_attribute_value(&mut self) -> Result<String> {
        self.expect("\"")?;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == b'"' {
                let raw = std::str::from_utf8(&self.input[start..self.pos])
                    .map_err(|_| self.corrupt("non-UTF-8 attribute value"))?;
                let value = unescape(raw)
                    .ok_or_else(|| self.corrupt("unknown entity in attribute value"))?;
                self.pos += 1;
                return Ok(value);
            }
            self.pos += 1;
        }
        Err(self.corrupt("unterminated attribute value"))
    }

    /// Parse one element, cursor positioned at its `<`.
    fn parse_element(&mut self) -> Result<XmlElement> {
        self.expect("<")?;
        let tag = self.read_name()?;
        let mut element = XmlElement::new(&tag);
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'/') => {
                    self.expect("/>")?;
                    return Ok(element);
                }
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let name = self.read_name()?;
                    self.skip_whitespace();
                    self.expect("=")?;
                    self.skip_whitespace();
                    let value = self.read_attribute_value()?;
                    element.attributes.push((name, value));
                }
                None => return Err(self.corrupt("unterminated element")),
            }
        }
        // children until the closing tag
        loop {
            self.skip_whitespace();
            if self.input[self.pos..].starts_with(b"</") {
                self.pos += 2;
                let closing = self.read_name()?;
                if closing != tag {
                    return Err(self.corrupt(&format!(
                        "mismatched closing tag </{closing}> for <{tag}>"
                    )));
                }
                self.skip_whitespace();
                self.expect(">")?;
                return Ok(element);
            }
            if self.peek() != Some(b'<') {
                return Err(self.corrupt("text content is not part of the sidecar dialect"));
            }
            element.children.push(self.parse_element()?);
        }
    }

    fn parse_document(&mut self) -> Result<XmlElement> {
        self.skip_whitespace();
        if self.input[self.pos..].starts_with(b"<?") {
            match self.input[self.pos..].windows(2).position(|w| w == b"?>") {
                Some(rel) => self.pos += rel + 2,
                None => return Err(self.corrupt("unterminated declaration")),
            }
        }
        self.skip_whitespace();
        let root = self.parse_element()?;
        self.skip_whitespace();
        if self.pos != self.input.len() {
            return Err(self.corrupt("trailing content after root element"));
        }
        Ok(root)
    }
}

fn unescape(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];
        let end = rest.find(';')?;
        match &rest[..=end] {
            "&amp;" => out.push('&'),
            "&lt;" => out.push('<'),
            "&gt;" => out.push('>'),
            "&quot;" => out.push('"'),
            "&apos;" => out.push('\''),
            _ => return None,
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Some(out)
}

// ------------------------------------------------------------------------------------------------
// File round-trip helpers
// ------------------------------------------------------------------------------------------------

fn write_document(path: &Path, root: &XmlElement) -> Result<()> {
    let mut out = String::from("<?xml version=\"1.0\" ?>\n");
    root.render(0, &mut out);
    fs::write(path, out)?;
    debug!(path = %path.display(), "wrote metadata sidecar");
    Ok(())
}

fn read_document(path: &Path) -> Result<XmlElement> {
    let text = fs::read_to_string(path)?;
    Parser::new(&text).parse_document()
}

// ------------------------------------------------------------------------------------------------
// Table schema sidecar
// ------------------------------------------------------------------------------------------------

fn column_element(col: &Column) -> XmlElement {
    let num_elements = match col.element_count() {
        ElementCount::Fixed(n) => n.to_string(),
        ElementCount::Variable => "var(1)".to_string(),
    };
    XmlElement::new("column")
        .attr("name", col.name())
        .attr("description", col.description())
        .attr("element_size", col.element_size().to_string())
        .attr("num_elements", num_elements)
        .attr("element_type", col.element_type().name())
}

fn parse_column(el: &XmlElement) -> Result<Column> {
    if el.tag != "column" {
        return Err(Error::CorruptMetadata(format!(
            "expected <column>, found <{}>",
            el.tag
        )));
    }
    let name = el.require_attr("name")?;
    let description = el.require_attr("description")?;
    let element_size: usize = el
        .require_attr("element_size")?
        .parse()
        .map_err(|_| Error::CorruptMetadata(format!("bad element_size for column '{name}'")))?;
    let element_count = match el.require_attr("num_elements")? {
        "var(1)" => ElementCount::Variable,
        n => ElementCount::Fixed(n.parse().map_err(|_| {
            Error::CorruptMetadata(format!("bad num_elements for column '{name}'"))
        })?),
    };
    let element_type = ElementType::from_name(el.require_attr("element_type")?)
        .ok_or_else(|| Error::CorruptMetadata(format!("bad element_type for column '{name}'")))?;
    Column::new(name, description, element_type, element_size, element_count)
        .map_err(|e| Error::CorruptMetadata(format!("invalid column '{name}': {e}")))
}

/// Write the `table.xml` sidecar for a schema.
pub(crate) fn write_table_metadata(path: &Path, schema: &Schema) -> Result<()> {
    let mut columns = XmlElement::new("columns");
    for col in schema.columns() {
        columns = columns.child(column_element(col));
    }
    let root = XmlElement::new("schema")
        .attr("version", SCHEMA_VERSION)
        .child(columns);
    write_document(path, &root)
}

/// Read and validate a `table.xml` sidecar.
pub(crate) fn read_table_metadata(path: &Path) -> Result<Schema> {
    let root = read_document(path)?;
    if root.tag != "schema" {
        return Err(Error::CorruptMetadata(format!(
            "expected <schema> root, found <{}>",
            root.tag
        )));
    }
    let version = root.require_attr("version")?;
    if version != SCHEMA_VERSION {
        return Err(Error::CorruptMetadata(format!(
            "unsupported schema version '{version}' - rebuild required"
        )));
    }
    let columns_el = root
        .children
        .iter()
        .find(|c| c.tag == "columns")
        .ok_or_else(|| Error::CorruptMetadata("missing <columns> element".into()))?;
    let columns = columns_el
        .children
        .iter()
        .map(parse_column)
        .collect::<Result<Vec<_>>>()?;
    Schema::new(columns).map_err(|e| Error::CorruptMetadata(format!("invalid schema: {e}")))
}

// ------------------------------------------------------------------------------------------------
// Index sidecar
// ------------------------------------------------------------------------------------------------

/// Format a bucket width the way the sidecar stores it: integral widths
/// without a fractional part, everything else in full.
fn format_bin_width(w: f64) -> String {
    if w.fract() == 0.0 && w.abs() < 1e15 {
        format!("{}", w as i64)
    } else {
        format!("{w}")
    }
}

/// Write the `index_<name>.xml` sidecar.
///
/// `key_columns` pairs each key column name with its bucket width.
pub(crate) fn write_index_metadata(path: &Path, key_columns: &[(String, f64)]) -> Result<()> {
    let mut keys = XmlElement::new("key_columns");
    for (name, width) in key_columns {
        keys = keys.child(
            XmlElement::new("key_column")
                .attr("name", name.as_str())
                .attr("bin_width", format_bin_width(*width)),
        );
    }
    let root = XmlElement::new("index")
        .attr("version", INDEX_METADATA_VERSION)
        .child(keys);
    write_document(path, &root)
}

/// Read an `index_<name>.xml` sidecar, returning key column names and
/// bucket widths in order.
pub(crate) fn read_index_metadata(path: &Path) -> Result<Vec<(String, f64)>> {
    let root = read_document(path)?;
    if root.tag != "index" {
        return Err(Error::CorruptMetadata(format!(
            "expected <index> root, found <{}>",
            root.tag
        )));
    }
    let version = root.require_attr("version")?;
    if version != INDEX_METADATA_VERSION {
        return Err(Error::CorruptMetadata(format!(
            "unsupported index metadata version '{version}' - rebuild required"
        )));
    }
    let keys_el = root
        .children
        .iter()
        .find(|c| c.tag == "key_columns")
        .ok_or_else(|| Error::CorruptMetadata("missing <key_columns> element".into()))?;
    let mut keys = Vec::with_capacity(keys_el.children.len());
    for el in &keys_el.children {
        if el.tag != "key_column" {
            return Err(Error::CorruptMetadata(format!(
                "expected <key_column>, found <{}>",
                el.tag
            )));
        }
        let name = el.require_attr("name")?.to_string();
        let width: f64 = el
            .require_attr("bin_width")?
            .parse()
            .map_err(|_| Error::CorruptMetadata(format!("bad bin_width for key '{name}'")))?;
        keys.push((name, width));
    }
    Ok(keys)
}
