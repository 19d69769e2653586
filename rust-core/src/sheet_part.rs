//! Row-level model of a worksheet part (`xl/worksheets/sheet#.xml`).
//!
//! Only `<sheetData>` is parsed. Everything before and after it is kept as raw
//! bytes and written back untouched, apart from `<dimension ref="…">` which is
//! resynced on render. Cells keep their original inner XML unless rewritten, so
//! styles and shared-string references survive a round trip.

use crate::cell::{CellValue, MAX_COL, MAX_ROW, col_idx_to_letters, letters_to_col_idx};
use crate::error::{LedgerError, Result};
use quick_xml::{
    Reader, Writer,
    events::{BytesText, Event},
};

/// Minimal worksheet body for a freshly created sheet.
pub(crate) const EMPTY_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><dimension ref="A1"/><sheetData></sheetData></worksheet>"#;

type Attrs = Vec<(Vec<u8>, Vec<u8>)>;

#[derive(Debug, Clone)]
struct CellXml {
    col: usize,
    attrs: Attrs,
    inner: Vec<u8>,
}

#[derive(Debug, Clone)]
struct RowXml {
    r: u32,
    attrs: Attrs,
    cells: Vec<CellXml>,
}

#[derive(Debug, Clone)]
pub(crate) struct SheetXml {
    head: Vec<u8>,
    tail: Vec<u8>,
    rows: Vec<RowXml>,
}

impl SheetXml {
    pub(crate) fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);

        let mut head: Option<Vec<u8>> = None;
        let mut tail: Option<Vec<u8>> = None;
        let mut rows: Vec<RowXml> = Vec::new();
        let mut row: Option<RowXml> = None;
        let mut cell: Option<(CellXml, usize)> = None;
        let mut next_r = 1u32;

        loop {
            let before = reader.buffer_position() as usize;
            let ev = reader.read_event()?;
            let after = reader.buffer_position() as usize;
            let in_data = head.is_some();

            match ev {
                Event::Start(ref e) if e.local_name().as_ref() == b"sheetData" => {
                    head = Some(xml[..before].to_vec());
                }
                Event::Empty(ref e) if e.local_name().as_ref() == b"sheetData" => {
                    head = Some(xml[..before].to_vec());
                    tail = Some(xml[after..].to_vec());
                    break;
                }
                Event::End(ref e) if e.local_name().as_ref() == b"sheetData" => {
                    tail = Some(xml[after..].to_vec());
                    break;
                }
                Event::Start(ref e) if in_data && e.local_name().as_ref() == b"row" => {
                    let (r, attrs) = split_ref(e.attributes().with_checks(false).flatten());
                    let r = row_index(r.as_deref(), next_r)?;
                    next_r = r + 1;
                    row = Some(RowXml {
                        r,
                        attrs,
                        cells: Vec::new(),
                    });
                }
                Event::Empty(ref e) if in_data && e.local_name().as_ref() == b"row" => {
                    let (r, attrs) = split_ref(e.attributes().with_checks(false).flatten());
                    let r = row_index(r.as_deref(), next_r)?;
                    next_r = r + 1;
                    rows.push(RowXml {
                        r,
                        attrs,
                        cells: Vec::new(),
                    });
                }
                Event::End(ref e) if in_data && e.local_name().as_ref() == b"row" => {
                    if let Some(mut done) = row.take() {
                        done.cells.sort_by_key(|c| c.col);
                        rows.push(done);
                    }
                }
                Event::Start(ref e) | Event::Empty(ref e)
                    if in_data && e.local_name().as_ref() == b"c" =>
                {
                    let Some(current) = row.as_mut() else {
                        return Err(LedgerError::malformed("<c> outside of <row>"));
                    };
                    let (r, attrs) = split_ref(e.attributes().with_checks(false).flatten());
                    let col = match r.as_deref() {
                        Some(r) if r.starts_with(|c: char| c.is_ascii_alphabetic()) => {
                            letters_to_col_idx(r)
                        }
                        _ => Some(current.cells.last().map_or(0, |c| c.col + 1)),
                    }
                    .filter(|&col| col <= MAX_COL)
                    .ok_or_else(|| {
                        LedgerError::malformed(format!(
                            "cell `{}` lies past column XFD",
                            r.as_deref().unwrap_or_default()
                        ))
                    })?;
                    let parsed = CellXml {
                        col,
                        attrs,
                        inner: Vec::new(),
                    };
                    if matches!(ev, Event::Empty(_)) {
                        current.cells.push(parsed);
                    } else {
                        cell = Some((parsed, after));
                    }
                }
                Event::End(ref e) if in_data && e.local_name().as_ref() == b"c" => {
                    if let (Some((mut done, start)), Some(current)) = (cell.take(), row.as_mut()) {
                        done.inner = xml[start..before].to_vec();
                        current.cells.push(done);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let head = head.ok_or_else(|| LedgerError::malformed("worksheet has no <sheetData>"))?;
        let tail = tail.ok_or_else(|| LedgerError::malformed("unterminated <sheetData>"))?;
        rows.sort_by_key(|r| r.r);
        Ok(Self { head, tail, rows })
    }

    pub(crate) fn render(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.head.len() + self.tail.len() + self.rows.len() * 160);
        out.extend_from_slice(&self.head);
        sync_dimension(&mut out, self.dimension_ref().as_bytes());
        out.extend_from_slice(b"<sheetData>");
        for row in &self.rows {
            row.render_into(&mut out);
        }
        out.extend_from_slice(b"</sheetData>");
        out.extend_from_slice(&self.tail);
        out
    }

    /// Index of the last row holding at least one cell, 0 for an empty sheet.
    pub(crate) fn last_row(&self) -> u32 {
        self.rows
            .iter()
            .filter(|r| !r.cells.is_empty())
            .map(|r| r.r)
            .max()
            .unwrap_or(0)
    }

    /// Writes `values` into row `r` starting at column A.
    ///
    /// Cells of an existing row beyond `values.len()` are kept; an `Empty`
    /// value clears the cell at that position.
    pub(crate) fn write_row(&mut self, r: u32, values: &[CellValue]) -> Result<()> {
        let pos = match self.rows.binary_search_by_key(&r, |row| row.r) {
            Ok(pos) => pos,
            Err(pos) => {
                self.rows.insert(
                    pos,
                    RowXml {
                        r,
                        attrs: Vec::new(),
                        cells: Vec::new(),
                    },
                );
                pos
            }
        };
        let row = &mut self.rows[pos];

        for (col, value) in values.iter().enumerate() {
            let existing = row.cells.iter().position(|c| c.col == col);
            if matches!(value, CellValue::Empty) {
                if let Some(i) = existing {
                    row.cells.remove(i);
                }
                continue;
            }
            // style index survives a rewrite, the value type does not
            let mut attrs: Attrs = existing
                .map(|i| {
                    row.cells[i]
                        .attrs
                        .iter()
                        .filter(|(k, _)| k.as_slice() != b"t")
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            let (t, inner) = render_value(value)?;
            if let Some(t) = t {
                attrs.push((b"t".to_vec(), t.as_bytes().to_vec()));
            }
            let new_cell = CellXml { col, attrs, inner };
            match existing {
                Some(i) => row.cells[i] = new_cell,
                None => {
                    let at = row.cells.partition_point(|c| c.col < col);
                    row.cells.insert(at, new_cell);
                }
            }
        }
        Ok(())
    }

    /// Appends `values` right after the last occupied row and returns its index.
    pub(crate) fn append_row(&mut self, values: &[CellValue]) -> Result<u32> {
        let r = self.last_row() + 1;
        self.write_row(r, values)?;
        Ok(r)
    }

    /// Removes physical row `r` and shifts every row below it up by one.
    /// Returns `false` when `r` lies outside `1..=last_row`.
    pub(crate) fn delete_row(&mut self, r: u32) -> bool {
        if r == 0 || r > self.last_row() {
            return false;
        }
        self.rows.retain(|row| row.r != r);
        for row in self.rows.iter_mut().filter(|row| row.r > r) {
            row.r -= 1;
        }
        true
    }

    /// Dense values of row `r`, from column A to its last cell.
    pub(crate) fn row_values(&self, r: u32, shared: &[String]) -> Vec<CellValue> {
        let Ok(pos) = self.rows.binary_search_by_key(&r, |row| row.r) else {
            return Vec::new();
        };
        let row = &self.rows[pos];
        let width = row.cells.iter().map(|c| c.col + 1).max().unwrap_or(0);
        let mut out = vec![CellValue::Empty; width];
        for c in &row.cells {
            out[c.col] = c.value(shared);
        }
        out
    }

    /// Dense rows `from..=last_row`; missing rows come back empty.
    pub(crate) fn rows_from(&self, from: u32, shared: &[String]) -> Vec<Vec<CellValue>> {
        let last = self.last_row();
        if from > last {
            return Vec::new();
        }
        (from..=last).map(|r| self.row_values(r, shared)).collect()
    }

    fn dimension_ref(&self) -> String {
        let last = self.last_row();
        let width = self
            .rows
            .iter()
            .flat_map(|r| r.cells.iter().map(|c| c.col + 1))
            .max()
            .unwrap_or(0);
        if last == 0 || width == 0 {
            return "A1".to_owned();
        }
        format!("A1:{}{}", col_idx_to_letters(width - 1), last)
    }
}

impl RowXml {
    fn render_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"<row r=\"");
        out.extend_from_slice(self.r.to_string().as_bytes());
        out.push(b'"');
        push_attrs(out, &self.attrs);
        if self.cells.is_empty() {
            out.extend_from_slice(b"/>");
            return;
        }
        out.push(b'>');
        for c in &self.cells {
            let coord = format!("{}{}", col_idx_to_letters(c.col), self.r);
            out.extend_from_slice(b"<c r=\"");
            out.extend_from_slice(coord.as_bytes());
            out.push(b'"');
            push_attrs(out, &c.attrs);
            if c.inner.is_empty() {
                out.extend_from_slice(b"/>");
            } else {
                out.push(b'>');
                out.extend_from_slice(&c.inner);
                out.extend_from_slice(b"</c>");
            }
        }
        out.extend_from_slice(b"</row>");
    }
}

impl CellXml {
    fn attr(&self, key: &[u8]) -> Option<&[u8]> {
        self.attrs
            .iter()
            .find(|(k, _)| k.as_slice() == key)
            .map(|(_, v)| v.as_slice())
    }

    fn value(&self, shared: &[String]) -> CellValue {
        let (v, t) = inner_texts(&self.inner);
        match self.attr(b"t") {
            Some(b"inlineStr") => CellValue::String(t),
            Some(b"s") => v
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| shared.get(i))
                .map_or(CellValue::Empty, |s| CellValue::String(s.clone())),
            Some(b"b") => CellValue::Boolean(v.trim() == "1"),
            Some(b"str" | b"e" | b"d") => CellValue::String(v),
            _ if v.is_empty() => CellValue::Empty,
            _ => v
                .trim()
                .parse::<f64>()
                .map_or_else(|_| CellValue::String(v.clone()), CellValue::Number),
        }
    }
}

/// Row number from `r="…"`, or the one after the previous row when absent.
fn row_index(r: Option<&str>, next_r: u32) -> Result<u32> {
    let idx = match r {
        Some(v) => v.trim().parse::<u32>().ok(),
        None => Some(next_r),
    };
    idx.filter(|i| (1..=MAX_ROW).contains(i))
        .ok_or_else(|| LedgerError::malformed(format!("row `{}` out of range", r.unwrap_or_default())))
}

/// Splits `r="…"` out of an element's attributes, keeping the rest raw.
fn split_ref<'a>(
    attrs: impl Iterator<Item = quick_xml::events::attributes::Attribute<'a>>,
) -> (Option<String>, Attrs) {
    let mut r = None;
    let mut rest = Vec::new();
    for a in attrs {
        if a.key.as_ref() == b"r" {
            r = Some(String::from_utf8_lossy(&a.value).into_owned());
        } else {
            rest.push((a.key.as_ref().to_vec(), a.value.to_vec()));
        }
    }
    (r, rest)
}

fn push_attrs(out: &mut Vec<u8>, attrs: &Attrs) {
    for (k, v) in attrs {
        out.push(b' ');
        out.extend_from_slice(k);
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(v);
        out.push(b'"');
    }
}

/// Inner XML and `t` attribute for a value we write ourselves.
fn render_value(value: &CellValue) -> Result<(Option<&'static str>, Vec<u8>)> {
    let mut writer = Writer::new(Vec::new());
    let t = match value {
        CellValue::String(s) => {
            let preserve = s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace);
            writer
                .create_element("is")
                .write_inner_content(|w| {
                    let mut t = w.create_element("t");
                    if preserve {
                        t = t.with_attribute(("xml:space", "preserve"));
                    }
                    t.write_text_content(BytesText::new(s))?;
                    Ok(())
                })
                .map_err(LedgerError::malformed)?;
            Some("inlineStr")
        }
        CellValue::Number(n) => {
            writer
                .create_element("v")
                .write_text_content(BytesText::new(&n.to_string()))
                .map_err(LedgerError::malformed)?;
            None
        }
        CellValue::Boolean(b) => {
            writer
                .create_element("v")
                .write_text_content(BytesText::new(if *b { "1" } else { "0" }))
                .map_err(LedgerError::malformed)?;
            Some("b")
        }
        CellValue::Empty => None,
    };
    Ok((t, writer.into_inner()))
}

/// Text of `<v>` and the concatenated `<t>` runs of a cell body.
/// Phonetic runs (`<rPh>`) are skipped.
fn inner_texts(inner: &[u8]) -> (String, String) {
    let mut reader = Reader::from_reader(inner);
    let mut v = String::new();
    let mut t = String::new();
    let mut in_v = false;
    let mut in_t = false;
    let mut in_rph = 0usize;

    while let Ok(ev) = reader.read_event() {
        match ev {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"v" => in_v = true,
                b"t" if in_rph == 0 => in_t = true,
                b"rPh" => in_rph += 1,
                _ => {}
            },
            Event::End(ref e) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"t" => in_t = false,
                b"rPh" => in_rph = in_rph.saturating_sub(1),
                _ => {}
            },
            Event::Eof => break,
            ref other if in_v => push_text(&mut v, other),
            ref other if in_t => push_text(&mut t, other),
            _ => {}
        }
    }
    (v, t)
}

/// Shared-string table (`xl/sharedStrings.xml`), one entry per `<si>`.
pub(crate) fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut out = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    let mut in_rph = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" if in_rph == 0 => in_t = true,
                b"rPh" => in_rph += 1,
                _ => {}
            },
            Event::Empty(ref e) if e.local_name().as_ref() == b"si" => out.push(String::new()),
            Event::End(ref e) => match e.local_name().as_ref() {
                b"si" => out.extend(current.take()),
                b"t" => in_t = false,
                b"rPh" => in_rph = in_rph.saturating_sub(1),
                _ => {}
            },
            Event::Eof => break,
            ref other if in_t => {
                if let Some(s) = current.as_mut() {
                    push_text(s, other);
                }
            }
            _ => {}
        }
    }
    Ok(out)
}

fn push_text(buf: &mut String, ev: &Event<'_>) {
    match ev {
        Event::Text(e) => buf.push_str(&String::from_utf8_lossy(e)),
        Event::CData(e) => buf.push_str(&String::from_utf8_lossy(e)),
        Event::GeneralRef(e) => {
            if let Ok(Some(ch)) = e.resolve_char_ref() {
                buf.push(ch);
                return;
            }
            let name = String::from_utf8_lossy(e);
            match name.as_ref() {
                "amp" => buf.push('&'),
                "lt" => buf.push('<'),
                "gt" => buf.push('>'),
                "quot" => buf.push('"'),
                "apos" => buf.push('\''),
                other => {
                    buf.push('&');
                    buf.push_str(other);
                    buf.push(';');
                }
            }
        }
        _ => {}
    }
}

/// Rewrites the value of `<dimension ref="…">` inside `xml`, if present.
fn sync_dimension(xml: &mut Vec<u8>, new_ref: &[u8]) {
    const MARKER: &[u8] = b"<dimension ref=\"";
    let Some(pos) = memchr::memmem::find(xml, MARKER) else {
        return;
    };
    let start = pos + MARKER.len();
    if let Some(len) = memchr::memchr(b'"', &xml[start..]) {
        xml.splice(start..start + len, new_ref.iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(row: &[CellValue]) -> Vec<String> {
        row.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn empty_template_has_no_rows() {
        let sheet = SheetXml::parse(EMPTY_SHEET.as_bytes()).unwrap();
        assert_eq!(sheet.last_row(), 0);
        assert!(sheet.rows_from(1, &[]).is_empty());
    }

    #[test]
    fn self_closing_sheet_data_is_accepted() {
        let xml = br#"<worksheet><dimension ref="A1"/><sheetData/><pageMargins left="0.7"/></worksheet>"#;
        let mut sheet = SheetXml::parse(xml).unwrap();
        sheet.append_row(&["x".into()]).unwrap();
        let out = String::from_utf8(sheet.render()).unwrap();
        assert!(out.contains(r#"<sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>x</t></is></c></row></sheetData>"#));
        assert!(out.ends_with(r#"<pageMargins left="0.7"/></worksheet>"#));
    }

    #[test]
    fn reads_shared_inline_and_numeric_cells() {
        let xml = br#"<worksheet><sheetData>
<row r="1" spans="1:3"><c r="A1" t="s"><v>1</v></c><c r="C1" s="2"><v>10.5</v></c></row>
<row r="2"><c r="B2" t="inlineStr"><is><t>Tom &amp; Jerry</t></is></c><c r="C2" t="b"><v>1</v></c></row>
</sheetData></worksheet>"#;
        let shared = vec!["zero".to_owned(), "one".to_owned()];
        let sheet = SheetXml::parse(xml).unwrap();
        assert_eq!(sheet.last_row(), 2);
        assert_eq!(
            sheet.row_values(1, &shared),
            vec![
                CellValue::String("one".into()),
                CellValue::Empty,
                CellValue::Number(10.5)
            ]
        );
        assert_eq!(strings(&sheet.row_values(2, &shared)), ["", "Tom & Jerry", "TRUE"]);
    }

    #[test]
    fn delete_shifts_rows_and_cell_refs() {
        let mut sheet = SheetXml::parse(EMPTY_SHEET.as_bytes()).unwrap();
        for name in ["a", "b", "c"] {
            sheet.append_row(&[name.into(), 1.0.into()]).unwrap();
        }
        assert!(sheet.delete_row(2));
        assert!(!sheet.delete_row(3));
        let out = String::from_utf8(sheet.render()).unwrap();
        assert!(out.contains(r#"<row r="2"><c r="A2" t="inlineStr"><is><t>c</t></is></c><c r="B2"><v>1</v></c></row>"#));
        assert!(!out.contains(r#"r="3""#));
        assert!(out.contains(r#"<dimension ref="A1:B2"/>"#));
    }

    #[test]
    fn write_row_keeps_style_and_extra_cells() {
        let xml = br#"<worksheet><sheetData><row r="1"><c r="A1" s="3" t="s"><v>0</v></c><c r="E1"><v>7</v></c></row></sheetData></worksheet>"#;
        let mut sheet = SheetXml::parse(xml).unwrap();
        sheet.write_row(1, &["Monte Mor".into(), "02/03/2025".into()]).unwrap();
        let out = String::from_utf8(sheet.render()).unwrap();
        assert!(out.contains(r#"<c r="A1" s="3" t="inlineStr"><is><t>Monte Mor</t></is></c>"#));
        assert!(out.contains(r#"<c r="E1"><v>7</v></c>"#));
        assert_eq!(
            strings(&sheet.row_values(1, &[])),
            ["Monte Mor", "02/03/2025", "", "", "7"]
        );
    }

    #[test]
    fn whitespace_is_preserved_in_strings() {
        let mut sheet = SheetXml::parse(EMPTY_SHEET.as_bytes()).unwrap();
        sheet.append_row(&[" padded ".into()]).unwrap();
        let reparsed = SheetXml::parse(&sheet.render()).unwrap();
        assert_eq!(strings(&reparsed.row_values(1, &[])), [" padded "]);
    }

    #[test]
    fn out_of_range_refs_are_malformed() {
        let wide = br#"<worksheet><sheetData><row r="2"><c r="ZZZZZZZZZ2" t="inlineStr"><is><t>x</t></is></c></row></sheetData></worksheet>"#;
        assert!(matches!(SheetXml::parse(wide), Err(LedgerError::MalformedWorkbook(_))));

        let tall = br#"<worksheet><sheetData><row r="4294967295"><c r="A4294967295"><v>1</v></c></row></sheetData></worksheet>"#;
        assert!(matches!(SheetXml::parse(tall), Err(LedgerError::MalformedWorkbook(_))));

        let zero = br#"<worksheet><sheetData><row r="0"/></sheetData></worksheet>"#;
        assert!(SheetXml::parse(zero).is_err());

        let edge = br#"<worksheet><sheetData><row r="1048576"><c r="XFD1048576"><v>1</v></c></row></sheetData></worksheet>"#;
        let sheet = SheetXml::parse(edge).unwrap();
        assert_eq!(sheet.last_row(), MAX_ROW);
    }

    #[test]
    fn shared_strings_skip_phonetic_runs() {
        let xml = br#"<sst><si><t>plain</t></si><si><r><t>ri</t></r><r><t>ch</t></r><rPh><t>x</t></rPh></si><si/></sst>"#;
        assert_eq!(parse_shared_strings(xml).unwrap(), ["plain", "rich", ""]);
    }
}
