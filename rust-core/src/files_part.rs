//! Package-level work: load a workbook, create a blank one, add sheets and
//! write the whole package back atomically.

use crate::error::{LedgerError, Result};
use crate::sheet_part::{EMPTY_SHEET, SheetXml, parse_shared_strings};
use ::zip as zip_crate;
use quick_xml::{Reader, events::Event};
use std::{
    collections::HashSet,
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::debug;

const CONTENT_TYPES: &str = "[Content_Types].xml";
const WORKBOOK: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const WORKSHEET_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const WORKSHEET_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";

/// One `<sheet>` of `xl/workbook.xml`, resolved to its part inside the zip.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SheetEntry {
    name: String,
    sheet_id: u32,
    part: String,
}

/// An XLSX package held in memory.
///
/// Parts that were never touched stay in the source archive and are copied
/// raw on [`Workbook::save`]; modified or new parts live in `new_files`.
pub struct Workbook {
    src_path: Option<PathBuf>,
    src_parts: HashSet<String>,
    content_types_xml: Vec<u8>,
    workbook_xml: Vec<u8>,
    rels_xml: Vec<u8>,
    sheets: Vec<SheetEntry>,
    shared_strings: Vec<String>,
    new_files: Vec<(String, Vec<u8>)>,
}

impl Workbook {
    /// A package with no sheets, not yet written anywhere.
    pub fn blank() -> Self {
        Self {
            src_path: None,
            src_parts: HashSet::new(),
            content_types_xml: BLANK_CONTENT_TYPES.as_bytes().to_vec(),
            workbook_xml: BLANK_WORKBOOK.as_bytes().to_vec(),
            rels_xml: BLANK_WORKBOOK_RELS.as_bytes().to_vec(),
            sheets: Vec::new(),
            shared_strings: Vec::new(),
            new_files: vec![
                ("_rels/.rels".to_owned(), BLANK_ROOT_RELS.as_bytes().to_vec()),
                ("xl/styles.xml".to_owned(), BLANK_STYLES.as_bytes().to_vec()),
            ],
        }
    }

    /// Reads the package index, sheet list and shared strings of `src`.
    ///
    /// `StorageUnavailable` when the file cannot be opened at all,
    /// `MalformedWorkbook` when it opens but is not a usable XLSX package.
    pub fn load<P: AsRef<Path>>(src: P) -> Result<Self> {
        let src_path = src.as_ref().to_path_buf();
        let file = File::open(&src_path).map_err(|e| LedgerError::storage(&src_path, e))?;
        let mut zip = zip_crate::ZipArchive::new(file).map_err(LedgerError::malformed)?;
        let src_parts: HashSet<String> = zip.file_names().map(str::to_owned).collect();

        let content_types_xml = read_part(&mut zip, CONTENT_TYPES)?;
        let workbook_xml = read_part(&mut zip, WORKBOOK)?;
        let rels_xml = read_part(&mut zip, WORKBOOK_RELS)?;

        let rels = parse_rels(&rels_xml)?;
        let sheets = parse_sheets(&workbook_xml, &rels)?;
        if let Some(missing) = sheets.iter().find(|s| !src_parts.contains(&s.part)) {
            return Err(LedgerError::malformed(format!(
                "{} not found for sheet `{}`",
                missing.part, missing.name
            )));
        }

        let shared_strings = match rels.iter().find(|r| r.kind.ends_with("/sharedStrings")) {
            Some(rel) if src_parts.contains(&part_path(&rel.target)) => {
                parse_shared_strings(&read_part(&mut zip, &part_path(&rel.target))?)?
            }
            _ => Vec::new(),
        };

        debug!(
            path = %src_path.display(),
            sheets = sheets.len(),
            shared_strings = shared_strings.len(),
            "workbook loaded"
        );
        Ok(Self {
            src_path: Some(src_path),
            src_parts,
            content_types_xml,
            workbook_xml,
            rels_xml,
            sheets,
            shared_strings,
            new_files: Vec::new(),
        })
    }

    /// Sheet names in tab order.
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    pub fn contains_sheet(&self, name: &str) -> bool {
        self.sheets.iter().any(|s| s.name == name)
    }

    pub(crate) fn shared_strings(&self) -> &[String] {
        &self.shared_strings
    }

    /// Appends a new empty sheet called `sheet_name` after the existing ones.
    /// The change is in memory only until [`Workbook::save`].
    pub fn add_sheet(&mut self, sheet_name: &str) -> Result<()> {
        if self.contains_sheet(sheet_name) {
            return Err(LedgerError::malformed(format!(
                "sheet `{sheet_name}` already exists"
            )));
        }

        // ── free sheetId / rId / sheet#.xml ──────────────────────────
        let new_sheet_id = self.sheets.iter().map(|s| s.sheet_id).max().unwrap_or(0) + 1;
        let new_rid = parse_rels(&self.rels_xml)?
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId")?.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let new_sheet_file = self
            .src_parts
            .iter()
            .chain(self.new_files.iter().map(|(p, _)| p))
            .filter_map(|name| {
                name.strip_prefix("xl/worksheets/sheet")
                    .and_then(|s| s.strip_suffix(".xml"))
                    .and_then(|s| s.parse::<usize>().ok())
            })
            .max()
            .unwrap_or(0)
            + 1;
        let new_sheet_path = format!("xl/worksheets/sheet{new_sheet_file}.xml");

        // ── workbook.xml / rels / content types ─────────────────────
        let sheet_tag = format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            quick_xml::escape::escape(sheet_name),
            new_sheet_id,
            new_rid
        );
        insert_before_close(&mut self.workbook_xml, b"sheets", sheet_tag.as_bytes())?;

        let rel_tag = format!(
            r#"<Relationship Id="rId{new_rid}" Type="{WORKSHEET_REL_TYPE}" Target="worksheets/sheet{new_sheet_file}.xml"/>"#
        );
        insert_before_close(&mut self.rels_xml, b"Relationships", rel_tag.as_bytes())?;

        let override_tag = format!(
            r#"<Override PartName="/{new_sheet_path}" ContentType="{WORKSHEET_CONTENT_TYPE}"/>"#
        );
        insert_before_close(&mut self.content_types_xml, b"Types", override_tag.as_bytes())?;

        self.put_part(&new_sheet_path, EMPTY_SHEET.as_bytes().to_vec());
        self.sheets.push(SheetEntry {
            name: sheet_name.to_owned(),
            sheet_id: new_sheet_id,
            part: new_sheet_path,
        });
        debug!(sheet = sheet_name, sheet_id = new_sheet_id, "sheet added");
        Ok(())
    }

    /// Parsed worksheet for `sheet_name`, `None` if there is no such sheet.
    pub(crate) fn sheet(&self, sheet_name: &str) -> Result<Option<SheetXml>> {
        let Some(entry) = self.sheets.iter().find(|s| s.name == sheet_name) else {
            return Ok(None);
        };
        if let Some((_, content)) = self.new_files.iter().find(|(p, _)| p == &entry.part) {
            return SheetXml::parse(content).map(Some);
        }
        let src = self
            .src_path
            .as_ref()
            .ok_or_else(|| LedgerError::malformed(format!("{} has no content", entry.part)))?;
        let file = File::open(src).map_err(|e| LedgerError::storage(src, e))?;
        let mut zip = zip_crate::ZipArchive::new(file).map_err(LedgerError::malformed)?;
        let xml = read_part(&mut zip, &entry.part)?;
        SheetXml::parse(&xml).map(Some)
    }

    /// Stages the rendered `sheet` as the new content of `sheet_name`.
    pub(crate) fn put_sheet(&mut self, sheet_name: &str, sheet: &SheetXml) -> Result<()> {
        let part = self
            .sheets
            .iter()
            .find(|s| s.name == sheet_name)
            .map(|s| s.part.clone())
            .ok_or_else(|| LedgerError::malformed(format!("sheet `{sheet_name}` not found")))?;
        self.put_part(&part, sheet.render());
        Ok(())
    }

    fn put_part(&mut self, path: &str, content: Vec<u8>) {
        if let Some(pair) = self.new_files.iter_mut().find(|(p, _)| p == path) {
            pair.1 = content;
        } else {
            self.new_files.push((path.to_owned(), content));
        }
    }

    /// Writes the package to `dst`.
    ///
    /// The archive is built in a temp file next to `dst` and renamed over it,
    /// so on any failure the previous file stays as it was. A read-only `dst`
    /// is refused; otherwise its permissions carry over to the new file.
    pub fn save<P: AsRef<Path>>(&mut self, dst: P, compression_level: Option<i64>) -> Result<()> {
        let dst = dst.as_ref();
        let storage = |e: io::Error| LedgerError::storage(dst, e);

        let permissions = match fs::metadata(dst) {
            Ok(meta) => Some(meta.permissions()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(storage(e)),
        };
        if permissions.as_ref().is_some_and(fs::Permissions::readonly) {
            return Err(storage(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "workbook is read-only",
            )));
        }

        let mut tmp = NamedTempFile::new_in(parent_dir_or_dot(dst)).map_err(storage)?;
        {
            let mut zout = zip_crate::ZipWriter::new(&mut tmp);
            let opt = zip_crate::write::SimpleFileOptions::default()
                .compression_method(zip_crate::CompressionMethod::Deflated)
                .compression_level(compression_level);

            let mut written: HashSet<String> = HashSet::new();
            let owned: [(&str, &[u8]); 3] = [
                (CONTENT_TYPES, self.content_types_xml.as_slice()),
                (WORKBOOK, self.workbook_xml.as_slice()),
                (WORKBOOK_RELS, self.rels_xml.as_slice()),
            ];
            for (name, content) in owned
                .into_iter()
                .chain(self.new_files.iter().map(|(p, c)| (p.as_str(), c.as_slice())))
            {
                zout.start_file(name, opt).map_err(zip_io).map_err(storage)?;
                zout.write_all(content).map_err(storage)?;
                written.insert(name.to_owned());
            }

            // untouched parts go over as-is
            if let Some(src) = &self.src_path {
                let file = File::open(src).map_err(storage)?;
                let mut zin = zip_crate::ZipArchive::new(file).map_err(zip_io).map_err(storage)?;
                for i in 0..zin.len() {
                    let entry = zin.by_index_raw(i).map_err(zip_io).map_err(storage)?;
                    if written.contains(entry.name()) || entry.is_dir() {
                        continue;
                    }
                    zout.raw_copy_file(entry).map_err(zip_io).map_err(storage)?;
                }
            }

            zout.finish().map_err(zip_io).map_err(storage)?;
        }
        if let Some(permissions) = permissions {
            tmp.as_file().set_permissions(permissions).map_err(storage)?;
        }
        tmp.as_file().sync_all().map_err(storage)?;
        tmp.persist(dst).map_err(|e| storage(e.error))?;

        self.src_parts.extend(self.new_files.drain(..).map(|(p, _)| p));
        self.src_parts.insert(CONTENT_TYPES.to_owned());
        self.src_parts.insert(WORKBOOK.to_owned());
        self.src_parts.insert(WORKBOOK_RELS.to_owned());
        self.src_path = Some(dst.to_path_buf());
        debug!(path = %dst.display(), sheets = self.sheets.len(), "workbook saved");
        Ok(())
    }
}

fn zip_io(e: zip_crate::result::ZipError) -> io::Error {
    match e {
        zip_crate::result::ZipError::Io(err) => err,
        other => io::Error::other(other),
    }
}

fn parent_dir_or_dot(path: &Path) -> &Path {
    // `parent()` is `Some("")` for a bare file name
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn read_part<R: Read + io::Seek>(zip: &mut zip_crate::ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut part = zip
        .by_name(name)
        .map_err(|e| LedgerError::malformed(format!("{name}: {e}")))?;
    let mut buf = Vec::with_capacity(part.size() as usize);
    part.read_to_end(&mut buf)
        .map_err(|e| LedgerError::malformed(format!("{name}: {e}")))?;
    Ok(buf)
}

/// `worksheets/sheet1.xml` -> `xl/worksheets/sheet1.xml`.
fn part_path(target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        abs.to_owned()
    } else if target.starts_with("xl/") {
        target.to_owned()
    } else {
        format!("xl/{target}")
    }
}

struct Rel {
    id: String,
    kind: String,
    target: String,
}

fn parse_rels(rels_xml: &[u8]) -> Result<Vec<Rel>> {
    let mut rdr = Reader::from_reader(rels_xml);
    rdr.config_mut().trim_text(true);
    let mut out = Vec::new();
    loop {
        match rdr.read_event()? {
            Event::Empty(ref e) | Event::Start(ref e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut rel = Rel {
                    id: String::new(),
                    kind: String::new(),
                    target: String::new(),
                };
                for a in e.attributes().with_checks(false).flatten() {
                    let v = String::from_utf8_lossy(&a.value).into_owned();
                    match a.key.as_ref() {
                        b"Id" => rel.id = v,
                        b"Type" => rel.kind = v,
                        b"Target" => rel.target = v,
                        _ => {}
                    }
                }
                out.push(rel);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

fn parse_sheets(workbook_xml: &[u8], rels: &[Rel]) -> Result<Vec<SheetEntry>> {
    let mut rdr = Reader::from_reader(workbook_xml);
    rdr.config_mut().trim_text(true);
    let mut out = Vec::new();
    loop {
        match rdr.read_event()? {
            Event::Empty(ref e) | Event::Start(ref e) if e.local_name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut sheet_id = 0u32;
                let mut rid = None;
                for a in e.attributes().with_checks(false).flatten() {
                    let v = String::from_utf8_lossy(&a.value).into_owned();
                    match (a.key.prefix().is_some(), a.key.local_name().as_ref()) {
                        (false, b"name") => {
                            name = Some(
                                quick_xml::escape::unescape(&v)
                                    .map(|s| s.into_owned())
                                    .unwrap_or(v),
                            )
                        }
                        (false, b"sheetId") => sheet_id = v.parse().unwrap_or(0),
                        (true, b"id") => rid = Some(v),
                        _ => {}
                    }
                }
                let name = name.ok_or_else(|| LedgerError::malformed("<sheet> without name"))?;
                let rid = rid
                    .ok_or_else(|| LedgerError::malformed(format!("sheet `{name}` has no r:id")))?;
                let rel = rels.iter().find(|r| r.id == rid).ok_or_else(|| {
                    LedgerError::malformed(format!("relationship {rid} for `{name}` not found"))
                })?;
                out.push(SheetEntry {
                    name,
                    sheet_id,
                    part: part_path(&rel.target),
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// Inserts `tag` right before `</{element}>`, expanding `<{element}/>` if needed.
fn insert_before_close(xml: &mut Vec<u8>, element: &[u8], tag: &[u8]) -> Result<()> {
    let close = [b"</".as_slice(), element, b">"].concat();
    if let Some(pos) = memchr::memmem::rfind(xml, &close) {
        xml.splice(pos..pos, tag.iter().copied());
        return Ok(());
    }
    let empty = [b"<".as_slice(), element, b"/>"].concat();
    if let Some(pos) = memchr::memmem::rfind(xml, &empty) {
        let expanded = [b"<".as_slice(), element, b">", tag, &close].concat();
        xml.splice(pos..pos + empty.len(), expanded);
        return Ok(());
    }
    Err(LedgerError::malformed(format!(
        "</{}> not found",
        String::from_utf8_lossy(element)
    )))
}

const BLANK_CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

const BLANK_ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const BLANK_WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets></sheets></workbook>"#;

const BLANK_WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const BLANK_STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;
