//! In-memory DOCX sanitizer for documents that break the converter.
//!
//! Fixes applied per [`SanitizeMode`]:
//! - glossary removal: drop `word/glossary/*` and every reference to it;
//! - RTL compat: for documents with `<w:rtl/>` or `<w:bidi/>`, downgrade the
//!   Word `compatibilityMode` setting from 15 to 14;
//! - SDT unwrap: replace structured document tags with their content.
//!
//! The result is repackaged with `[Content_Types].xml` as the first entry.

use std::io::{Cursor, Read, Write};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DOCUMENT_XML: &str = "word/document.xml";
const SETTINGS_XML: &str = "word/settings.xml";
const DOCUMENT_RELS: &str = "word/_rels/document.xml.rels";
const CONTENT_TYPES: &str = "[Content_Types].xml";
const GLOSSARY_PREFIX: &str = "word/glossary/";

const WORD_COMPAT_URI: &str = r#"w:uri="http://schemas.microsoft.com/office/word""#;
const COMPAT_MODE_NAME: &str = r#"w:name="compatibilityMode""#;

static COMPAT_SETTING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<w:compatSetting\b[^>]*>").unwrap());

static COMPAT_VAL_15: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bw:val="15""#).unwrap());

static GLOSSARY_RELATIONSHIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<Relationship[^>]*Target="glossary/[^"]*"[^>]*/>\s*"#).unwrap()
});

static GLOSSARY_OVERRIDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<Override[^>]*PartName="/word/glossary/[^"]*"[^>]*/>\s*"#).unwrap()
});

static SDT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:sdt><w:sdtPr>.*?</w:sdtPr><w:sdtContent>(.*?)</w:sdtContent></w:sdt>")
        .unwrap()
});

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which fixes to apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SanitizeMode {
    /// Glossary removal and RTL compat downgrade.
    Rtl,
    /// SDT unwrap only.
    Sdt,
    #[default]
    All,
}

impl SanitizeMode {
    fn fixes_rtl(self) -> bool {
        matches!(self, Self::Rtl | Self::All)
    }

    fn unwraps_sdt(self) -> bool {
        matches!(self, Self::Sdt | Self::All)
    }
}

impl FromStr for SanitizeMode {
    type Err = SanitizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rtl" => Ok(Self::Rtl),
            "sdt" => Ok(Self::Sdt),
            "all" => Ok(Self::All),
            other => Err(SanitizeError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SanitizeError {
    #[error("Invalid sanitize mode '{0}'. Must be one of: rtl, sdt, all")]
    InvalidMode(String),

    #[error("Not a readable DOCX archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Archive I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsafe ZIP entry path: {0}")]
    UnsafeEntry(String),

    #[error("No {DOCUMENT_XML} found")]
    MissingDocument,

    #[error("{0} is not valid UTF-8")]
    Encoding(String),
}

/// What the sanitizer changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SanitizeReport {
    pub glossary_removed: bool,
    pub compat_downgraded: bool,
    pub sdt_unwrapped: usize,
}

// ---------------------------------------------------------------------------
// Text transforms
// ---------------------------------------------------------------------------

/// Whether `document.xml` carries RTL / complex-script markers.
pub fn has_rtl_content(document: &str) -> bool {
    document.contains("<w:rtl/>") || document.contains("<w:bidi/>")
}

/// Downgrade the Word `compatibilityMode` setting from 15 to 14.
///
/// Returns the new content and whether anything changed.
pub fn downgrade_compat_mode(settings: &str) -> (String, bool) {
    let mut changed = false;
    let out = COMPAT_SETTING.replace_all(settings, |caps: &regex::Captures<'_>| {
        let tag = &caps[0];
        if tag.contains(COMPAT_MODE_NAME) && tag.contains(WORD_COMPAT_URI) {
            let fixed = COMPAT_VAL_15.replace(tag, r#"w:val="14""#);
            if fixed != tag {
                changed = true;
            }
            fixed.into_owned()
        } else {
            tag.to_string()
        }
    });
    (out.into_owned(), changed)
}

/// Unwrap `<w:sdt>` blocks one at a time until none remain.
pub fn unwrap_sdt(document: &str) -> (String, usize) {
    let mut content = document.to_string();
    let mut count = 0;
    while content.contains("<w:sdt>") {
        let next = SDT_BLOCK.replacen(&content, 1, "$1").into_owned();
        if next == content {
            break;
        }
        content = next;
        count += 1;
    }
    (content, count)
}

fn strip_glossary_refs(name: &str, content: &str) -> String {
    match name {
        DOCUMENT_RELS => GLOSSARY_RELATIONSHIP.replace_all(content, "").into_owned(),
        CONTENT_TYPES => GLOSSARY_OVERRIDE.replace_all(content, "").into_owned(),
        _ => content.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Archive handling
// ---------------------------------------------------------------------------

struct Entry {
    name: String,
    data: Vec<u8>,
}

fn read_entries(input: &[u8]) -> Result<Vec<Entry>, SanitizeError> {
    let mut archive = ZipArchive::new(Cursor::new(input))?;
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.enclosed_name().is_none() {
            return Err(SanitizeError::UnsafeEntry(file.name().to_string()));
        }
        if file.is_dir() {
            continue;
        }
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        entries.push(Entry {
            name: file.name().to_string(),
            data,
        });
    }
    Ok(entries)
}

fn text_of(entry: &Entry) -> Result<String, SanitizeError> {
    String::from_utf8(entry.data.clone()).map_err(|_| SanitizeError::Encoding(entry.name.clone()))
}

fn repackage(mut entries: Vec<Entry>) -> Result<Vec<u8>, SanitizeError> {
    if let Some(pos) = entries.iter().position(|e| e.name == CONTENT_TYPES) {
        let content_types = entries.remove(pos);
        entries.insert(0, content_types);
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        writer.start_file(entry.name, options)?;
        writer.write_all(&entry.data)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Sanitize a DOCX held in memory.
pub fn sanitize_docx(
    input: &[u8],
    mode: SanitizeMode,
) -> Result<(Vec<u8>, SanitizeReport), SanitizeError> {
    let mut entries = read_entries(input)?;
    let mut report = SanitizeReport::default();

    let doc_idx = entries
        .iter()
        .position(|e| e.name == DOCUMENT_XML)
        .ok_or(SanitizeError::MissingDocument)?;
    let mut document = text_of(&entries[doc_idx])?;

    if mode.fixes_rtl() {
        let before = entries.len();
        entries.retain(|e| !e.name.starts_with(GLOSSARY_PREFIX));
        if entries.len() != before {
            report.glossary_removed = true;
            for entry in entries
                .iter_mut()
                .filter(|e| e.name == DOCUMENT_RELS || e.name == CONTENT_TYPES)
            {
                let content = text_of(entry)?;
                entry.data = strip_glossary_refs(&entry.name, &content).into_bytes();
            }
            tracing::info!("Removed word/glossary/ parts");
        }

        if has_rtl_content(&document) {
            if let Some(settings) = entries.iter_mut().find(|e| e.name == SETTINGS_XML) {
                let (fixed, changed) = downgrade_compat_mode(&text_of(settings)?);
                if changed {
                    settings.data = fixed.into_bytes();
                    report.compat_downgraded = true;
                    tracing::info!("Downgraded compatibilityMode 15 -> 14");
                }
            }
        }
    }

    if mode.unwraps_sdt() {
        let (unwrapped, count) = unwrap_sdt(&document);
        if count > 0 {
            tracing::info!(count, removed_bytes = document.len() - unwrapped.len(), "Unwrapped <w:sdt> blocks");
            document = unwrapped;
            report.sdt_unwrapped = count;
        }
    }

    if let Some(doc) = entries.iter_mut().find(|e| e.name == DOCUMENT_XML) {
        doc.data = document.into_bytes();
    }

    Ok((repackage(entries)?, report))
}
