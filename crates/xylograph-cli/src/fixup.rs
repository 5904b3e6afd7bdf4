//! Raw repair of malformed XML exports.
//!
//! Real-world feeds regularly arrive with a UTF-8 BOM, log banners, or
//! other junk ahead of the XML declaration, which strict parsers reject.
//! Fixup cuts everything before the declaration (or the first `<` when
//! there is no declaration) and reports what it removed. Content after the
//! document is left alone; that is the parser's problem.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixupError {
    #[error("no XML content found in input")]
    NoXmlContent,
}

/// What fixup removed from the input.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FixupReport {
    pub bytes_stripped: usize,
    pub had_bom: bool,
}

/// Strip a BOM and any leading junk before the XML declaration.
pub fn fixup_xml(raw: &str) -> Result<(String, FixupReport), FixupError> {
    let mut report = FixupReport::default();
    let mut text = raw;
    if let Some(stripped) = text.strip_prefix('\u{feff}') {
        report.had_bom = true;
        text = stripped;
    }

    let start = match text.find("<?xml") {
        Some(index) => index,
        None => text.find('<').ok_or(FixupError::NoXmlContent)?,
    };
    let fixed = &text[start..];
    report.bytes_stripped = raw.len() - fixed.len();
    Ok((fixed.to_string(), report))
}
