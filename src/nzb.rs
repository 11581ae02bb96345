//! NZB document parsing and archive candidate selection
//!
//! NZB is an XML manifest listing the articles (by message-id) that
//! reconstruct a binary via yEnc. The parse is non-resolving and
//! non-expanding; unknown attributes are ignored and text is trimmed.
//!
//! Reference: https://sabnzbd.org/wiki/extra/nzb-spec

use crate::error::{Result, TriageError};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Extensions recognized by the subject fallback matcher
static SUBJECT_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[\w\-.()\[\]]+\.(rar|r\d{2}|7z|par2|sfv|nfo|mkv|mp4|avi|mov|wmv)").unwrap()
});

static QUOTED_FILENAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""([^"]+)""#).unwrap());

static PART_VOLUME_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.part\d+\.rar$").unwrap());

static SPLIT_VOLUME_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.r\d{2}$").unwrap());

/// A parsed NZB document
#[derive(Debug, Clone, PartialEq)]
pub struct NzbDocument {
    /// Title from `head/meta[@type='title']`, when present
    pub title: Option<String>,
    /// Files in document order
    pub files: Vec<NzbFile>,
}

/// A single file entry in an NZB
#[derive(Debug, Clone, PartialEq)]
pub struct NzbFile {
    /// Subject line
    pub subject: String,
    /// Filename derived from the subject, when one could be recognized
    pub filename: Option<String>,
    /// Lowercased extension of the derived filename
    pub extension: Option<String>,
    /// Segments in document order
    pub segments: Vec<NzbSegment>,
}

/// A segment (article) of a file
#[derive(Debug, Clone, PartialEq)]
pub struct NzbSegment {
    /// Segment number (1-based)
    pub number: u32,
    /// Size of this segment in bytes
    pub bytes: u64,
    /// Message-id in storage form, without angle brackets
    pub message_id: String,
}

impl NzbFile {
    /// Total size of all segments
    pub fn total_bytes(&self) -> u64 {
        self.segments.iter().map(|s| s.bytes).sum()
    }

    /// Whether this file looks like a RAR/7z archive volume
    pub fn is_archive_candidate(&self) -> bool {
        self.extension
            .as_deref()
            .is_some_and(is_archive_extension)
    }
}

impl NzbDocument {
    /// Total size of all files
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.total_bytes()).sum()
    }

    /// Archive candidates in document order, deduplicated by canonical
    /// archive key (multi-volume sets collapse to one representative).
    pub fn archive_candidates(&self) -> Vec<&NzbFile> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for file in &self.files {
            if !file.is_archive_candidate() {
                continue;
            }
            let key = match &file.filename {
                Some(name) => canonical_archive_key(name),
                None => continue,
            };
            if seen.insert(key) {
                candidates.push(file);
            }
        }

        candidates
    }
}

/// Derive a filename from an NZB subject line.
///
/// The first double-quoted substring wins; otherwise the first token that
/// ends in a recognized media/archive extension.
pub fn derive_filename(subject: &str) -> Option<String> {
    if let Some(captures) = QUOTED_FILENAME.captures(subject) {
        let name = captures[1].trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    SUBJECT_FILENAME
        .find(subject)
        .map(|m| m.as_str().to_string())
}

/// Lowercased extension after the last dot, when present
pub fn extension_of(filename: &str) -> Option<String> {
    let dot = filename.rfind('.')?;
    let ext = &filename[dot + 1..];
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Whether an extension belongs to the archive candidate set
/// (`rar`, `r00`–`r99`, `7z`)
pub fn is_archive_extension(ext: &str) -> bool {
    if ext == "rar" || ext == "7z" {
        return true;
    }
    ext.len() == 3
        && ext.starts_with('r')
        && ext[1..].bytes().all(|b| b.is_ascii_digit())
}

/// Canonical archive key: lowercased filename with `.partNNN.rar` and
/// `.rNN` volume suffixes collapsed to `.rar`.
///
/// Idempotent: applying the key to itself is a no-op.
pub fn canonical_archive_key(filename: &str) -> String {
    let lower = filename.to_ascii_lowercase();
    if PART_VOLUME_SUFFIX.is_match(&lower) {
        return PART_VOLUME_SUFFIX.replace(&lower, ".rar").into_owned();
    }
    if SPLIT_VOLUME_SUFFIX.is_match(&lower) {
        return SPLIT_VOLUME_SUFFIX.replace(&lower, ".rar").into_owned();
    }
    lower
}

/// Strip enclosing angle brackets from a message-id for storage form
fn storage_message_id(raw: &str) -> &str {
    raw.strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(raw)
}

/// Parse an NZB document from XML text.
///
/// The minimum schema understood: root `nzb`, optional
/// `head/meta[@type='title']`, `file` elements with `@subject` and child
/// `segments/segment` carrying `@number`, `@bytes` and the message-id as
/// text content.
pub fn parse_nzb(xml: &str) -> Result<NzbDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut document = NzbDocument {
        title: None,
        files: Vec::new(),
    };

    let mut in_head = false;
    let mut in_title_meta = false;
    let mut in_segments = false;
    let mut current_file: Option<NzbFile> = None;
    let mut current_segment: Option<(u32, u64)> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"head" => in_head = true,
                b"meta" if in_head => {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"type"
                            && attr.value.as_ref().eq_ignore_ascii_case(b"title")
                        {
                            in_title_meta = true;
                        }
                    }
                }
                b"file" => {
                    let mut subject = String::new();
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"subject" {
                            subject = attr.unescape_value().unwrap_or_default().to_string();
                        }
                    }

                    let filename = derive_filename(&subject);
                    let extension = filename.as_deref().and_then(extension_of);

                    current_file = Some(NzbFile {
                        subject,
                        filename,
                        extension,
                        segments: Vec::new(),
                    });
                }
                b"segments" if current_file.is_some() => in_segments = true,
                b"segment" if in_segments => {
                    let mut number = 0u32;
                    let mut bytes = 0u64;
                    for attr in e.attributes().flatten() {
                        let value = String::from_utf8_lossy(&attr.value).to_string();
                        match attr.key.as_ref() {
                            b"number" => number = value.parse().unwrap_or(0),
                            b"bytes" => bytes = value.parse().unwrap_or(0),
                            _ => {}
                        }
                    }
                    current_segment = Some((number, bytes));
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"head" => in_head = false,
                b"meta" => in_title_meta = false,
                b"file" => {
                    if let Some(file) = current_file.take() {
                        document.files.push(file);
                    }
                }
                b"segments" => in_segments = false,
                b"segment" => current_segment = None,
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default().trim().to_string();
                if text.is_empty() {
                    continue;
                }

                if in_title_meta {
                    document.title = Some(text);
                } else if let (Some((number, bytes)), Some(file)) =
                    (current_segment, current_file.as_mut())
                {
                    file.segments.push(NzbSegment {
                        number,
                        bytes,
                        message_id: storage_message_id(&text).to_string(),
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(TriageError::Xml(format!("XML parse error: {}", e))),
            _ => {}
        }

        buf.clear();
    }

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nzb PUBLIC "-//newzBin//DTD NZB 1.1//EN" "http://www.newzbin.com/DTD/nzb/nzb-1.1.dtd">
<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
  <head>
    <meta type="title">Some.Release.2160p</meta>
  </head>
  <file poster="up@example.com" date="1600000000" subject="[01/10] - &quot;archive.part01.rar&quot; yEnc (1/3)">
    <groups>
      <group>alt.binaries.test</group>
    </groups>
    <segments>
      <segment bytes="768000" number="1">&lt;seg1@example.com&gt;</segment>
      <segment bytes="768000" number="2">seg2@example.com</segment>
    </segments>
  </file>
  <file poster="up@example.com" date="1600000000" subject="[02/10] - &quot;archive.part02.rar&quot; yEnc (1/3)">
    <segments>
      <segment bytes="768000" number="1">seg3@example.com</segment>
    </segments>
  </file>
</nzb>"#;

    #[test]
    fn test_parse_simple() {
        let doc = parse_nzb(SAMPLE).unwrap();
        assert_eq!(doc.title.as_deref(), Some("Some.Release.2160p"));
        assert_eq!(doc.files.len(), 2);

        let file = &doc.files[0];
        assert_eq!(file.filename.as_deref(), Some("archive.part01.rar"));
        assert_eq!(file.extension.as_deref(), Some("rar"));
        assert_eq!(file.segments.len(), 2);
        assert_eq!(file.segments[0].number, 1);
        assert_eq!(file.segments[0].bytes, 768000);
        assert_eq!(file.total_bytes(), 1_536_000);
    }

    #[test]
    fn test_message_ids_stored_without_brackets() {
        let doc = parse_nzb(SAMPLE).unwrap();
        assert_eq!(doc.files[0].segments[0].message_id, "seg1@example.com");
        assert_eq!(doc.files[0].segments[1].message_id, "seg2@example.com");
    }

    #[test]
    fn test_multi_volume_set_collapses_to_one_candidate() {
        let doc = parse_nzb(SAMPLE).unwrap();
        let candidates = doc.archive_candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].filename.as_deref(),
            Some("archive.part01.rar")
        );
    }

    #[test]
    fn test_derive_filename_quoted() {
        assert_eq!(
            derive_filename(r#"[01/10] - "release.part01.rar" yEnc (1/25)"#).as_deref(),
            Some("release.part01.rar")
        );
    }

    #[test]
    fn test_derive_filename_fallback_match() {
        assert_eq!(
            derive_filename("release.2160p [01/10] movie.r03 yEnc").as_deref(),
            Some("movie.r03")
        );
        assert_eq!(
            derive_filename("no quotes here Some.Show.mkv (1/5)").as_deref(),
            Some("Some.Show.mkv")
        );
    }

    #[test]
    fn test_derive_filename_none() {
        assert_eq!(derive_filename("just some random words"), None);
    }

    #[test]
    fn test_extension_normalization() {
        assert_eq!(extension_of("Movie.PART01.RAR").as_deref(), Some("rar"));
        assert_eq!(extension_of("x.7z").as_deref(), Some("7z"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn test_archive_extension_set() {
        assert!(is_archive_extension("rar"));
        assert!(is_archive_extension("7z"));
        assert!(is_archive_extension("r00"));
        assert!(is_archive_extension("r99"));
        assert!(!is_archive_extension("r1"));
        assert!(!is_archive_extension("r100"));
        assert!(!is_archive_extension("par2"));
        assert!(!is_archive_extension("mkv"));
    }

    #[test]
    fn test_canonical_archive_key() {
        assert_eq!(
            canonical_archive_key("Archive.part01.rar"),
            "archive.rar"
        );
        assert_eq!(canonical_archive_key("Archive.r05"), "archive.rar");
        assert_eq!(canonical_archive_key("archive.rar"), "archive.rar");
        assert_eq!(canonical_archive_key("archive.7z"), "archive.7z");
    }

    #[test]
    fn test_canonical_archive_key_idempotent() {
        for name in ["Archive.part123.rar", "set.r42", "plain.rar", "x.7z"] {
            let once = canonical_archive_key(name);
            assert_eq!(canonical_archive_key(&once), once);
        }
    }

    #[test]
    fn test_candidates_keep_insertion_order() {
        let xml = r#"<nzb>
  <file subject="&quot;beta.rar&quot;"><segments><segment bytes="1" number="1">b@x</segment></segments></file>
  <file subject="&quot;alpha.7z&quot;"><segments><segment bytes="1" number="1">a@x</segment></segments></file>
  <file subject="&quot;beta.r00&quot;"><segments><segment bytes="1" number="1">c@x</segment></segments></file>
</nzb>"#;
        let doc = parse_nzb(xml).unwrap();
        let names: Vec<_> = doc
            .archive_candidates()
            .iter()
            .map(|f| f.filename.as_deref().unwrap())
            .collect();
        assert_eq!(names, vec!["beta.rar", "alpha.7z"]);
    }

    #[test]
    fn test_par2_files_are_not_candidates() {
        let xml = r#"<nzb>
  <file subject="&quot;set.par2&quot;"><segments><segment bytes="1" number="1">p@x</segment></segments></file>
</nzb>"#;
        let doc = parse_nzb(xml).unwrap();
        assert!(doc.archive_candidates().is_empty());
        assert_eq!(doc.files.len(), 1);
    }

    #[test]
    fn test_unknown_attributes_ignored() {
        let xml = r#"<nzb custom="x">
  <file subject="&quot;a.rar&quot;" poster="p" novel="1">
    <segments><segment bytes="10" number="1" other="y">id@x</segment></segments>
  </file>
</nzb>"#;
        let doc = parse_nzb(xml).unwrap();
        assert_eq!(doc.files[0].segments[0].bytes, 10);
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        assert!(parse_nzb("<nzb><file</nzb>").is_err());
    }

    #[test]
    fn test_empty_document() {
        let doc = parse_nzb("<nzb></nzb>").unwrap();
        assert!(doc.files.is_empty());
        assert!(doc.title.is_none());
        assert_eq!(doc.total_bytes(), 0);
    }
}
