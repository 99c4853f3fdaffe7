//! Plain-text extraction from uploaded policy documents.
//!
//! Supports PDF, Word (`.docx`), PowerPoint (`.pptx`), and UTF-8 text or
//! Markdown. The caller supplies bytes plus a content type (see
//! [`detect_content_type`] for choosing one from a file name).

use std::io::Read;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("document is not valid UTF-8 text")]
    NotUtf8,
}

/// Guess a content type from a file name's extension.
pub fn detect_content_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => MIME_PDF,
        "docx" => MIME_DOCX,
        "pptx" => MIME_PPTX,
        "txt" | "text" => MIME_TEXT,
        "md" | "markdown" => MIME_MARKDOWN,
        _ => MIME_OCTET_STREAM,
    }
}

/// Extract UTF-8 text from `bytes` of the given content type.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    // Ignore parameters such as "; charset=utf-8"
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        MIME_PDF => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string())),
        MIME_DOCX => extract_docx(bytes),
        MIME_PPTX => extract_pptx(bytes),
        MIME_TEXT | MIME_MARKDOWN => std::str::from_utf8(bytes)
            .map(|s| s.trim_start_matches('\u{feff}').to_string())
            .map_err(|_| ExtractError::NotUtf8),
        _ => Err(ExtractError::UnsupportedContentType(mime)),
    }
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    text_runs(&xml, b"p")
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut slides: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    slides.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut pages = Vec::with_capacity(slides.len());
    for name in slides {
        let xml = read_entry(&mut archive, &name)?;
        let text = text_runs(&xml, b"p")?;
        if !text.is_empty() {
            pages.push(text);
        }
    }
    Ok(pages.join("\n\n"))
}

/// Concatenate the text of every `<*:t>` element, with a newline after each
/// closing `paragraph` element.
fn text_runs(xml: &[u8], paragraph: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    in_text = false;
                } else if name.as_ref() == paragraph && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            for (name, body) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(body.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn detects_content_types() {
        assert_eq!(detect_content_type("Act.PDF"), MIME_PDF);
        assert_eq!(detect_content_type("brief.docx"), MIME_DOCX);
        assert_eq!(detect_content_type("deck.pptx"), MIME_PPTX);
        assert_eq!(detect_content_type("notes.md"), MIME_MARKDOWN);
        assert_eq!(detect_content_type("notes.txt"), MIME_TEXT);
        assert_eq!(detect_content_type("archive"), MIME_OCTET_STREAM);
    }

    #[test]
    fn plain_text_passes_through() {
        let text = extract_text("\u{feff}Policy text".as_bytes(), "text/plain; charset=utf-8").unwrap();
        assert_eq!(text, "Policy text");
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let err = extract_text(&[0xff, 0xfe, 0x00], MIME_TEXT).unwrap_err();
        assert!(matches!(err, ExtractError::NotUtf8));
    }

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_text(b"foo", MIME_OCTET_STREAM).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", MIME_DOCX).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let doc = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t>Clean Air </w:t></w:r><w:r><w:t>Act</w:t></w:r></w:p>
<w:p><w:r><w:t>Section 1 &amp; 2</w:t></w:r></w:p>
</w:body></w:document>"#;
        let bytes = zip_with(&[("word/document.xml", doc)]);
        let text = extract_text(&bytes, MIME_DOCX).unwrap();
        assert_eq!(text, "Clean Air Act\nSection 1 & 2");
    }

    #[test]
    fn pptx_slides_in_numeric_order() {
        let slide = |t: &str| {
            format!(
                r#"<p:sld xmlns:p="p" xmlns:a="a"><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:sld>"#,
                t
            )
        };
        let s1 = slide("first");
        let s2 = slide("second");
        let s10 = slide("tenth");
        let bytes = zip_with(&[
            ("ppt/slides/slide10.xml", s10.as_str()),
            ("ppt/slides/slide2.xml", s2.as_str()),
            ("ppt/slides/slide1.xml", s1.as_str()),
        ]);
        let text = extract_text(&bytes, MIME_PPTX).unwrap();
        assert_eq!(text, "first\n\nsecond\n\ntenth");
    }
}
