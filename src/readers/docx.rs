use std::{fs::File, io::Read, path::Path};

use quick_xml::{Reader, events::Event};

use super::{Content, FileReader};
use crate::error::{Error, Result};

const DOCUMENT_PART: &str = "word/document.xml";

/// Word (OOXML) documents: paragraph texts joined by newlines.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxReader;

impl FileReader for DocxReader {
    fn extensions(&self) -> &'static [&'static str] {
        &["docx"]
    }

    fn read(&self, path: &Path) -> Result<Content> {
        let file = File::open(path).map_err(|e| Error::file_read(path, e))?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| Error::file_read(path, e))?;
        let mut xml = String::new();
        archive
            .by_name(DOCUMENT_PART)
            .map_err(|e| Error::file_read(path, e))?
            .read_to_string(&mut xml)
            .map_err(|e| Error::file_read(path, e))?;

        let paragraphs =
            paragraphs(&xml).map_err(|e| Error::file_read(path, e))?;
        Ok(Content::Text(paragraphs.join("\n")))
    }
}

/// Collect the text of each `w:p` element of a WordprocessingML body.
fn paragraphs(xml: &str) -> std::result::Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text_run = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => current = Some(String::new()),
                b"w:t" => in_text_run = true,
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" => paragraphs.push(String::new()),
                b"w:tab" => {
                    if let Some(p) = current.as_mut() {
                        p.push('\t');
                    }
                }
                _ => {}
            },
            Event::Text(e) if in_text_run => {
                if let Some(p) = current.as_mut() {
                    p.push_str(&e.unescape()?);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => {
                    if let Some(p) = current.take() {
                        paragraphs.push(p);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>
<w:p><w:r><w:t>Fish &amp; chips</w:t></w:r></w:p>
<w:p/>
<w:p><w:r><w:t xml:space="preserve">Second </w:t></w:r><w:r><w:t>line</w:t></w:r></w:p>
</w:body>
</w:document>"#;

    #[test]
    fn paragraphs_are_split() {
        assert_eq!(
            paragraphs(BODY).unwrap(),
            vec!["Fish & chips", "", "Second line"]
        );
    }

    #[test]
    fn reads_docx_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("memo.docx");
        {
            let file = File::create(&path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file(
                DOCUMENT_PART,
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
            zip.write_all(BODY.as_bytes()).unwrap();
            zip.finish().unwrap();
        }

        assert_eq!(
            DocxReader.read(&path).unwrap(),
            Content::Text("Fish & chips\n\nSecond line".into())
        );
    }

    #[test]
    fn missing_document_part_is_a_read_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.docx");
        {
            let file = File::create(&path).unwrap();
            zip::ZipWriter::new(file).finish().unwrap();
        }

        assert!(matches!(
            DocxReader.read(&path),
            Err(Error::FileRead { .. })
        ));
    }
}
