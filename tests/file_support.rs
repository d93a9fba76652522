//! Multi-format file ingestion through the normalizer and session.

use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;

use docqa::config::Config;
use docqa::gateway::DisabledGateway;
use docqa::normalize::Normalizer;
use docqa::session::{Session, FILE_ERROR_TEXT};
use docqa_core::{CanonicalDocument, DocumentSource, IngestionError};

/// Minimal valid PDF with one text line per page.
/// Builds body then xref with correct byte offsets so pdf-extract can parse it.
fn minimal_pdf(pages: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut offsets = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");

    // 1: catalog, 2: pages, 3: font, then (page, contents) pairs from 4.
    let kids = (0..pages.len())
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids,
            pages.len()
        )
        .as_bytes(),
    );
    offsets.push(out.len());
    out.extend_from_slice(
        b"3 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );

    for (i, text) in pages.iter().enumerate() {
        let page_id = 4 + 2 * i;
        let content_id = page_id + 1;
        let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", text);

        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >> endobj\n",
                page_id, content_id
            )
            .as_bytes(),
        );
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
                content_id,
                stream.len(),
                stream
            )
            .as_bytes(),
        );
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", offsets.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            offsets.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

fn zip_with(entries: &[(&str, String)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, body) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    let body = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect::<String>();
    zip_with(&[(
        "word/document.xml",
        format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        ),
    )])
}

fn minimal_pptx(slides: &[&str]) -> Vec<u8> {
    let entries = slides
        .iter()
        .enumerate()
        .map(|(i, text)| {
            (
                format!("ppt/slides/slide{}.xml", i + 1),
                format!(
                    "<?xml version=\"1.0\"?><p:sld xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\" xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>",
                    text
                ),
            )
        })
        .collect::<Vec<_>>();
    let borrowed = entries
        .iter()
        .map(|(n, b)| (n.as_str(), b.clone()))
        .collect::<Vec<_>>();
    zip_with(&borrowed)
}

fn normalizer() -> Normalizer {
    Normalizer::from_config(&Config::default()).unwrap()
}

/// Write `bytes` to a temp file and build a source from it the way the CLI does.
fn file_source(tmp: &TempDir, name: &str, bytes: &[u8]) -> DocumentSource {
    let path = tmp.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    DocumentSource::File {
        name: name.to_string(),
        mime_hint: None,
        raw_bytes: std::fs::read(&path).unwrap(),
    }
}

#[tokio::test]
async fn test_pdf_pages_are_joined_in_order() {
    let tmp = TempDir::new().unwrap();
    let source = file_source(
        &tmp,
        "report.pdf",
        &minimal_pdf(&["quarterly revenue grew", "costs stayed flat"]),
    );

    let doc = normalizer().normalize(source).await.unwrap();
    assert_eq!(doc.title, "report.pdf");
    let first = doc.text.find("quarterly revenue grew").unwrap();
    let second = doc.text.find("costs stayed flat").unwrap();
    assert!(first < second);
    assert!(doc.text[first..second].contains("\n\n"));
}

#[tokio::test]
async fn test_docx_paragraphs_become_lines() {
    let tmp = TempDir::new().unwrap();
    let source = file_source(
        &tmp,
        "memo.docx",
        &minimal_docx(&["To all staff.", "The office closes at noon."]),
    );

    let doc = normalizer().normalize(source).await.unwrap();
    assert_eq!(
        doc,
        CanonicalDocument::new("memo.docx", "To all staff.\nThe office closes at noon.")
    );
}

#[tokio::test]
async fn test_pptx_slides_are_joined_with_blank_line() {
    let tmp = TempDir::new().unwrap();
    let source = file_source(&tmp, "deck.pptx", &minimal_pptx(&["Agenda", "Results"]));

    let doc = normalizer().normalize(source).await.unwrap();
    assert_eq!(doc.text, "Agenda\n\nResults");
}

#[tokio::test]
async fn test_invalid_utf8_text_file_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let source = file_source(&tmp, "latin1.txt", &[0x63, 0x61, 0x66, 0xe9]);

    let err = normalizer().normalize(source).await.unwrap_err();
    assert!(matches!(err, IngestionError::InvalidUtf8(_)));
}

#[tokio::test]
async fn test_session_recovers_from_corrupt_docx() {
    let tmp = TempDir::new().unwrap();
    let source = file_source(&tmp, "broken.docx", b"PK not really a zip");

    let mut session = Session::new(Arc::new(DisabledGateway), Arc::new(normalizer()));
    session.load_document(source).await;
    assert_eq!(
        session.document(),
        &CanonicalDocument::new("broken.docx", FILE_ERROR_TEXT)
    );
}
