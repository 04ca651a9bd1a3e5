//! Content-type detection from file bytes.
//!
//! The client-declared type and the filename extension are never consulted:
//! a `.jpg` whose bytes are an HTML page is `text/html` here and gets rejected.

use crate::models::FileType;

const OLE2_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const TEXT_SAMPLE: usize = 8192;

pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_PNG: &str = "image/png";
pub const MIME_GIF: &str = "image/gif";
pub const MIME_WEBP: &str = "image/webp";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOC: &str = "application/msword";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_XLS: &str = "application/vnd.ms-excel";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_PPT: &str = "application/vnd.ms-powerpoint";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_ZIP: &str = "application/zip";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MP3: &str = "audio/mpeg";
pub const MIME_MP4: &str = "video/mp4";
pub const MIME_MPEG: &str = "video/mpeg";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// Types an upload may have, paired with the extension used for the stored file.
const ALLOWED: &[(&str, &str)] = &[
    (MIME_JPEG, "jpg"),
    (MIME_PNG, "png"),
    (MIME_GIF, "gif"),
    (MIME_WEBP, "webp"),
    (MIME_PDF, "pdf"),
    (MIME_DOC, "doc"),
    (MIME_DOCX, "docx"),
    (MIME_XLS, "xls"),
    (MIME_XLSX, "xlsx"),
    (MIME_PPT, "ppt"),
    (MIME_PPTX, "pptx"),
    (MIME_ZIP, "zip"),
    (MIME_TEXT, "txt"),
    (MIME_MP3, "mp3"),
    (MIME_MP4, "mp4"),
    (MIME_MPEG, "mpg"),
];

const DOCUMENT_TYPES: &[&str] = &[
    MIME_PDF, MIME_DOC, MIME_DOCX, MIME_XLS, MIME_XLSX, MIME_PPT, MIME_PPTX, MIME_TEXT,
];

/// Best-effort MIME detection. `None` means the bytes matched nothing we recognise.
pub fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    if data.is_empty() {
        return None;
    }

    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(MIME_JPEG);
    }
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(MIME_PNG);
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some(MIME_GIF);
    }
    if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return Some(MIME_WEBP);
    }
    if data.starts_with(b"%PDF-") {
        return Some(MIME_PDF);
    }
    if data.starts_with(&OLE2_MAGIC) {
        return Some(sniff_ole2(data));
    }
    if data.starts_with(b"PK\x03\x04") || data.starts_with(b"PK\x05\x06") {
        return Some(sniff_zip(data));
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return Some(sniff_iso_media(&data[8..12]));
    }
    if data.starts_with(&[0x00, 0x00, 0x01, 0xBA]) || data.starts_with(&[0x00, 0x00, 0x01, 0xB3])
    {
        return Some(MIME_MPEG);
    }
    if data.starts_with(b"ID3") || is_mpeg_audio_frame(data) {
        return Some(MIME_MP3);
    }

    sniff_text(data)
}

pub fn is_allowed(mime: &str) -> bool {
    ALLOWED.iter().any(|(allowed, _)| *allowed == mime)
}

/// Extension for a stored file of this type; only defined for allowed types.
pub fn extension_for(mime: &str) -> Option<&'static str> {
    ALLOWED
        .iter()
        .find(|(allowed, _)| *allowed == mime)
        .map(|(_, ext)| *ext)
}

pub fn classify(mime: &str) -> FileType {
    if mime.starts_with("image/") {
        FileType::Image
    } else if mime.starts_with("audio/") {
        FileType::Audio
    } else if mime.starts_with("video/") {
        FileType::Video
    } else if DOCUMENT_TYPES.contains(&mime) {
        FileType::Document
    } else {
        FileType::Other
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn utf16le(name: &str) -> Vec<u8> {
    name.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

// Compound documents name their main stream in the directory sector.
fn sniff_ole2(data: &[u8]) -> &'static str {
    if contains(data, &utf16le("WordDocument")) {
        MIME_DOC
    } else if contains(data, &utf16le("Workbook")) || contains(data, &utf16le("Book")) {
        MIME_XLS
    } else if contains(data, &utf16le("PowerPoint Document")) {
        MIME_PPT
    } else {
        "application/x-ole-storage"
    }
}

// OOXML packages are zips whose entry names reveal the application.
fn sniff_zip(data: &[u8]) -> &'static str {
    if contains(data, b"[Content_Types].xml") || contains(data, b"_rels/.rels") {
        if contains(data, b"word/") {
            return MIME_DOCX;
        }
        if contains(data, b"xl/") {
            return MIME_XLSX;
        }
        if contains(data, b"ppt/") {
            return MIME_PPTX;
        }
    }
    MIME_ZIP
}

fn sniff_iso_media(brand: &[u8]) -> &'static str {
    match brand {
        b"M4A " | b"M4B " => "audio/mp4",
        b"qt  " => "video/quicktime",
        b"heic" | b"heix" | b"mif1" => "image/heic",
        _ => MIME_MP4,
    }
}

fn is_mpeg_audio_frame(data: &[u8]) -> bool {
    if data.len() < 3 || data[0] != 0xFF || data[1] & 0xE0 != 0xE0 {
        return false;
    }
    let version = (data[1] >> 3) & 0b11;
    let layer = (data[1] >> 1) & 0b11;
    let bitrate = data[2] >> 4;
    version != 0b01 && layer != 0b00 && bitrate != 0b1111
}

fn sniff_text(data: &[u8]) -> Option<&'static str> {
    let sample = &data[..data.len().min(TEXT_SAMPLE)];

    let valid_utf8 = match std::str::from_utf8(sample) {
        Ok(_) => true,
        // A multibyte sequence cut by the sample boundary is fine.
        Err(e) => e.error_len().is_none() && sample.len() < data.len(),
    };
    if !valid_utf8 {
        return None;
    }
    if sample
        .iter()
        .any(|&b| matches!(b, 0x00..=0x08 | 0x0E..=0x1A | 0x1C..=0x1F | 0x7F))
    {
        return None;
    }

    Some(sniff_markup(sample).unwrap_or(MIME_TEXT))
}

fn sniff_markup(sample: &[u8]) -> Option<&'static str> {
    let text = String::from_utf8_lossy(sample);
    let head: String = text
        .trim_start_matches('\u{feff}')
        .trim_start()
        .chars()
        .take(512)
        .collect::<String>()
        .to_ascii_lowercase();

    if head.starts_with("<?xml") {
        return Some(if head.contains("<svg") {
            "image/svg+xml"
        } else {
            "text/xml"
        });
    }
    if head.starts_with("<svg") {
        return Some("image/svg+xml");
    }

    const HTML_OPENERS: &[&str] = &[
        "<!doctype html",
        "<html",
        "<head",
        "<body",
        "<script",
        "<iframe",
        "<title",
        "<style",
        "<table",
        "<div",
        "<meta",
        "<link",
        "<form",
        "<img",
        "<a ",
        "<p>",
        "<br",
        "<h1",
        "<!--",
    ];
    if HTML_OPENERS.iter().any(|tag| head.starts_with(tag)) {
        return Some("text/html");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_signatures() {
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]), Some(MIME_JPEG));
        assert_eq!(
            sniff_mime(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00]),
            Some(MIME_PNG)
        );
        assert_eq!(sniff_mime(b"GIF89a\x01\x00"), Some(MIME_GIF));
        assert_eq!(sniff_mime(b"RIFF\x00\x00\x00\x00WEBPVP8 "), Some(MIME_WEBP));
    }

    #[test]
    fn truncated_png_header_is_not_png() {
        assert_ne!(sniff_mime(&[0x89, 0x50, 0x4E]), Some(MIME_PNG));
    }

    #[test]
    fn html_disguised_as_jpeg_is_html() {
        let mime = sniff_mime(b"<!DOCTYPE html><html><body>hi</body></html>").unwrap();
        assert_eq!(mime, "text/html");
        assert!(!is_allowed(mime));

        let mime = sniff_mime(b"\n  <script>alert(1)</script>").unwrap();
        assert_eq!(mime, "text/html");
    }

    #[test]
    fn plain_text_including_korean() {
        assert_eq!(sniff_mime("주일 예배 순서\n1. 찬양\n".as_bytes()), Some(MIME_TEXT));
    }

    #[test]
    fn binary_garbage_is_unrecognised() {
        assert_eq!(sniff_mime(&[0x00, 0x01, 0x02, 0x03, 0x99]), None);
        assert_eq!(sniff_mime(&[]), None);
    }

    #[test]
    fn office_containers() {
        let mut docx = b"PK\x03\x04".to_vec();
        docx.extend_from_slice(b"....[Content_Types].xml....word/document.xml");
        assert_eq!(sniff_mime(&docx), Some(MIME_DOCX));

        let mut xlsx = b"PK\x03\x04".to_vec();
        xlsx.extend_from_slice(b"[Content_Types].xml xl/workbook.xml");
        assert_eq!(sniff_mime(&xlsx), Some(MIME_XLSX));

        assert_eq!(sniff_mime(b"PK\x03\x04plain-archive"), Some(MIME_ZIP));

        let mut doc = OLE2_MAGIC.to_vec();
        doc.extend_from_slice(&utf16le("WordDocument"));
        assert_eq!(sniff_mime(&doc), Some(MIME_DOC));
    }

    #[test]
    fn media_signatures() {
        assert_eq!(sniff_mime(b"ID3\x03\x00\x00"), Some(MIME_MP3));
        assert_eq!(sniff_mime(&[0xFF, 0xFB, 0x90, 0x64]), Some(MIME_MP3));
        assert_eq!(
            sniff_mime(b"\x00\x00\x00\x18ftypisom\x00\x00"),
            Some(MIME_MP4)
        );
        assert_eq!(
            sniff_mime(b"\x00\x00\x00\x18ftypM4A \x00\x00"),
            Some("audio/mp4")
        );
        assert_eq!(sniff_mime(&[0x00, 0x00, 0x01, 0xBA, 0x44]), Some(MIME_MPEG));
    }

    #[test]
    fn pdf_signature() {
        assert_eq!(sniff_mime(b"%PDF-1.7\n"), Some(MIME_PDF));
    }

    #[test]
    fn classification_uses_mime_only() {
        assert_eq!(classify(MIME_PNG), FileType::Image);
        assert_eq!(classify(MIME_MP3), FileType::Audio);
        assert_eq!(classify(MIME_MPEG), FileType::Video);
        assert_eq!(classify(MIME_XLSX), FileType::Document);
        assert_eq!(classify(MIME_TEXT), FileType::Document);
        assert_eq!(classify(MIME_ZIP), FileType::Other);
    }

    #[test]
    fn allow_list_and_extensions() {
        assert!(is_allowed(MIME_WEBP));
        assert!(!is_allowed("image/svg+xml"));
        assert!(!is_allowed(MIME_OCTET_STREAM));
        assert_eq!(extension_for(MIME_JPEG), Some("jpg"));
        assert_eq!(extension_for(MIME_MPEG), Some("mpg"));
        assert_eq!(extension_for("text/html"), None);
    }
}
