//! Parsing-engine backend identifiers and `auto` resolution.
//!
//! The core never calls an engine; it only routes tasks to one by name.
//! Workers resolve the name to an adapter at claim time.

/// GPU document pipeline for PDFs and scanned images.
pub const BACKEND_PIPELINE: &str = "pipeline";
/// Vision-language OCR engine.
pub const BACKEND_PADDLEOCR_VL: &str = "paddleocr-vl";
/// Office / HTML / plain-text conversion.
pub const BACKEND_MARKITDOWN: &str = "markitdown";
/// Speech-to-text with optional diarization.
pub const BACKEND_SENSEVOICE: &str = "sensevoice";
/// Video transcription and keyframe extraction.
pub const BACKEND_VIDEO: &str = "video";
/// FASTA sequence records.
pub const BACKEND_FASTA: &str = "fasta";
/// GenBank flat files.
pub const BACKEND_GENBANK: &str = "genbank";
/// Resolved to a concrete backend from the file extension at submit time.
pub const BACKEND_AUTO: &str = "auto";

/// Every backend a task row may carry (`auto` is resolved before insert).
pub const KNOWN_BACKENDS: &[&str] = &[
    BACKEND_PIPELINE,
    BACKEND_PADDLEOCR_VL,
    BACKEND_MARKITDOWN,
    BACKEND_SENSEVOICE,
    BACKEND_VIDEO,
    BACKEND_FASTA,
    BACKEND_GENBANK,
];

const PDF_IMAGE_EXTENSIONS: &[&str] = &[
    "pdf", "png", "jpg", "jpeg", "bmp", "tiff", "tif", "webp",
];
const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "flac", "ogg", "aac"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov", "webm"];

/// Normalize a submitted backend string.
///
/// Trims and lowercases, resolves `auto` (or empty) against the file name,
/// and rejects anything not in [`KNOWN_BACKENDS`].
pub fn normalize_backend(backend: &str, file_name: &str) -> Result<String, String> {
    let backend = backend.trim().to_ascii_lowercase();

    if backend.is_empty() || backend == BACKEND_AUTO {
        return Ok(resolve_auto(file_name).to_string());
    }

    if KNOWN_BACKENDS.contains(&backend.as_str()) {
        Ok(backend)
    } else {
        Err(format!("Unknown backend: '{backend}'"))
    }
}

/// Pick a backend from the file extension.
///
/// PDF and image formats go to the GPU pipeline; audio, video, and the
/// bioinformatics formats go to their dedicated engines; everything else
/// falls through to markitdown.
pub fn resolve_auto(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();

    if PDF_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        BACKEND_PIPELINE
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        BACKEND_SENSEVOICE
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        BACKEND_VIDEO
    } else if ext == "fa" || ext == "fasta" {
        BACKEND_FASTA
    } else if ext == "gb" || ext == "gbk" || ext == "genbank" {
        BACKEND_GENBANK
    } else {
        BACKEND_MARKITDOWN
    }
}
