/// How many leading bytes are inspected for NUL bytes
const SNIFF_LEN: usize = 8000;

/// Decide whether content should be scanned as text.
///
/// Content with a recognised non-text magic number (images, archives,
/// executables) is binary, as is anything with a NUL byte near the start.
/// Unrecognised content without NULs is treated as text.
pub fn is_text(content: &[u8]) -> bool {
    if let Some(kind) = infer::get(content) {
        return kind.mime_type().starts_with("text");
    }
    !content.iter().take(SNIFF_LEN).any(|&b| b == 0)
}
