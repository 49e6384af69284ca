/// Drops NUL and BOM characters and unifies line endings so that the
/// line-oriented heuristics see one line per OCR row.
pub fn clean_ocr_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(|character| *character != '\u{0000}' && *character != '\u{FEFF}')
        .collect()
}

/// Collapses every whitespace run to a single space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
