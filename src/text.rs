use crate::error::AppError;

/// Sentence-ending punctuation, including fullwidth CJK terminators.
const SENTENCE_ENDINGS: &[char] = &['.', '!', '?', '。', '！', '？'];

/// Collapse raw request text into a single-line synthesis script.
///
/// Line breaks become spaces, the result is trimmed, split at sentence
/// boundaries and rejoined with single spaces so the engines never see
/// formatting artifacts. Text that is empty after trimming is a client error.
pub fn normalize(raw: &str) -> Result<String, AppError> {
    let flattened = raw.replace(['\r', '\n'], " ");
    let trimmed = flattened.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(
            "input_text is empty after normalization".to_string(),
        ));
    }

    Ok(split_sentences(trimmed).join(" "))
}

/// Split at sentence-ending punctuation. This is deliberately simple
/// segment-and-rejoin, not semantic chunking.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for (i, ch) in text.char_indices() {
        if SENTENCE_ENDINGS.contains(&ch) {
            let end = i + ch.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}
