//! Splits a streamed reply into sentences for synthesis.

/// Characters that close a sentence.
const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Accumulates tokens and releases a sentence whenever the buffer ends in
/// `.`, `!` or `?`.
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    buffer: String,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a token. Returns the trimmed sentence if the buffer now ends a sentence.
    pub fn push(&mut self, token: &str) -> Option<String> {
        self.buffer.push_str(token);
        if self.buffer.ends_with(SENTENCE_TERMINATORS) {
            self.take()
        } else {
            None
        }
    }

    /// Flush whatever remains at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        self.take()
    }

    fn take(&mut self) -> Option<String> {
        let sentence = std::mem::take(&mut self.buffer).trim().to_string();
        if sentence.is_empty() {
            None
        } else {
            Some(sentence)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(tokens: &[&str]) -> Vec<String> {
        let mut segmenter = SentenceSegmenter::new();
        let mut out: Vec<String> = tokens.iter().filter_map(|t| segmenter.push(t)).collect();
        out.extend(segmenter.finish());
        out
    }

    #[test]
    fn two_sentences_from_stream() {
        let sentences = segment(&["Hello", " there", ".", " How", " are", " you", "?"]);
        assert_eq!(sentences, vec!["Hello there.", "How are you?"]);
    }

    #[test]
    fn remainder_flushed_at_end() {
        let sentences = segment(&["Sure", "!", " Let me", " check"]);
        assert_eq!(sentences, vec!["Sure!", "Let me check"]);
    }

    #[test]
    fn terminator_inside_token_only_counts_at_end() {
        let sentences = segment(&["It costs 3", ".5 dollars", "."]);
        assert_eq!(sentences, vec!["It costs 3.5 dollars."]);
    }

    #[test]
    fn whitespace_only_is_dropped() {
        assert!(segment(&["  ", "\n"]).is_empty());
        assert!(segment(&[]).is_empty());
    }
}
