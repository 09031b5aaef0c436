//! Extracted tokens and the per-scan sequence they form.

use serde::Serialize;

/// One extracted token, with the measurements the host indexes on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub word: String,
    /// Length of `word` in bytes.
    pub byte_len: usize,
    /// Length of `word` in characters, not bytes.
    pub char_count: usize,
    pub frequency: u64,
}

impl Token {
    pub fn new(word: String) -> Self {
        let byte_len = word.len();
        let char_count = word.chars().count();
        Self {
            word,
            byte_len,
            char_count,
            frequency: 1,
        }
    }
}

/// Ordered tokens produced by one segmentation call.
///
/// Owned exclusively by the consumer module that ran the scan; released
/// when its scan session ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenSequence {
    tokens: Vec<Token>,
}

impl TokenSequence {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_words(words: Vec<String>) -> Self {
        Self {
            tokens: words.into_iter().map(Token::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multibyte_words_count_characters_not_bytes() {
        let token = Token::new("東京都".to_owned());
        assert_eq!(token.byte_len, 9);
        assert_eq!(token.char_count, 3);
        assert_eq!(token.frequency, 1);
    }

    #[test]
    fn sequence_preserves_word_order() {
        let sequence =
            TokenSequence::from_words(vec!["สวัสดี".to_owned(), "ครับ".to_owned()]);
        assert_eq!(sequence.len(), 2);
        assert_eq!(sequence.get(0).unwrap().word, "สวัสดี");
        assert_eq!(sequence.get(1).unwrap().word, "ครับ");
    }

    #[test]
    fn tokens_serialize_for_host_diagnostics() {
        let token = Token::new("서울".to_owned());
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["word"], "서울");
        assert_eq!(json["byte_len"], 6);
        assert_eq!(json["char_count"], 2);
    }
}
