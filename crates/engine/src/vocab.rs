//! Dense, zero-based string-to-code encoding for item and user identifiers.

use std::collections::HashMap;

/// Bidirectional identifier encoder. Codes are assigned in order of first
/// appearance and never removed; an encoder lives exactly as long as the
/// snapshot that owns it.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    codes: HashMap<String, u32>,
    raw: Vec<String>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the code for `raw`, assigning the next free code on first sight.
    pub fn code_of(&mut self, raw: &str) -> u32 {
        if let Some(&code) = self.codes.get(raw) {
            return code;
        }
        let code = self.raw.len() as u32;
        self.raw.push(raw.to_string());
        self.codes.insert(raw.to_string(), code);
        code
    }

    /// Read-only lookup used on the query path.
    pub fn lookup(&self, raw: &str) -> Option<u32> {
        self.codes.get(raw).copied()
    }

    pub fn raw_of(&self, code: u32) -> Option<&str> {
        self.raw.get(code as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_dense_in_first_seen_order() {
        let mut vocab = Vocabulary::new();
        assert_eq!(vocab.code_of("b"), 0);
        assert_eq!(vocab.code_of("a"), 1);
        assert_eq!(vocab.code_of("b"), 0);
        assert_eq!(vocab.code_of("c"), 2);
        assert_eq!(vocab.len(), 3);

        assert_eq!(vocab.raw_of(1), Some("a"));
        assert_eq!(vocab.raw_of(3), None);
        assert_eq!(vocab.lookup("c"), Some(2));
        assert_eq!(vocab.lookup("missing"), None);
    }
}
