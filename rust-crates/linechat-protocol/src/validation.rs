//! Message validation rules
//!
//! A line is accepted when, after removing line terminators from both ends,
//! it is not blank and is at most `max_len` characters long. Surrounding
//! spaces are kept in the accepted text; they only matter for the blank check.

/// Default maximum message length, in characters
pub const MAX_MESSAGE_LEN: usize = 256;

/// Reply sent to a client whose message was rejected
pub const INVALID_MESSAGE_REPLY: &str = "ERR Invalid message";

/// Pure predicate over candidate lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageValidator {
    max_len: usize,
}

impl MessageValidator {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Longest raw line worth buffering: `max_len` characters of up to four
    /// UTF-8 bytes each, plus `\r\n`
    pub fn max_line_bytes(&self) -> usize {
        self.max_len.saturating_mul(4).saturating_add(2)
    }

    /// Return the text to broadcast, or `None` if the line is rejected.
    pub fn validate<'a>(&self, line: &'a str) -> Option<&'a str> {
        let text = line.trim_matches(['\r', '\n']);

        if text.trim().is_empty() {
            return None;
        }

        if text.chars().count() > self.max_len {
            return None;
        }

        Some(text)
    }

    pub fn is_valid(&self, line: &str) -> bool {
        self.validate(line).is_some()
    }
}

impl Default for MessageValidator {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_text() {
        let v = MessageValidator::default();
        assert!(v.is_valid("hola"));
        assert_eq!(v.validate("hola\r\n"), Some("hola"));
    }

    #[test]
    fn test_rejects_blank() {
        let v = MessageValidator::default();
        assert!(!v.is_valid(""));
        assert!(!v.is_valid("   "));
        assert!(!v.is_valid("\t \r\n"));
        assert!(!v.is_valid("\n"));
    }

    #[test]
    fn test_keeps_surrounding_spaces() {
        let v = MessageValidator::default();
        assert_eq!(v.validate("  hi there  \n"), Some("  hi there  "));
    }

    #[test]
    fn test_length_boundary() {
        let v = MessageValidator::default();
        let exact = "a".repeat(MAX_MESSAGE_LEN);
        let over = "a".repeat(MAX_MESSAGE_LEN + 1);

        assert!(v.is_valid(&exact));
        assert!(v.is_valid(&format!("{}\r\n", exact)));
        assert!(!v.is_valid(&over));
    }

    #[test]
    fn test_max_line_bytes() {
        assert_eq!(MessageValidator::default().max_line_bytes(), 1026);
        assert_eq!(MessageValidator::new(usize::MAX).max_line_bytes(), usize::MAX);
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let v = MessageValidator::new(4);
        assert!(v.is_valid("ñañá"));
        assert!(!v.is_valid("ñañáa"));
    }
}
