//! Symbolic encoder for trace output
//!
//! Every line a tracer emits can be passed through a two-stage, stateless transform
//! before it reaches the sink:
//!
//! 1. **Keyword compression**: each keyword of a [`KeywordDictionary`] is replaced by
//!    its symbol, keyword by keyword, in dictionary order. Replacement is plain
//!    substring replacement, so a keyword that contains an earlier keyword is only
//!    partially replaced (`INACTIVE` becomes `IN◉` because `ACTIVE` comes first).
//! 2. **Character substitution**: ASCII capitals map to negative squared letters,
//!    lowercase letters to circled letters, digits to circled digits. Everything
//!    else, including spaces, passes through.
//!
//! The result is framed with five delimiter tokens. The transform is meant for log
//! readability only: keyword compression loses information, so there is no decoder.
//!
//! # Example
//!
//! ```
//! use glyphtrace::encoder::SymbolicEncoder;
//!
//! let encoder = SymbolicEncoder::default();
//! assert_eq!(encoder.encode("OK"), "✓");
//! assert_eq!(encoder.encode(""), "");
//! ```

use chrono::Utc;
use std::sync::Arc;

/// Start-of-block delimiter
pub const DELIMITER_START: &str = "⚿";
/// Section boundary delimiter
pub const DELIMITER_SECTION: &str = "⌬";
/// Field boundary delimiter
pub const DELIMITER_FIELD: &str = "⫽";
/// Record boundary delimiter
pub const DELIMITER_RECORD: &str = "⛝";
/// End-of-block delimiter
pub const DELIMITER_END: &str = "⁂";

const HEADER_LABEL: &str = "SYMBOLIC-TRACE";

/// Keywords in compression order.
const STANDARD_KEYWORDS: &[(&str, &str)] = &[
    ("OK", "✓"),
    ("NEW", "✦"),
    ("FREE", "◆"),
    ("ID", "◈"),
    ("ERROR", "✗"),
    ("WARNING", "⚠"),
    ("INFO", "ℹ"),
    ("DEBUG", "◉"),
    ("START", "►"),
    ("STOP", "■"),
    ("PAUSE", "❚❚"),
    ("CONTINUE", "▶"),
    ("SUCCESS", "✔"),
    ("FAIL", "✘"),
    ("ACTIVE", "◉"),
    ("INACTIVE", "○"),
];

/// Ordered keyword → symbol table used for keyword compression.
///
/// The order of entries is the order replacements are applied in. It never changes
/// after construction; share it between encoders with an [`Arc`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordDictionary {
    entries: Vec<(String, String)>,
}

impl KeywordDictionary {
    /// Build a dictionary from `(keyword, symbol)` pairs, keeping their order.
    ///
    /// Empty keywords and repeated keywords are skipped; the first occurrence wins.
    pub fn new<K, S>(entries: impl IntoIterator<Item = (K, S)>) -> Self
    where
        K: Into<String>,
        S: Into<String>,
    {
        let mut kept: Vec<(String, String)> = Vec::new();
        for (keyword, symbol) in entries {
            let keyword = keyword.into();
            if keyword.is_empty() || kept.iter().any(|(k, _)| *k == keyword) {
                continue;
            }
            kept.push((keyword, symbol.into()));
        }
        Self { entries: kept }
    }

    /// The built-in control keyword table.
    pub fn standard() -> Self {
        Self::new(STANDARD_KEYWORDS.iter().copied())
    }

    /// Symbol assigned to an exact keyword, if any
    pub fn symbol_for(&self, keyword: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k == keyword).map(|(_, s)| s.as_str())
    }

    /// Iterate entries in compression order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, s)| (k.as_str(), s.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for KeywordDictionary {
    fn default() -> Self {
        Self::standard()
    }
}

/// Stateless keyword-compression and character-substitution encoder.
#[derive(Debug, Clone)]
pub struct SymbolicEncoder {
    dictionary: Arc<KeywordDictionary>,
}

impl SymbolicEncoder {
    pub fn new(dictionary: Arc<KeywordDictionary>) -> Self {
        Self { dictionary }
    }

    pub fn dictionary(&self) -> &KeywordDictionary {
        &self.dictionary
    }

    /// Encode text: keyword compression followed by character substitution.
    pub fn encode(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        self.compress_keywords(text).chars().map(substitute_char).collect()
    }

    /// Apply only the keyword compression stage.
    pub fn compress_keywords(&self, text: &str) -> String {
        self.dictionary
            .iter()
            .fold(text.to_string(), |compressed, (keyword, symbol)| {
                compressed.replace(keyword, symbol)
            })
    }

    /// Symbol for a keyword, or the keyword itself when it is not in the dictionary.
    pub fn keyword_symbol<'a>(&'a self, keyword: &'a str) -> &'a str {
        self.dictionary.symbol_for(keyword).unwrap_or(keyword)
    }

    /// Header identifying the producer and the time of emission.
    pub fn generate_header(&self, producer_id: &str, timestamp: &str) -> String {
        format!(
            "{} {} {} ID: {}{} TIME: {}{}",
            DELIMITER_START,
            HEADER_LABEL,
            DELIMITER_SECTION,
            self.encode(producer_id),
            DELIMITER_FIELD,
            timestamp,
            DELIMITER_SECTION
        )
    }

    /// Encode content and frame it between the start and end delimiters.
    pub fn wrap_content(&self, content: &str) -> String {
        format!("{}{}{}", DELIMITER_START, self.encode(content), DELIMITER_END)
    }

    /// Encode each field, join with the field delimiter and close the record.
    pub fn create_record(&self, fields: &[&str]) -> String {
        let encoded: Vec<String> = fields.iter().map(|f| self.encode(f)).collect();
        format!("{}{}", encoded.join(DELIMITER_FIELD), DELIMITER_RECORD)
    }

    /// Compose a complete framed message stamped with the current time.
    pub fn format_message(&self, producer_id: &str, message_type: &str, content: &str) -> String {
        self.format_message_at(producer_id, message_type, content, Utc::now().timestamp_millis())
    }

    /// Compose a complete framed message with an explicit timestamp (milliseconds).
    pub fn format_message_at(
        &self,
        producer_id: &str,
        message_type: &str,
        content: &str,
        timestamp_ms: i64,
    ) -> String {
        format!(
            "{}{} TYPE: {}{} CONTENT: {}{}",
            self.generate_header(producer_id, &timestamp_ms.to_string()),
            DELIMITER_SECTION,
            self.encode(message_type),
            DELIMITER_FIELD,
            self.encode(content),
            DELIMITER_END
        )
    }
}

impl Default for SymbolicEncoder {
    fn default() -> Self {
        Self::new(Arc::new(KeywordDictionary::standard()))
    }
}

fn substitute_char(c: char) -> char {
    let mapped = match c {
        'A'..='Z' => char::from_u32(0x1F170 + (c as u32 - 'A' as u32)),
        'a'..='z' => char::from_u32(0x24D0 + (c as u32 - 'a' as u32)),
        '0' => Some('\u{24EA}'),
        '1'..='9' => char::from_u32(0x2460 + (c as u32 - '1' as u32)),
        _ => None,
    };
    mapped.unwrap_or(c)
}
