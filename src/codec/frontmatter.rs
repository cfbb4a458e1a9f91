//! Splits a page into its leading `---` metadata block and markdown body.

use crate::error::MetadataError;

const DELIMITER: &str = "---";

/// A page split into its metadata block and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitDocument<'a> {
    /// Raw YAML between the delimiters, `None` when the page has no metadata block.
    pub metadata: Option<&'a str>,
    pub body: &'a str,
    /// Byte offset of `body` within the original content.
    pub body_offset: usize,
    /// Set when a block was opened but never closed. The whole content is then the body.
    pub error: Option<MetadataError>,
}

/// Returns the byte length of a line terminator at the start of `s`, if any.
fn newline_len(s: &str) -> Option<usize> {
    if s.starts_with("\r\n") {
        Some(2)
    } else if s.starts_with('\n') {
        Some(1)
    } else {
        None
    }
}

pub fn split_document(content: &str) -> SplitDocument<'_> {
    let whole = SplitDocument {
        metadata: None,
        body: content,
        body_offset: 0,
        error: None,
    };

    let Some(after_delim) = content.strip_prefix(DELIMITER) else {
        return whole;
    };
    let Some(open_nl) = newline_len(after_delim) else {
        return whole;
    };
    let meta_start = DELIMITER.len() + open_nl;

    let mut cursor = meta_start;
    while cursor <= content.len() {
        let rest = &content[cursor..];
        let line_end = rest.find('\n').map(|i| cursor + i).unwrap_or(content.len());
        let line = content[cursor..line_end].trim_end_matches('\r');
        if line == DELIMITER {
            let body_offset = if line_end < content.len() {
                line_end + 1
            } else {
                content.len()
            };
            // Exclude the newline that precedes the closing delimiter.
            let meta_end = cursor.saturating_sub(1).max(meta_start);
            let metadata = content[meta_start..meta_end].trim_end_matches('\r');
            return SplitDocument {
                metadata: Some(metadata),
                body: &content[body_offset..],
                body_offset,
                error: None,
            };
        }
        if line_end >= content.len() {
            break;
        }
        cursor = line_end + 1;
    }

    tracing::debug!("metadata block opened on line 1 but never closed");
    SplitDocument {
        error: Some(MetadataError {
            message: "metadata block is not terminated by a closing '---' line".to_string(),
            line: Some(1),
            column: Some(1),
        }),
        ..whole
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_metadata() {
        let doc = split_document("# Title\n\nBody");
        assert_eq!(doc.metadata, None);
        assert_eq!(doc.body, "# Title\n\nBody");
        assert!(doc.error.is_none());
    }

    #[test]
    fn test_metadata_and_body() {
        let content = "---\ntitle: A\ntags: [x]\n---\n# Heading\n";
        let doc = split_document(content);
        assert_eq!(doc.metadata, Some("title: A\ntags: [x]"));
        assert_eq!(doc.body, "# Heading\n");
        assert_eq!(&content[doc.body_offset..], doc.body);
    }

    #[test]
    fn test_metadata_at_eof() {
        let doc = split_document("---\ntitle: A\n---");
        assert_eq!(doc.metadata, Some("title: A"));
        assert_eq!(doc.body, "");
    }

    #[test]
    fn test_empty_metadata() {
        let doc = split_document("---\n---\nbody");
        assert_eq!(doc.metadata, Some(""));
        assert_eq!(doc.body, "body");
    }

    #[test]
    fn test_crlf() {
        let doc = split_document("---\r\ntitle: A\r\n---\r\nbody");
        assert_eq!(doc.metadata, Some("title: A"));
        assert_eq!(doc.body, "body");
    }

    #[test]
    fn test_closing_must_be_whole_line() {
        let doc = split_document("---\ntitle: A\n----\nbody\n");
        assert!(doc.metadata.is_none());
        assert!(doc.error.is_some());
        assert_eq!(doc.body, "---\ntitle: A\n----\nbody\n");
    }

    #[test]
    fn test_unterminated() {
        let content = "---\ntitle: A\n# Body";
        let doc = split_document(content);
        assert_eq!(doc.metadata, None);
        assert_eq!(doc.body, content);
        let err = doc.error.unwrap();
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn test_horizontal_rule_not_first_line() {
        let doc = split_document("intro\n---\nmore");
        assert!(doc.metadata.is_none());
        assert!(doc.error.is_none());
    }
}
