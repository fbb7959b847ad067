//! Front matter extraction
//!
//! A workflow document is Markdown with a leading `---` delimited YAML
//! block. The extractor splits the two and records where the YAML starts
//! so parse errors can be reported against document line numbers.

use crate::error::{ConfigError, Result};

/// The split form of a workflow document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frontmatter {
    /// Raw YAML text between the delimiters.
    pub yaml: String,
    /// 1-based document line of the first YAML line. Adding a YAML-relative
    /// line to this minus one yields the document line.
    pub yaml_start_line: usize,
    /// Everything after the closing delimiter, passed through unmodified
    /// to the execution engine.
    pub body: String,
}

impl Frontmatter {
    /// Map a 1-based line within the YAML block to a document line.
    pub fn document_line(&self, yaml_line: usize) -> usize {
        self.yaml_start_line + yaml_line - 1
    }
}

/// Split a document into front matter and body.
///
/// The document must begin with a `---` line (leading blank lines are
/// tolerated) and contain a closing `---` line; anything else is a
/// [`ConfigError`].
pub fn extract(file: &str, text: &str) -> Result<Frontmatter> {
    let mut lines = text.lines().enumerate().peekable();

    // Skip leading blank lines.
    while matches!(lines.peek(), Some((_, line)) if line.trim().is_empty()) {
        lines.next();
    }

    match lines.next() {
        Some((_, line)) if line.trim_end() == "---" => {}
        _ => {
            return Err(ConfigError::MissingFrontmatter {
                file: file.to_string(),
            })
        }
    }

    let mut yaml_lines = Vec::new();
    let mut yaml_start_line = 0usize;
    let mut close_line = None;

    for (idx, line) in lines.by_ref() {
        if line.trim_end() == "---" {
            close_line = Some(idx);
            break;
        }
        if yaml_start_line == 0 {
            yaml_start_line = idx + 1;
        }
        yaml_lines.push(line);
    }

    let close_line = close_line.ok_or_else(|| ConfigError::MalformedFrontmatter {
        file: file.to_string(),
        line: 1,
        reason: "unterminated front matter (missing closing '---')".to_string(),
    })?;

    let body: String = text
        .lines()
        .skip(close_line + 1)
        .collect::<Vec<_>>()
        .join("\n");

    Ok(Frontmatter {
        yaml: yaml_lines.join("\n"),
        yaml_start_line: if yaml_start_line == 0 {
            close_line + 1
        } else {
            yaml_start_line
        },
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_basic() {
        let doc = "---\nname: demo\non:\n  issues:\n---\n\nDo the thing.\n";
        let fm = extract("wf.md", doc).unwrap();
        assert_eq!(fm.yaml, "name: demo\non:\n  issues:");
        assert_eq!(fm.yaml_start_line, 2);
        assert!(fm.body.contains("Do the thing."));
    }

    #[test]
    fn test_document_line_mapping() {
        let doc = "---\nname: demo\nengine: claude\n---\nbody\n";
        let fm = extract("wf.md", doc).unwrap();
        // YAML line 2 ("engine: claude") is document line 3.
        assert_eq!(fm.document_line(2), 3);
    }

    #[test]
    fn test_missing_frontmatter() {
        let err = extract("wf.md", "just markdown\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingFrontmatter { .. }));
    }

    #[test]
    fn test_unterminated_frontmatter() {
        let err = extract("wf.md", "---\nname: demo\n").unwrap_err();
        assert!(matches!(err, ConfigError::MalformedFrontmatter { .. }));
    }

    #[test]
    fn test_leading_blank_lines_tolerated() {
        let doc = "\n\n---\nname: demo\n---\nbody";
        let fm = extract("wf.md", doc).unwrap();
        assert_eq!(fm.yaml, "name: demo");
        assert_eq!(fm.yaml_start_line, 4);
    }
}
