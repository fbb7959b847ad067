//! Content sanitization
//!
//! Applied to every free-text field of every item before validation.
//! Stages run in a fixed order; each mutation is recorded in the audit
//! trail. The whole pass is idempotent: running it on its own output
//! performs no further mutation and records no further entries.

use crate::audit::{SanitizationAuditEntry, SanitizeCategory};
use once_cell::sync::Lazy;
use regex::Regex;
use warden_core::constants::{MAX_CONTENT_BYTES, MAX_CONTENT_LINES, TRUNCATION_MARKER};

static ANSI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b(?:\[[0-9;]*[A-Za-z]|[@-Z\\-_])").unwrap());

// A mention not already neutralized (preceded by a backtick), not part of
// an e-mail address (preceded by a word character), and not a URL path
// segment (preceded by a slash).
static MENTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(?P<pre>^|[^\x60\w@/])@(?P<name>[A-Za-z0-9][A-Za-z0-9-]*(?:/[A-Za-z0-9._-]+)?)")
        .unwrap()
});

// Issue auto-close phrases such as "fixes #123".
static CLOSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)(?P<pre>^|[^\x60\w])(?P<phrase>(?:close[sd]?|fix(?:e[sd])?|resolve[sd]?)\s+#[0-9]+)")
        .unwrap()
});

static URI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?P<scheme>[A-Za-z][A-Za-z0-9+.-]*)://(?P<rest>[^\s<>"'\x60)\]]+)"#).unwrap()
});

const REDACTED: &str = "(redacted)";

/// The sanitization engine for one payload.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    allowed_domains: Vec<String>,
    max_bytes: usize,
    max_lines: usize,
}

impl Sanitizer {
    /// Engine with the standard content budgets.
    pub fn new(allowed_domains: Vec<String>) -> Self {
        Self {
            allowed_domains: allowed_domains
                .into_iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
            max_bytes: MAX_CONTENT_BYTES,
            max_lines: MAX_CONTENT_LINES,
        }
    }

    /// Override the budgets (tests and constrained surfaces like labels).
    pub fn with_budgets(mut self, max_bytes: usize, max_lines: usize) -> Self {
        self.max_bytes = max_bytes;
        self.max_lines = max_lines;
        self
    }

    /// Sanitize one text field, returning the clean text and the audit
    /// entries for every mutation performed.
    pub fn sanitize(&self, text: &str) -> (String, Vec<SanitizationAuditEntry>) {
        let mut entries = Vec::new();
        let text = strip_ansi(text, &mut entries);
        let text = strip_control(&text, &mut entries);
        let text = self.redact_uris(&text, &mut entries);
        let text = neutralize_mentions(&text, &mut entries);
        let text = neutralize_close_phrases(&text, &mut entries);
        let text = escape_markup(&text, &mut entries);
        let text = self.truncate(&text, &mut entries);
        (text, entries)
    }

    fn redact_uris(&self, text: &str, entries: &mut Vec<SanitizationAuditEntry>) -> String {
        replace_matches(text, &URI_RE, entries, |caps, line| {
            let scheme = &caps["scheme"];
            let whole = caps.get(0).unwrap().as_str();
            if !scheme.eq_ignore_ascii_case("https") {
                return Some((
                    REDACTED.to_string(),
                    SanitizationAuditEntry::new(
                        SanitizeCategory::UriRedacted,
                        whole,
                        REDACTED,
                        line,
                        "non-https scheme",
                    ),
                ));
            }
            let host = host_of(&caps["rest"]);
            if self.host_allowed(&host) {
                None
            } else {
                Some((
                    REDACTED.to_string(),
                    SanitizationAuditEntry::new(
                        SanitizeCategory::UriRedacted,
                        whole,
                        REDACTED,
                        line,
                        "host not on the allow-list",
                    ),
                ))
            }
        })
    }

    fn host_allowed(&self, host: &str) -> bool {
        self.allowed_domains.iter().any(|domain| {
            host == domain || host.ends_with(&format!(".{domain}"))
        })
    }

    fn truncate(&self, text: &str, entries: &mut Vec<SanitizationAuditEntry>) -> String {
        let mut text = text.to_string();

        let line_count = text.lines().count();
        if line_count > self.max_lines {
            let kept: Vec<&str> = text.lines().take(self.max_lines - 1).collect();
            let truncated = format!("{}{}", kept.join("\n"), TRUNCATION_MARKER);
            entries.push(SanitizationAuditEntry::new(
                SanitizeCategory::Truncated,
                &format!("{line_count} lines"),
                TRUNCATION_MARKER.trim_start(),
                self.max_lines,
                "line budget exceeded",
            ));
            text = truncated;
        }

        if text.len() > self.max_bytes {
            let budget = self.max_bytes.saturating_sub(TRUNCATION_MARKER.len());
            let mut cut = budget;
            while cut > 0 && !text.is_char_boundary(cut) {
                cut -= 1;
            }
            let clipped_len = text.len();
            text.truncate(cut);
            text.push_str(TRUNCATION_MARKER);
            entries.push(SanitizationAuditEntry::new(
                SanitizeCategory::Truncated,
                &format!("{clipped_len} bytes"),
                TRUNCATION_MARKER.trim_start(),
                text.lines().count(),
                "byte budget exceeded",
            ));
        }

        text
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(vec!["github.com".to_string()])
    }
}

/// 1-based line of a byte offset.
fn line_of(text: &str, offset: usize) -> usize {
    text[..offset].bytes().filter(|b| *b == b'\n').count() + 1
}

/// Host portion of the part after `scheme://`, lowercased, userinfo and
/// port stripped.
fn host_of(rest: &str) -> String {
    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    host.to_ascii_lowercase()
}

/// Apply a regex over the text, letting the callback decide replacement
/// and audit per match. Line numbers refer to the input text.
fn replace_matches<F>(
    text: &str,
    re: &Regex,
    entries: &mut Vec<SanitizationAuditEntry>,
    mut decide: F,
) -> String
where
    F: FnMut(&regex::Captures<'_>, usize) -> Option<(String, SanitizationAuditEntry)>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut changed = false;
    for caps in re.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        if let Some((replacement, entry)) = decide(&caps, line_of(text, whole.start())) {
            out.push_str(&text[last..whole.start()]);
            out.push_str(&replacement);
            last = whole.end();
            entries.push(entry);
            changed = true;
        }
    }
    if !changed {
        return text.to_string();
    }
    out.push_str(&text[last..]);
    out
}

fn strip_ansi(text: &str, entries: &mut Vec<SanitizationAuditEntry>) -> String {
    replace_matches(text, &ANSI_RE, entries, |caps, line| {
        Some((
            String::new(),
            SanitizationAuditEntry::new(
                SanitizeCategory::AnsiEscapes,
                caps.get(0).unwrap().as_str(),
                "",
                line,
                "terminal escape sequence",
            ),
        ))
    })
}

fn strip_control(text: &str, entries: &mut Vec<SanitizationAuditEntry>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut removed_per_line: Vec<(usize, usize)> = Vec::new();
    let mut line = 1;
    for ch in text.chars() {
        if ch == '\n' {
            line += 1;
            out.push(ch);
        } else if ch.is_control() && ch != '\t' {
            match removed_per_line.last_mut() {
                Some((l, count)) if *l == line => *count += 1,
                _ => removed_per_line.push((line, 1)),
            }
        } else {
            out.push(ch);
        }
    }
    for (line, count) in removed_per_line {
        entries.push(SanitizationAuditEntry::new(
            SanitizeCategory::ControlChars,
            &format!("{count} control character(s)"),
            "",
            line,
            "non-printable control characters",
        ));
    }
    out
}

fn neutralize_mentions(text: &str, entries: &mut Vec<SanitizationAuditEntry>) -> String {
    replace_matches(text, &MENTION_RE, entries, |caps, line| {
        let pre = &caps["pre"];
        let name = &caps["name"];
        let mention = format!("@{name}");
        Some((
            format!("{pre}`{mention}`"),
            SanitizationAuditEntry::new(
                SanitizeCategory::MentionNeutralized,
                &mention,
                &format!("`{mention}`"),
                line,
                "mention rendered inert",
            ),
        ))
    })
}

fn neutralize_close_phrases(text: &str, entries: &mut Vec<SanitizationAuditEntry>) -> String {
    replace_matches(text, &CLOSE_RE, entries, |caps, line| {
        let pre = &caps["pre"];
        let phrase = &caps["phrase"];
        Some((
            format!("{pre}`{phrase}`"),
            SanitizationAuditEntry::new(
                SanitizeCategory::ClosePhraseNeutralized,
                phrase,
                &format!("`{phrase}`"),
                line,
                "auto-close phrase rendered inert",
            ),
        ))
    })
}

fn escape_markup(text: &str, entries: &mut Vec<SanitizationAuditEntry>) -> String {
    if !text.contains('<') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut escaped_per_line: Vec<(usize, usize)> = Vec::new();
    let mut line = 1;
    for ch in text.chars() {
        match ch {
            '\n' => {
                line += 1;
                out.push(ch);
            }
            '<' => {
                out.push_str("&lt;");
                match escaped_per_line.last_mut() {
                    Some((l, count)) if *l == line => *count += 1,
                    _ => escaped_per_line.push((line, 1)),
                }
            }
            _ => out.push(ch),
        }
    }
    for (line, count) in escaped_per_line {
        entries.push(SanitizationAuditEntry::new(
            SanitizeCategory::MarkupEscaped,
            &format!("{count} '<' character(s)"),
            "&lt;",
            line,
            "markup metacharacter escaped",
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer() -> Sanitizer {
        Sanitizer::new(vec!["github.com".to_string(), "example.com".to_string()])
    }

    #[test]
    fn test_scenario_close_mention_and_markup() {
        let (out, entries) = sanitizer().sanitize("fixes #123 cc @octocat <script>");
        assert!(out.contains("`fixes #123`"));
        assert!(out.contains("`@octocat`"));
        assert!(out.contains("&lt;script>"));
        let categories: Vec<_> = entries.iter().map(|e| e.category).collect();
        assert!(categories.contains(&SanitizeCategory::ClosePhraseNeutralized));
        assert!(categories.contains(&SanitizeCategory::MentionNeutralized));
        assert!(categories.contains(&SanitizeCategory::MarkupEscaped));
    }

    #[test]
    fn test_idempotence() {
        let dirty = "fixes #1 @org/team see http://evil.test and https://sub.example.com/x \u{1b}[31mred\u{0007}";
        let (once, first_entries) = sanitizer().sanitize(dirty);
        assert!(!first_entries.is_empty());
        let (twice, second_entries) = sanitizer().sanitize(&once);
        assert_eq!(once, twice);
        assert!(second_entries.is_empty(), "second pass: {second_entries:?}");
    }

    #[test]
    fn test_non_https_scheme_redacted() {
        let (out, entries) = sanitizer().sanitize("download ftp://files.example.com/x");
        assert!(out.contains(REDACTED));
        assert!(!out.contains("ftp://"));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, "non-https scheme");
    }

    #[test]
    fn test_allowed_domain_suffix_match() {
        let (out, entries) = sanitizer().sanitize("see https://docs.example.com/guide");
        assert!(out.contains("https://docs.example.com/guide"));
        assert!(entries.is_empty());
    }

    #[test]
    fn test_disallowed_host_redacted() {
        let (out, _) = sanitizer().sanitize("see https://attacker.test/payload");
        assert!(!out.contains("attacker.test"));
        assert!(out.contains(REDACTED));
    }

    #[test]
    fn test_lookalike_suffix_not_allowed() {
        // notexample.com must not match the example.com allow entry.
        let (out, _) = sanitizer().sanitize("https://notexample.com/x");
        assert!(out.contains(REDACTED));
    }

    #[test]
    fn test_email_is_not_a_mention() {
        let (out, entries) = sanitizer().sanitize("contact build@example.com");
        assert_eq!(out, "contact build@example.com");
        assert!(entries.is_empty());
    }

    #[test]
    fn test_mention_in_url_path_untouched() {
        let (out, entries) = sanitizer().sanitize("profile https://github.com/@octocat");
        assert_eq!(out, "profile https://github.com/@octocat");
        assert!(entries.is_empty());
    }

    #[test]
    fn test_control_chars_stripped_keeping_newline_and_tab() {
        let (out, entries) = sanitizer().sanitize("a\u{0007}b\tc\nd\r");
        assert_eq!(out, "ab\tc\nd");
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_byte_truncation_is_idempotent() {
        let sanitizer = sanitizer().with_budgets(64, 1000);
        let long = "long ".repeat(100);
        let (once, entries) = sanitizer.sanitize(&long);
        assert!(once.len() <= 64);
        assert!(once.ends_with("[truncated]"));
        assert_eq!(entries.len(), 1);
        let (twice, second) = sanitizer.sanitize(&once);
        assert_eq!(once, twice);
        assert!(second.is_empty());
    }

    #[test]
    fn test_line_truncation() {
        let sanitizer = sanitizer().with_budgets(MAX_CONTENT_BYTES, 5);
        let many = (0..20).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let (out, entries) = sanitizer.sanitize(&many);
        assert_eq!(out.lines().count(), 5);
        assert!(out.ends_with("[truncated]"));
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_audit_line_numbers() {
        let (_, entries) = sanitizer().sanitize("clean line\ncc @octocat");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].line, 2);
    }
}
