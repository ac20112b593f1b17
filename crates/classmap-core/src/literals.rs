//! String literal scanning for script-like text.
//!
//! A small lexer that understands quotes, escapes and comments well enough to
//! find the string literals in JavaScript-family code. It does not try to
//! recognise regex literals; a stray quote inside one just yields a short
//! garbage literal that never matches a class token set.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

/// A quoted string literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringLiteral {
    pub quote: char,
    /// Content range, excluding the quotes.
    pub range: Range<usize>,
}

impl StringLiteral {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.range.clone()]
    }

    /// Range including the opening and closing quote.
    pub fn outer(&self) -> Range<usize> {
        self.range.start - 1..self.range.end + 1
    }
}

/// Find every string literal in `source[region]`.
///
/// Single- and double-quoted literals may not span lines; an unterminated one
/// is dropped. Template literals may span lines.
pub fn scan(source: &str, region: Range<usize>) -> Vec<StringLiteral> {
    let bytes = source.as_bytes();
    let end = region.end.min(bytes.len());
    let mut i = region.start;
    let mut out = Vec::new();

    while i < end {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') && i + 1 < end => {
                i = bytes[i..end]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map(|p| i + p)
                    .unwrap_or(end);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') && i + 1 < end => {
                i = source[i + 2..end]
                    .find("*/")
                    .map(|p| i + 2 + p + 2)
                    .unwrap_or(end);
            }
            quote @ (b'"' | b'\'' | b'`') => {
                let start = i + 1;
                let mut j = start;
                let mut closed = None;
                while j < end {
                    match bytes[j] {
                        b'\\' => j += 2,
                        b'\n' if quote != b'`' => break,
                        b if b == quote => {
                            closed = Some(j);
                            break;
                        }
                        _ => j += 1,
                    }
                }
                match closed {
                    Some(close) => {
                        out.push(StringLiteral {
                            quote: quote as char,
                            range: start..close,
                        });
                        i = close + 1;
                    }
                    None => i = j.min(end).max(start),
                }
            }
            _ => i += 1,
        }
    }

    out
}

/// Byte ranges of the contents of every `<script>` block in some markup.
pub fn script_blocks(source: &str) -> Vec<Range<usize>> {
    static RE_SCRIPT_OPEN: OnceLock<Regex> = OnceLock::new();
    let re = RE_SCRIPT_OPEN
        .get_or_init(|| Regex::new(r"(?i)<script\b[^>]*>").expect("script pattern is valid"));

    let mut blocks = Vec::new();
    let mut pos = 0;
    while let Some(open) = re.find_at(source, pos) {
        let Some(close) = crate::annotate::find_closing_tag(source, open.end(), "script") else {
            break;
        };
        blocks.push(open.end()..close);
        pos = close;
    }
    blocks
}

/// Name of the variable a literal is assigned to, for `x = "..."` forms.
///
/// Only plain assignment on the same line counts; comparisons, arrows and
/// compound assignments such as `+=` do not.
pub fn assigned_name<'a>(source: &'a str, literal: &StringLiteral) -> Option<&'a str> {
    static RE_ASSIGN: OnceLock<Regex> = OnceLock::new();
    let re = RE_ASSIGN.get_or_init(|| {
        Regex::new(r"([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*|\])\s*=\s*$")
            .expect("assignment pattern is valid")
    });
    let prefix = line_prefix(source, literal.outer().start);
    let caps = re.captures(prefix)?;
    let name = caps.get(1)?;
    Some(name.as_str())
}

/// Whether the literal sits where class names are usually assigned.
///
/// Matches `className = `, `class: `, `classList.add(`, `setAttribute('class', `
/// and a few common variable names directly before the literal.
pub fn in_class_context(source: &str, literal: &StringLiteral) -> bool {
    static RE_CLASS_CONTEXT: OnceLock<Regex> = OnceLock::new();
    let re = RE_CLASS_CONTEXT.get_or_init(|| {
        Regex::new(
            r#"(?i)(?:\bclass(?:name)?\s*[:=]\s*\{?\s*|classlist\.(?:add|toggle|replace)\s*\(\s*(?:[^,()]*,\s*)?|setattribute\s*\(\s*['"]class['"]\s*,\s*|\b(?:cls|classes|classnames?|clsx|cn)\s*(?:[:=(]\s*)|\+\s*)$"#,
        )
        .expect("class context pattern is valid")
    });
    let prefix = line_prefix(source, literal.outer().start);
    re.is_match(prefix.trim_end_matches(|c: char| c == '[' || c.is_whitespace()))
        || re.is_match(prefix)
}

/// Text from the start of the line (at most 120 bytes back) up to `at`.
fn line_prefix(source: &str, at: usize) -> &str {
    let line_start = source[..at].rfind('\n').map(|p| p + 1).unwrap_or(0);
    let mut start = line_start.max(at.saturating_sub(120));
    while !source.is_char_boundary(start) {
        start += 1;
    }
    &source[start..at]
}

/// Quote `value` for insertion between `quote` characters.
pub fn escape_for_quote(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == quote {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(source: &str) -> Vec<&str> {
        scan(source, 0..source.len())
            .iter()
            .map(|l| l.text(source))
            .collect()
    }

    #[test]
    fn test_all_quote_kinds() {
        assert_eq!(
            texts(r#"a("x y"); b('z'); c(`t ${v}`);"#),
            vec!["x y", "z", "t ${v}"]
        );
    }

    #[test]
    fn test_escapes_and_comments() {
        let source = "const a = \"say \\\"hi\\\"\"; // it's 'not' a string\n/* 'nor' this */ b = 'ok';";
        assert_eq!(texts(source), vec!["say \\\"hi\\\"", "ok"]);
    }

    #[test]
    fn test_unterminated_line_literal_dropped() {
        assert_eq!(texts("x = 'oops\ny = \"fine\""), vec!["fine"]);
    }

    #[test]
    fn test_script_blocks() {
        let source = "<p>'no'</p><script type=\"module\">a = 'yes';</script><SCRIPT>b = \"too\"</SCRIPT>";
        let blocks = script_blocks(source);
        assert_eq!(blocks.len(), 2);
        assert_eq!(&source[blocks[0].clone()], "a = 'yes';");
        assert_eq!(&source[blocks[1].clone()], "b = \"too\"");
    }

    #[test]
    fn test_assigned_name() {
        let source = "const base = \"btn large\";\nif (x == \"btn\") {}\ncls += \" big\";\nthis.klass = 'a';";
        let lits = scan(source, 0..source.len());
        let names: Vec<_> = lits.iter().map(|l| assigned_name(source, l)).collect();
        assert_eq!(names, vec![Some("base"), None, None, Some("this.klass")]);
    }

    #[test]
    fn test_class_context() {
        let source = "el.className = \"a b\";\nconst label = \"a b\";\nel.classList.add('a');\nel.setAttribute(\"class\", 'a b');";
        let lits = scan(source, 0..source.len());
        let flags: Vec<_> = lits
            .iter()
            .filter(|l| l.text(source).starts_with('a'))
            .map(|l| in_class_context(source, l))
            .collect();
        assert_eq!(flags, vec![true, false, true, true]);
    }

    #[test]
    fn test_escape_for_quote() {
        assert_eq!(escape_for_quote(r#"a "b""#, '"'), r#"a \"b\""#);
        assert_eq!(escape_for_quote("it's", '"'), "it's");
    }
}
