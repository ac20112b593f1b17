//! Heuristic check for whether a document is styled with Tailwind.

use std::sync::OnceLock;

use regex::Regex;

/// True when `html` loads Tailwind or uses its utility classes.
pub fn uses_tailwind(html: &str) -> bool {
    static RE_ASSET: OnceLock<Regex> = OnceLock::new();
    static RE_UTILITY: OnceLock<Regex> = OnceLock::new();

    if html.to_ascii_lowercase().contains("cdn.tailwindcss.com") {
        return true;
    }

    let asset = RE_ASSET.get_or_init(|| {
        Regex::new(r#"(?i)(?:<link|<script)[^>]+(?:href|src)\s*=\s*["'][^"']*tailwind[^"']*["']"#)
            .expect("asset pattern is valid")
    });
    if asset.is_match(html) {
        return true;
    }

    let utility = RE_UTILITY.get_or_init(|| {
        Regex::new(
            r#"(?i)class\s*=\s*["'][^"']*(?:\bflex\b|\bgrid\b|\bp[xytrbl]?-\d|\bm[xytrbl]?-\d|\btext-|\bbg-|\bw-|\bh-|\brounded|\bshadow|\bjustify-|\bitems-|\bgap-|\bspace-[xy]-|\bring-)"#,
        )
        .expect("utility pattern is valid")
    });
    utility.is_match(html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdn_and_assets() {
        assert!(uses_tailwind(
            r#"<script src="https://cdn.tailwindcss.com"></script>"#
        ));
        assert!(uses_tailwind(
            r#"<link rel="stylesheet" href="/css/tailwind.min.css">"#
        ));
    }

    #[test]
    fn test_utility_classes() {
        assert!(uses_tailwind(r#"<div class="mx-auto px-4 text-lg">"#));
        assert!(uses_tailwind(r#"<span class='inline-flex items-center'>"#));
        assert!(uses_tailwind(r#"<div class="flex">"#));
    }

    #[test]
    fn test_plain_html() {
        assert!(!uses_tailwind(
            r#"<link rel="stylesheet" href="site.css"><div class="header nav">x</div>"#
        ));
        assert!(!uses_tailwind("<p>text-only bg- mention outside class</p>"));
    }
}
