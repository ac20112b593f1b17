//! The resolver's heuristic passes.
//!
//! Each pass is a pure function over the loaded files. It plans whole-file
//! rewrites and never touches storage itself.

use std::ops::Range;
use std::path::PathBuf;

use crate::annotate::Annotator;
use crate::config::ProximityConfig;
use crate::literals::{self, StringLiteral};
use crate::tokens::{TokenSet, remove_tokens};
use crate::types::{CandidateMatch, DynamicHint, MatchQuality, PassKind};
use crate::workspace::FileKind;

/// One candidate file as loaded for a resolution.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub kind: FileKind,
    pub text: String,
}

/// A planned whole-file rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEdit {
    pub path: PathBuf,
    pub text: String,
    pub matches: Vec<CandidateMatch>,
}

/// What every pass searches for.
pub(crate) struct Query<'a> {
    pub before: &'a str,
    pub after: &'a str,
    pub before_tokens: TokenSet,
    pub after_tokens: TokenSet,
    pub hint: &'a DynamicHint,
    pub annotator: &'a Annotator,
    pub proximity: &'a ProximityConfig,
}

impl<'a> Query<'a> {
    pub fn new(
        before: &'a str,
        after: &'a str,
        hint: &'a DynamicHint,
        annotator: &'a Annotator,
        proximity: &'a ProximityConfig,
    ) -> Self {
        Self {
            before,
            after,
            before_tokens: TokenSet::parse(before),
            after_tokens: TokenSet::parse(after),
            hint,
            annotator,
            proximity,
        }
    }
}

pub(crate) type Pass = fn(&Query<'_>, &[&SourceFile]) -> Vec<FileEdit>;

/// Passes tried after the exact pass, in order.
pub(crate) const TOLERANT_PASSES: &[(PassKind, Pass)] = &[
    (PassKind::TolerantMarkup, tolerant_markup),
    (PassKind::TolerantLiteral, tolerant_literal),
    (PassKind::BaseConstant, base_constant),
    (PassKind::Proximity, proximity),
];

struct Rewrite {
    range: Range<usize>,
    replacement: String,
    quality: MatchQuality,
}

fn plan(file: &SourceFile, mut rewrites: Vec<Rewrite>) -> Option<FileEdit> {
    rewrites.sort_by_key(|r| (r.range.start, r.range.end));
    let mut text = String::with_capacity(file.text.len());
    let mut matches = Vec::with_capacity(rewrites.len());
    let mut last = 0;
    for rewrite in rewrites {
        if rewrite.range.start < last {
            continue;
        }
        text.push_str(&file.text[last..rewrite.range.start]);
        text.push_str(&rewrite.replacement);
        last = rewrite.range.end;
        matches.push(CandidateMatch {
            file: file.path.clone(),
            range: rewrite.range,
            quality: rewrite.quality,
        });
    }
    text.push_str(&file.text[last..]);

    (!matches.is_empty() && text != file.text).then(|| FileEdit {
        path: file.path.clone(),
        text,
        matches,
    })
}

/// String literals in the script-like regions of a file.
fn script_literals(file: &SourceFile) -> Vec<StringLiteral> {
    match file.kind {
        FileKind::Script => literals::scan(&file.text, 0..file.text.len()),
        FileKind::Markup | FileKind::Component => literals::script_blocks(&file.text)
            .into_iter()
            .flat_map(|block| literals::scan(&file.text, block))
            .collect(),
    }
}

/// Script string literals spelling `before` verbatim.
pub(crate) fn exact_literal(query: &Query<'_>, files: &[&SourceFile]) -> Vec<FileEdit> {
    let quality = MatchQuality::new(PassKind::ExactLiteral, 0);
    files
        .iter()
        .filter_map(|file| {
            let rewrites = script_literals(file)
                .into_iter()
                .filter(|lit| lit.text(&file.text) == query.before)
                .map(|lit| Rewrite {
                    replacement: literals::escape_for_quote(query.after, lit.quote),
                    range: lit.range,
                    quality,
                })
                .collect();
            plan(file, rewrites)
        })
        .collect()
}

/// Class attributes whose token set equals `before`'s.
fn tolerant_markup(query: &Query<'_>, files: &[&SourceFile]) -> Vec<FileEdit> {
    let quality = MatchQuality::new(PassKind::TolerantMarkup, 0);
    files
        .iter()
        .filter(|file| file.kind.is_markup_like())
        .filter_map(|file| {
            let rewrites = query
                .annotator
                .class_spans(&file.text)
                .into_iter()
                .filter(|span| TokenSet::parse(&file.text[span.range.clone()]) == query.before_tokens)
                .map(|span| Rewrite {
                    range: span.range,
                    replacement: query.after.to_string(),
                    quality,
                })
                .collect();
            plan(file, rewrites)
        })
        .collect()
}

/// Script string literals whose token set equals `before`'s.
fn tolerant_literal(query: &Query<'_>, files: &[&SourceFile]) -> Vec<FileEdit> {
    let quality = MatchQuality::new(PassKind::TolerantLiteral, 0);
    files
        .iter()
        .filter_map(|file| {
            let rewrites = script_literals(file)
                .into_iter()
                .filter(|lit| TokenSet::parse(lit.text(&file.text)) == query.before_tokens)
                .map(|lit| Rewrite {
                    replacement: literals::escape_for_quote(query.after, lit.quote),
                    range: lit.range,
                    quality,
                })
                .collect();
            plan(file, rewrites)
        })
        .collect()
}

/// A lone base-class assignment that holds every removed token.
///
/// Only runs for pure removals. More than one qualifying assignment is
/// treated as no match.
fn base_constant(query: &Query<'_>, files: &[&SourceFile]) -> Vec<FileEdit> {
    if !query.after_tokens.is_strict_subset_of(&query.before_tokens) {
        return Vec::new();
    }
    let removed = query.before_tokens.difference(&query.after_tokens);

    let mut qualifying = Vec::new();
    for (index, file) in files.iter().enumerate() {
        for lit in script_literals(file) {
            if literals::assigned_name(&file.text, &lit).is_none() {
                continue;
            }
            let tokens = TokenSet::parse(lit.text(&file.text));
            if !tokens.is_empty()
                && tokens.is_subset(&query.before_tokens)
                && tokens.is_superset(&removed)
            {
                qualifying.push((index, lit));
            }
        }
    }

    match qualifying.as_slice() {
        [(index, lit)] => {
            let file = files[*index];
            let rewrite = Rewrite {
                replacement: remove_tokens(lit.text(&file.text), &removed),
                range: lit.range.clone(),
                quality: MatchQuality::new(PassKind::BaseConstant, 0),
            };
            plan(file, vec![rewrite]).into_iter().collect()
        }
        [] => Vec::new(),
        many => {
            tracing::debug!(
                target: "classmap::resolve",
                candidates = many.len(),
                "several base assignments qualify, skipping"
            );
            Vec::new()
        }
    }
}

struct Nearby {
    file: usize,
    range: Range<usize>,
    quote: Option<char>,
    class_context: bool,
    distance: usize,
}

impl Nearby {
    fn score(&self) -> i64 {
        let context = if self.class_context { 1_000_000 } else { 0 };
        context - self.distance as i64
    }
}

/// The literal nearest the element's rendered text, preferring class contexts.
fn proximity(query: &Query<'_>, files: &[&SourceFile]) -> Vec<FileEdit> {
    let Some(anchor) = query.hint.anchor(query.proximity.min_anchor_len) else {
        return Vec::new();
    };
    let window = query.proximity.window;

    let mut best: Option<Nearby> = None;
    for (index, file) in files.iter().enumerate() {
        let text = file.text.as_str();
        let anchors: Vec<usize> = text.match_indices(anchor).map(|(at, _)| at).collect();
        if anchors.is_empty() {
            continue;
        }

        let mut candidates: Vec<(Range<usize>, Option<char>, bool)> = Vec::new();
        if file.kind.is_markup_like() {
            candidates.extend(
                query
                    .annotator
                    .class_spans(text)
                    .into_iter()
                    .map(|span| (span.range, None, true)),
            );
        }
        candidates.extend(script_literals(file).into_iter().map(|lit| {
            let context = literals::in_class_context(text, &lit);
            (lit.range, Some(lit.quote), context)
        }));

        for (range, quote, class_context) in candidates {
            if !TokenSet::parse(&text[range.clone()]).is_superset(&query.before_tokens) {
                continue;
            }
            let Some(distance) = anchors
                .iter()
                .filter_map(|&at| char_distance(text, at, range.start, anchor.len(), window))
                .min()
            else {
                continue;
            };

            let candidate = Nearby {
                file: index,
                range,
                quote,
                class_context,
                distance,
            };
            if best.as_ref().is_none_or(|b| candidate.score() > b.score()) {
                best = Some(candidate);
            }
        }
    }

    let Some(best) = best else {
        return Vec::new();
    };
    let file = files[best.file];
    tracing::debug!(
        target: "classmap::resolve",
        file = %file.path.display(),
        distance = best.distance,
        class_context = best.class_context,
        "proximity candidate chosen"
    );
    let replacement = match best.quote {
        Some(quote) => literals::escape_for_quote(query.after, quote),
        None => query.after.to_string(),
    };
    let rewrite = Rewrite {
        quality: MatchQuality::new(PassKind::Proximity, best.score()),
        range: best.range,
        replacement,
    };
    plan(file, vec![rewrite]).into_iter().collect()
}

/// Character distance from an anchor occurrence to `at`, if within `window`.
fn char_distance(
    text: &str,
    anchor: usize,
    at: usize,
    anchor_len: usize,
    window: usize,
) -> Option<usize> {
    let distance = if at < anchor {
        text[at..anchor].chars().count()
    } else if at >= anchor + anchor_len {
        text[anchor + anchor_len..at].chars().count()
    } else {
        0
    };
    (distance <= window).then_some(distance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn file(path: &str, text: &str) -> SourceFile {
        SourceFile {
            path: PathBuf::from(path),
            kind: FileKind::of(Path::new(path)).unwrap(),
            text: text.to_string(),
        }
    }

    fn run(pass: Pass, before: &str, after: &str, hint: DynamicHint, files: &[SourceFile]) -> Vec<FileEdit> {
        let annotator = Annotator::default();
        let proximity = ProximityConfig::default();
        let query = Query::new(before, after, &hint, &annotator, &proximity);
        let refs: Vec<&SourceFile> = files.iter().collect();
        pass(&query, &refs)
    }

    #[test]
    fn test_exact_literal_all_quote_forms() {
        let files = [file(
            "a.js",
            "x = \"flex p-4\"; y = 'flex p-4'; z = `flex p-4`; w = \"p-4 flex\";",
        )];
        let edits = run(exact_literal, "flex p-4", "it's", DynamicHint::default(), &files);
        assert_eq!(edits.len(), 1);
        assert_eq!(
            edits[0].text,
            "x = \"it's\"; y = 'it\\'s'; z = `it's`; w = \"p-4 flex\";"
        );
        assert_eq!(edits[0].matches.len(), 3);
    }

    #[test]
    fn test_exact_literal_ignores_markup_text() {
        let source = r#"<div id="card"></div><p>Say "card" twice</p><!-- "card" --><script>el.className = "card"; // "card"
</script>"#;
        let files = [file("index.html", source)];
        let edits = run(exact_literal, "card", "card shadow", DynamicHint::default(), &files);
        assert_eq!(
            edits[0].text,
            r#"<div id="card"></div><p>Say "card" twice</p><!-- "card" --><script>el.className = "card shadow"; // "card"
</script>"#
        );
        assert_eq!(edits[0].matches.len(), 1);
    }

    #[test]
    fn test_exact_literal_is_order_sensitive() {
        let files = [file("a.js", "x = 'p-4 flex';")];
        assert!(run(exact_literal, "flex p-4", "flex", DynamicHint::default(), &files).is_empty());
    }

    #[test]
    fn test_tolerant_markup_matches_token_sets() {
        let files = [file(
            "index.html",
            r#"<div class="p-4  flex flex"></div><div class="flex"></div>"#,
        )];
        let edits = run(tolerant_markup, "flex p-4", "flex p-2", DynamicHint::default(), &files);
        assert_eq!(
            edits[0].text,
            r#"<div class="flex p-2"></div><div class="flex"></div>"#
        );
    }

    #[test]
    fn test_tolerant_literal_reads_script_blocks() {
        let files = [
            file("page.html", "<div class=\"x\"></div><script>el.className = 'p-4 flex';</script>"),
            file("app.ts", "const c: string = \"flex  p-4\";"),
        ];
        let edits = run(tolerant_literal, "flex p-4", "grid", DynamicHint::default(), &files);
        assert_eq!(edits.len(), 2);
        assert_eq!(
            edits[0].text,
            "<div class=\"x\"></div><script>el.className = 'grid';</script>"
        );
        assert_eq!(edits[1].text, "const c: string = \"grid\";");
    }

    #[test]
    fn test_base_constant_single_assignment() {
        let files = [file(
            "app.js",
            "const base = \"btn large\";\nel.className = base + \" btn-primary\";",
        )];
        let edits = run(
            base_constant,
            "btn large btn-primary",
            "btn btn-primary",
            DynamicHint::default(),
            &files,
        );
        assert_eq!(
            edits[0].text,
            "const base = \"btn\";\nel.className = base + \" btn-primary\";"
        );
    }

    #[test]
    fn test_base_constant_requires_pure_removal() {
        let files = [file("app.js", "const base = \"btn large\";")];
        let hint = DynamicHint::default();
        assert!(run(base_constant, "btn large", "btn small", hint, &files).is_empty());
    }

    #[test]
    fn test_base_constant_skips_when_ambiguous() {
        let files = [
            file("a.js", "const base = \"btn large\";"),
            file("b.js", "let size = 'large';"),
        ];
        let hint = DynamicHint::default();
        assert!(run(base_constant, "btn large primary", "btn primary", hint, &files).is_empty());
    }

    #[test]
    fn test_proximity_prefers_class_context() {
        let text = "const title = 'card shadow';\nfunction render() {\n  el.className = 'card shadow rounded';\n  el.textContent = 'Welcome back';\n}";
        let files = [file("app.js", text)];
        let hint = DynamicHint {
            nearby_text: Some("  Welcome back ".into()),
            ..Default::default()
        };
        let edits = run(proximity, "card shadow", "card", hint, &files);
        assert_eq!(edits.len(), 1);
        assert!(edits[0].text.contains("el.className = 'card';"));
        assert!(edits[0].text.contains("const title = 'card shadow';"));
        assert_eq!(edits[0].matches[0].quality.pass, PassKind::Proximity);
    }

    #[test]
    fn test_proximity_needs_anchor() {
        let files = [file("app.js", "el.className = 'card';")];
        let hint = DynamicHint {
            nearby_text: Some("ok".into()),
            ..Default::default()
        };
        assert!(run(proximity, "card", "box", hint, &files).is_empty());
    }

    #[test]
    fn test_proximity_respects_window() {
        let text = format!("el.className = 'card';{}Far away text", " ".repeat(900));
        let files = [file("app.js", &text)];
        let hint = DynamicHint {
            nearby_text: Some("Far away text".into()),
            ..Default::default()
        };
        assert!(run(proximity, "card", "box", hint, &files).is_empty());
    }
}
