use super::Solution;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

/// Artifact links the service emits for a solution.
///
/// A missing field means that artifact has not been generated yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DocumentLinks {
    #[serde(default)]
    pub word: Option<String>,
    #[serde(default)]
    pub excel: Option<String>,
}

/// `<title phrase containing 方案> {..."word": "..."...}` on a single line.
///
/// The phrase starts after the last whitespace or punctuation separator, so
/// "文档：推荐方案 1" captures "推荐方案 1".
fn link_fragment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"([^\s{}|:：,，、]*方案\s*[^\s{}|]+)\s*(\{[^\n]*?"(?:word|excel)"\s*:\s*"[^"\n]*"[^\n]*?\})"#,
        )
        .expect("valid link fragment regex")
    })
}

/// Scan `raw_text` for link fragments and copy their links onto the solution
/// with the matching title. Returns how many fragments were attached.
///
/// Only sets links, never clears them, so running it again over the same
/// text changes nothing. Fragments with broken JSON or an unknown title are
/// skipped.
pub fn attach_document_links(solutions: &mut [Solution], raw_text: &str) -> usize {
    let mut attached = 0;

    for caps in link_fragment_re().captures_iter(raw_text) {
        let phrase = caps[1].trim();
        let links: DocumentLinks = match serde_json::from_str(&caps[2]) {
            Ok(links) => links,
            Err(err) => {
                tracing::debug!(phrase, error = %err, "skipping malformed link fragment");
                continue;
            }
        };

        let Some(target) = find_by_title(solutions, phrase) else {
            tracing::debug!(phrase, "link fragment does not match any solution");
            continue;
        };

        if let Some(word) = links.word.filter(|link| !link.trim().is_empty()) {
            target.document_link = Some(word);
        }
        if let Some(excel) = links.excel.filter(|link| !link.trim().is_empty()) {
            target.spreadsheet_link = Some(excel);
        }
        attached += 1;
    }

    attached
}

fn find_by_title<'a>(solutions: &'a mut [Solution], phrase: &str) -> Option<&'a mut Solution> {
    solutions
        .iter_mut()
        .find(|solution| solution.title.trim() == phrase)
}
