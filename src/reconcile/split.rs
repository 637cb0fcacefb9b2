use regex::Regex;
use std::sync::OnceLock;

/// Phrase the service emits right before the solution tables
pub const RESULTS_START_MARKER: &str = "生成完毕，最终结果如下：";

/// Phrase that introduces the document-generation trailer
pub const RESULTS_END_MARKER: &str = "请耐心等待";

/// `<font ... size=5 ...>` opens every solution title
fn title_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<font[^>]*size\s*=\s*["']?5["']?[^>]*>"#).expect("valid title regex")
    })
}

fn title_close_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</font>").expect("valid close regex"))
}

/// Cut the results section of a raw answer into one block per solution.
///
/// Returns nothing when the start marker is missing. Text after the end
/// marker is excluded. Each block starts with its title line.
pub fn split_blocks(raw_text: &str) -> Vec<String> {
    let Some(start) = raw_text.find(RESULTS_START_MARKER) else {
        tracing::debug!("results start marker not found");
        return Vec::new();
    };

    let mut content = &raw_text[start + RESULTS_START_MARKER.len()..];
    if let Some(end) = content.find(RESULTS_END_MARKER) {
        content = &content[..end];
    }

    title_open_re()
        .split(content)
        .map(|fragment| title_close_re().replace_all(fragment, "").trim().to_string())
        .filter(|block| !block.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_start_marker_yields_nothing() {
        assert!(split_blocks("<font size=5>方案1</font>\n|a|b|c|1|").is_empty());
    }

    #[test]
    fn test_blocks_split_on_large_font_titles() {
        let raw = format!(
            "前言{}\n<font size=5>推荐方案 1</font>\n|a|b|c|1|\n<font size=\"5\" color=red>推荐方案 2</font>\n|d|e|f|2|",
            RESULTS_START_MARKER
        );
        let blocks = split_blocks(&raw);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].starts_with("推荐方案 1"));
        assert!(blocks[1].starts_with("推荐方案 2"));
        assert!(!blocks[1].contains("</font>"));
    }

    #[test]
    fn test_trailer_after_end_marker_is_excluded() {
        let raw = format!(
            "{}<font size=5>方案1</FONT>\n|a|b|c|1|\n{}\n<font size=5>方案 9</font>",
            RESULTS_START_MARKER, RESULTS_END_MARKER
        );
        let blocks = split_blocks(&raw);
        assert_eq!(blocks.len(), 1);
        assert!(!blocks[0].contains("方案 9"));
    }

    #[test]
    fn test_smaller_fonts_do_not_split() {
        let raw = format!(
            "{}<font size=5>方案1</font>\n<font size=3>注</font>\n|a|b|c|1|",
            RESULTS_START_MARKER
        );
        assert_eq!(split_blocks(&raw).len(), 1);
    }
}
