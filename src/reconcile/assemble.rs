use super::tokenize::tokenize_rows;
use super::Solution;

/// Prefix for synthesized titles ("方案1", "方案2", ...).
///
/// Uses the same word the service puts in its link fragments so that an
/// untitled solution can still pick up document links.
pub const PLACEHOLDER_TITLE_PREFIX: &str = "方案";

/// Build solutions from split blocks, in block order.
///
/// Blocks whose table yields no line items are discarded without leaving a
/// placeholder behind.
pub fn assemble_solutions(blocks: &[String]) -> Vec<Solution> {
    let mut solutions: Vec<Solution> = Vec::with_capacity(blocks.len());

    for block in blocks {
        let (title, table) = split_title(block);
        let items = tokenize_rows(table);
        if items.is_empty() {
            tracing::debug!(title = title.unwrap_or(""), "dropping block without line items");
            continue;
        }

        let title = match title {
            Some(title) => title.to_string(),
            None => format!("{}{}", PLACEHOLDER_TITLE_PREFIX, solutions.len() + 1),
        };
        solutions.push(Solution::new(title, items));
    }

    solutions
}

/// Title is the text before the first newline or cell delimiter.
fn split_title(block: &str) -> (Option<&str>, &str) {
    match block.find(['\n', '|']) {
        Some(end) if end > 0 => {
            let title = block[..end].trim();
            let table = block[end..].trim();
            ((!title.is_empty()).then_some(title), table)
        }
        _ => (None, block),
    }
}
