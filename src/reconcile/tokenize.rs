use super::EquipmentLineItem;

/// Column labels the service uses for its table header row
pub const HEADER_LABELS: [&str; 8] = [
    "类型", "产品名称", "型号", "数量", "category", "name", "model", "quantity",
];

const DELIMITER: char = '|';

/// Turn a pipe-delimited pseudo-table into line items, in row order.
///
/// Columns are positional: category, name, model, quantity. Rows with fewer
/// than four non-empty cells are skipped, and header rows are skipped even
/// when the service repeats them mid-table.
pub fn tokenize_rows(table: &str) -> Vec<EquipmentLineItem> {
    table
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_separator_line(line))
        .filter_map(parse_row)
        .collect()
}

fn parse_row(line: &str) -> Option<EquipmentLineItem> {
    let cells: Vec<&str> = line
        .split(DELIMITER)
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .collect();

    let [category, name, model, quantity, ..] = cells.as_slice() else {
        return None;
    };

    if is_header_label(category) {
        return None;
    }

    Some(EquipmentLineItem::new(
        category.to_string(),
        name.to_string(),
        model.to_string(),
        parse_quantity(quantity),
    ))
}

/// Divider rows such as `|:-:|---|` carry no data
fn is_separator_line(line: &str) -> bool {
    line.contains('-')
        && line
            .chars()
            .all(|c| matches!(c, '-' | ':' | '|' | ' ' | '\t'))
}

fn is_header_label(cell: &str) -> bool {
    HEADER_LABELS
        .iter()
        .any(|label| label.eq_ignore_ascii_case(cell))
}

/// Leading digits of the cell ("4台" -> 4). Anything unusable becomes 1.
fn parse_quantity(text: &str) -> u32 {
    let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
    match digits.parse::<u32>() {
        Ok(n) if n > 0 => n,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_row_maps_columns_positionally() {
        let items = tokenize_rows("音箱|同轴吸顶扬声器|SX60|4");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].category, "音箱");
        assert_eq!(items[0].name, "同轴吸顶扬声器");
        assert_eq!(items[0].model, "SX60");
        assert_eq!(items[0].quantity, 4);
    }

    #[test]
    fn test_header_and_separator_rows_are_skipped() {
        let table = "| 类型 | 产品名称 | 型号 | 数量 |\n|:-:|:-:|:-:|:-:|\n| 功放 | 数字功放 | SD300 | 2 |";
        let items = tokenize_rows(table);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].model, "SD300");
    }

    #[test]
    fn test_bad_quantity_defaults_to_one() {
        let items = tokenize_rows("|音箱|线阵列|LA12|若干|\n|功放|数字功放|SD300|0|");
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item.quantity == 1));
    }

    #[test]
    fn test_quantity_with_unit_suffix() {
        assert_eq!(parse_quantity("6台"), 6);
        assert_eq!(parse_quantity("-2"), 1);
        assert_eq!(parse_quantity(""), 1);
    }

    #[test]
    fn test_short_rows_and_prose_are_ignored() {
        let table = "以下为设备清单\n|音箱|SX60|4|\n\n|中控|中控主机|CP4-R|1|备注|";
        let items = tokenize_rows(table);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].category, "中控");
    }

    #[test]
    fn test_ids_are_unique_within_a_run() {
        let items = tokenize_rows("|音箱|A|X1|1|\n|音箱|A|X1|1|");
        assert_eq!(items.len(), 2);
        assert_ne!(items[0].id, items[1].id);
    }

    #[test]
    fn test_dash_inside_cells_is_not_a_separator() {
        assert!(!is_separator_line("|音箱|A-1|X-2|2|"));
        assert!(is_separator_line("| --- | :-: |"));
    }
}
