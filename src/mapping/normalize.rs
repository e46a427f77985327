use crate::spreadsheet::cell::CellValue;

/// Folds a header label into its canonical alias key.
///
/// Lowercases, spells `&` as `and`, and keeps only ASCII letters and digits, so
/// punctuation, asterisks, parentheses and any run of whitespace disappear.
/// The result is idempotent: `normalize(&normalize(x)) == normalize(x)`.
///
/// # Examples
/// `"*Street Address"`, `"street_address"` and `"STREET   ADDRESS"` all map to `"streetaddress"`.
pub fn normalize(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    for character in raw.trim().chars().flat_map(char::to_lowercase) {
        match character {
            '&' => key.push_str("and"),
            'a'..='z' | '0'..='9' => key.push(character),
            _ => (),
        }
    }
    key
}

/// Normalizes the display text of a cell; empty cells give an empty key.
pub fn normalize_value(value: &CellValue) -> String {
    match value {
        CellValue::Empty => String::new(),
        CellValue::Text(text) => normalize(text),
        other => normalize(&other.to_string()),
    }
}
