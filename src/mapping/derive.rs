//! Value-level derivations applied while mapping source records.
use crate::mapping::table::SourceTable;
use crate::spreadsheet::cell::CellValue;
use regex::Regex;
use std::sync::LazyLock;

static ADDRESS_NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{1,6})\b").expect("Hardcode regex pattern"));

static ZIP_RUN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{5})(?:-?(\d{4}))?").expect("Hardcode regex pattern"));

static PERCENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*%?\s*$").expect("Hardcode regex pattern"));

static COMBINED_LOCATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^,]+,\s*[A-Za-z]{2},\s*\d{5}(?:-\d{4})?$").expect("Hardcode regex pattern")
});

static LOCATION_PARTS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<city>[^,]+?)\s*,\s*(?P<state>[A-Za-z]{2})\s*,\s*(?P<zip>\d{5}(?:-\d{4})?)\s*$")
        .expect("Hardcode regex pattern")
});

/// Headers naming a combined "City, State, Zip" column.
const COMBINED_HEADERS: [&str; 2] = ["city, state, zip", "city,state,zip"];

/// Headers never sampled for combined values; they already hold one part.
const LOCATION_PART_HEADERS: [&str; 8] = [
    "city",
    "state",
    "state/prov",
    "state/province",
    "zip",
    "postal code",
    "postalcode",
    "zipcode",
];

fn text_of(value: &CellValue) -> String {
    value.to_string().trim().to_owned()
}

/// Leading street number (1 to 6 digits) of a street address.
pub fn address_number(street: &CellValue) -> CellValue {
    let CellValue::Text(street) = street else {
        return CellValue::Empty;
    };
    ADDRESS_NUMBER_PATTERN
        .captures(street.trim())
        .and_then(|captures| captures.get(1))
        .map(|number| CellValue::from(number.as_str()))
        .unwrap_or_default()
}

/// Two-letter uppercase state code; blanks stay empty.
pub fn state_code(value: &CellValue) -> CellValue {
    if value.is_blank() {
        return CellValue::Empty;
    }
    let code: String = text_of(value).to_uppercase().chars().take(2).collect();
    CellValue::Text(code)
}

/// Formats a ZIP code as text, keeping leading zeros.
///
/// `"02481.0"` becomes `"02481"` and `"123456789"` becomes `"12345-6789"`. Values with no
/// recognisable 5 or 9 digit ZIP pass through as trimmed text.
pub fn format_zip(value: &CellValue) -> CellValue {
    if value.is_blank() {
        return CellValue::Empty;
    }
    let text = text_of(value);
    let cleaned: String = text.strip_suffix(".0").unwrap_or(&text).split_whitespace().collect();
    let digits = cleaned.replace('-', "");
    if digits.chars().all(|c| c.is_ascii_digit()) {
        match digits.len() {
            5 => return CellValue::Text(digits),
            9 => return CellValue::Text(format!("{}-{}", &digits[..5], &digits[5..])),
            _ => (),
        }
    }
    match ZIP_RUN_PATTERN.captures(&cleaned) {
        Some(captures) => {
            let zip = &captures[1];
            match captures.get(2) {
                Some(plus_four) => CellValue::Text(format!("{}-{}", zip, plus_four.as_str())),
                None => CellValue::Text(zip.to_owned()),
            }
        }
        None => CellValue::Text(text),
    }
}

/// How a sprinkler cell reads.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Sprinkler {
    /// Yes/no style answer
    YesNo(bool),
    /// Coverage percentage, 0 to 100
    Percent(i64),
    /// Anything else
    Unknown,
}

impl Sprinkler {
    /// Classifies a cell. Yes/no words win over numbers, so `1` and `0` are answers, not percentages.
    pub fn classify(value: &CellValue) -> Self {
        let text = text_of(value).to_lowercase();
        match text.as_str() {
            "y" | "yes" | "true" | "t" | "1" => return Sprinkler::YesNo(true),
            "n" | "no" | "false" | "f" | "0" => return Sprinkler::YesNo(false),
            _ => (),
        }
        PERCENT_PATTERN
            .captures(&text)
            .and_then(|captures| captures[1].parse::<f64>().ok())
            .filter(|percent| (0.0..=100.0).contains(percent))
            .map(|percent| Sprinkler::Percent(percent.round() as i64))
            .unwrap_or(Sprinkler::Unknown)
    }

    /// The value for the yes/no field.
    pub fn yes_no(&self) -> CellValue {
        match self {
            Sprinkler::YesNo(true) => CellValue::from("Y"),
            Sprinkler::YesNo(false) => CellValue::from("N"),
            _ => CellValue::Empty,
        }
    }

    /// The value for the percentage field.
    pub fn percent(&self) -> CellValue {
        match self {
            Sprinkler::Percent(percent) => CellValue::Number(*percent as f64),
            _ => CellValue::Empty,
        }
    }
}

/// The parts of a combined "City, ST, 12345" value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocationParts {
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Splits a combined location value; the state comes back uppercase.
pub fn split_location(value: &CellValue) -> Option<LocationParts> {
    let text = value.as_text()?;
    let captures = LOCATION_PARTS_PATTERN.captures(text)?;
    Some(LocationParts {
        city: captures["city"].to_owned(),
        state: captures["state"].to_uppercase(),
        zip: captures["zip"].to_owned(),
    })
}

/// Finds a column holding "City, State, Zip" values.
#[derive(Copy, Clone, Debug)]
pub struct LocationSplitter {
    /// Number of non-empty values sampled per column
    pub sample_size: usize,
    /// Share of sampled values that must look combined
    pub threshold: f64,
}

impl Default for LocationSplitter {
    fn default() -> Self {
        LocationSplitter {
            sample_size: 50,
            threshold: 0.8,
        }
    }
}

impl LocationSplitter {
    /// A column named like a combined location wins; otherwise the first column whose
    /// sampled values mostly look combined.
    pub fn detect(&self, table: &SourceTable) -> Option<usize> {
        if let Some(index) = table.position(|header| COMBINED_HEADERS.contains(&header.trim().to_lowercase().as_str())) {
            return Some(index);
        }
        table.columns().iter().position(|column| {
            if LOCATION_PART_HEADERS.contains(&column.header.trim().to_lowercase().as_str()) {
                return false;
            }
            let sample: Vec<String> = column
                .values
                .iter()
                .filter(|value| **value != CellValue::Empty)
                .take(self.sample_size)
                .map(text_of)
                .collect();
            if sample.is_empty() {
                return false;
            }
            let matches = sample.iter().filter(|text| COMBINED_LOCATION_PATTERN.is_match(text)).count();
            matches as f64 / sample.len() as f64 >= self.threshold
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::table::SourceColumn;

    fn text(value: &str) -> CellValue {
        CellValue::from(value)
    }

    #[test]
    fn address_numbers() {
        assert_eq!(address_number(&text("  1234 Main St")), text("1234"));
        assert_eq!(address_number(&text("12B Elm")), CellValue::Empty);
        assert_eq!(address_number(&text("1234567 Long Rd")), CellValue::Empty);
        assert_eq!(address_number(&text("PO Box 5")), CellValue::Empty);
        assert_eq!(address_number(&CellValue::Number(12.0)), CellValue::Empty);
    }

    #[test]
    fn state_codes() {
        assert_eq!(state_code(&text(" texas ")), text("TE"));
        assert_eq!(state_code(&text("ma")), text("MA"));
        assert_eq!(state_code(&text("  ")), CellValue::Empty);
        assert_eq!(state_code(&CellValue::Empty), CellValue::Empty);
    }

    #[test]
    fn zip_codes() {
        assert_eq!(format_zip(&text("02481.0")), text("02481"));
        assert_eq!(format_zip(&text("02481 ")), text("02481"));
        assert_eq!(format_zip(&text("12345-6789")), text("12345-6789"));
        assert_eq!(format_zip(&text("123456789")), text("12345-6789"));
        assert_eq!(format_zip(&CellValue::Number(33101.0)), text("33101"));
        assert_eq!(format_zip(&text("MA 02110")), text("02110"));
        assert_eq!(format_zip(&text("1234")), text("1234"));
        assert_eq!(format_zip(&text("")), CellValue::Empty);
        assert_eq!(format_zip(&CellValue::Empty), CellValue::Empty);
    }

    #[test]
    fn sprinkler_values_are_exclusive() {
        for (raw, expected) in [
            ("Yes", Sprinkler::YesNo(true)),
            ("f", Sprinkler::YesNo(false)),
            ("1", Sprinkler::YesNo(true)),
            ("0", Sprinkler::YesNo(false)),
            ("85%", Sprinkler::Percent(85)),
            (" 99.6 ", Sprinkler::Percent(100)),
            ("100", Sprinkler::Percent(100)),
            ("150", Sprinkler::Unknown),
            ("Partial", Sprinkler::Unknown),
            ("", Sprinkler::Unknown),
        ] {
            assert_eq!(Sprinkler::classify(&text(raw)), expected, "{raw}");
        }
        assert_eq!(Sprinkler::classify(&CellValue::Number(1.0)), Sprinkler::YesNo(true));
        assert_eq!(Sprinkler::classify(&CellValue::Bool(false)), Sprinkler::YesNo(false));

        let answer = Sprinkler::classify(&text("1"));
        assert_eq!(answer.yes_no(), text("Y"));
        assert_eq!(answer.percent(), CellValue::Empty);
        let coverage = Sprinkler::classify(&text("50"));
        assert_eq!(coverage.yes_no(), CellValue::Empty);
        assert_eq!(coverage.percent(), CellValue::Number(50.0));
    }

    #[test]
    fn location_split() {
        assert_eq!(
            split_location(&text(" Austin , tx , 78701-1234 ")),
            Some(LocationParts {
                city: "Austin".to_owned(),
                state: "TX".to_owned(),
                zip: "78701-1234".to_owned(),
            })
        );
        assert_eq!(split_location(&text("Austin, Texas, 78701")), None);
        assert_eq!(split_location(&CellValue::Number(1.0)), None);
    }

    fn column(header: &str, values: &[&str]) -> SourceColumn {
        SourceColumn {
            header: header.to_owned(),
            values: values.iter().map(|value| if value.is_empty() { CellValue::Empty } else { text(value) }).collect(),
        }
    }

    #[test]
    fn detect_by_name_then_by_sampling() {
        let splitter = LocationSplitter::default();
        let named = SourceTable::from_columns(vec![column("Street", &["1 A St"]), column(" City, State, Zip ", &["x"])]);
        assert_eq!(splitter.detect(&named), Some(1));

        let sampled = SourceTable::from_columns(vec![
            column("City", &["Austin, TX, 78701", "Dallas, TX, 75201"]),
            column("Location", &["Austin, TX, 78701", "", "Dallas, TX, 75201", "Waco, TX, 76701", "Plano, TX, 75023", "see notes"]),
        ]);
        assert_eq!(splitter.detect(&sampled), Some(1));

        let sparse = SourceTable::from_columns(vec![column("Location", &["Austin, TX, 78701", "n/a", "tbd"])]);
        assert_eq!(splitter.detect(&sparse), None);
    }
}
