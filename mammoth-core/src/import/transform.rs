//! Per-cell column transforms, applied between the source reader and the
//! wire encoding.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Transform applied to every value of one mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnTransform {
    #[default]
    None,
    /// Strip leading and trailing whitespace.
    Trim,
    Uppercase,
    Lowercase,
    /// Normalize common truthy/falsy spellings to `true` / `false`.
    ParseBoolean,
    /// Normalize `%m/%d/%Y` or `%d/%m/%Y` dates to ISO `%Y-%m-%d`.
    ParseDate,
    /// Strip thousands separators (commas and spaces).
    ParseNumber,
    /// Reserved for server-side expression rewriting; identity for now.
    CustomSql,
}

impl ColumnTransform {
    /// Apply the transform. Unrecognized inputs pass through unchanged.
    pub fn apply(&self, value: &str) -> String {
        match self {
            ColumnTransform::None | ColumnTransform::CustomSql => value.to_string(),
            ColumnTransform::Trim => value.trim().to_string(),
            ColumnTransform::Uppercase => value.to_uppercase(),
            ColumnTransform::Lowercase => value.to_lowercase(),
            ColumnTransform::ParseBoolean => match value.to_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => "true".to_string(),
                "false" | "f" | "no" | "n" | "0" => "false".to_string(),
                _ => value.to_string(),
            },
            ColumnTransform::ParseDate => {
                for format in ["%m/%d/%Y", "%d/%m/%Y"] {
                    if let Ok(date) = NaiveDate::parse_from_str(value, format) {
                        return date.format("%Y-%m-%d").to_string();
                    }
                }
                value.to_string()
            }
            ColumnTransform::ParseNumber => value.replace([',', ' '], ""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_and_custom_sql_are_identity() {
        assert_eq!(ColumnTransform::None.apply(" a "), " a ");
        assert_eq!(ColumnTransform::CustomSql.apply("x + 1"), "x + 1");
    }

    #[test]
    fn test_trim_and_case() {
        assert_eq!(ColumnTransform::Trim.apply("  ab \t"), "ab");
        assert_eq!(ColumnTransform::Uppercase.apply("abc"), "ABC");
        assert_eq!(ColumnTransform::Lowercase.apply("AbC"), "abc");
    }

    #[test]
    fn test_parse_boolean() {
        for truthy in ["true", "T", "YES", "y", "1"] {
            assert_eq!(ColumnTransform::ParseBoolean.apply(truthy), "true");
        }
        for falsy in ["false", "F", "no", "N", "0"] {
            assert_eq!(ColumnTransform::ParseBoolean.apply(falsy), "false");
        }
        // Not a recognized spelling: identity
        assert_eq!(ColumnTransform::ParseBoolean.apply("maybe"), "maybe");
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(ColumnTransform::ParseDate.apply("01/15/2024"), "2024-01-15");
        // Falls through to day-first when month-first cannot parse
        assert_eq!(ColumnTransform::ParseDate.apply("25/12/2024"), "2024-12-25");
        assert_eq!(ColumnTransform::ParseDate.apply("not a date"), "not a date");
    }

    #[test]
    fn test_parse_date_prefers_month_first() {
        // Ambiguous dates resolve as %m/%d/%Y
        assert_eq!(ColumnTransform::ParseDate.apply("02/03/2024"), "2024-02-03");
    }

    #[test]
    fn test_parse_number_strips_separators() {
        assert_eq!(ColumnTransform::ParseNumber.apply("1,234,567.89"), "1234567.89");
        assert_eq!(ColumnTransform::ParseNumber.apply("1 234"), "1234");
    }

    #[test]
    fn test_custom_sql_round_trips_through_serde() {
        let json = serde_json::to_string(&ColumnTransform::CustomSql).unwrap();
        assert_eq!(json, "\"custom_sql\"");
        let back: ColumnTransform = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ColumnTransform::CustomSql);
    }
}
