//! Argument normalization shared by the tag engine and the search engine.
//!
//! Every function here either returns a normalized value or a
//! [`crate::error::CatalogError`]; callers that pass a [`WarningBag`] get the
//! error pushed there instead and a best-effort fallback, matching the
//! source's "raise, or warn and continue" split.

use crate::config::{Config, TagConfig, UserConfig};
use crate::error::{CatalogError, Result};
use crate::model::WarningBag;

/// Lowercases, maps space/`-` to `_`, drops characters outside
/// `valid_chars`, then checks length bounds.
pub fn normalize_tag_name(name: &str, config: &TagConfig) -> Result<String> {
    let lowered = name.to_lowercase().replace([' ', '-'], "_");
    let filtered: String = lowered
        .chars()
        .filter(|c| config.valid_chars.contains(*c))
        .collect();

    if filtered.len() < config.min_length {
        return Err(CatalogError::TagTooShort(name.to_string()));
    }
    if filtered.len() > config.max_length {
        return Err(CatalogError::TagTooLong(name.to_string()));
    }
    Ok(filtered)
}

/// Lowercases before every other check so that `"Alice"` and `"alice"`
/// normalize to the same stored value, matching [`normalize_tag_name`]'s
/// case-insensitive-uniqueness pattern.
pub fn normalize_username(username: &str, config: &UserConfig) -> Result<String> {
    let lowered = username.to_lowercase();
    if lowered.len() < config.min_username_length {
        return Err(CatalogError::UsernameTooShort(username.to_string()));
    }
    if lowered.len() > config.max_username_length {
        return Err(CatalogError::UsernameTooLong(username.to_string()));
    }
    if !lowered.chars().all(|c| config.valid_chars.contains(c)) {
        return Err(CatalogError::InvalidUsernameChars(username.to_string()));
    }
    Ok(lowered)
}

pub fn assert_valid_password(password: &[u8], config: &UserConfig) -> Result<()> {
    if password.len() < config.min_password_length {
        return Err(CatalogError::PasswordTooShort);
    }
    Ok(())
}

/// Splits on commas/whitespace, lowercases, strips a leading dot, drops
/// empty elements.
pub fn normalize_extension_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(|s| s.trim().to_lowercase())
        .map(|s| s.strip_prefix('.').map(str::to_string).unwrap_or(s))
        .filter(|s| !s.is_empty())
        .collect()
}

/// The two ends of a `"a-b"`/`"a-"`/`"-b"`/`"a"` range expression, after
/// parsing HMS and byte-suffix forms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub low: Option<f64>,
    pub high: Option<f64>,
}

pub fn parse_hyphen_range(raw: &str) -> Result<Range> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Range { low: None, high: None });
    }

    let (low_raw, high_raw) = match raw.rfind('-') {
        // a bare negative/single number, or a HMS string that itself has no '-'.
        None => (Some(raw), None),
        Some(idx) if idx == 0 => (None, Some(&raw[1..])),
        Some(idx) => (Some(&raw[..idx]), Some(&raw[idx + 1..])),
    };

    let low = match low_raw {
        Some(s) if !s.is_empty() => Some(parse_scalar(s)?),
        _ => None,
    };
    let high = match high_raw {
        Some(s) if !s.is_empty() => Some(parse_scalar(s)?),
        _ => None,
    };

    if let (Some(low), Some(high)) = (low, high) {
        if low > high {
            return Err(CatalogError::OutOfOrder {
                low: low.to_string(),
                high: high.to_string(),
            });
        }
    }

    Ok(Range { low, high })
}

fn parse_scalar(raw: &str) -> Result<f64> {
    if raw.contains(':') {
        return hms_to_seconds(raw);
    }
    if let Some(value) = parse_byte_suffix(raw) {
        return Ok(value);
    }
    raw.parse::<f64>()
        .map_err(|_| CatalogError::OutOfOrder { low: raw.to_string(), high: raw.to_string() })
}

fn parse_byte_suffix(raw: &str) -> Option<f64> {
    let lower = raw.to_lowercase();
    let (number, multiplier) = if let Some(n) = lower.strip_suffix('k') {
        (n, 1024.0)
    } else if let Some(n) = lower.strip_suffix('m') {
        (n, 1024.0 * 1024.0)
    } else if let Some(n) = lower.strip_suffix('g') {
        (n, 1024.0 * 1024.0 * 1024.0)
    } else {
        return None;
    };
    number.parse::<f64>().ok().map(|n| n * multiplier)
}

fn hms_to_seconds(raw: &str) -> Result<f64> {
    let parts: Vec<&str> = raw.split(':').collect();
    let invalid = || CatalogError::OutOfOrder { low: raw.to_string(), high: raw.to_string() };
    let parsed: Vec<f64> = parts
        .iter()
        .map(|p| p.parse::<f64>().map_err(|_| invalid()))
        .collect::<Result<_>>()?;

    let seconds = match parsed.as_slice() {
        [s] => *s,
        [m, s] => m * 60.0 + s,
        [h, m, s] => h * 3600.0 + m * 60.0 + s,
        _ => return Err(invalid()),
    };
    Ok(seconds)
}

/// Validates and lowercases a column/`RANDOM()` pair. Unknown columns are
/// dropped with a warning; unknown directions default to `desc`.
pub const ALLOWED_ORDERBY_COLUMNS: &[&str] = &[
    "extension", "width", "height", "ratio", "area", "duration", "bytes", "created", "tagged_at",
    "random",
];

pub fn normalize_orderby(
    raw: &[(String, String)],
    warnings: Option<&mut WarningBag>,
) -> Vec<(String, String)> {
    let mut warnings = warnings;
    let mut result = Vec::new();
    for (column, direction) in raw {
        let column_lower = column.to_lowercase();
        if !ALLOWED_ORDERBY_COLUMNS.contains(&column_lower.as_str()) {
            if let Some(bag) = warnings.as_deref_mut() {
                bag.add(format!("unknown orderby column: {column}"));
            }
            continue;
        }
        let direction_lower = direction.to_lowercase();
        let direction = match direction_lower.as_str() {
            "asc" | "desc" => direction_lower,
            _ => {
                if let Some(bag) = warnings.as_deref_mut() {
                    bag.add(format!("unknown orderby direction '{direction}', defaulting to desc"));
                }
                "desc".to_string()
            }
        };
        let sql_column = if column_lower == "random" {
            "RANDOM()".to_string()
        } else if column_lower == "ratio" {
            "aspectratio".to_string()
        } else {
            column_lower
        };
        result.push((sql_column, direction));
    }
    result
}

pub fn normalize_limit(limit: Option<i64>, warnings: Option<&mut WarningBag>) -> Option<i64> {
    match limit {
        Some(n) if n < 0 => {
            if let Some(bag) = warnings {
                bag.add(format!("negative limit {n} ignored"));
            }
            None
        }
        other => other,
    }
}

pub fn normalize_offset(offset: Option<i64>, warnings: Option<&mut WarningBag>) -> i64 {
    match offset {
        Some(n) if n < 0 => {
            if let Some(bag) = warnings {
                bag.add(format!("negative offset {n} treated as 0"));
            }
            0
        }
        Some(n) => n,
        None => 0,
    }
}

pub fn required_feature(config: &Config, key: &str) -> Result<()> {
    config.required_feature(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_name_normalization_lowercases_and_substitutes() {
        let config = TagConfig::default();
        assert_eq!(normalize_tag_name("Cool Tag-Name", &config).unwrap(), "cool_tag_name");
    }

    #[test]
    fn tag_too_short_or_too_long() {
        let config = TagConfig::default();
        assert!(matches!(
            normalize_tag_name("", &config),
            Err(CatalogError::TagTooShort(_))
        ));
        let long = "a".repeat(100);
        assert!(matches!(
            normalize_tag_name(&long, &config),
            Err(CatalogError::TagTooLong(_))
        ));
    }

    #[test]
    fn hyphen_range_parses_both_bounds() {
        let range = parse_hyphen_range("5-10").unwrap();
        assert_eq!(range.low, Some(5.0));
        assert_eq!(range.high, Some(10.0));
    }

    #[test]
    fn hyphen_range_single_number_is_lower_bound_only() {
        let range = parse_hyphen_range("5").unwrap();
        assert_eq!(range.low, Some(5.0));
        assert_eq!(range.high, None);
    }

    #[test]
    fn hyphen_range_out_of_order_fails() {
        assert!(matches!(parse_hyphen_range("5-3"), Err(CatalogError::OutOfOrder { .. })));
    }

    #[test]
    fn hyphen_range_supports_byte_suffix() {
        let range = parse_hyphen_range("1k-2m").unwrap();
        assert_eq!(range.low, Some(1024.0));
        assert_eq!(range.high, Some(1024.0 * 1024.0 * 2.0));
    }

    #[test]
    fn hyphen_range_supports_hms() {
        let range = parse_hyphen_range("1:30-").unwrap();
        assert_eq!(range.low, Some(90.0));
        assert_eq!(range.high, None);
    }

    #[test]
    fn orderby_unknown_column_is_dropped_with_warning() {
        let mut bag = WarningBag::new();
        let result = normalize_orderby(
            &[("bogus".to_string(), "asc".to_string())],
            Some(&mut bag),
        );
        assert!(result.is_empty());
        assert!(!bag.is_empty());
    }

    #[test]
    fn orderby_random_maps_to_sql_function() {
        let result = normalize_orderby(&[("random".to_string(), "asc".to_string())], None);
        assert_eq!(result[0].0, "RANDOM()");
    }

    #[test]
    fn orderby_ratio_aliases_to_aspectratio_column() {
        let result = normalize_orderby(&[("ratio".to_string(), "asc".to_string())], None);
        assert_eq!(result[0].0, "aspectratio");
    }

    #[test]
    fn username_normalization_lowercases() {
        let config = UserConfig::default();
        assert_eq!(normalize_username("Alice", &config).unwrap(), "alice");
    }
}
