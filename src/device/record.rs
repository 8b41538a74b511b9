//! Flat device records and RouterOS value conversions.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One instance of a device resource (e.g. one interface).
///
/// A flat mapping of field name to string value. Records are produced fresh
/// by every request and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceRecord(HashMap<String, String>);

impl DeviceRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a field value.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Field value, or an empty string when the device omitted it.
    pub fn get_or_empty(&self, field: &str) -> &str {
        self.get(field).unwrap_or("")
    }

    /// Check whether the record carries a field.
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<HashMap<String, String>> for DeviceRecord {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DeviceRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

const NANOS_PER_SEC: f64 = 1e9;

/// Map a RouterOS boolean token to a gauge value.
///
/// `"true"` and `"yes"` are truthy; everything else is `0.0`.
pub fn bool_to_float(value: &str) -> f64 {
    match value {
        "true" | "yes" => 1.0,
        _ => 0.0,
    }
}

/// Parse a RouterOS duration string.
///
/// Accepts unit sequences (`1w2d3h4m5s`, `150ms`, `1.5s`), clock notation
/// (`02:03:04`) and a mix of both (`1w2d03:04:05`).
///
/// # Examples
///
/// ```
/// use mikrotik_exporter::device::parse_duration;
///
/// assert_eq!(parse_duration("1h30m").unwrap().as_secs(), 5400);
/// assert_eq!(parse_duration("1d00:00:05").unwrap().as_secs(), 86405);
/// assert_eq!(parse_duration("250ms").unwrap().as_millis(), 250);
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration string is empty".to_string());
    }
    if !s.is_ascii() {
        return Err(format!("invalid character in duration '{input}'"));
    }

    // Split off a trailing HH:MM:SS clock part.
    let (units, clock) = match s.find(':') {
        Some(colon) => {
            let start = s[..colon]
                .rfind(|c: char| !c.is_ascii_digit())
                .map_or(0, |i| i + 1);
            (&s[..start], Some(&s[start..]))
        }
        None => (s, None),
    };

    // Accumulated in nanoseconds so sub-second units stay exact.
    let mut total = 0.0_f64;
    let mut rest = units;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration '{input}'"))?;
        if num_len == 0 {
            return Err(format!("expected a number in duration '{input}'"));
        }
        let value: f64 = rest[..num_len]
            .parse()
            .map_err(|_| format!("invalid number in duration '{input}'"))?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let factor = match &rest[..unit_len] {
            "w" => 7.0 * 86_400.0 * NANOS_PER_SEC,
            "d" => 86_400.0 * NANOS_PER_SEC,
            "h" => 3_600.0 * NANOS_PER_SEC,
            "m" => 60.0 * NANOS_PER_SEC,
            "s" => NANOS_PER_SEC,
            "ms" => 1e6,
            "us" => 1e3,
            "ns" => 1.0,
            other => return Err(format!("unknown unit '{other}' in duration '{input}'")),
        };
        total += value * factor;
        rest = &rest[unit_len..];
    }

    if let Some(clock) = clock {
        let parts: Vec<&str> = clock.split(':').collect();
        if parts.len() != 3 {
            return Err(format!("invalid clock notation in duration '{input}'"));
        }
        let mut seconds = 0.0;
        for (part, factor) in parts.iter().zip([3_600.0, 60.0, 1.0]) {
            let value: f64 = part
                .parse()
                .map_err(|_| format!("invalid clock notation in duration '{input}'"))?;
            seconds += value * factor;
        }
        total += seconds * NANOS_PER_SEC;
    }

    if !total.is_finite() || total < 0.0 || total > u64::MAX as f64 {
        return Err(format!("duration '{input}' out of range"));
    }
    Ok(Duration::from_nanos(total.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_to_float() {
        assert_eq!(bool_to_float("yes"), 1.0);
        assert_eq!(bool_to_float("true"), 1.0);
        assert_eq!(bool_to_float("no"), 0.0);
        assert_eq!(bool_to_float("false"), 0.0);
        assert_eq!(bool_to_float("maybe"), 0.0);
        assert_eq!(bool_to_float(""), 0.0);
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("4m").unwrap(), Duration::from_secs(240));
        assert_eq!(
            parse_duration("1w2d3h4m5s").unwrap(),
            Duration::from_secs(7 * 86_400 + 2 * 86_400 + 3 * 3_600 + 4 * 60 + 5)
        );
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_duration_clock() {
        assert_eq!(parse_duration("02:03:04").unwrap(), Duration::from_secs(7384));
        assert_eq!(
            parse_duration("1w2d03:04:05").unwrap(),
            Duration::from_secs(9 * 86_400 + 3 * 3_600 + 4 * 60 + 5)
        );
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("1:2").is_err());
    }

    #[test]
    fn test_parse_duration_non_ascii() {
        assert!(parse_duration("é1:02:03").is_err());
        assert!(parse_duration("1d€02:03:04").is_err());
        assert!(parse_duration("5秒").is_err());
    }

    #[test]
    fn test_record_lookup() {
        let record: DeviceRecord = [("name", "ether1"), ("rx-byte", "100")]
            .into_iter()
            .collect();
        assert_eq!(record.get("name"), Some("ether1"));
        assert_eq!(record.get_or_empty("comment"), "");
        assert!(record.contains("rx-byte"));
        assert_eq!(record.len(), 2);
    }
}
