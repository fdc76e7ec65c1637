use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};

/// Datetime layouts accepted in the `date` column of every source table.
pub const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a float that may use comma as decimal separator
pub fn parse_locale_float(s: &str) -> Result<f64, std::num::ParseFloatError> {
    s.trim().replace(',', ".").parse::<f64>()
}

/// Parse a timestamp in any of the accepted layouts; a bare date means midnight.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

pub fn accepted_formats() -> Vec<String> {
    DATETIME_FORMATS
        .iter()
        .chain(std::iter::once(&DATE_FORMAT))
        .map(|f| f.to_string())
        .collect()
}

/// Truncates a timestamp to midnight of the same day.
pub fn midnight(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_time(NaiveTime::MIN)
}

/// Last calendar day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month0() == 11 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .unwrap_or(date)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (n - 1 denominator); `None` below two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_locale_float() {
        assert_eq!(parse_locale_float("12,5").unwrap(), 12.5);
        assert_eq!(parse_locale_float(" 3.25 ").unwrap(), 3.25);
        assert!(parse_locale_float("abc").is_err());
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = NaiveDate::from_ymd_opt(2021, 3, 4)
            .unwrap()
            .and_hms_opt(13, 30, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2021-03-04 13:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2021-03-04T13:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2021-03-04 13:30"), Some(expected));
        assert_eq!(
            parse_timestamp("2021-03-04"),
            Some(NaiveDate::from_ymd_opt(2021, 3, 4).unwrap().and_hms_opt(0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("04/03/2021"), None);
    }

    #[test]
    fn test_month_end() {
        let feb = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        assert_eq!(month_end(feb), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        let dec = NaiveDate::from_ymd_opt(2021, 12, 1).unwrap();
        assert_eq!(month_end(dec), NaiveDate::from_ymd_opt(2021, 12, 31).unwrap());
    }

    #[test]
    fn test_basic_stats() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&values).unwrap(), 5.0);
        assert_relative_eq!(sample_std(&values).unwrap(), 2.138089935299395, epsilon = 1e-12);
        assert_relative_eq!(median(&values).unwrap(), 4.5);
        assert_eq!(sample_std(&[1.0]), None);
        assert_eq!(median(&[]), None);
    }
}
