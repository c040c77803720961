use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::database::services_catalog::ServiceCatalog;

/// Communication state of a ticket derived from its last user contact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Silence {
    pub hours_since_last_user_contact: Option<f64>,
    pub communication_sla_hours: f64,
    pub is_silent: bool,
}

/// Parses gateway timestamps. Naive values are taken as UTC.
pub fn parse_datetime(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    // A bare date is midnight UTC.
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// RFC 3339 in UTC with a `Z` suffix.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn normalize_datetime(value: Option<&str>) -> Option<String> {
    parse_datetime(value).map(format_datetime)
}

pub fn hours_since(last_contact: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<f64> {
    last_contact.map(|dt| (now - dt).num_milliseconds() as f64 / 3_600_000.0)
}

/// A ticket without a known last contact is never silent.
pub fn compute_silence(
    last_contact: Option<DateTime<Utc>>,
    sla_hours: f64,
    now: DateTime<Utc>,
) -> Silence {
    let hours = hours_since(last_contact, now);
    Silence {
        hours_since_last_user_contact: hours,
        communication_sla_hours: sla_hours,
        is_silent: hours.is_some_and(|h| h >= sla_hours),
    }
}

/// SLA for a service entry and a `p1`..`p4` priority, falling back to `default_hours`.
pub fn select_comm_sla(
    service: Option<&ServiceCatalog>,
    priority: Option<&str>,
    default_hours: f64,
) -> f64 {
    let Some(service) = service else {
        return default_hours;
    };
    let hours = match priority.unwrap_or("").trim().to_lowercase().as_str() {
        "p1" => service.comm_sla_p1_hours,
        "p2" => service.comm_sla_p2_hours,
        "p3" => service.comm_sla_p3_hours,
        "p4" => service.comm_sla_p4_hours,
        _ => None,
    };
    hours.unwrap_or(default_hours)
}

/// Display name of a gateway value that is either a plain string or an object.
pub fn extract_name(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => ["name", "display_value", "display_name", "value"]
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_silent_after_sla() {
        let silence = compute_silence(Some(now() - Duration::hours(50)), 48.0, now());
        assert!(silence.is_silent);
        assert_eq!(silence.hours_since_last_user_contact, Some(50.0));
    }

    #[test]
    fn test_not_silent_within_sla() {
        let silence = compute_silence(Some(now() - Duration::hours(10)), 48.0, now());
        assert!(!silence.is_silent);
        assert_eq!(silence.communication_sla_hours, 48.0);
    }

    #[test]
    fn test_exactly_at_sla_is_silent() {
        let silence = compute_silence(Some(now() - Duration::hours(48)), 48.0, now());
        assert!(silence.is_silent);
    }

    #[test]
    fn test_missing_contact_is_never_silent() {
        for sla in [0.0, 1.0, 48.0, -5.0] {
            let silence = compute_silence(None, sla, now());
            assert!(!silence.is_silent);
            assert_eq!(silence.hours_since_last_user_contact, None);
        }
    }

    #[test]
    fn test_parse_datetime_variants() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 8, 10, 30, 0).unwrap();
        assert_eq!(parse_datetime(Some("2025-03-08T10:30:00Z")), Some(expected));
        assert_eq!(parse_datetime(Some("2025-03-08T12:30:00+02:00")), Some(expected));
        assert_eq!(parse_datetime(Some("2025-03-08T10:30:00")), Some(expected));
        assert_eq!(parse_datetime(Some("2025-03-08 10:30:00.000")), Some(expected));
        assert_eq!(parse_datetime(Some("2025-03-08T10:30")), Some(expected));
        assert_eq!(parse_datetime(Some("2025-03-08 10:30")), Some(expected));
        assert_eq!(parse_datetime(Some("2025-03-08T10:30:00+0000")), Some(expected));
        assert_eq!(parse_datetime(Some("2025-03-08T12:30:00.000+0200")), Some(expected));
        assert_eq!(parse_datetime(Some("2025-03-08 10:30:00+00:00")), Some(expected));
        assert_eq!(
            parse_datetime(Some("2025-03-08")),
            Some(Utc.with_ymd_and_hms(2025, 3, 8, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_datetime(Some("2025-03-08T10")), None);
        assert_eq!(parse_datetime(Some("not a date")), None);
        assert_eq!(parse_datetime(Some("")), None);
        assert_eq!(parse_datetime(None), None);
    }

    #[test]
    fn test_minute_precision_contact_counts_toward_silence() {
        let last = parse_datetime(Some("2025-03-08T10:00"));
        let silence = compute_silence(last, 48.0, now());
        assert_eq!(silence.hours_since_last_user_contact, Some(50.0));
        assert!(silence.is_silent);
    }

    #[test]
    fn test_normalize_datetime_uses_utc() {
        assert_eq!(
            normalize_datetime(Some("2025-03-08T12:30:00+02:00")).as_deref(),
            Some("2025-03-08T10:30:00Z")
        );
        assert_eq!(normalize_datetime(Some("ayer")), None);
    }

    #[test]
    fn test_select_comm_sla_by_priority() {
        let service = ServiceCatalog {
            service_code: "NET".to_string(),
            comm_sla_p1_hours: Some(4.0),
            comm_sla_p2_hours: Some(8.0),
            comm_sla_p4_hours: None,
            ..Default::default()
        };
        assert_eq!(select_comm_sla(Some(&service), Some(" P1 "), 48.0), 4.0);
        assert_eq!(select_comm_sla(Some(&service), Some("p2"), 48.0), 8.0);
        assert_eq!(select_comm_sla(Some(&service), Some("p4"), 48.0), 48.0);
        assert_eq!(select_comm_sla(Some(&service), Some("Alta"), 48.0), 48.0);
        assert_eq!(select_comm_sla(Some(&service), None, 48.0), 48.0);
        assert_eq!(select_comm_sla(None, Some("p1"), 24.0), 24.0);
    }

    #[test]
    fn test_extract_name() {
        assert_eq!(extract_name(Some(&json!("Open"))), Some("Open".to_string()));
        assert_eq!(extract_name(Some(&json!({"name": "P2"}))), Some("P2".to_string()));
        assert_eq!(
            extract_name(Some(&json!({"display_value": "Mesa central"}))),
            Some("Mesa central".to_string())
        );
        assert_eq!(extract_name(Some(&json!({"id": 3}))), None);
        assert_eq!(extract_name(Some(&json!(null))), None);
        assert_eq!(extract_name(None), None);
    }
}
