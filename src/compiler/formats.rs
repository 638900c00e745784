//! `format` keyword checks.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^P([0-9]+(?:[,.][0-9]+)?Y)?([0-9]+(?:[,.][0-9]+)?M)?([0-9]+(?:[,.][0-9]+)?D)?(?:T([0-9]+(?:[,.][0-9]+)?H)?([0-9]+(?:[,.][0-9]+)?M)?([0-9]+(?:[,.][0-9]+)?S)?)?$",
    )
    .unwrap()
});

static RFC1123: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(Mon|Tue|Wed|Thu|Fri|Sat|Sun), (0[1-9]|[12]\d|3[01]) (Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec) \d{4} ([01]\d|2[0-3]):[0-5]\d:[0-5]\d GMT$",
    )
    .unwrap()
});

static DATE_TIME_NO_ZONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?$").unwrap());

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$")
        .unwrap()
});

static ARM_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:/subscriptions/[^/]+(?:/resourceGroups/[^/]+)?)?(?:/providers/[^/]+(?:/[^/]+/[^/]+)*)*/?$",
    )
    .unwrap()
});

/// A format with a real check behind it. Every other format name accepts
/// any value of the declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Format {
    Int32,
    Int64,
    UnixTime,
    Duration,
    DateTimeRfc1123,
    DateTime,
    Date,
    Uuid,
    Byte,
    ArmId,
    Uri,
    Email,
    Ipv4,
    Ipv6,
}

impl Format {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "int32" => Some(Self::Int32),
            "int64" => Some(Self::Int64),
            "unixtime" => Some(Self::UnixTime),
            "duration" => Some(Self::Duration),
            "date-time-rfc1123" => Some(Self::DateTimeRfc1123),
            "date-time" => Some(Self::DateTime),
            "date" => Some(Self::Date),
            "uuid" => Some(Self::Uuid),
            "byte" => Some(Self::Byte),
            "arm-id" => Some(Self::ArmId),
            "uri" => Some(Self::Uri),
            "email" => Some(Self::Email),
            "ipv4" => Some(Self::Ipv4),
            "ipv6" => Some(Self::Ipv6),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UnixTime => "unixtime",
            Self::Duration => "duration",
            Self::DateTimeRfc1123 => "date-time-rfc1123",
            Self::DateTime => "date-time",
            Self::Date => "date",
            Self::Uuid => "uuid",
            Self::Byte => "byte",
            Self::ArmId => "arm-id",
            Self::Uri => "uri",
            Self::Email => "email",
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
        }
    }

    /// Returns false only when the value has the format's base type and
    /// fails the check.
    pub fn is_valid(self, value: &Value) -> bool {
        match self {
            Self::Int32 | Self::Int64 | Self::UnixTime => match value {
                Value::Number(n) => self.check_number(n),
                _ => true,
            },
            _ => match value {
                Value::String(s) => self.check_string(s),
                _ => true,
            },
        }
    }

    fn check_number(self, n: &serde_json::Number) -> bool {
        if let Some(i) = n.as_i64() {
            return match self {
                Self::Int32 => i32::try_from(i).is_ok(),
                _ => true,
            };
        }
        if n.is_u64() {
            return self == Self::UnixTime;
        }
        let f = n.as_f64().unwrap_or(f64::NAN);
        if f.fract() != 0.0 {
            return false;
        }
        match self {
            Self::Int32 => (i32::MIN as f64..=i32::MAX as f64).contains(&f),
            Self::Int64 => (i64::MIN as f64..=i64::MAX as f64).contains(&f),
            _ => true,
        }
    }

    fn check_string(self, s: &str) -> bool {
        match self {
            Self::Duration => DURATION.is_match(s),
            Self::DateTimeRfc1123 => RFC1123.is_match(s),
            Self::DateTime => is_date_time(s),
            Self::Date => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
            Self::Uuid => uuid::Uuid::parse_str(s).is_ok(),
            Self::Byte => is_base64(s),
            Self::ArmId => s.starts_with('/') && ARM_ID.is_match(s),
            Self::Uri => url::Url::parse(s).is_ok(),
            Self::Email => EMAIL.is_match(s),
            Self::Ipv4 => s.parse::<std::net::Ipv4Addr>().is_ok(),
            Self::Ipv6 => s.parse::<std::net::Ipv6Addr>().is_ok(),
            Self::Int32 | Self::Int64 | Self::UnixTime => true,
        }
    }
}

/// RFC 3339, also accepting a timestamp whose zone designator is missing.
fn is_date_time(s: &str) -> bool {
    if chrono::DateTime::parse_from_rfc3339(s).is_ok() {
        return true;
    }
    DATE_TIME_NO_ZONE.is_match(s)
        && chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

/// Decodes and re-encodes; padding differences do not count.
fn is_base64(s: &str) -> bool {
    match STANDARD.decode(s) {
        Ok(bytes) => STANDARD.encode(bytes).trim_end_matches('=') == s.trim_end_matches('='),
        Err(_) => false,
    }
}
