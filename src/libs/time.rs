use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Datelike, DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};

use crate::Response;

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy)]
pub enum TimeFormat {
    /// 2024-02-05
    YYYYMMDD,
    /// 2024-02-05 14:00:00
    YYYYMMDD_HHMMSS,
    /// 2024-02-01，目标与月报使用的月份
    YYYYMM01,
}

impl TimeFormat {
    pub fn pattern(self) -> &'static str {
        match self {
            TimeFormat::YYYYMMDD => "%Y-%m-%d",
            TimeFormat::YYYYMMDD_HHMMSS => "%Y-%m-%d %H:%M:%S",
            TimeFormat::YYYYMM01 => "%Y-%m-01",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TIME {
    naos: i64,
}

impl TIME {
    pub fn now() -> Result<Self, Response> {
        let naos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(Response::internal_server_error)?
            .as_nanos();
        Ok(Self { naos: naos as i64 })
    }
    pub fn naos(&self) -> i64 {
        self.naos
    }
    pub fn local(&self) -> DateTime<Local> {
        Local.timestamp_nanos(self.naos)
    }
    pub fn naive(&self) -> NaiveDateTime {
        self.local().naive_local()
    }
    pub fn date(&self) -> NaiveDate {
        self.naive().date()
    }
    pub fn format(&self, f: TimeFormat) -> String {
        self.local().format(f.pattern()).to_string()
    }
}

pub fn format_naive(time: &NaiveDateTime, f: TimeFormat) -> String {
    time.format(f.pattern()).to_string()
}

/// 解析客户端传入的时间
///
/// 支持 `YYYY-MM-DD HH:MM[:SS]`、`YYYY-MM-DDTHH:MM[:SS]` 以及带时区的 RFC 3339，
/// 带时区的时间会转换为本地时间。
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Local).naive_local());
    }
    [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
    ]
    .iter()
    .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
    .or_else(|| parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// 将 `YYYY-MM` 或 `YYYY-MM-DD` 规范为当月第一天 `YYYY-MM-01`
pub fn month_start(s: &str) -> Option<String> {
    let s = s.trim();
    let date = parse_date(s).or_else(|| parse_date(&format!("{s}-01")))?;
    Some(date.format(TimeFormat::YYYYMM01.pattern()).to_string())
}

/// 下个月第一天，用于按月份范围查询
pub fn next_month_start(month: &str) -> Option<String> {
    let date = parse_date(month)?;
    let (y, m) = match date.month() {
        12 => (date.year() + 1, 1),
        m => (date.year(), m + 1),
    };
    NaiveDate::from_ymd_opt(y, m, 1).map(|d| d.format(TimeFormat::YYYYMMDD.pattern()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_times_are_normalized() {
        let t = parse_datetime("2024-02-05T14:30").unwrap();
        assert_eq!(format_naive(&t, TimeFormat::YYYYMMDD_HHMMSS), "2024-02-05 14:30:00");
        assert!(parse_datetime("2024-02-05 14:30:00").is_some());
        assert!(parse_datetime("next week").is_none());
    }

    #[test]
    fn months_are_first_days() {
        assert_eq!(month_start("2024-02").as_deref(), Some("2024-02-01"));
        assert_eq!(month_start("2024-02-17").as_deref(), Some("2024-02-01"));
        assert_eq!(next_month_start("2024-12-01").as_deref(), Some("2025-01-01"));
        assert_eq!(next_month_start("2024-02-01").as_deref(), Some("2024-03-01"));
        assert!(month_start("Feb").is_none());
    }
}
