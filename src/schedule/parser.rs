use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, Timelike};
use regex::{Captures, Regex};

/// 从备注中解析出的预约时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemarkTime(NaiveDateTime);

impl RemarkTime {
    /// 日期或时间不合法时返回 None
    pub fn new(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)?
            .and_hms_opt(hour, minute, 0)
            .map(Self)
    }
    pub fn year(&self) -> i32 {
        self.0.year()
    }
    /// 1-12
    pub fn month(&self) -> u32 {
        self.0.month()
    }
    /// 0-11
    pub fn month0(&self) -> u32 {
        self.0.month0()
    }
    pub fn day(&self) -> u32 {
        self.0.day()
    }
    pub fn hour(&self) -> u32 {
        self.0.hour()
    }
    pub fn minute(&self) -> u32 {
        self.0.minute()
    }
    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }
}

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// 月份缩写（取前三个字母，不区分大小写）转为 1-12
pub fn month_number(name: &str) -> Option<u32> {
    let key = name.get(..3)?.to_ascii_lowercase();
    MONTHS.iter().position(|m| *m == key).map(|i| i as u32 + 1)
}

/// 12 小时制转 24 小时制，PM 加 12（12 PM 除外），12 AM 为 0
pub fn to_24_hour(hour: u32, meridiem: Option<&str>) -> u32 {
    match meridiem.map(str::to_ascii_lowercase).as_deref() {
        Some("pm") if hour != 12 => hour + 12,
        Some("am") if hour == 12 => 0,
        _ => hour,
    }
}

fn number<T: std::str::FromStr>(caps: &Captures, i: usize) -> Option<T> {
    caps.get(i)?.as_str().parse().ok()
}

/// 时间部分统一为最后三个捕获组：时、分、AM/PM
fn hour_minute(caps: &Captures, first: usize) -> Option<(u32, u32)> {
    let hour: u32 = number(caps, first)?;
    let minute = caps.get(first + 1).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let meridiem = caps.get(first + 2).map(|m| m.as_str());
    Some((to_24_hour(hour, meridiem), minute))
}

struct Matcher {
    regex: &'static Regex,
    build: fn(&Captures, NaiveDate) -> Option<RemarkTime>,
}

const TIME: &str = r"\s+at\s+(\d{1,2})(?::?(\d{2}))?\s*(am|pm)?";
/// 月份缩写或全称，后面必须是单词边界
const MONTH: &str = r"(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\b";

lazy_static::lazy_static! {
    static ref DAY_MONTH: Regex = Regex::new(&format!(
        r"(?i)(\d{{1,2}})(?:st|nd|rd|th)?\s+{MONTH}{TIME}"
    )).expect("DAY_MONTH");
    static ref MONTH_DAY: Regex = Regex::new(&format!(
        r"(?i){MONTH}\s+(\d{{1,2}})(?:,?\s+(\d{{4}}))?{TIME}"
    )).expect("MONTH_DAY");
    static ref NUMERIC: Regex = Regex::new(&format!(
        r"(?i)(\d{{1,2}})/(\d{{1,2}})(?:/(\d{{4}}))?{TIME}"
    )).expect("NUMERIC");
    static ref RELATIVE: Regex = Regex::new(&format!(r"(?i)(today|tomorrow){TIME}")).expect("RELATIVE");
}

fn build_day_month(caps: &Captures, today: NaiveDate) -> Option<RemarkTime> {
    let day = number(caps, 1)?;
    let month = month_number(caps.get(2)?.as_str())?;
    let (hour, minute) = hour_minute(caps, 3)?;
    RemarkTime::new(today.year(), month, day, hour, minute)
}

fn build_month_day(caps: &Captures, today: NaiveDate) -> Option<RemarkTime> {
    let month = month_number(caps.get(1)?.as_str())?;
    let day = number(caps, 2)?;
    let year = caps.get(3).map_or(Some(today.year()), |y| y.as_str().parse().ok())?;
    let (hour, minute) = hour_minute(caps, 4)?;
    RemarkTime::new(year, month, day, hour, minute)
}

fn build_numeric(caps: &Captures, today: NaiveDate) -> Option<RemarkTime> {
    let day = number(caps, 1)?;
    let month = number(caps, 2)?;
    let year = caps.get(3).map_or(Some(today.year()), |y| y.as_str().parse().ok())?;
    let (hour, minute) = hour_minute(caps, 4)?;
    RemarkTime::new(year, month, day, hour, minute)
}

fn build_relative(caps: &Captures, today: NaiveDate) -> Option<RemarkTime> {
    let date = if caps.get(1)?.as_str().eq_ignore_ascii_case("tomorrow") {
        today.checked_add_days(Days::new(1))?
    } else {
        today
    };
    let (hour, minute) = hour_minute(caps, 2)?;
    RemarkTime::new(date.year(), date.month(), date.day(), hour, minute)
}

lazy_static::lazy_static! {
    /// 按顺序尝试，第一个匹配上的模式决定结果
    static ref MATCHERS: [Matcher; 4] = [
        Matcher { regex: &*DAY_MONTH, build: build_day_month },
        Matcher { regex: &*MONTH_DAY, build: build_month_day },
        Matcher { regex: &*NUMERIC, build: build_numeric },
        Matcher { regex: &*RELATIVE, build: build_relative },
    ];
}

impl Matcher {
    fn apply(&self, text: &str, today: NaiveDate) -> Option<Option<RemarkTime>> {
        self.regex.captures(text).map(|caps| (self.build)(&caps, today))
    }
}

/// `5th Feb at 2 PM`
pub fn match_day_month(text: &str, today: NaiveDate) -> Option<RemarkTime> {
    MATCHERS[0].apply(text, today).flatten()
}
/// `Feb 5, 2025 at 2 PM`
pub fn match_month_day(text: &str, today: NaiveDate) -> Option<RemarkTime> {
    MATCHERS[1].apply(text, today).flatten()
}
/// `5/2/2025 at 14:00`
pub fn match_numeric(text: &str, today: NaiveDate) -> Option<RemarkTime> {
    MATCHERS[2].apply(text, today).flatten()
}
/// `tomorrow at 11 AM`
pub fn match_relative(text: &str, today: NaiveDate) -> Option<RemarkTime> {
    MATCHERS[3].apply(text, today).flatten()
}

/// 从备注中提取预约时间
///
/// 第一个匹配上的模式即为结果，即使它无法构成合法的日期时间也不再尝试后面的模式。
pub fn extract_scheduled_time(text: &str, today: NaiveDate) -> Option<RemarkTime> {
    MATCHERS
        .iter()
        .find_map(|m| m.apply(text, today))
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 20).unwrap()
    }

    #[test]
    fn day_month_with_meridiem() {
        let t = extract_scheduled_time("Meeting on 5th Feb at 2 PM", today()).unwrap();
        assert_eq!((t.year(), t.month0(), t.day()), (2024, 1, 5));
        assert_eq!((t.hour(), t.minute()), (14, 0));
    }

    #[test]
    fn month_day_with_year() {
        let t = match_month_day("visit Feb 5, 2025 at 10:30 am", today()).unwrap();
        assert_eq!((t.year(), t.month(), t.day(), t.hour(), t.minute()), (2025, 2, 5, 10, 30));
        let t = match_month_day("site visit march 3 at 4pm", today()).unwrap();
        assert_eq!((t.year(), t.month(), t.hour()), (2024, 3, 16));
    }

    #[test]
    fn numeric_is_day_first() {
        let t = match_numeric("meeting 5/2 at 14:00", today()).unwrap();
        assert_eq!((t.month(), t.day(), t.hour()), (2, 5, 14));
        let t = match_numeric("meeting 5/2/2026 at 9", today()).unwrap();
        assert_eq!((t.year(), t.hour()), (2026, 9));
    }

    #[test]
    fn relative_days() {
        let t = match_relative("visit TOMORROW at 11 AM", today()).unwrap();
        assert_eq!((t.month(), t.day(), t.hour()), (1, 21, 11));
        let t = match_relative("meeting today at 12 am", today()).unwrap();
        assert_eq!((t.day(), t.hour()), (20, 0));
    }

    #[test]
    fn meridiem_edges() {
        assert_eq!(to_24_hour(12, Some("PM")), 12);
        assert_eq!(to_24_hour(12, Some("am")), 0);
        assert_eq!(to_24_hour(7, Some("pm")), 19);
        assert_eq!(to_24_hour(7, None), 7);
    }

    #[test]
    fn no_time_in_text() {
        assert!(extract_scheduled_time("talked to customer, no update", today()).is_none());
        assert!(extract_scheduled_time("meeting next week", today()).is_none());
    }

    #[test]
    fn first_match_decides_even_when_invalid() {
        // 30 Feb 不存在，后面的 today 模式不会被使用
        assert!(extract_scheduled_time("30th Feb at 2 PM or today at 4 PM", today()).is_none());
        assert!(extract_scheduled_time("meeting 5th Feb at 25", today()).is_none());
        assert!(extract_scheduled_time("visit today at 13 PM", today()).is_none());
    }

    #[test]
    fn words_starting_with_a_month_are_not_months() {
        assert!(extract_scheduled_time("meeting with 3 marketing at 4 PM", today()).is_none());
        assert!(extract_scheduled_time("meeting 2 mayors at 3 PM", today()).is_none());
        assert!(extract_scheduled_time("visit decor 4 at 5 pm", today()).is_none());
        let t = extract_scheduled_time("visit on 3 September at 5 pm", today()).unwrap();
        assert_eq!((t.month(), t.day(), t.hour()), (9, 3, 17));
        let t = extract_scheduled_time("meeting June 7 at 10", today()).unwrap();
        assert_eq!((t.month(), t.day()), (6, 7));
    }

    #[test]
    fn numbers_glued_to_words_still_match() {
        let t = match_numeric("meeting on5/2 at 14:00", today()).unwrap();
        assert_eq!((t.month(), t.day(), t.hour()), (2, 5, 14));
    }

    #[test]
    fn month_names_are_case_insensitive() {
        assert_eq!(month_number("FEB"), Some(2));
        assert_eq!(month_number("September"), Some(9));
        assert_eq!(month_number("xyz"), None);
        assert_eq!(month_number("ja"), None);
    }
}
