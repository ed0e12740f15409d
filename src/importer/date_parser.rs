// ==========================================
// 参考数据导入引擎 - 宽松日期解析
// ==========================================
// 顺序（首个成功即返回）:
// 1. 通用解析: RFC 3339 / RFC 2822 / ISO `T` / 紧凑数字 / 英文月份名 / today 等关键字
// 2. 显式格式表: ISO Y-M-D、D-M-Y、M-D-Y × 分隔符 `-` `/` `.` × 有无时分秒
// 歧义日期按"日在前"解释（D-M-Y 先于 M-D-Y）
// ==========================================

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};

/// 显式日期格式（按优先级）
const DATE_FORMATS: [&str; 9] = [
    "%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", // ISO
    "%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y", // 日-月-年
    "%m-%d-%Y", "%m/%d/%Y", "%m.%d.%Y", // 月-日-年
];

/// 时间后缀
const TIME_SUFFIXES: [&str; 4] = [" %H:%M:%S", " %H:%M", "T%H:%M:%S", "T%H:%M"];

/// 通用解析使用的日期时间格式
const NATURAL_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y%m%d%H%M%S",
    "%d %B %Y %H:%M:%S",
    "%B %d, %Y %H:%M:%S",
];

/// 通用解析使用的日期格式（%B 同时接受全称与缩写）
const NATURAL_DATE_FORMATS: [&str; 8] = [
    "%Y%m%d",
    "%d %B %Y",
    "%d %B, %Y",
    "%B %d %Y",
    "%B %d, %Y",
    "%d-%B-%Y",
    "%A, %d %B %Y",
    "%A, %B %d, %Y",
];

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// 通用解析（自然语言层）
fn parse_natural(value: &str) -> Option<NaiveDateTime> {
    let lower = value.trim().to_lowercase();
    let today = Local::now().date_naive();
    match lower.as_str() {
        "now" => return Some(Local::now().naive_local()),
        "today" => return Some(midnight(today)),
        "yesterday" => return Some(midnight(today - Duration::days(1))),
        "tomorrow" => return Some(midnight(today + Duration::days(1))),
        _ => {}
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.naive_local());
    }

    NATURAL_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NATURAL_DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .map(midnight)
        })
}

/// 显式格式表（带时间）
fn parse_explicit_datetime(value: &str) -> Option<NaiveDateTime> {
    DATE_FORMATS.iter().find_map(|date_fmt| {
        TIME_SUFFIXES.iter().find_map(|time_fmt| {
            NaiveDateTime::parse_from_str(value, &format!("{}{}", date_fmt, time_fmt)).ok()
        })
    })
}

/// 显式格式表（仅日期）
fn parse_explicit_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

/// 宽松解析日期
pub fn parse_flexible_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    parse_natural(value)
        .map(|dt| dt.date())
        .or_else(|| parse_explicit_date(value))
        .or_else(|| parse_explicit_datetime(value).map(|dt| dt.date()))
}

/// 宽松解析日期时间（仅日期时补零点）
pub fn parse_flexible_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    parse_natural(value)
        .or_else(|| parse_explicit_datetime(value))
        .or_else(|| parse_explicit_date(value).map(midnight))
}

/// 按指定格式解析日期（格式只含日期或同时含时间均可）
pub fn parse_date_with_format(value: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, format)
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, format)
                .ok()
                .map(|dt| dt.date())
        })
}

/// 按指定格式解析日期时间
pub fn parse_datetime_with_format(value: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, format)
        .ok()
        .or_else(|| NaiveDate::parse_from_str(value, format).ok().map(midnight))
}
