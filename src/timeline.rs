//! 计算某个时间点在一年 / 一个月中所处的位置
//!
//! 统一按北京时间（UTC+8）划分年、月边界，与服务器本地时区无关。

use chrono::{DateTime, Datelike, FixedOffset, TimeZone, Utc};
use thiserror::Error;
use tracing::debug;

const BEIJING_OFFSET_SECS: i32 = 8 * 3600;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimelineError {
    #[error("时间点不在区间内")]
    OutOfBounds,

    #[error("无法构造日期: {0}-{1}")]
    InvalidDate(i32, u32),
}

/// 北京时间
pub fn beijing() -> FixedOffset {
    FixedOffset::east_opt(BEIJING_OFFSET_SECS).expect("UTC+8 是合法的时区偏移")
}

pub fn now_in_beijing() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&beijing())
}

/// `t` 在 `[start, end]` 中的位置，保留 4 位小数
pub fn progress<Tz: TimeZone>(
    t: &DateTime<Tz>,
    start: &DateTime<Tz>,
    end: &DateTime<Tz>,
) -> Result<f64, TimelineError> {
    let point = t.timestamp();
    let (start, end) = (start.timestamp(), end.timestamp());

    if point < start || point > end || end <= start {
        return Err(TimelineError::OutOfBounds);
    }

    let ratio = (point - start) as f64 / (end - start) as f64;
    let rounded = (ratio * 10000.0).round() / 10000.0;

    // 区间末尾的几秒会被四舍五入成 1，但那时还没有真正到达终点
    if rounded >= 1.0 && point < end {
        return Ok(0.9999);
    }

    Ok(rounded)
}

/// 今年已经过去的比例
pub fn year_progress(now: &DateTime<FixedOffset>) -> Result<f64, TimelineError> {
    let tz = beijing();
    let local = now.with_timezone(&tz);
    let year = local.year();

    let start = month_start(&tz, year, 1)?;
    let end = month_start(&tz, year + 1, 1)?;

    let ratio = progress(&local, &start, &end)?;
    debug!("progress of {} is {}", year, ratio);
    Ok(ratio)
}

/// 本月已经过去的比例
pub fn month_progress(now: &DateTime<FixedOffset>) -> Result<f64, TimelineError> {
    let tz = beijing();
    let local = now.with_timezone(&tz);
    let (year, month) = (local.year(), local.month());
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };

    let start = month_start(&tz, year, month)?;
    let end = month_start(&tz, next_year, next_month)?;

    let ratio = progress(&local, &start, &end)?;
    debug!("progress of {}-{:02} is {}", year, month, ratio);
    Ok(ratio)
}

/// 比例换算成向下取整的百分数，例如 0.4839 -> 48
pub fn percent(ratio: f64) -> u32 {
    // 先换成整数万分位，避免 0.29 * 100 = 28.999... 这类误差
    let basis_points = (ratio * 10000.0).round().max(0.0) as u32;
    basis_points / 100
}

fn month_start(
    tz: &FixedOffset,
    year: i32,
    month: u32,
) -> Result<DateTime<FixedOffset>, TimelineError> {
    tz.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .ok_or(TimelineError::InvalidDate(year, month))
}
