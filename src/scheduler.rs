use chrono::{DateTime, Days, FixedOffset, NaiveTime, TimeDelta, TimeZone};
use std::future::Future;
use tracing::info;

use crate::timeline::{beijing, now_in_beijing};

/// 下一次执行时间：今天的 `at` 还没到就是今天，否则是明天
pub fn next_run_after(now: &DateTime<FixedOffset>, at: NaiveTime) -> DateTime<FixedOffset> {
    let tz = beijing();
    let local = now.with_timezone(&tz);

    let today = at_local(&tz, local.date_naive().and_time(at));
    if today > local {
        return today;
    }

    match local.date_naive().checked_add_days(Days::new(1)) {
        Some(tomorrow) => at_local(&tz, tomorrow.and_time(at)),
        None => today + TimeDelta::days(1),
    }
}

// 固定偏移的时区下本地时间总是唯一的
fn at_local(tz: &FixedOffset, naive: chrono::NaiveDateTime) -> DateTime<FixedOffset> {
    let utc = naive - TimeDelta::seconds(i64::from(tz.local_minus_utc()));
    tz.from_utc_datetime(&utc)
}

/// 距离下一次执行还要等待多久
pub fn delay_until_next(now: &DateTime<FixedOffset>, at: NaiveTime) -> std::time::Duration {
    (next_run_after(now, at) - *now)
        .to_std()
        .unwrap_or_default()
}

/// 每天北京时间 `at` 执行一次 `job`，永不返回
///
/// 任务自己负责处理和记录错误，一次失败不影响第二天。
pub async fn run_daily<F, Fut>(at: NaiveTime, mut job: F)
where
    F: FnMut(DateTime<FixedOffset>) -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let now = now_in_beijing();
        let next = next_run_after(&now, at);
        info!("⏰ 下一次推送时间: {}", next.format("%Y-%m-%d %H:%M:%S %:z"));

        tokio::time::sleep(delay_until_next(&now, at)).await;
        job(now_in_beijing()).await;
    }
}
