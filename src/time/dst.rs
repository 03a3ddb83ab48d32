//! United States daylight saving time rules.
//!
//! DST begins at local 02:00 on the second Sunday of March and ends at local
//! 02:00 on the first Sunday of November. All functions here are pure and take
//! the *standard-time* local date and hour, i.e. UTC plus the fixed offset with
//! no DST applied.

/// Weekday index where Sunday is 0.
pub const SUNDAY: u32 = 0;

/// Hour at which both the spring and fall changes happen.
const CHANGE_HOUR: u32 = 2;

/// Day of week using Sakamoto's method. Returns 0 for Sunday through 6 for
/// Saturday. `month` is 1-based.
pub fn weekday(year: i32, month: u32, day: u32) -> u32 {
    const T: [i32; 12] = [0, 3, 2, 5, 0, 3, 5, 1, 4, 6, 2, 4];
    let y = if month < 3 { year - 1 } else { year };
    let m = (month.clamp(1, 12) - 1) as usize;
    (y + y.div_euclid(4) - y.div_euclid(100) + y.div_euclid(400) + T[m] + day as i32)
        .rem_euclid(7) as u32
}

/// Day of month of the `n`th occurrence of `target_weekday` in the month.
///
/// Scans days 1..=7 for the first match and adds `7 * (n - 1)`. Returns `None`
/// when `n` is zero; callers ask only for occurrences that always exist.
pub fn nth_weekday_of_month(year: i32, month: u32, target_weekday: u32, n: u32) -> Option<u32> {
    if n == 0 {
        return None;
    }
    (1..=7)
        .find(|&d| weekday(year, month, d) == target_weekday)
        .map(|first| first + 7 * (n - 1))
}

/// Pack a date and hour into one comparable integer, `YYYYMMDDHH`.
pub fn pack(year: i32, month: u32, day: u32, hour: u32) -> i64 {
    year as i64 * 1_000_000 + month as i64 * 10_000 + day as i64 * 100 + hour as i64
}

/// Day of month DST starts (second Sunday of March).
pub fn dst_start_day(year: i32) -> u32 {
    nth_weekday_of_month(year, 3, SUNDAY, 2).unwrap_or(8)
}

/// Day of month DST ends (first Sunday of November).
pub fn dst_end_day(year: i32) -> u32 {
    nth_weekday_of_month(year, 11, SUNDAY, 1).unwrap_or(1)
}

/// Whether US daylight saving time is in effect at the given standard-time
/// local date and hour.
///
/// The spring-forward gap (02:00-02:59 never happens locally) falls out of the
/// packed comparison: hours before 02:00 on the start date are not DST. The
/// repeated 01:00-01:59 on the end date is reported as *not* DST every time,
/// so the hour is treated as already reverted.
pub fn is_dst(year: i32, month: u32, day: u32, hour: u32) -> bool {
    let end_day = dst_end_day(year);
    if month == 11 && day == end_day && hour == 1 {
        return false;
    }

    let now = pack(year, month, day, hour);
    let start = pack(year, 3, dst_start_day(year), CHANGE_HOUR);
    let end = pack(year, 11, end_day, CHANGE_HOUR);
    start <= now && now < end
}
