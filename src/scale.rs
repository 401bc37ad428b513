use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::series::Point;

const SECOND: f64 = 1.0;
const MINUTE: f64 = 60.0;
const HOUR: f64 = 3600.0;
const DAY: f64 = 86_400.0;
const WEEK: f64 = 7.0 * DAY;
const MONTH: f64 = 30.0 * DAY;
const YEAR: f64 = 365.0 * DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    Second(u32),
    Minute(u32),
    Hour(u32),
    Day(u32),
    Week,
    Month(u32),
    Year(u32),
}

const STEPS: [(f64, Interval); 18] = [
    (SECOND, Interval::Second(1)),
    (5.0 * SECOND, Interval::Second(5)),
    (15.0 * SECOND, Interval::Second(15)),
    (30.0 * SECOND, Interval::Second(30)),
    (MINUTE, Interval::Minute(1)),
    (5.0 * MINUTE, Interval::Minute(5)),
    (15.0 * MINUTE, Interval::Minute(15)),
    (30.0 * MINUTE, Interval::Minute(30)),
    (HOUR, Interval::Hour(1)),
    (3.0 * HOUR, Interval::Hour(3)),
    (6.0 * HOUR, Interval::Hour(6)),
    (12.0 * HOUR, Interval::Hour(12)),
    (DAY, Interval::Day(1)),
    (2.0 * DAY, Interval::Day(2)),
    (WEEK, Interval::Week),
    (MONTH, Interval::Month(1)),
    (3.0 * MONTH, Interval::Month(3)),
    (YEAR, Interval::Year(1)),
];

impl Interval {
    /// Picks the candidate interval closest to `span / count`.
    pub fn for_span(span_secs: f64, count: usize) -> Interval {
        let target = span_secs / count.max(1) as f64;
        let i = STEPS.partition_point(|(d, _)| *d <= target);
        if i == 0 {
            return Interval::Second(1);
        }
        if i == STEPS.len() {
            let years = tick_step(0.0, span_secs / YEAR, count).round().max(1.0);
            return Interval::Year(years as u32);
        }
        let (lo, lo_iv) = STEPS[i - 1];
        let (hi, hi_iv) = STEPS[i];
        if target / lo < hi / target { lo_iv } else { hi_iv }
    }

    fn floor(self, t: NaiveDateTime) -> NaiveDateTime {
        let date = t.date();
        match self {
            Interval::Second(_) => t.with_nanosecond(0).unwrap_or(t),
            Interval::Minute(_) => date.and_hms_opt(t.hour(), t.minute(), 0).unwrap_or(t),
            Interval::Hour(_) => date.and_hms_opt(t.hour(), 0, 0).unwrap_or(t),
            Interval::Day(_) => midnight(date),
            Interval::Week => {
                let back = date.weekday().num_days_from_sunday() as i64;
                midnight(date - Duration::days(back))
            }
            Interval::Month(_) => midnight(date.with_day(1).unwrap_or(date)),
            Interval::Year(_) => {
                midnight(NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date))
            }
        }
    }

    fn next(self, t: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Interval::Second(_) => t.checked_add_signed(Duration::seconds(1)),
            Interval::Minute(_) => t.checked_add_signed(Duration::minutes(1)),
            Interval::Hour(_) => t.checked_add_signed(Duration::hours(1)),
            Interval::Day(_) => t.checked_add_signed(Duration::days(1)),
            Interval::Week => t.checked_add_signed(Duration::weeks(1)),
            Interval::Month(_) => t.checked_add_months(Months::new(1)),
            Interval::Year(_) => t.checked_add_months(Months::new(12)),
        }
    }

    fn aligned(self, t: NaiveDateTime) -> bool {
        match self {
            Interval::Second(n) => t.second() % n == 0,
            Interval::Minute(n) => t.minute() % n == 0,
            Interval::Hour(n) => t.hour() % n == 0,
            Interval::Day(n) => t.day0() % n == 0,
            Interval::Week => true,
            Interval::Month(n) => t.month0() % n == 0,
            Interval::Year(n) => t.year().rem_euclid(n as i32) == 0,
        }
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::default())
}

fn seconds(t: NaiveDateTime) -> f64 {
    t.and_utc().timestamp_millis() as f64 / 1000.0
}

/// Maps a datetime domain linearly onto `[0, width]`.
#[derive(Debug, Clone, Copy)]
pub struct TimeScale {
    t0: NaiveDateTime,
    t1: NaiveDateTime,
    width: f64,
}

impl TimeScale {
    pub fn new(t0: NaiveDateTime, t1: NaiveDateTime, width: f64) -> Self {
        if t0 == t1 {
            let pad = Duration::hours(1);
            return Self { t0: t0 - pad, t1: t1 + pad, width };
        }
        Self { t0, t1, width }
    }

    pub fn apply(&self, t: NaiveDateTime) -> f64 {
        let s0 = seconds(self.t0);
        (seconds(t) - s0) / (seconds(self.t1) - s0) * self.width
    }

    pub fn invert(&self, x: f64) -> NaiveDateTime {
        let s0 = seconds(self.t0);
        let s = s0 + x / self.width * (seconds(self.t1) - s0);
        DateTime::from_timestamp_millis((s * 1000.0).round() as i64)
            .map(|d| d.naive_utc())
            .unwrap_or(self.t0)
    }

    pub fn ticks(&self, count: usize) -> Vec<NaiveDateTime> {
        let interval = Interval::for_span(seconds(self.t1) - seconds(self.t0), count);
        let mut out = Vec::new();
        let mut t = interval.floor(self.t0);
        while t <= self.t1 {
            if t >= self.t0 && interval.aligned(t) {
                out.push(t);
            }
            match interval.next(t) {
                Some(n) => t = n,
                None => break,
            }
        }
        out
    }
}

/// Label for a time tick, choosing the coarsest unit the tick sits on.
pub fn time_tick_format(t: NaiveDateTime) -> String {
    let fmt = if t.second() != 0 {
        ":%S"
    } else if t.minute() != 0 {
        "%I:%M"
    } else if t.hour() != 0 {
        "%I %p"
    } else if t.weekday().num_days_from_sunday() != 0 && t.day() != 1 {
        "%a %d"
    } else if t.day() != 1 {
        "%b %d"
    } else if t.month() != 1 {
        "%B"
    } else {
        "%Y"
    };
    t.format(fmt).to_string()
}

/// Maps `[0, max]` onto `[height, 0]` so larger values sit higher.
#[derive(Debug, Clone, Copy)]
pub struct LinearScale {
    max: f64,
    height: f64,
}

impl LinearScale {
    pub fn new(max: f64, height: f64) -> Self {
        Self { max, height }
    }

    pub fn apply(&self, v: f64) -> f64 {
        let span = if self.max == 0.0 { 1.0 } else { self.max };
        self.height - v / span * self.height
    }

    pub fn ticks(&self, count: usize) -> Vec<f64> {
        let (lo, hi) = if self.max < 0.0 { (self.max, 0.0) } else { (0.0, self.max) };
        let step = tick_step(lo, hi, count);
        if !step.is_finite() || step <= 0.0 {
            return vec![lo];
        }
        let k0 = (lo / step).ceil() as i64;
        let k1 = (hi / step).floor() as i64;
        (k0..=k1).map(|k| k as f64 * step).collect()
    }

    pub fn tick_format(&self, count: usize) -> impl Fn(f64) -> String {
        let (lo, hi) = if self.max < 0.0 { (self.max, 0.0) } else { (0.0, self.max) };
        let step = tick_step(lo, hi, count);
        let precision = if step.is_finite() && step > 0.0 {
            (-(step.log10() + 0.01).floor()).max(0.0) as usize
        } else {
            0
        };
        move |v| format_grouped(v, precision)
    }
}

/// Power of ten scaled by 1, 2, 5 or 10, giving roughly `count` steps.
pub fn tick_step(lo: f64, hi: f64, count: usize) -> f64 {
    let span = hi - lo;
    let m = count.max(1) as f64;
    let mut step = 10f64.powf((span / m).log10().floor());
    let err = m / span * step;
    if err <= 0.15 {
        step *= 10.0;
    } else if err <= 0.35 {
        step *= 5.0;
    } else if err <= 0.75 {
        step *= 2.0;
    }
    step
}

/// Fixed-precision number with comma thousands separators.
pub fn format_grouped(v: f64, precision: usize) -> String {
    let raw = format!("{:.*}", precision, v.abs());
    let (int, frac) = match raw.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (raw.as_str(), None),
    };
    let mut grouped = String::new();
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let negative = v < 0.0 && raw.chars().any(|c| c.is_ascii_digit() && c != '0');
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(f) = frac {
        out.push('.');
        out.push_str(f);
    }
    out
}

/// Index of the point closest to `t`; ties go to the earlier point.
pub fn nearest_index(points: &[Point], t: NaiveDateTime) -> Option<usize> {
    match points.len() {
        0 => None,
        1 => Some(0),
        n => {
            let i = points.partition_point(|p| p.datetime < t).clamp(1, n - 1);
            let d0 = &points[i - 1];
            let d1 = &points[i];
            if t - d0.datetime > d1.datetime - t { Some(i) } else { Some(i - 1) }
        }
    }
}
