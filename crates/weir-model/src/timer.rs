use chrono::Duration;
use serde::{Deserialize, Serialize};

/// A parsed timer definition.
///
/// A fixed duration (`PT10S`) becomes a one-shot interval with a repetition
/// count of 1. A cycle (`R3/PT10S`) repeats a bounded number of times and
/// `R/PT10S` repeats without bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatingInterval {
    /// Remaining repetitions; `None` means unbounded
    pub repetitions: Option<u32>,

    /// Interval between firings, in milliseconds
    pub interval_ms: i64,
}

impl RepeatingInterval {
    /// One-shot interval for a fixed duration.
    pub fn once(interval: Duration) -> Self {
        Self {
            repetitions: Some(1),
            interval_ms: interval.num_milliseconds(),
        }
    }

    /// The interval as a chrono duration.
    pub fn interval(&self) -> Duration {
        Duration::milliseconds(self.interval_ms)
    }

    /// Parse a timer expression: either an ISO-8601 duration or a
    /// `R[n]/<duration>` cycle.
    pub fn parse(expression: &str) -> Result<Self, String> {
        if let Some(rest) = expression.strip_prefix('R') {
            let (count, duration) = rest
                .split_once('/')
                .ok_or_else(|| "cycle is missing the '/' separator".to_string())?;

            let repetitions = if count.is_empty() {
                None
            } else {
                let n: u32 = count
                    .parse()
                    .map_err(|_| format!("invalid repetition count '{}'", count))?;
                if n == 0 {
                    return Err("repetition count must be at least 1".to_string());
                }
                Some(n)
            };

            Ok(Self {
                repetitions,
                interval_ms: parse_duration(duration)?.num_milliseconds(),
            })
        } else {
            Ok(Self::once(parse_duration(expression)?))
        }
    }
}

/// Parse an ISO-8601 duration of the form `P[nD]T[nH][nM][nS]`.
///
/// Only day and sub-day designators are supported; months and years have no
/// fixed length and are rejected.
fn parse_duration(expression: &str) -> Result<Duration, String> {
    let rest = expression
        .strip_prefix('P')
        .ok_or_else(|| format!("duration '{}' must start with 'P'", expression))?;

    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, t),
        None => (rest, ""),
    };

    if date_part.is_empty() && time_part.is_empty() {
        return Err("duration has no components".to_string());
    }

    let mut total = Duration::zero();
    for (value, designator) in segments(date_part)? {
        total = total
            + match designator {
                'D' => Duration::days(value),
                'W' => Duration::weeks(value),
                other => return Err(format!("unsupported date designator '{}'", other)),
            };
    }
    for (value, designator) in segments(time_part)? {
        total = total
            + match designator {
                'H' => Duration::hours(value),
                'M' => Duration::minutes(value),
                'S' => Duration::seconds(value),
                other => return Err(format!("unsupported time designator '{}'", other)),
            };
    }

    if total <= Duration::zero() {
        return Err("duration must be positive".to_string());
    }

    Ok(total)
}

/// Split `10H30M` into `[(10, 'H'), (30, 'M')]`.
fn segments(part: &str) -> Result<Vec<(i64, char)>, String> {
    let mut out = Vec::new();
    let mut digits = String::new();

    for c in part.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            if digits.is_empty() {
                return Err(format!("designator '{}' has no value", c));
            }
            let value: i64 = digits
                .parse()
                .map_err(|_| format!("invalid number '{}'", digits))?;
            out.push((value, c));
            digits.clear();
        }
    }

    if !digits.is_empty() {
        return Err(format!("trailing digits '{}' without a designator", digits));
    }

    Ok(out)
}
