//! Lap time parsing and ordering.
//!
//! Times travel through the system as the exact strings drivers submitted;
//! parsing happens at comparison points only. The accepted grammar is
//! `M:SS.mmm` or `S.mmm` with nothing optional: two second digits under a
//! minute marker, exactly three millisecond digits.

use std::fmt;

/// A parsed lap time.
///
/// `Unparseable` sorts after every finite time, so records with malformed
/// times sink to the bottom of any field and never win a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LapTime {
    Millis(u64),
    Unparseable,
}

impl LapTime {
    pub fn is_parseable(&self) -> bool {
        matches!(self, LapTime::Millis(_))
    }
}

impl fmt::Display for LapTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LapTime::Millis(ms) => {
                let minutes = ms / 60_000;
                let seconds = (ms % 60_000) / 1000;
                let millis = ms % 1000;
                if minutes > 0 {
                    write!(f, "{minutes}:{seconds:02}.{millis:03}")
                } else {
                    write!(f, "{seconds}.{millis:03}")
                }
            }
            LapTime::Unparseable => write!(f, "-"),
        }
    }
}

/// Parses a lap time string.
///
/// Any deviation from the grammar returns `Unparseable` rather than an
/// error; whether that is acceptable depends on the call site.
pub fn parse_lap_time(raw: &str) -> LapTime {
    let raw = raw.trim();

    let Some((whole, fraction)) = raw.rsplit_once('.') else {
        return LapTime::Unparseable;
    };
    if fraction.len() != 3 {
        return LapTime::Unparseable;
    }
    let Some(millis) = digits(fraction) else {
        return LapTime::Unparseable;
    };

    let total_seconds = match whole.split_once(':') {
        Some((minutes, seconds)) => {
            if minutes.is_empty() || seconds.len() != 2 {
                return LapTime::Unparseable;
            }
            let (Some(minutes), Some(seconds)) = (digits(minutes), digits(seconds)) else {
                return LapTime::Unparseable;
            };
            if seconds >= 60 {
                return LapTime::Unparseable;
            }
            match minutes.checked_mul(60).and_then(|m| m.checked_add(seconds)) {
                Some(total) => total,
                None => return LapTime::Unparseable,
            }
        }
        None => {
            if whole.is_empty() {
                return LapTime::Unparseable;
            }
            match digits(whole) {
                Some(seconds) => seconds,
                None => return LapTime::Unparseable,
            }
        }
    };

    match total_seconds
        .checked_mul(1000)
        .and_then(|ms| ms.checked_add(millis))
    {
        Some(ms) => LapTime::Millis(ms),
        None => LapTime::Unparseable,
    }
}

/// Parses a run of ASCII digits; anything else (signs, whitespace, unicode
/// digits) is rejected.
fn digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut value: u64 = 0;
    for b in s.bytes() {
        value = value
            .checked_mul(10)?
            .checked_add(u64::from(b - b'0'))?;
    }
    Some(value)
}
