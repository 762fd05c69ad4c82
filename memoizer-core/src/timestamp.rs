//! Asof timestamp formatting
//!
//! Timestamps are rendered in the shortest of three fixed layouts that still
//! represents the value exactly:
//!
//! | layout | length |
//! |---|---|
//! | `YYYY-MM-DD` | 10 |
//! | `YYYY-MM-DD HH:MM:SS` | 19 |
//! | `YYYY-MM-DD HH:MM:SS.ffffff` | 26 |
//!
//! None of them contains `@`, which is what lets a node identity be split on
//! its last `@`.

use crate::error::TimestampError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, SubsecRound, Timelike};

/// Asof timestamps are naive (no timezone) and carry microsecond precision.
pub type Asof = NaiveDateTime;

const FMT_DATE: &str = "%Y-%m-%d";
const FMT_SECONDS: &str = "%Y-%m-%d %H:%M:%S";
const FMT_MICROS: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// The asof of the default context: `0001-01-01`.
pub fn min_asof() -> Asof {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::default())
}

/// Drop anything below microsecond precision.
pub fn truncate_asof(asof: Asof) -> Asof {
    asof.trunc_subsecs(6)
}

/// Format with the minimal exact layout.
pub fn format_asof(asof: &Asof) -> String {
    let asof = truncate_asof(*asof);
    if asof.nanosecond() != 0 {
        asof.format(FMT_MICROS).to_string()
    } else if asof.time() != NaiveTime::default() {
        asof.format(FMT_SECONDS).to_string()
    } else {
        asof.format(FMT_DATE).to_string()
    }
}

/// Parse a timestamp produced by [`format_asof`]; dispatches on length.
pub fn parse_asof(s: &str) -> Result<Asof, TimestampError> {
    let parse_err = |e: chrono::ParseError| TimestampError::Parse {
        value: s.to_string(),
        reason: e.to_string(),
    };
    match s.len() {
        10 => NaiveDate::parse_from_str(s, FMT_DATE)
            .map(|d| d.and_time(NaiveTime::default()))
            .map_err(parse_err),
        19 => NaiveDateTime::parse_from_str(s, FMT_SECONDS).map_err(parse_err),
        26 => NaiveDateTime::parse_from_str(s, FMT_MICROS).map_err(parse_err),
        _ => Err(TimestampError::UnrecognizedFormat {
            value: s.to_string(),
        }),
    }
}

/// Folder-safe variant of the formatted asof (`:` replaced by `-`).
pub fn asof_folder_name(asof: &Asof) -> String {
    format_asof(asof).replace(':', "-")
}
