//! Stateless feed cursors
//!
//! A cursor is the `pub_date` of the last rumor served, optionally with its
//! id as a tie-break. The token form is `<unix_micros>` or
//! `<unix_micros>:<id>`; RFC 3339 timestamps are also accepted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rumor_core::{Rumor, RumorError};
use serde::{Deserialize, Serialize};

/// Position after which the next feed page starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCursor {
    pub pub_date: DateTime<Utc>,
    pub id: Option<i64>,
}

impl FeedCursor {
    pub fn new(pub_date: DateTime<Utc>, id: Option<i64>) -> Self {
        Self { pub_date, id }
    }

    /// Cursor pointing just past this rumor
    pub fn after(rumor: &Rumor) -> Self {
        Self::new(rumor.pub_date, Some(rumor.id))
    }

    pub fn encode(&self) -> String {
        match self.id {
            Some(id) => format!("{}:{}", self.pub_date.timestamp_micros(), id),
            None => self.pub_date.timestamp_micros().to_string(),
        }
    }

    pub fn parse(token: &str) -> Result<Self, RumorError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(RumorError::validation("empty cursor"));
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(token) {
            return Ok(Self::new(ts.with_timezone(&Utc), None));
        }

        let bad = || RumorError::validation(format!("malformed cursor {:?}", token));
        let (micros, id) = match token.split_once(':') {
            Some((micros, id)) => (micros, Some(id.parse::<i64>().map_err(|_| bad())?)),
            None => (token, None),
        };
        let micros: i64 = micros.parse().map_err(|_| bad())?;
        let pub_date = DateTime::from_timestamp_micros(micros).ok_or_else(bad)?;
        Ok(Self::new(pub_date, id))
    }
}

impl fmt::Display for FeedCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for FeedCursor {
    type Err = RumorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One page of the public feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub rumors: Vec<Rumor>,
    pub has_more: bool,
    /// Token for the following page when `has_more` is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl FeedPage {
    /// Build a page from `limit + 1` fetched rows, trimming the probe row
    pub(crate) fn from_probe(mut rumors: Vec<Rumor>, limit: usize) -> Self {
        let has_more = rumors.len() > limit;
        rumors.truncate(limit);
        let next_cursor = if has_more {
            rumors.last().map(|r| FeedCursor::after(r).encode())
        } else {
            None
        };
        Self {
            rumors,
            has_more,
            next_cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cursor_token_forms() {
        let ts = Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap();
        let with_id = FeedCursor::new(ts, Some(42));
        assert_eq!(with_id.encode(), format!("{}:42", ts.timestamp_micros()));
        assert_eq!(FeedCursor::parse(&with_id.encode()).unwrap(), with_id);

        let bare = FeedCursor::parse(&ts.timestamp_micros().to_string()).unwrap();
        assert_eq!(bare, FeedCursor::new(ts, None));

        let rfc = FeedCursor::parse("2024-07-15T12:00:00Z").unwrap();
        assert_eq!(rfc.pub_date, ts);
        assert_eq!(rfc.id, None);
    }

    #[test]
    fn test_malformed_cursor_is_validation_error() {
        for token in ["", "yesterday", "123:abc", ":5"] {
            let err = FeedCursor::parse(token).unwrap_err();
            assert!(matches!(err, RumorError::Validation(_)), "token {:?}", token);
        }
    }
}
