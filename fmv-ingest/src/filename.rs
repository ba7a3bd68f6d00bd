//! Output file names with `%{date=<strftime>}` tokens.

use std::fmt::Write;

use chrono::{DateTime, TimeZone};
use log::debug;

const PREFIX: &str = "%{date=";
const SUFFIX: char = '}';

/// Template such as `mission-%{date=%Y%m%d-%H%M%S}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameTemplate(String);

impl FilenameTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Replace every date token with `now` formatted by its pattern. The
    /// remaining text is kept as is once a token cannot be expanded.
    pub fn expand<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        let mut out = String::with_capacity(self.0.len());
        let mut rest = self.0.as_str();

        while let Some(start) = rest.find(PREFIX) {
            let after = &rest[start + PREFIX.len()..];
            let Some(end) = after.find(SUFFIX).filter(|&end| end > 0) else {
                break;
            };
            let pattern = &after[..end];

            let mut formatted = String::new();
            if write!(formatted, "{}", now.format(pattern)).is_err() {
                debug!("Unable to expand date token: template={}", self.0);
                break;
            }
            out.push_str(&rest[..start]);
            out.push_str(&formatted);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        out
    }
}

impl Default for FilenameTemplate {
    fn default() -> Self {
        Self::new("fmv-%{date=%Y%m%dT%H%M%S}")
    }
}
