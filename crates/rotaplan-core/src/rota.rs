//! Rota configuration.
//!
//! The rota is described by a YAML file (`config.yaml` by default):
//!
//! ```yaml
//! startDate: 2024-11-03
//! calendarID: team@group.calendar.google.com
//! shiftDuration: 1
//! description: Primary on-call
//! notify: true
//! title: "{{.Name}} on duty"
//! attachments:
//!   - name: Runbook
//!     url: https://example.com/runbook
//! members:
//!   - name: Ada
//!     email: ada@example.com
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::schedule::weeks_after;

/// Title used when the rota file does not set one.
pub const DEFAULT_TITLE: &str = "{{.Name}} on duty";

/// Errors raised while reading or validating a rota file.
#[derive(Debug, Error)]
pub enum RotaError {
    /// The file could not be read.
    #[error("failed to read rota config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML or does not match the expected shape.
    #[error("failed to parse rota config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The file parsed but describes an unusable rota.
    #[error("invalid rota config: {0}")]
    Invalid(String),
}

impl RotaError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// A person taking part in the rota.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Member {
    pub name: String,
    pub email: String,
}

impl Member {
    /// Creates a new member.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.email)
    }
}

/// A link attached to every shift event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

/// The calendar to use, the rota members and the shift parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotaConfig {
    /// First day of the first shift.
    #[serde(deserialize_with = "deserialize_start_date")]
    pub start_date: NaiveDate,

    /// Members in shift order.
    #[serde(default)]
    pub members: Vec<Member>,

    /// Target calendar identifier.
    #[serde(rename = "calendarID", default)]
    pub calendar_id: String,

    /// Length of a shift in weeks.
    #[serde(default = "default_shift_duration")]
    pub shift_duration: u32,

    /// Event description.
    #[serde(default)]
    pub description: Option<String>,

    /// Send invitation emails to attendees.
    #[serde(default)]
    pub notify: bool,

    /// Event title template, see [`TitleTemplate`].
    #[serde(default)]
    pub title: Option<String>,

    /// Links attached to every event.
    #[serde(default)]
    pub attachments: Vec<Attachment>,

    /// Time zone of the all-day events.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
}

fn default_shift_duration() -> u32 {
    1
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

/// Accepts either a plain date or a full RFC 3339 timestamp.
fn deserialize_start_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .map_err(|_| {
            serde::de::Error::custom(format!(
                "invalid startDate {raw:?}: expected YYYY-MM-DD or an RFC 3339 timestamp"
            ))
        })
}

impl RotaConfig {
    /// Loads and validates a rota file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RotaError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| RotaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parses and validates a rota from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, RotaError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the rota can be turned into events.
    pub fn validate(&self) -> Result<(), RotaError> {
        if self.calendar_id.trim().is_empty() {
            return Err(RotaError::invalid("calendarID is required"));
        }
        if self.members.is_empty() {
            return Err(RotaError::invalid("at least one member is required"));
        }
        if self.shift_duration == 0 {
            return Err(RotaError::invalid("shiftDuration must be at least 1 week"));
        }
        let cycle_weeks = i64::try_from(self.members.len())
            .ok()
            .and_then(|members| members.checked_mul(i64::from(self.shift_duration)));
        if cycle_weeks
            .and_then(|weeks| weeks_after(self.start_date, weeks))
            .is_none()
        {
            return Err(RotaError::invalid(
                "shiftDuration is too long: the rota ends past the supported date range",
            ));
        }
        for member in &self.members {
            if member.name.trim().is_empty() {
                return Err(RotaError::invalid("member name must not be empty"));
            }
            if member.email.trim().is_empty() {
                return Err(RotaError::invalid(format!(
                    "member {} has no email address",
                    member.name
                )));
            }
        }
        for attachment in &self.attachments {
            if attachment.url.trim().is_empty() {
                return Err(RotaError::invalid(format!(
                    "attachment {:?} has no url",
                    attachment.name
                )));
            }
        }
        self.title_template()?;
        Ok(())
    }

    /// Returns the parsed title template.
    pub fn title_template(&self) -> Result<TitleTemplate, RotaError> {
        TitleTemplate::parse(self.title.as_deref().unwrap_or(DEFAULT_TITLE))
    }
}

/// A member field a title template can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    Email,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// An event title with `{{.Name}}` / `{{.Email}}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleTemplate {
    segments: Vec<Segment>,
}

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("Invalid placeholder regex")
});

impl TitleTemplate {
    /// Parses a template, rejecting unknown placeholders.
    pub fn parse(template: &str) -> Result<Self, RotaError> {
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in PLACEHOLDER_RE.captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Literal(template[last..whole.start()].to_string()));
            }
            let field = match name.as_str() {
                "Name" => Field::Name,
                "Email" | "EmailAddr" => Field::Email,
                other => {
                    return Err(RotaError::invalid(format!(
                        "unknown title placeholder {{{{.{other}}}}}; use {{{{.Name}}}} or {{{{.Email}}}}"
                    )));
                }
            };
            segments.push(Segment::Field(field));
            last = whole.end();
        }
        if last < template.len() {
            segments.push(Segment::Literal(template[last..].to_string()));
        }
        Ok(Self { segments })
    }

    /// Renders the title for a member.
    pub fn render(&self, member: &Member) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::Field(Field::Name) => member.name.as_str(),
                Segment::Field(Field::Email) => member.email.as_str(),
            })
            .collect()
    }
}
