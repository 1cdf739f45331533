use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::zodiac::{self, SunSign};

const MAX_NAME_LEN: usize = 100;
const MAX_PLACE_LEN: usize = 200;
const MAX_DECISION_CONTEXT_LEN: usize = 2000;

/// Birth details as submitted by the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BirthInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub birth_date: String,
    #[serde(default)]
    pub birth_time: Option<String>,
    #[serde(default)]
    pub birth_place: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Validated, whitespace-normalized input. This is what gets persisted on the
/// record and what the idempotency key is derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedInput {
    pub name: String,
    pub birth_date: Date,
    /// `HH:MM`, 24 hour clock.
    pub birth_time: Option<String>,
    pub birth_place: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
    #[serde(default)]
    pub decision_context: Option<String>,
}

impl BirthInput {
    /// Validate and normalize. `today` bounds the birth date so that tests can
    /// pin the clock.
    pub fn normalize(
        &self,
        decision_context: Option<&str>,
        today: Date,
    ) -> Result<NormalizedInput, CoreError> {
        let name = collapse_whitespace(&self.name);
        if name.is_empty() {
            return Err(CoreError::MissingField("name"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(CoreError::invalid(
                "name",
                format!("must be at most {MAX_NAME_LEN} characters"),
            ));
        }

        let birth_date = parse_date(self.birth_date.trim())?;
        if birth_date > today {
            return Err(CoreError::invalid("birthDate", "must not be in the future"));
        }
        if birth_date.year() < 1900 {
            return Err(CoreError::invalid("birthDate", "must be 1900 or later"));
        }

        let birth_time = match self.birth_time.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_time(raw)?),
        };

        let birth_place = collapse_whitespace(&self.birth_place);
        if birth_place.is_empty() {
            return Err(CoreError::MissingField("birthPlace"));
        }
        if birth_place.chars().count() > MAX_PLACE_LEN {
            return Err(CoreError::invalid(
                "birthPlace",
                format!("must be at most {MAX_PLACE_LEN} characters"),
            ));
        }

        let (latitude, longitude) = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) {
                    return Err(CoreError::invalid("latitude", "must be within [-90, 90]"));
                }
                if !(-180.0..=180.0).contains(&lon) {
                    return Err(CoreError::invalid("longitude", "must be within [-180, 180]"));
                }
                (Some(lat), Some(lon))
            }
            (None, None) => (None, None),
            _ => {
                return Err(CoreError::invalid(
                    "latitude",
                    "latitude and longitude must be supplied together",
                ));
            }
        };

        let timezone = self
            .timezone
            .as_deref()
            .map(str::trim)
            .filter(|tz| !tz.is_empty())
            .map(str::to_string);

        let decision_context = match decision_context.map(collapse_whitespace) {
            Some(ctx) if ctx.is_empty() => None,
            Some(ctx) if ctx.chars().count() > MAX_DECISION_CONTEXT_LEN => {
                return Err(CoreError::invalid(
                    "decisionContext",
                    format!("must be at most {MAX_DECISION_CONTEXT_LEN} characters"),
                ));
            }
            other => other,
        };

        Ok(NormalizedInput {
            name,
            birth_date,
            birth_time,
            birth_place,
            latitude,
            longitude,
            timezone,
            decision_context,
        })
    }
}

impl NormalizedInput {
    /// True when the chart has to be computed from fallback data: a noon
    /// chart without birth time, or no houses without coordinates.
    pub fn is_degraded(&self) -> bool {
        self.birth_time.is_none() || self.latitude.is_none()
    }

    pub fn sun_sign(&self) -> SunSign {
        zodiac::sun_sign(self.birth_date.month(), self.birth_date.day())
    }

    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_date(raw: &str) -> Result<Date, CoreError> {
    let invalid = || CoreError::invalid("birthDate", format!("expected YYYY-MM-DD, got {raw:?}"));

    let mut parts = raw.splitn(3, '-');
    let (Some(y), Some(m), Some(d)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    if y.len() != 4 || m.len() != 2 || d.len() != 2 {
        return Err(invalid());
    }
    let year: i16 = y.parse().map_err(|_| invalid())?;
    let month: i8 = m.parse().map_err(|_| invalid())?;
    let day: i8 = d.parse().map_err(|_| invalid())?;

    Date::new(year, month, day).map_err(|_| invalid())
}

fn parse_time(raw: &str) -> Result<String, CoreError> {
    let invalid = || CoreError::invalid("birthTime", format!("expected HH:MM, got {raw:?}"));

    let (h, m) = raw.split_once(':').ok_or_else(invalid)?;
    let hour: u8 = h.parse().map_err(|_| invalid())?;
    let minute: u8 = m.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 || m.len() != 2 {
        return Err(invalid());
    }
    Ok(format!("{hour:02}:{minute:02}"))
}
