//! Sunrise/sunset lookup used to pick the basemap light preset at load.
//!
//! The upstream API reports dawn/sunrise/dusk/sunset for a location as unix
//! timestamps; the current time is classified into one of the four light
//! presets against those reference points. The lookup happens once per
//! session load, never on a timer.

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

use crate::config::DaylightConfig;
use crate::models::MapMode;

#[derive(Debug, Error)]
pub enum DaylightError {
    #[error("Unix timestamp must be positive")]
    InvalidTimestamp,
    #[error("API request failed with status: {0}")]
    Status(u16),
    #[error("Invalid API response: missing results object")]
    MissingResults,
    #[error("Invalid {0} timestamp in API response")]
    InvalidField(&'static str),
    #[error("Network error: Unable to reach sunrise/sunset API")]
    Network(#[source] reqwest::Error),
}

/// Daylight reference points for one day, unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunTimes {
    pub dawn: i64,
    pub sunrise: i64,
    pub dusk: i64,
    pub sunset: i64,
}

/// Classify a moment against the daylight reference points.
///
/// Bands are half-open in source order: before dawn and from sunset on it is
/// night, dawn up to sunrise, day up to dusk, dusk up to sunset. Reference
/// ordering is not validated; the first matching band wins.
pub fn classify(now: i64, times: &SunTimes) -> MapMode {
    if now < times.dawn {
        MapMode::Night
    } else if now < times.sunrise {
        MapMode::Dawn
    } else if now < times.dusk {
        MapMode::Day
    } else if now < times.sunset {
        MapMode::Dusk
    } else {
        MapMode::Night
    }
}

/// Client for the sunrise/sunset API.
pub struct DaylightClient {
    client: Client,
    config: DaylightConfig,
}

impl DaylightClient {
    pub fn new(config: DaylightConfig) -> Result<Self, DaylightError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(DaylightError::Network)?;

        Ok(Self { client, config })
    }

    /// Resolve the light preset for `now_unix` at the configured location.
    pub async fn resolve_period(&self, now_unix: i64) -> Result<MapMode, DaylightError> {
        if now_unix < 0 {
            return Err(DaylightError::InvalidTimestamp);
        }

        let url = format!(
            "{}?lat={}&lng={}&time_format=unix",
            self.config.url, self.config.lat, self.config.lng
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(DaylightError::Network)?;

        if !response.status().is_success() {
            return Err(DaylightError::Status(response.status().as_u16()));
        }

        let body: serde_json::Value = response.json().await.map_err(DaylightError::Network)?;

        let results = body
            .get("results")
            .filter(|v| v.is_object())
            .ok_or(DaylightError::MissingResults)?;

        let times = SunTimes {
            dawn: parse_unix_field(results, "dawn")?,
            sunrise: parse_unix_field(results, "sunrise")?,
            dusk: parse_unix_field(results, "dusk")?,
            sunset: parse_unix_field(results, "sunset")?,
        };

        Ok(classify(now_unix, &times))
    }
}

fn parse_unix_field(
    results: &serde_json::Value,
    key: &'static str,
) -> Result<i64, DaylightError> {
    results
        .get(key)
        .and_then(parse_unix)
        .ok_or(DaylightError::InvalidField(key))
}

/// Lenient unix-seconds coercion: numbers truncate, strings parse a leading
/// integer after optional whitespace and sign.
fn parse_unix(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => {
            n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64))
        }
        serde_json::Value::String(s) => {
            let s = s.trim_start();
            let (sign, digits) = match s.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, s.strip_prefix('+').unwrap_or(s)),
            };
            let prefix: String = digits.chars().take_while(|c| c.is_ascii_digit()).collect();
            if prefix.is_empty() {
                return None;
            }
            prefix.parse::<i64>().ok().map(|v| sign * v)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMES: SunTimes = SunTimes {
        dawn: 1_756_090_800,   // 06:00
        sunrise: 1_756_094_400, // 07:00
        dusk: 1_756_137_600,   // 19:00
        sunset: 1_756_141_200, // 20:00
    };

    #[test]
    fn classifies_a_moment_in_each_band() {
        assert_eq!(classify(TIMES.dawn - 1, &TIMES), MapMode::Night);
        // 06:30 sits between dawn and sunrise
        assert_eq!(classify(TIMES.dawn + 1800, &TIMES), MapMode::Dawn);
        assert_eq!(classify(TIMES.sunrise + 3600, &TIMES), MapMode::Day);
        assert_eq!(classify(TIMES.dusk + 600, &TIMES), MapMode::Dusk);
        assert_eq!(classify(TIMES.sunset + 1, &TIMES), MapMode::Night);
    }

    #[test]
    fn boundaries_fall_into_the_later_band() {
        assert_eq!(classify(TIMES.dawn, &TIMES), MapMode::Dawn);
        assert_eq!(classify(TIMES.sunrise, &TIMES), MapMode::Day);
        assert_eq!(classify(TIMES.dusk, &TIMES), MapMode::Dusk);
        assert_eq!(classify(TIMES.sunset, &TIMES), MapMode::Night);
    }

    #[tokio::test]
    async fn negative_timestamp_is_rejected_before_any_request() {
        let client = DaylightClient::new(DaylightConfig::default()).unwrap();
        let err = client.resolve_period(-1).await.unwrap_err();
        assert!(matches!(err, DaylightError::InvalidTimestamp));
        assert_eq!(err.to_string(), "Unix timestamp must be positive");
    }

    #[test]
    fn parse_unix_coerces_numbers_and_strings() {
        assert_eq!(parse_unix(&serde_json::json!(1756090800)), Some(1756090800));
        assert_eq!(parse_unix(&serde_json::json!(1756090800.7)), Some(1756090800));
        assert_eq!(parse_unix(&serde_json::json!("1756090800")), Some(1756090800));
        assert_eq!(parse_unix(&serde_json::json!("  1756090800 UTC")), Some(1756090800));
        assert_eq!(parse_unix(&serde_json::json!("-42")), Some(-42));
        assert_eq!(parse_unix(&serde_json::json!("+42")), Some(42));
        assert_eq!(parse_unix(&serde_json::json!("")), None);
        assert_eq!(parse_unix(&serde_json::json!("noon")), None);
        assert_eq!(parse_unix(&serde_json::json!(true)), None);
        assert_eq!(parse_unix(&serde_json::json!(null)), None);
    }

    #[test]
    fn missing_field_names_the_offender() {
        let results = serde_json::json!({
            "dawn": "1756090800",
            "sunrise": "1756094400",
            "sunset": "1756141200"
        });
        let err = parse_unix_field(&results, "dusk").unwrap_err();
        assert_eq!(err.to_string(), "Invalid dusk timestamp in API response");
    }

    #[test]
    fn error_messages_match_the_api_contract() {
        assert_eq!(
            DaylightError::Status(503).to_string(),
            "API request failed with status: 503"
        );
        assert_eq!(
            DaylightError::MissingResults.to_string(),
            "Invalid API response: missing results object"
        );
    }
}
