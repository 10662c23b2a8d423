//! Bolide events reported at <https://neo-bolide.ndc.nasa.gov>.
use crate::{satellite::Satellite, scan_key::parse_timestamp, BolideError, BolideResult};
use chrono::NaiveDateTime;
use log::debug;
use serde::Deserialize;

/// Default endpoint of the event service, the event id is appended to it.
pub const DEFAULT_EVENT_ENDPOINT: &str = "https://neo-bolide.ndc.nasa.gov/service/event";

/// A single bright fireball as reported by the event service.
#[derive(Debug, Clone, Deserialize)]
pub struct BolideEvent {
    /// Comma separated list of the instruments that detected it, e.g. "GLM-16,GLM-17".
    #[serde(rename = "detectedBy")]
    pub detected_by: String,
    pub latitude: f64,
    pub longitude: f64,
    pub datetime: String,
    /// One attachment per detecting satellite. Only the count is used.
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct EventResponse {
    data: Vec<BolideEvent>,
}

impl BolideEvent {
    /// Parse the body of an event service response, the first record is the event.
    pub fn from_json(json: &str) -> BolideResult<Self> {
        let response: EventResponse = serde_json::from_str(json)?;
        response
            .data
            .into_iter()
            .next()
            .ok_or(BolideError::EventNotFound)
    }

    /// The satellites that detected this event, in the order they're listed.
    pub fn satellites(&self) -> BolideResult<Vec<Satellite>> {
        self.detected_by
            .split(',')
            .filter(|label| !label.trim().is_empty())
            .map(Satellite::from_source_label)
            .collect()
    }

    /// Number of satellites with data attached to the event.
    pub fn num_satellites(&self) -> usize {
        self.attachments.len()
    }

    /// When the event happened, in UTC.
    pub fn time(&self) -> BolideResult<NaiveDateTime> {
        parse_timestamp(&self.datetime)
    }
}

/// Blocking client for the event service.
#[derive(Debug, Clone)]
pub struct EventClient {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl EventClient {
    pub fn new(endpoint: &str) -> BolideResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("bolidebox/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(EventClient {
            client,
            endpoint: endpoint.trim_end_matches('/').to_owned(),
        })
    }

    /// Fetch the record of an event.
    pub fn fetch(&self, event_id: &str) -> BolideResult<BolideEvent> {
        let url = format!("{}/{}", self.endpoint, event_id);
        debug!("fetching event {}", url);

        let text = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()?
            .error_for_status()?
            .text()?;

        BolideEvent::from_json(&text)
    }
}
