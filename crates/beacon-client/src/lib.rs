use std::fmt;
use std::sync::Arc;

use beacon_config::{Config, ConfigError};
use beacon_contracts::{
    CollectRequest, DebugResponse, Event, InboundMessage, UserId, ValidationMessage,
};
use beacon_kernel::{build_collect_request, merge_user_properties, validate_events, ValidationError};
use parking_lot::Mutex;
use reqwest::{Client, Url};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

mod middleware;

pub use middleware::{AnalyticsLayer, AnalyticsService, Context};

#[derive(Debug, Error)]
pub enum BeaconError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("invalid collect endpoint: {0}")]
    Endpoint(String),
    #[error("collect request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Which collect endpoint a request goes to. `Debug` requests are validated
/// by the collector and never recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Production,
    Debug,
}

impl Mode {
    pub fn from_debug_flag(debug: bool) -> Self {
        if debug {
            Mode::Debug
        } else {
            Mode::Production
        }
    }

    fn path_segments(self) -> &'static [&'static str] {
        match self {
            Mode::Production => &["mp", "collect"],
            Mode::Debug => &["debug", "mp", "collect"],
        }
    }
}

pub fn collect_url(
    base_url: &str,
    mode: Mode,
    measurement_id: &str,
    api_secret: &str,
) -> Result<Url, BeaconError> {
    let mut url = Url::parse(base_url).map_err(|e| BeaconError::Endpoint(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| BeaconError::Endpoint(format!("{base_url} cannot be used as a base")))?
        .pop_if_empty()
        .extend(mode.path_segments());
    url.query_pairs_mut()
        .append_pair("measurement_id", measurement_id)
        .append_pair("api_secret", api_secret);
    Ok(url)
}

#[derive(Debug, Default)]
struct Session {
    user_id: Option<UserId>,
    user_properties: Map<String, Value>,
}

struct Shared {
    measurement_id: String,
    api_secret: String,
    client_id: String,
    base_url: String,
    client: Client,
    session: Mutex<Session>,
}

/// Analytics session bound to one measurement stream. Clones share the same
/// identity and accumulated user properties.
#[derive(Clone)]
pub struct Analytics {
    inner: Arc<Shared>,
}

impl fmt::Debug for Analytics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analytics")
            .field("measurement_id", &self.inner.measurement_id)
            .field("client_id", &self.inner.client_id)
            .field("base_url", &self.inner.base_url)
            .field("session", &*self.inner.session.lock())
            .finish_non_exhaustive()
    }
}

impl Analytics {
    pub fn new(cfg: Config) -> Result<Self, BeaconError> {
        cfg.validate()?;
        let client = Client::builder().build()?;
        let client_id = cfg
            .client_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Ok(Self {
            inner: Arc::new(Shared {
                measurement_id: cfg.measurement_id,
                api_secret: cfg.api_secret,
                client_id,
                base_url: cfg.endpoint.base_url,
                client,
                session: Mutex::new(Session {
                    user_id: cfg.user_id,
                    user_properties: Map::new(),
                }),
            }),
        })
    }

    pub fn measurement_id(&self) -> &str {
        &self.inner.measurement_id
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.inner.session.lock().user_id.clone()
    }

    pub fn set_user_id(&self, user_id: impl Into<UserId>) {
        self.inner.session.lock().user_id = Some(user_id.into());
    }

    pub fn user_properties(&self) -> Map<String, Value> {
        self.inner.session.lock().user_properties.clone()
    }

    pub fn set_user_properties(&self, properties: Map<String, Value>) {
        let mut session = self.inner.session.lock();
        merge_user_properties(&mut session.user_properties, properties);
    }

    /// Pipeline stage that attaches this session to every inbound message.
    pub fn middleware(&self) -> AnalyticsLayer {
        AnalyticsLayer::new(self.clone())
    }

    /// Request body for `events` from the current session state.
    pub fn payload(&self, events: Vec<Event>) -> CollectRequest {
        let session = self.inner.session.lock();
        build_collect_request(
            &self.inner.client_id,
            events,
            session.user_id.as_ref(),
            &session.user_properties,
        )
    }

    pub async fn event(
        &self,
        name: impl Into<String>,
        params: Option<Map<String, Value>>,
        mode: Mode,
    ) -> Result<Vec<ValidationMessage>, BeaconError> {
        let mut event = Event::new(name);
        event.params = params;
        let body = self.payload(vec![event]);
        self.query(&body, mode).await
    }

    /// Sends a batch of raw event descriptors in one request. The whole batch
    /// is rejected before any I/O if one descriptor is malformed.
    pub async fn events(
        &self,
        descriptors: &[Value],
        mode: Mode,
    ) -> Result<Vec<ValidationMessage>, BeaconError> {
        let events = validate_events(descriptors)?;
        let body = self.payload(events);
        self.query(&body, mode).await
    }

    /// Posts `body` to the collect endpoint. Only debug requests read the
    /// response; production requests resolve to an empty list once sent.
    pub async fn query(
        &self,
        body: &CollectRequest,
        mode: Mode,
    ) -> Result<Vec<ValidationMessage>, BeaconError> {
        let url = collect_url(
            &self.inner.base_url,
            mode,
            &self.inner.measurement_id,
            &self.inner.api_secret,
        )?;
        tracing::debug!(
            ?mode,
            path = url.path(),
            events = body.events.len(),
            "sending collect request"
        );

        let response = self.inner.client.post(url).json(body).send().await?;
        match mode {
            Mode::Production => Ok(Vec::new()),
            Mode::Debug => {
                let parsed: DebugResponse = response.json().await?;
                tracing::debug!(
                    messages = parsed.validation_messages.len(),
                    "collect request validated"
                );
                Ok(parsed.validation_messages)
            }
        }
    }

    pub(crate) fn observe(&self, message: &InboundMessage) {
        let mut session = self.inner.session.lock();
        if session.user_id.is_none() {
            if let Some(id) = message.sender_id() {
                tracing::trace!(user_id = %id, "user id taken from inbound message");
                session.user_id = Some(id.clone());
            }
        }
        if let Some(locale) = message.locale() {
            session
                .user_properties
                .insert("language".to_string(), Value::String(locale.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn analytics() -> Analytics {
        Analytics::new(Config::new("G-TEST", "secret").with_client_id("cid-1")).unwrap()
    }

    #[test]
    fn production_and_debug_urls_differ_only_by_segment() {
        let prod = collect_url("https://www.google-analytics.com", Mode::Production, "G-1", "s")
            .unwrap();
        assert_eq!(
            prod.as_str(),
            "https://www.google-analytics.com/mp/collect?measurement_id=G-1&api_secret=s"
        );
        let debug =
            collect_url("https://www.google-analytics.com/", Mode::Debug, "G-1", "s").unwrap();
        assert_eq!(
            debug.as_str(),
            "https://www.google-analytics.com/debug/mp/collect?measurement_id=G-1&api_secret=s"
        );
    }

    #[test]
    fn credentials_are_query_encoded() {
        let url = collect_url("http://localhost:9000", Mode::Production, "G 1", "a&b").unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("measurement_id".to_string(), "G 1".to_string()),
                ("api_secret".to_string(), "a&b".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_unparsable_base_url() {
        let err = collect_url("not a url", Mode::Production, "G-1", "s").unwrap_err();
        assert!(matches!(err, BeaconError::Endpoint(_)));
    }

    #[test]
    fn debug_flag_maps_to_mode() {
        assert_eq!(Mode::from_debug_flag(true), Mode::Debug);
        assert_eq!(Mode::from_debug_flag(false), Mode::Production);
        assert_eq!(Mode::default(), Mode::Production);
    }

    #[test]
    fn payload_reflects_current_session_state() {
        let a = analytics();
        let bare = a.payload(vec![Event::new("a")]);
        assert_eq!(bare.client_id, "cid-1");
        assert!(bare.user_id.is_none());
        assert!(bare.user_properties.is_none());

        a.set_user_id(5_i64);
        a.set_user_properties(json!({"plan": "pro"}).as_object().cloned().unwrap());
        let full = a.payload(vec![Event::new("a")]);
        assert_eq!(full.user_id.as_deref(), Some("5"));
        assert_eq!(full.user_properties.unwrap()["plan"].value, "pro");
    }

    #[test]
    fn clones_share_session_state() {
        let a = analytics();
        let b = a.clone();
        b.set_user_id("u-1");
        assert_eq!(a.user_id(), Some(UserId::Text("u-1".to_string())));
    }

    #[test]
    fn debug_output_redacts_api_secret() {
        let rendered = format!("{:?}", analytics());
        assert!(rendered.contains("G-TEST"));
        assert!(!rendered.contains("secret"));
    }
}
