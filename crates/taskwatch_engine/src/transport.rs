use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use futures_util::stream::{self, Stream};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use taskwatch_core::{StatusSnapshot, TaskId};
use taskwatch_logging::{track_debug, track_trace};
use url::Url;

use crate::sse::{SseEvent, SseParser};
use crate::{FailureKind, TrackError};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Applies to status polls and submissions. Streams stay open without a deadline.
    pub request_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Snapshots pushed by the server, in arrival order.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<StatusSnapshot, TrackError>> + Send>>;

/// The two ways of learning about a task's status.
#[async_trait::async_trait]
pub trait StatusTransport: Send + Sync {
    /// One request, one snapshot.
    async fn fetch_status(&self, task_id: &TaskId) -> Result<StatusSnapshot, TrackError>;

    /// Open a push channel. Errors here mean no event was ever received.
    async fn open_stream(&self, task_id: &TaskId) -> Result<SnapshotStream, TrackError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    settings: TransportSettings,
    base: Url,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(settings: TransportSettings) -> Result<Self, TrackError> {
        let base = Url::parse(&settings.base_url)
            .map_err(|err| TrackError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(TrackError::new(
                FailureKind::InvalidUrl,
                format!("{base} cannot carry a path"),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| TrackError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            settings,
            base,
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, TrackError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| TrackError::new(FailureKind::InvalidUrl, "base url cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request with the request timeout and return the status with the whole body.
    pub(crate) async fn exchange(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(StatusCode, Vec<u8>), TrackError> {
        let response = request
            .timeout(self.settings.request_timeout)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        Ok((status, body.to_vec()))
    }

    /// Like [`exchange`](Self::exchange), but any non-2xx status is an error and the body is JSON.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TrackError> {
        let (status, body) = self.exchange(request).await?;
        if !status.is_success() {
            return Err(http_status_error(status));
        }
        decode_json(&body)
    }
}

pub(crate) fn http_status_error(status: StatusCode) -> TrackError {
    TrackError::new(FailureKind::HttpStatus(status.as_u16()), status.to_string())
}

pub(crate) fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, TrackError> {
    serde_json::from_slice(body)
        .map_err(|err| TrackError::new(FailureKind::MalformedPayload, err.to_string()))
}

#[async_trait::async_trait]
impl StatusTransport for ReqwestTransport {
    async fn fetch_status(&self, task_id: &TaskId) -> Result<StatusSnapshot, TrackError> {
        let url = self.endpoint(&["api", "task-status", task_id.as_str()])?;
        track_trace!("Polling {url}");
        self.send_json(self.client.get(url)).await
    }

    async fn open_stream(&self, task_id: &TaskId) -> Result<SnapshotStream, TrackError> {
        let url = self.endpoint(&["api", "task-stream", task_id.as_str()])?;
        track_debug!("Opening event stream {url}");
        let response = self
            .client
            .get(url)
            .header(ACCEPT, EVENT_STREAM)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(http_status_error(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_event_stream(&content_type) {
            return Err(TrackError::new(
                FailureKind::UnsupportedContentType { content_type },
                "expected an event stream",
            ));
        }

        Ok(decode_events(response.bytes_stream()))
    }
}

fn is_event_stream(content_type: &str) -> bool {
    let ct = content_type.split(';').next().unwrap_or(content_type).trim();
    ct.eq_ignore_ascii_case(EVENT_STREAM)
}

/// Turn a raw body into snapshots. Events with a non-default type are skipped.
pub(crate) fn decode_events<S, B>(body: S) -> SnapshotStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let decoder = EventDecoder {
        body: Box::pin(body),
        parser: SseParser::new(),
        pending: VecDeque::new(),
        finished: false,
    };
    Box::pin(stream::unfold(decoder, |mut decoder| async move {
        let item = decoder.next_snapshot().await?;
        Some((item, decoder))
    }))
}

struct EventDecoder<S> {
    body: Pin<Box<S>>,
    parser: SseParser,
    pending: VecDeque<SseEvent>,
    finished: bool,
}

impl<S, B> EventDecoder<S>
where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
{
    async fn next_snapshot(&mut self) -> Option<Result<StatusSnapshot, TrackError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if event.event != "message" {
                    track_debug!("Ignoring '{}' event", event.event);
                    continue;
                }
                if event.data.trim().is_empty() {
                    continue;
                }
                return Some(serde_json::from_str(&event.data).map_err(|err| {
                    TrackError::new(FailureKind::MalformedPayload, err.to_string())
                }));
            }
            if self.finished {
                return None;
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.pending.extend(self.parser.feed(chunk.as_ref())),
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(Err(map_reqwest_error(err)));
                }
                None => {
                    self.finished = true;
                    self.pending.extend(self.parser.flush());
                }
            }
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TrackError {
    if err.is_timeout() {
        return TrackError::new(FailureKind::Timeout, err.to_string());
    }
    TrackError::new(FailureKind::Network, err.to_string())
}
