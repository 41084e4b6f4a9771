//! Scripted HTTP transport for exercising the fetch stack without a network.
//!
//! Routes match on a URL fragment in registration order. A route holds a
//! sequence of replies; once the sequence is exhausted the last reply repeats.

use crate::api::transport::{HttpResponse, HttpTransport};
use crate::error::{DashboardError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone)]
pub enum MockReply {
    /// 200 with a JSON body
    Json(Value),
    /// Given status with an empty JSON object body
    Status(u16),
    /// Given status and raw body
    Raw(u16, String),
    /// Transport-level failure
    NetworkError,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub at: Instant,
}

#[derive(Debug)]
struct Route {
    fragment: String,
    replies: Vec<MockReply>,
    served: usize,
}

#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RecordedCall>>,
    latency: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer URLs containing `fragment` with `reply`.
    pub fn on(&self, fragment: &str, reply: MockReply) {
        self.on_sequence(fragment, vec![reply]);
    }

    /// Answer URLs containing `fragment` with `replies` in order.
    pub fn on_sequence(&self, fragment: &str, replies: Vec<MockReply>) {
        let mut routes = self.routes.lock().unwrap();
        routes.retain(|r| r.fragment != fragment);
        routes.push(Route {
            fragment: fragment.to_string(),
            replies,
            served: 0,
        });
    }

    /// Delay every reply by `latency`, useful to widen race windows.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap() = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_matching(&self, fragment: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.url.contains(fragment)).count()
    }

    fn next_reply(&self, url: &str) -> Option<MockReply> {
        let mut routes = self.routes.lock().unwrap();
        let route = routes.iter_mut().find(|r| url.contains(&r.fragment))?;
        let index = route.served.min(route.replies.len().saturating_sub(1));
        route.served += 1;
        route.replies.get(index).cloned()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            url: url.to_string(),
            headers: headers.to_vec(),
            at: Instant::now(),
        });

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            sleep(latency).await;
        }

        match self.next_reply(url) {
            Some(MockReply::Json(body)) => Ok(HttpResponse::new(200, body.to_string())),
            Some(MockReply::Status(status)) => Ok(HttpResponse::new(status, "{}")),
            Some(MockReply::Raw(status, body)) => Ok(HttpResponse::new(status, body)),
            Some(MockReply::NetworkError) => Err(DashboardError::NetworkError(format!("connection reset: {}", url))),
            None => Ok(HttpResponse::new(404, "{}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_sequence_repeats_last_reply() {
        let transport = MockTransport::new();
        transport.on_sequence("/a", vec![MockReply::Status(500), MockReply::Json(json!({"x": 1}))]);

        assert_eq!(transport.get("http://h/a", &[]).await.unwrap().status, 500);
        assert_eq!(transport.get("http://h/a", &[]).await.unwrap().status, 200);
        assert_eq!(transport.get("http://h/a", &[]).await.unwrap().status, 200);
        assert_eq!(transport.get("http://h/unknown", &[]).await.unwrap().status, 404);
        assert_eq!(transport.call_count(), 4);
        assert_eq!(transport.calls_matching("/a"), 3);
    }
}
