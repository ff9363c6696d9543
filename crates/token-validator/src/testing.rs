//! Scripted IdP transport for unit tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use serde_json::Value;

use crate::error::TransportError;
use crate::http::{HttpReply, IdpHttpClient};

type Form = Vec<(String, String)>;

/// Replays canned replies in order and records every request
#[derive(Debug, Default)]
pub(crate) struct ScriptedIdp {
    replies: Mutex<VecDeque<Result<HttpReply, TransportError>>>,
    urls: Mutex<Vec<String>>,
    bearers: Mutex<Vec<Option<String>>>,
    forms: Mutex<Vec<Form>>,
    delay: Duration,
}

impl ScriptedIdp {
    pub(crate) fn new(
        replies: impl IntoIterator<Item = Result<HttpReply, TransportError>>,
    ) -> Arc<Self> {
        Self::delayed(replies, Duration::ZERO)
    }

    /// Every request fails as if the IdP were down
    pub(crate) fn offline() -> Arc<Self> {
        Self::new(Vec::<Result<HttpReply, TransportError>>::new())
    }

    pub(crate) fn delayed(
        replies: impl IntoIterator<Item = Result<HttpReply, TransportError>>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            delay,
            ..Self::default()
        })
    }

    pub(crate) fn json(status: StatusCode, body: Value) -> HttpReply {
        HttpReply::new(status, body.to_string())
    }

    pub(crate) fn calls(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    pub(crate) fn bearers(&self) -> Vec<Option<String>> {
        self.bearers.lock().unwrap().clone()
    }

    pub(crate) fn forms(&self) -> Vec<Form> {
        self.forms.lock().unwrap().clone()
    }

    async fn next(&self, url: &str) -> Result<HttpReply, TransportError> {
        self.urls.lock().unwrap().push(url.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(TransportError::Connect {
                    url: url.to_string(),
                    message: "no scripted reply left".into(),
                })
            })
    }
}

#[async_trait]
impl IdpHttpClient for ScriptedIdp {
    async fn get(&self, url: &str, bearer: Option<&str>) -> Result<HttpReply, TransportError> {
        self.bearers
            .lock()
            .unwrap()
            .push(bearer.map(str::to_string));
        self.next(url).await
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpReply, TransportError> {
        self.forms.lock().unwrap().push(
            form.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self.next(url).await
    }
}
