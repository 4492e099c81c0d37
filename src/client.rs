use anyhow::{Result, anyhow, bail};
use async_stream::stream;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

/// Source of streamed chat replies.
///
/// `stream` yields cumulative snapshots: every item is the full text received
/// so far, never a delta. The stream ends after the first error.
pub trait ChatTransport: Send + Sync {
    fn stream(&self, message: &str) -> BoxStream<'static, Result<String>>;

    fn health(&self) -> BoxFuture<'static, Result<String>>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    response: Option<String>,
    success: bool,
    error: Option<String>,
}

#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: Url,
}

impl ChatClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `<base>/api/chat/stream?message=<encoded>`
    pub fn stream_url(&self, message: &str) -> Result<Url> {
        let mut url = self.endpoint(&["api", "chat", "stream"])?;
        url.query_pairs_mut().append_pair("message", message);
        Ok(url)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("backend URL cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Non-streaming request against `POST /api/chat`.
    pub async fn send(&self, message: &str) -> Result<String> {
        if message.trim().is_empty() {
            bail!("Message cannot be empty");
        }

        let url = self.endpoint(&["api", "chat"])?;
        let response = self
            .client
            .post(url)
            .json(&ChatRequest { message })
            .send()
            .await?;

        let status = response.status();
        // The backend reports failures as 400 with a ChatResponse body
        let reply: ChatResponse = match response.json().await {
            Ok(reply) => reply,
            Err(err) if !status.is_success() => {
                bail!("Chat request failed with status: {status} ({err})")
            }
            Err(err) => return Err(err.into()),
        };

        if !reply.success {
            bail!(
                "{}",
                reply.error.unwrap_or_else(|| format!("Chat request failed with status: {status}"))
            );
        }
        Ok(reply.response.unwrap_or_default())
    }
}

impl ChatTransport for ChatClient {
    fn stream(&self, message: &str) -> BoxStream<'static, Result<String>> {
        let client = self.client.clone();
        let url = self.stream_url(message);

        stream! {
            let url = match url {
                Ok(url) => url,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };

            tracing::debug!(%url, "opening chat stream");
            let response = match client.get(url).send().await.and_then(|r| r.error_for_status()) {
                Ok(response) => response,
                Err(err) => {
                    yield Err(anyhow::Error::from(err));
                    return;
                }
            };

            let mut body = response.bytes_stream();
            let mut text = PartialText::default();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        if text.push(&bytes) {
                            yield Ok(text.as_str().to_string());
                        }
                    }
                    Err(err) => {
                        yield Err(anyhow::Error::from(err));
                        return;
                    }
                }
            }

            if text.finish() {
                yield Ok(text.as_str().to_string());
            }
        }
        .boxed()
    }

    fn health(&self) -> BoxFuture<'static, Result<String>> {
        let client = self.client.clone();
        let url = self.endpoint(&["api", "chat", "health"]);

        async move {
            let response = client.get(url?).send().await?;
            if !response.status().is_success() {
                bail!("Health check failed with status: {}", response.status());
            }
            Ok(response.text().await?)
        }
        .boxed()
    }
}

/// Incremental UTF-8 decoder for a streamed body.
///
/// Bytes of a character split across chunks are held back until the rest
/// arrives. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct PartialText {
    text: String,
    pending: Vec<u8>,
}

impl PartialText {
    /// Append a chunk. Returns true when the decoded text grew.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        let before = self.text.len();
        self.pending.extend_from_slice(chunk);

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
                    match err.error_len() {
                        Some(len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + len);
                        }
                        None => {
                            // Incomplete character at the end; wait for more bytes
                            self.pending.drain(..valid_up_to);
                            break;
                        }
                    }
                }
            }
        }

        self.text.len() > before
    }

    /// Flush a truncated trailing character. Returns true when the text grew.
    pub fn finish(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.pending.clear();
        self.text.push(char::REPLACEMENT_CHARACTER);
        true
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}
