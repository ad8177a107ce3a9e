use crate::classify::classify_cancellation;
use crate::classify::classify_transport_error;
use crate::decode::StreamDecoder;
use crate::error::ApiError;
use futures::StreamExt;
use repochat_async_utils::CancellationController;
use repochat_async_utils::OrCancelExt;
use repochat_client::HttpTransport;
use repochat_client::Request;
use std::time::Duration;
use tracing::debug;
use tracing::trace;
use tracing::warn;

/// What a completed exchange delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Number of non-empty fragments handed to the sink.
    pub fragments: usize,
    /// Raw body bytes received.
    pub bytes: usize,
}

/// Drives one streamed HTTP exchange from request to end of body.
///
/// A consumer never retries: each call either completes, times out, or fails
/// once with a classified [`ApiError`].
#[derive(Debug, Clone)]
pub struct StreamConsumer<T: HttpTransport> {
    transport: T,
}

impl<T: HttpTransport> StreamConsumer<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Run `request` under a fresh deadline of `deadline` from now.
    pub async fn consume<F>(
        &self,
        request: Request,
        deadline: Duration,
        on_fragment: F,
    ) -> Result<StreamSummary, ApiError>
    where
        F: FnMut(&str),
    {
        let controller = CancellationController::with_timeout(deadline);
        self.consume_with(request, &controller, on_fragment).await
    }

    /// Run `request` under an existing controller, so the caller can also
    /// cancel it explicitly.
    ///
    /// `on_fragment` runs synchronously for every non-empty decoded fragment,
    /// in arrival order, before the next chunk is pulled. Once the controller
    /// fires it is never called again.
    pub async fn consume_with<F>(
        &self,
        request: Request,
        controller: &CancellationController,
        mut on_fragment: F,
    ) -> Result<StreamSummary, ApiError>
    where
        F: FnMut(&str),
    {
        let mut session = StreamSession::new(controller);

        let response = match self
            .transport
            .stream(request)
            .or_cancel(controller.token())
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                let err = classify_transport_error(err, session.deadline_elapsed());
                warn!("streamed exchange rejected: {err}");
                return Err(err);
            }
            Err(_) => return Err(session.cancelled_error()),
        };
        debug!(status = %response.status, "streamed exchange accepted");

        let mut bytes = response.bytes;
        loop {
            let next = tokio::select! {
                biased;
                reason = controller.cancelled() => {
                    let err = classify_cancellation(reason);
                    warn!(
                        fragments = session.fragments,
                        "streamed exchange cut short: {err}"
                    );
                    return Err(err);
                }
                next = bytes.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if let Some(text) = session.decode(&chunk) {
                        on_fragment(&text);
                    }
                }
                Some(Err(err)) => {
                    let err = classify_transport_error(err, session.deadline_elapsed());
                    warn!(
                        fragments = session.fragments,
                        "streamed exchange failed: {err}"
                    );
                    return Err(err);
                }
                None => break,
            }
        }

        if let Some(tail) = session.finish() {
            on_fragment(&tail);
        }
        debug!(
            fragments = session.fragments,
            bytes = session.bytes,
            "streamed exchange complete"
        );
        Ok(session.summary())
    }
}

/// Per-invocation state. Never shared across exchanges; dropping it stops the
/// deadline timer.
struct StreamSession<'a> {
    controller: &'a CancellationController,
    decoder: StreamDecoder,
    fragments: usize,
    bytes: usize,
}

impl<'a> StreamSession<'a> {
    fn new(controller: &'a CancellationController) -> Self {
        Self {
            controller,
            decoder: StreamDecoder::new(),
            fragments: 0,
            bytes: 0,
        }
    }

    fn deadline_elapsed(&self) -> bool {
        self.controller.deadline_elapsed()
    }

    fn cancelled_error(&self) -> ApiError {
        self.controller
            .reason()
            .map(classify_cancellation)
            .unwrap_or_else(|| ApiError::TransportAborted("request cancelled".to_string()))
    }

    fn decode(&mut self, chunk: &[u8]) -> Option<String> {
        self.bytes += chunk.len();
        trace!(len = chunk.len(), "chunk received");
        let text = self.decoder.decode(chunk);
        self.count(text)
    }

    /// Flush the decoder. Only called once the body ended normally.
    fn finish(&mut self) -> Option<String> {
        let text = std::mem::take(&mut self.decoder).finish();
        self.count(text)
    }

    fn count(&mut self, text: String) -> Option<String> {
        if text.is_empty() {
            return None;
        }
        self.fragments += 1;
        Some(text)
    }

    fn summary(&self) -> StreamSummary {
        StreamSummary {
            fragments: self.fragments,
            bytes: self.bytes,
        }
    }
}

impl Drop for StreamSession<'_> {
    fn drop(&mut self) {
        self.controller.disarm();
    }
}
