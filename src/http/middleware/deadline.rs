//! Per-request read and write deadlines.
//!
//! Both deadlines are absolute, fixed when the request head has been read:
//! - read: the full request body must arrive before `read_secs`
//! - write: the response, body included, must be produced before `write_secs`
//!
//! A body that outlives its deadline fails with [`DeadlineElapsed`], which
//! makes hyper abort the connection instead of keeping it alive.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderValue, Version},
    middleware::Next,
    response::Response,
};
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::{Instant, Sleep};

use crate::config::TimeoutConfig;
use crate::http::request::request_id;
use crate::http::response;

/// A body was still streaming when its deadline passed.
#[derive(Debug, Clone, Copy, Error)]
#[error("{0} deadline elapsed")]
pub struct DeadlineElapsed(pub &'static str);

/// Shared record of a body being cut off by its deadline.
#[derive(Debug, Default)]
pub struct Expiry {
    fired: AtomicBool,
    notify: Notify,
}

impl Expiry {
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Resolves once the deadline has cut the body short.
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        if self.fired() {
            return;
        }
        notified.await;
    }

    fn fire(&self) {
        self.fired.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// Body wrapper failing once an absolute deadline has passed.
pub struct DeadlineBody {
    inner: Body,
    sleep: Pin<Box<Sleep>>,
    what: &'static str,
    expiry: Arc<Expiry>,
    done: bool,
}

impl DeadlineBody {
    pub fn new(inner: Body, deadline: Instant, what: &'static str) -> Self {
        Self {
            inner,
            sleep: Box::pin(tokio::time::sleep_until(deadline)),
            what,
            expiry: Arc::new(Expiry::default()),
            done: false,
        }
    }

    pub fn expiry(&self) -> Arc<Expiry> {
        Arc::clone(&self.expiry)
    }
}

impl HttpBody for DeadlineBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(None);
        }

        if this.sleep.as_mut().poll(cx).is_ready() {
            this.done = true;
            this.expiry.fire();
            return Poll::Ready(Some(Err(axum::Error::new(DeadlineElapsed(this.what)))));
        }

        let frame = Pin::new(&mut this.inner).poll_frame(cx);
        if let Poll::Ready(None) = frame {
            this.done = true;
        }
        frame
    }

    fn is_end_stream(&self) -> bool {
        self.done || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Read and write bounds applied to every request.
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    pub read: Duration,
    pub write: Duration,
}

impl Deadlines {
    pub fn from_config(timeouts: &TimeoutConfig) -> Self {
        Self {
            read: Duration::from_secs(timeouts.read_secs),
            write: Duration::from_secs(timeouts.write_secs),
        }
    }
}

/// Enforce [`Deadlines`] on the request body and on the whole response.
///
/// A request cut off before its response is ready gets 408 (read bound) or
/// 504 (write bound) and, on HTTP/1, `Connection: close`.
pub async fn enforce_deadlines(
    State(deadlines): State<Deadlines>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let request_id = request_id(&request);
    let version = request.version();

    let (parts, body) = request.into_parts();
    let body = DeadlineBody::new(body, start + deadlines.read, "request body");
    let read_expiry = body.expiry();
    let request = Request::from_parts(parts, Body::new(body));

    let write_deadline = start + deadlines.write;
    let response = tokio::select! {
        result = tokio::time::timeout_at(write_deadline, next.run(request)) => match result {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(
                    request_id = %request_id,
                    write_secs = deadlines.write.as_secs(),
                    "Response not ready before write deadline"
                );
                return close_connection(response::gateway_timeout(), version);
            }
        },
        _ = read_expiry.wait() => return read_timeout(&request_id, deadlines, version),
    };

    if read_expiry.fired() {
        return read_timeout(&request_id, deadlines, version);
    }

    response.map(|body| Body::new(DeadlineBody::new(body, write_deadline, "response")))
}

fn read_timeout(request_id: &str, deadlines: Deadlines, version: Version) -> Response {
    tracing::warn!(
        request_id = %request_id,
        read_secs = deadlines.read.as_secs(),
        "Request body not received before read deadline"
    );
    close_connection(response::request_timeout(), version)
}

fn close_connection(mut response: Response, version: Version) -> Response {
    // HTTP/2 has no connection header; the stream ends with the response.
    if version < Version::HTTP_2 {
        response
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
    }
    response
}
