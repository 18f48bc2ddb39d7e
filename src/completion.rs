// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Single-delivery completion for queued session operations.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use crate::error::SessionError;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Outcome of an asynchronous session operation.
///
/// Resolves exactly once. Checks that fail before any work is queued
/// resolve on the first poll. If the session worker goes away before
/// answering, resolves to [`SessionError::Closed`].
#[must_use = "completions report the outcome of the operation"]
#[derive(Debug)]
pub struct Completion<T> {
    early: Option<SessionError>,
    rx: Option<oneshot::Receiver<Result<T, SessionError>>>,
}

impl<T> Completion<T> {
    pub(crate) fn channel() -> (Reply<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                early: None,
                rx: Some(rx),
            },
        )
    }

    pub(crate) fn failed(error: SessionError) -> Self {
        Self {
            early: Some(error),
            rx: None,
        }
    }
}

impl<T> Unpin for Completion<T> {}

impl<T> Future for Completion<T> {
    type Output = Result<T, SessionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(error) = self.early.take() {
            return Poll::Ready(Err(error));
        }
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(Err(SessionError::Closed));
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(result) => {
                self.rx = None;
                Poll::Ready(result.unwrap_or(Err(SessionError::Closed)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
