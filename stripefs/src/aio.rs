//! Completion bridge between the store's asynchronous calls and a caller
//! callback.

use std::sync::Arc;

use bytes::Bytes;
use nix::errno::Errno;

use crate::store::AioCompletion;

/// What a caller callback receives when an asynchronous request finishes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AioResult {
    /// The requested byte count on success, the store's code otherwise.
    pub result: Result<usize, Errno>,
    /// Bytes read; empty for writes and failures.
    pub data: Bytes,
}

impl AioResult {
    /// `result` in the signed return-code convention.
    pub fn rc(&self) -> i64 {
        match self.result {
            Ok(n) => i64::try_from(n).unwrap_or(i64::MAX),
            Err(e) => -(e as i64),
        }
    }
}

/// Caller callback of an asynchronous request. Runs on a store thread.
pub type AioCallback = Box<dyn FnOnce(AioResult) + Send + 'static>;

/// Wraps `callback` in a completion record for a request of `requested`
/// bytes.
pub(crate) fn bridge(requested: usize, callback: AioCallback) -> Arc<AioCompletion> {
    AioCompletion::new(move |rc, data| {
        let result = rc.map(|_| requested);
        if let Err(e) = result {
            tracing::debug!("asynchronous request of {requested} bytes failed: {e}");
        }
        callback(AioResult { result, data });
    })
}
