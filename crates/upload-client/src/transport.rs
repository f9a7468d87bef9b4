//! Chunk transport trait.
//!
//! `ChunkTransport` is the seam between the upload controller and the
//! network. [`HttpTransport`](crate::http::HttpTransport) implements the
//! server's multipart contract; tests plug in mocks.

use std::future::Future;
use std::pin::Pin;

use groupbin_protocol::{ChunkForm, SessionParams};

use crate::error::TransportError;

/// Boxed future returned by transport operations.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// One chunk ready to go on the wire.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub form: ChunkForm,
    pub params: SessionParams,
    pub payload: Vec<u8>,
}

impl ChunkRequest {
    /// Text fields of the request (chunk parameters plus session parameters).
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        self.form.fields(&self.params)
    }
}

/// Abstract carrier of chunk requests.
///
/// Implementations must be safe to call concurrently: the controller keeps
/// up to its concurrency cap of `send_chunk` futures alive at once, and may
/// drop any of them mid-flight to abort the transfer.
pub trait ChunkTransport: Send + Sync {
    /// Reports whether this transport can carry chunked uploads at all.
    ///
    /// Checked once when the controller is built.
    fn check_support(&self) -> Result<(), String> {
        Ok(())
    }

    /// Sends one chunk. `Ok` means the server acknowledged it.
    fn send_chunk(&self, request: ChunkRequest) -> TransportFuture<'_, ()>;

    /// Asks whether the server already holds this chunk.
    fn test_chunk(&self, form: ChunkForm, params: SessionParams) -> TransportFuture<'_, bool> {
        let _ = (form, params);
        Box::pin(async { Ok(false) })
    }
}
