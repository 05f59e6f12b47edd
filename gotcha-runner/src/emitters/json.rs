//! The JSON passthrough "emitter" (spec.md §4.8, §6): unlike the other
//! three, this isn't a pure function of a [`SummaryDocument`] — it's the
//! raw `go test -json` stream as received, so it has to be wired in at
//! decode time rather than rendered after the fact. See
//! [`crate::event::Decoder::with_passthrough`].

use camino::Utf8Path;
use std::io;
use tokio::fs::File;
use tokio::io::AsyncWrite;

/// Open (create or truncate) `path` as a sink for [`Decoder::with_passthrough`].
///
/// [`Decoder::with_passthrough`]: crate::event::Decoder::with_passthrough
pub async fn passthrough_sink(path: &Utf8Path) -> io::Result<Box<dyn AsyncWrite + Unpin + Send>> {
    let file = File::create(path.as_std_path()).await?;
    Ok(Box::new(file))
}
