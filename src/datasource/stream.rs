//! Adapters from backend-native bodies to [`ByteStream`].
//!
//! Nothing here buffers a whole object; chunks are forwarded as the
//! underlying connection or file yields them.

use super::{ByteRange, ByteStream};
use futures::{StreamExt, TryStreamExt};
use std::io::{self, SeekFrom};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;

/// Wrap an HTTP response body. The connection is held until the stream is
/// drained or dropped.
pub fn from_response(response: reqwest::Response) -> ByteStream {
    response.bytes_stream().map_err(io::Error::other).boxed()
}

/// Stream `range` out of an open file.
pub async fn from_file(mut file: File, range: ByteRange) -> io::Result<ByteStream> {
    if range.start > 0 {
        file.seek(SeekFrom::Start(range.start)).await?;
    }

    let stream = match range.length() {
        Some(len) => ReaderStream::new(file.take(len)).boxed(),
        None => ReaderStream::new(file).boxed(),
    };
    Ok(stream)
}

/// Drain a stream into memory.
#[cfg(test)]
pub async fn collect(mut stream: ByteStream) -> io::Result<bytes::Bytes> {
    let mut buf = bytes::BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}
