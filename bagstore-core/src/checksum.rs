// Copyright 2026 Bagstore Team
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

//! Pass-through SHA-256 computation for streamed payloads.

use crate::types::Sha256Digest;
use sha2::{Digest, Sha256};
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Computes the SHA-256 hash of an in-memory buffer.
pub fn sha256(data: &[u8]) -> Sha256Digest {
    Sha256::digest(data).into()
}

/// Async reader that hashes and counts every byte passing through it.
///
/// Nothing is buffered beyond what the caller's read buffer holds, so it is
/// safe for arbitrarily large payloads. The digest is only available by
/// consuming the wrapper with [`HashingReader::finish`], after the inner
/// stream has been read to the end.
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    bytes_read: u64,
}

impl<R> HashingReader<R> {
    /// Wraps a reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes_read: 0,
        }
    }

    /// Consumes the reader, returning the digest and the byte count.
    pub fn finish(self) -> (Sha256Digest, u64) {
        (self.hasher.finalize().into(), self.bytes_read)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for HashingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let before = buf.filled().len();

        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;

        let new_bytes = &buf.filled()[before..];
        this.hasher.update(new_bytes);
        this.bytes_read += new_bytes.len() as u64;

        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[tokio::test]
    async fn test_hashing_reader_matches_one_shot_hash() {
        let data = b"hello world".to_vec();
        let mut reader = HashingReader::new(&data[..]);
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).await.unwrap();
        let (digest, count) = reader.finish();

        assert_eq!(count, 11);
        assert_eq!(hex::encode(digest), HELLO_SHA256);
        assert_eq!(digest, sha256(&data));
    }

    #[tokio::test]
    async fn test_hashing_reader_passes_bytes_through() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut reader = HashingReader::new(&data[..]);
        let mut copy = Vec::new();
        reader.read_to_end(&mut copy).await.unwrap();

        let (digest, count) = reader.finish();
        assert_eq!(copy, data);
        assert_eq!(count, data.len() as u64);
        assert_eq!(digest, sha256(&data));
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let mut reader = HashingReader::new(tokio::io::empty());
        let mut sink = Vec::new();
        assert_eq!(reader.read_to_end(&mut sink).await.unwrap(), 0);
        let (digest, count) = reader.finish();
        assert_eq!(count, 0);
        assert_eq!(digest, sha256(b""));
    }
}
