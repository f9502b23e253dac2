//! Body copy loops.
//!
//! [`copy_chunked`] flushes the sink after every read so a client sees
//! streamed data as soon as the producer emits it. [`copy_buffered`] lets the
//! sink coalesce writes and flushes once at the end.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::CopyError;

/// Read buffer size; one read is at most one unit of transmission.
pub const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Copy `src` into `dst`, flushing after each unit read.
///
/// No length is required and none is enforced; the copy runs until `src`
/// reports EOF. The sink is flushed at least once, even for an empty source.
/// Returns the number of bytes written, or the first read, write or flush
/// failure together with the bytes written before it.
pub async fn copy_chunked<W, R>(dst: &mut W, src: &mut R) -> Result<u64, CopyError>
where
    W: AsyncWrite + Unpin + ?Sized,
    R: AsyncRead + Unpin + ?Sized,
{
    copy(dst, src, true).await
}

/// Copy `src` into `dst` with a single flush at the end.
pub async fn copy_buffered<W, R>(dst: &mut W, src: &mut R) -> Result<u64, CopyError>
where
    W: AsyncWrite + Unpin + ?Sized,
    R: AsyncRead + Unpin + ?Sized,
{
    copy(dst, src, false).await
}

async fn copy<W, R>(dst: &mut W, src: &mut R, flush_each: bool) -> Result<u64, CopyError>
where
    W: AsyncWrite + Unpin + ?Sized,
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut written = 0u64;
    let fail = |written, source| CopyError { written, source };

    loop {
        let n = match src.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(fail(written, e)),
        };

        dst.write_all(&buf[..n]).await.map_err(|e| fail(written, e))?;
        written += n as u64;

        if flush_each {
            dst.flush().await.map_err(|e| fail(written, e))?;
        }
    }

    dst.flush().await.map_err(|e| fail(written, e))?;
    Ok(written)
}
