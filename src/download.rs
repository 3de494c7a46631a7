use crate::fetcher::Fetcher;
use anyhow::Result;
use std::io::{Cursor, SeekFrom};
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWrite, AsyncWriteExt};

/// Fetch `url` and write each chunk to `writer` as it arrives, returning the number of bytes
/// written.  At most `max_length` bytes are written; a shorter download is not an error.
pub async fn download_to_writer<F, W>(
    fetcher: &F,
    url: &str,
    max_length: u64,
    writer: &mut W,
) -> Result<u64>
where
    F: Fetcher + ?Sized,
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let mut chunks = fetcher.fetch(url, max_length).await?;
    while let Some(chunk) = chunks.next_chunk().await? {
        writer.write_all(&chunk).await?;
    }
    writer.flush().await?;
    Ok(chunks.bytes_received())
}

/// Download to a [Vec<u8>] and return that.  The vector never grows beyond `max_length`.
pub async fn download_to_vec<F: Fetcher + ?Sized>(
    fetcher: &F,
    url: &str,
    max_length: u64,
) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    download_to_writer(fetcher, url, max_length, &mut data).await?;
    Ok(data)
}

/// Download into the given buffer and return the slice of that buffer containing the data.  If
/// the data is larger than the buffer, then resulting error can be downcast to [std::io::Error]
/// with kind `WriteZero`.
pub async fn download_to_buf<'a, F: Fetcher + ?Sized>(
    fetcher: &F,
    url: &str,
    max_length: u64,
    buf: &'a mut [u8],
) -> Result<&'a [u8]> {
    let mut cursor = Cursor::new(&mut buf[..]);
    download_to_writer(fetcher, url, max_length, &mut cursor).await?;
    let size = cursor.position() as usize;
    Ok(&buf[..size])
}

/// Download into the given File, which must be open in write mode.  The file is truncated first,
/// and is returned with all write operations complete and positioned at its start.
pub async fn download_to_file<F: Fetcher + ?Sized>(
    fetcher: &F,
    url: &str,
    max_length: u64,
    mut file: File,
) -> Result<File> {
    file.set_len(0).await?;
    file.seek(SeekFrom::Start(0)).await?;
    download_to_writer(fetcher, url, max_length, &mut file).await?;
    file.seek(SeekFrom::Start(0)).await?;
    Ok(file)
}
