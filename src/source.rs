use std::collections::VecDeque;
use std::io::Read;

use crate::{LlamaError, Result};

/// A source of variably-sized byte chunks: a file, a response body, an
/// in-memory queue. `None` means the stream is exhausted.
pub trait ChunkStream {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

impl ChunkStream for VecDeque<Vec<u8>> {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.pop_front())
    }
}

const CHUNK_SIZE: usize = 64 * 1024;

/// Adapts any [`Read`] into a chunk stream.
pub struct ReadChunks<R> {
    reader: R,
}

impl<R: Read> ReadChunks<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read> ChunkStream for ReadChunks<R> {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = vec![0; CHUNK_SIZE];
        let read = self.reader.read(&mut chunk)?;

        if read == 0 {
            return Ok(None);
        }

        chunk.truncate(read);

        Ok(Some(chunk))
    }
}

/// Pull-based view over a chunk stream that fills caller-supplied buffers of
/// any size with consecutive stream bytes, hiding chunk boundaries.
///
/// At most one partially-consumed source chunk is held between calls; a
/// `request` either fills its buffer completely or fails, so no partially
/// filled destination ever survives a call. Dropping the `DataSource`
/// releases the underlying stream.
pub struct DataSource<S> {
    stream: S,
    chunk: Vec<u8>,
    consumed: usize,
    ended: bool,
}

impl<S: ChunkStream> DataSource<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            chunk: Vec::new(),
            consumed: 0,
            ended: false,
        }
    }

    /// Fills `dest` with the next `dest.len()` bytes of the stream.
    ///
    /// `dest` may be a sub-slice of a larger buffer; only the given range is
    /// touched. An empty `dest` is a valid drain probe: it pulls from the
    /// stream only when no source bytes are pending. Once the stream has
    /// ended every call fails, including empty ones; a buffer that cannot be
    /// filled completely fails after its prefix has been written.
    pub fn request(&mut self, dest: &mut [u8]) -> Result<()> {
        if self.ended {
            return Err(LlamaError::UnexpectedEndOfStream);
        }

        let mut filled = 0;

        loop {
            if self.consumed == self.chunk.len() {
                match self.stream.next_chunk()? {
                    Some(chunk) => {
                        self.chunk = chunk;
                        self.consumed = 0;
                    }
                    None => {
                        self.ended = true;
                        return Err(LlamaError::UnexpectedEndOfStream);
                    }
                }
            }

            let step = (self.chunk.len() - self.consumed).min(dest.len() - filled);
            dest[filled..filled + step]
                .copy_from_slice(&self.chunk[self.consumed..self.consumed + step]);
            self.consumed += step;
            filled += step;

            if filled == dest.len() {
                return Ok(());
            }
        }
    }

    /// [`request`](Self::request) for f32 buffers; stream floats are
    /// little-endian and poured in as raw bytes.
    pub fn request_f32(&mut self, dest: &mut [f32]) -> Result<()> {
        let byte_len = dest.len() * std::mem::size_of::<f32>();
        let bytes =
            unsafe { std::slice::from_raw_parts_mut(dest.as_mut_ptr().cast::<u8>(), byte_len) };
        self.request(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_source(chunks: &[&[u8]]) -> DataSource<VecDeque<Vec<u8>>> {
        DataSource::new(chunks.iter().map(|chunk| chunk.to_vec()).collect())
    }

    #[test]
    fn empty_source_data() {
        let mut source = data_source(&[]);
        let mut dest = *b".";

        assert!(matches!(
            source.request(&mut dest),
            Err(LlamaError::UnexpectedEndOfStream)
        ));
    }

    #[test]
    fn exhausted_source_data_s_tt() {
        let mut source = data_source(&[b"a"]);
        let mut dest = *b"..";

        assert!(matches!(
            source.request(&mut dest),
            Err(LlamaError::UnexpectedEndOfStream)
        ));
        assert_eq!(&dest, b"a.");
    }

    #[test]
    fn exhausted_source_data_ss_t_tt() {
        let mut source = data_source(&[b"ab"]);
        let mut dest1 = *b".";
        let mut dest2 = *b"..";

        source.request(&mut dest1).unwrap();

        assert!(matches!(
            source.request(&mut dest2),
            Err(LlamaError::UnexpectedEndOfStream)
        ));
        assert_eq!(&dest1, b"a");
        assert_eq!(&dest2, b"b.");
    }

    #[test]
    fn exhausted_source_data_s_s_ttt() {
        let mut source = data_source(&[b"a", b"b"]);
        let mut dest = *b"...";

        assert!(matches!(
            source.request(&mut dest),
            Err(LlamaError::UnexpectedEndOfStream)
        ));
        assert_eq!(&dest, b"ab.");
    }

    #[test]
    fn exhausted_source_data_s_s_t_tt() {
        let mut source = data_source(&[b"a", b"b"]);
        let mut dest1 = *b".";
        let mut dest2 = *b"..";

        source.request(&mut dest1).unwrap();

        assert!(matches!(
            source.request(&mut dest2),
            Err(LlamaError::UnexpectedEndOfStream)
        ));
        assert_eq!(&dest1, b"a");
        assert_eq!(&dest2, b"b.");
    }

    #[test]
    fn exact_request_succeeds_then_drain_fails() {
        let mut source = data_source(&[b"ab", b"cd"]);
        let mut dest = [0; 4];

        source.request(&mut dest).unwrap();
        assert_eq!(&dest, b"abcd");

        assert!(matches!(
            source.request(&mut []),
            Err(LlamaError::UnexpectedEndOfStream)
        ));
        assert!(matches!(
            source.request(&mut dest),
            Err(LlamaError::UnexpectedEndOfStream)
        ));
    }

    #[test]
    fn empty_request_with_pending_bytes_is_a_no_op() {
        let mut source = data_source(&[b"ab"]);
        let mut dest = [0; 1];

        source.request(&mut dest).unwrap();
        source.request(&mut []).unwrap();
        source.request(&mut dest).unwrap();
        assert_eq!(&dest, b"b");
    }

    #[test]
    fn fills_a_sub_range_of_a_larger_buffer() {
        let mut source = data_source(&[b"xyz"]);
        let mut dest = *b"........";

        source.request(&mut dest[2..5]).unwrap();
        assert_eq!(&dest, b"..xyz...");
    }

    #[test]
    fn reassembles_any_partition() {
        let data: Vec<u8> = (0..=41).collect();

        for chunk_size in 1..=7 {
            for request_size in 1..=7 {
                let chunks: VecDeque<Vec<u8>> =
                    data.chunks(chunk_size).map(<[u8]>::to_vec).collect();
                let mut source = DataSource::new(chunks);
                let mut out = Vec::new();
                let mut dest = vec![0; request_size];

                while out.len() < data.len() {
                    let take = request_size.min(data.len() - out.len());
                    source.request(&mut dest[..take]).unwrap();
                    out.extend_from_slice(&dest[..take]);
                }

                assert_eq!(out, data);
                assert!(source.request(&mut []).is_err());
            }
        }
    }

    #[test]
    fn request_f32_reads_little_endian() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-2.0f32).to_le_bytes());

        let mut source = data_source(&[&bytes]);
        let mut dest = [0.0f32; 2];

        source.request_f32(&mut dest).unwrap();
        assert_eq!(dest, [1.5, -2.0]);
    }
}
