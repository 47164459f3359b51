use std::ops::Range;

/// Segment size used when the server does not announce one (1 MiB).
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1_048_576;
/// Smallest segment size ever used, whatever the server announces (64 KiB).
pub const MIN_CHUNK_SIZE: usize = 64 * 1024;

/// Segment size to use for a session, given the server's `max_chunk_size`.
pub fn effective_chunk_size(announced: Option<u64>) -> usize {
    let announced = announced
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
        .unwrap_or(DEFAULT_MAX_CHUNK_SIZE);
    announced.max(MIN_CHUNK_SIZE)
}

/// Byte ranges tiling `[0, len)` in order, each at most `max` bytes long.
///
/// A `max` of zero is treated as one.
pub fn segment_ranges(len: usize, max: usize) -> Segments {
    Segments {
        offset: 0,
        len,
        max: max.max(1),
    }
}

#[derive(Debug, Clone)]
pub struct Segments {
    offset: usize,
    len: usize,
    max: usize,
}

impl Iterator for Segments {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Range<usize>> {
        if self.offset >= self.len {
            return None;
        }
        let end = self.offset.saturating_add(self.max).min(self.len);
        let range = self.offset..end;
        self.offset = end;
        Some(range)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.len - self.offset).div_ceil(self.max);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Segments {}
