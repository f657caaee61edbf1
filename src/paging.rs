//! Splitting firmware images into flash pages.

/// Image length rounded up to a whole number of pages
pub fn padded_size(len: usize, page_size: usize) -> usize {
    match len % page_size {
        0 => len,
        r => len + (page_size - r),
    }
}

/// Page checksum sent ahead of each page.
///
/// Little-endian 16-bit words are summed and carries folded back in until the
/// sum fits in 16 bits. An odd trailing byte counts as a word with a zero
/// high byte.
pub fn page_checksum(page: &[u8]) -> [u8; 2] {
    let mut sum: u64 = page
        .chunks(2)
        .map(|w| u16::from_le_bytes([w[0], *w.get(1).unwrap_or(&0)]) as u64)
        .sum();

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    (sum as u16).to_le_bytes()
}

/// Fixed size, zero padded pages of a firmware image
#[derive(Clone, Debug)]
pub struct Pages<'a> {
    chunks: core::slice::Chunks<'a, u8>,
    page_size: usize,
}

impl<'a> Pages<'a> {
    /// Split `image` into pages of `page_size` bytes.
    ///
    /// Panics if `page_size` is zero.
    pub fn new(image: &'a [u8], page_size: usize) -> Self {
        Self {
            chunks: image.chunks(page_size),
            page_size,
        }
    }
}

impl Iterator for Pages<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        let chunk = self.chunks.next()?;

        let mut page = Vec::with_capacity(self.page_size);
        page.extend_from_slice(chunk);
        page.resize(self.page_size, 0);

        Some(page)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Pages<'_> {}
