use bytes::Bytes;

/// An owned, fixed-size record payload. The bytes are copied out of the page
/// buffer at read time, so a `Record` stays valid after the page is unpinned
/// or evicted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    data: Bytes,
}

impl Record {
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    pub(crate) fn copy_of(data: &[u8]) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
        }
    }

    pub fn data(&self) -> Bytes {
        // Note this does not copy the record data over into a new container; rather, it
        // returns a reference-counted pointer to the existing container.
        Bytes::clone(&self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for Record {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
