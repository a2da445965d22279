//! Typed device buffers and views.
//!
//! Storage is host memory behind a lock; writes only happen when an upload
//! command executes at a commit point.

use bytemuck::Pod;
use parking_lot::RwLock;
use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::Arc;

use super::stream::{Command, CommandKind};
use crate::util::{Error, Result};

/// Untyped backing store shared by a buffer and all its views.
pub(crate) struct RawBuffer {
    pub(crate) id: u64,
    pub(crate) bytes: RwLock<Vec<u8>>,
}

impl RawBuffer {
    pub(crate) fn new(id: u64, size_bytes: usize) -> Arc<Self> {
        Arc::new(Self {
            id,
            bytes: RwLock::new(vec![0u8; size_bytes]),
        })
    }

    pub(crate) fn size_bytes(&self) -> usize {
        self.bytes.read().len()
    }
}

/// Device buffer of `len` elements of `T`.
pub struct Buffer<T> {
    raw: Arc<RawBuffer>,
    len: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Pod> Buffer<T> {
    pub(crate) fn from_raw(raw: Arc<RawBuffer>, len: usize) -> Self {
        Self {
            raw,
            len,
            _marker: PhantomData,
        }
    }

    /// Element count.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Device-unique buffer id.
    pub fn id(&self) -> u64 {
        self.raw.id
    }

    /// View over the whole buffer.
    pub fn view(&self) -> BufferView<T> {
        BufferView::new(self.raw.clone(), 0, self.len)
    }

    /// Upload command filling the buffer from `data`.
    pub fn copy_from(&self, data: &[T]) -> Command {
        self.view().copy_from(data)
    }

    /// Read one element as a kernel would.
    pub fn read(&self, index: usize) -> Result<T> {
        self.view().read(index)
    }
}

impl<T> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            len: self.len,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.raw.id)
            .field("len", &self.len)
            .finish()
    }
}

/// Window of `len` elements starting at element `offset` of a buffer.
pub struct BufferView<T> {
    raw: Arc<RawBuffer>,
    offset: usize,
    len: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Pod> BufferView<T> {
    pub(crate) fn new(raw: Arc<RawBuffer>, offset: usize, len: usize) -> Self {
        Self {
            raw,
            offset,
            len,
            _marker: PhantomData,
        }
    }

    pub(crate) fn raw(&self) -> &Arc<RawBuffer> {
        &self.raw
    }

    /// Offset in elements of `T` from the start of the buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Offset in bytes from the start of the buffer.
    pub fn offset_bytes(&self) -> usize {
        self.offset * size_of::<T>()
    }

    /// Element count.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the view holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Device-unique id of the underlying buffer.
    pub fn buffer_id(&self) -> u64 {
        self.raw.id
    }

    /// View over the entire underlying buffer.
    pub fn original(&self) -> BufferView<T> {
        BufferView::new(self.raw.clone(), 0, self.raw.size_bytes() / size_of::<T>())
    }

    /// Upload command writing `data` at the start of this view.
    ///
    /// Elements beyond the view length are ignored.
    pub fn copy_from(&self, data: &[T]) -> Command {
        let count = data.len().min(self.len);
        let bytes = bytemuck::cast_slice::<T, u8>(&data[..count]).to_vec();
        let raw = self.raw.clone();
        let byte_offset = self.offset_bytes();
        Command::new(
            CommandKind::BufferUpload {
                buffer: raw.id,
                bytes: bytes.len(),
            },
            move || {
                let mut storage = raw.bytes.write();
                let end = byte_offset + bytes.len();
                if end > storage.len() {
                    return Err(Error::BufferOutOfBounds {
                        index: end,
                        len: storage.len(),
                    });
                }
                storage[byte_offset..end].copy_from_slice(&bytes);
                Ok(())
            },
        )
    }

    /// Read element `index` of the view.
    pub fn read(&self, index: usize) -> Result<T> {
        if index >= self.len {
            return Err(Error::BufferOutOfBounds {
                index,
                len: self.len,
            });
        }
        let start = (self.offset + index) * size_of::<T>();
        let storage = self.raw.bytes.read();
        let bytes = storage
            .get(start..start + size_of::<T>())
            .ok_or(Error::BufferOutOfBounds {
                index: self.offset + index,
                len: storage.len() / size_of::<T>(),
            })?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Copy the whole view back to the host.
    pub fn to_vec(&self) -> Vec<T> {
        let storage = self.raw.bytes.read();
        let start = self.offset_bytes();
        let end = (start + self.len * size_of::<T>()).min(storage.len());
        storage[start.min(end)..end]
            .chunks_exact(size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }
}

impl<T> Clone for BufferView<T> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            offset: self.offset,
            len: self.len,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for BufferView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferView")
            .field("buffer", &self.raw.id)
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_is_deferred_until_run() {
        let raw = RawBuffer::new(1, 16);
        let view = BufferView::<u32>::new(raw, 1, 2);
        let cmd = view.copy_from(&[7, 8, 9]);
        assert_eq!(view.read(0).unwrap(), 0);
        cmd.run().unwrap();
        assert_eq!(view.to_vec(), vec![7, 8]);
        assert_eq!(view.original().to_vec(), vec![0, 7, 8, 0]);
    }

    #[test]
    fn test_read_out_of_bounds() {
        let raw = RawBuffer::new(1, 8);
        let view = BufferView::<u32>::new(raw, 0, 2);
        assert!(matches!(
            view.read(2),
            Err(Error::BufferOutOfBounds { index: 2, len: 2 })
        ));
    }
}
