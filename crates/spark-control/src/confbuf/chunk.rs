use bytes::BytesMut;

/// 缓冲队列中的单个分块。
///
/// - `data` 的长度即分块当前容量：分配时零初始化，封存时截断为已提交长度；
/// - 封存后容量只减不增，且不再接受写入。
#[derive(Debug)]
pub(crate) struct Chunk {
    data: BytesMut,
    sealed: bool,
}

impl Chunk {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::zeroed(capacity),
            sealed: false,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// 将容量截断为 `len` 并封存；重复封存不会放大容量。
    pub(crate) fn seal(&mut self, len: usize) {
        debug_assert!(len <= self.data.len(), "封存长度不得超过当前容量");
        self.data.truncate(len);
        self.sealed = true;
    }

    pub(crate) fn region(&self, start: usize, len: usize) -> &[u8] {
        &self.data[start..start + len]
    }

    pub(crate) fn region_mut(&mut self, start: usize, len: usize) -> &mut [u8] {
        &mut self.data[start..start + len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_truncates_and_never_grows() {
        let mut chunk = Chunk::with_capacity(8);
        chunk.region_mut(0, 3).copy_from_slice(b"abc");
        chunk.seal(3);
        assert!(chunk.is_sealed());
        assert_eq!(chunk.capacity(), 3);
        assert_eq!(chunk.region(0, 3), b"abc");
        chunk.seal(3);
        assert_eq!(chunk.capacity(), 3);
    }
}
