//! Heap allocator behind the `malloc` and `mfree` opcodes
//!
//! The heap lives in a region that starts at the end of the game's memory at
//! the time of the first allocation. Blocks are handed out first-fit from a
//! free list; when nothing fits, the region grows through a [`HeapBacking`].
//!
//! Only allocation metadata is tracked here. The bytes themselves live in the
//! backing memory and are saved with it.

use log::debug;

/// Memory that the heap region can be grown and shrunk in
pub trait HeapBacking {
    /// Current end of the backing memory
    fn end_mem(&self) -> u32;

    /// Try to move the end of the backing memory; `false` if refused
    fn resize(&mut self, new_end: u32) -> bool;
}

/// An allocated or free span of the heap, by absolute address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapEntry {
    pub start: u32,
    pub length: u32,
}

impl HeapEntry {
    pub fn end(&self) -> u32 {
        self.start + self.length
    }
}

/// First-fit allocator over a growable region
#[derive(Debug, Clone)]
pub struct HeapAllocator {
    heap_address: u32,
    end_mem: u32,
    heap_extent: u32,
    max_heap_extent: u32,
    blocks: Vec<HeapEntry>, // sorted by start
    free_list: Vec<HeapEntry>,
}

impl HeapAllocator {
    /// Start an empty heap at `heap_address`. A `max_heap_extent` of 0 means
    /// the region is limited only by the backing memory.
    pub fn new(heap_address: u32, max_heap_extent: u32) -> Self {
        HeapAllocator {
            heap_address,
            end_mem: heap_address,
            heap_extent: 0,
            max_heap_extent,
            blocks: Vec::new(),
            free_list: Vec::new(),
        }
    }

    pub fn address(&self) -> u32 {
        self.heap_address
    }

    pub fn extent(&self) -> u32 {
        self.heap_extent
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[HeapEntry] {
        &self.blocks
    }

    pub fn free_list(&self) -> &[HeapEntry] {
        &self.free_list
    }

    /// Allocate `size` bytes, returning the block address or `None`
    pub fn alloc<B: HeapBacking>(&mut self, size: u32, backing: &mut B) -> Option<u32> {
        let mut found = None;
        if let Some(i) = self.free_list.iter().position(|e| e.length >= size) {
            let entry = &mut self.free_list[i];
            found = Some(entry.start);
            if entry.length > size {
                entry.start += size;
                entry.length -= size;
            } else {
                self.free_list.remove(i);
            }
        }

        let start = match found {
            Some(start) => start,
            None => {
                let available = self.end_mem - self.heap_address - self.heap_extent;
                if available < size {
                    let needed = self.heap_extent.checked_add(size)?;
                    if self.max_heap_extent != 0 && needed > self.max_heap_extent {
                        return None;
                    }
                    let mut new_allocation =
                        needed.max(self.heap_extent.saturating_mul(5) / 4);
                    if self.max_heap_extent != 0 {
                        new_allocation = new_allocation.min(self.max_heap_extent);
                    }
                    let new_end = self.heap_address.checked_add(new_allocation)?;
                    if !backing.resize(new_end) {
                        return None;
                    }
                    debug!(
                        "heap region grown to {:#x} bytes at {:#010x}",
                        new_allocation, self.heap_address
                    );
                    self.end_mem = backing.end_mem();
                }
                let start = self.heap_address + self.heap_extent;
                self.heap_extent += size;
                start
            }
        };

        let entry = HeapEntry {
            start,
            length: size,
        };
        let pos = self.blocks.partition_point(|b| b.start < start);
        self.blocks.insert(pos, entry);
        Some(start)
    }

    /// Release the block at `address`. Returns `false` if no block starts there.
    pub fn free<B: HeapBacking>(&mut self, address: u32, backing: &mut B) -> bool {
        let Ok(index) = self.blocks.binary_search_by_key(&address, |b| b.start) else {
            return false;
        };
        let entry = self.blocks.remove(index);

        if entry.end() == self.heap_address + self.heap_extent {
            let top = self.blocks.iter().map(HeapEntry::end).max();
            self.heap_extent = top.map_or(0, |end| end - self.heap_address);
            let limit = self.heap_address + self.heap_extent;
            self.free_list.retain(|e| e.start < limit);
        } else {
            self.free_list.push(entry);
        }

        if self.heap_extent <= (self.end_mem - self.heap_address) / 2 {
            let new_end = self.heap_address + self.heap_extent;
            if backing.resize(new_end) {
                self.end_mem = backing.end_mem();
                self.free_list.retain(|e| e.end() <= new_end);
            }
        }
        true
    }

    /// Serialize the block list as `[heap_address, count, (start, length)*]`
    pub fn save(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 8 * self.blocks.len());
        out.extend_from_slice(&self.heap_address.to_be_bytes());
        out.extend_from_slice(&(self.blocks.len() as u32).to_be_bytes());
        for block in &self.blocks {
            out.extend_from_slice(&block.start.to_be_bytes());
            out.extend_from_slice(&block.length.to_be_bytes());
        }
        out
    }

    /// Rebuild an allocator from [`save`](Self::save) output. The free list is
    /// recomputed from the gaps between blocks. Fails on malformed data or when
    /// the backing memory cannot hold the restored extent.
    pub fn restore<B: HeapBacking>(
        data: &[u8],
        max_heap_extent: u32,
        backing: &mut B,
    ) -> Option<Self> {
        let word = |i: usize| -> Option<u32> {
            let b = data.get(i..i + 4)?;
            Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        };
        let heap_address = word(0)?;
        let count = word(4)? as usize;

        let mut blocks = Vec::with_capacity(count);
        for i in 0..count {
            let offset = 8 + 8 * i;
            blocks.push(HeapEntry {
                start: word(offset)?,
                length: word(offset + 4)?,
            });
        }
        blocks.sort_by_key(|b| b.start);

        let mut free_list = Vec::new();
        let mut next = heap_address;
        for block in &blocks {
            if block.start < next {
                return None;
            }
            if block.start > next {
                free_list.push(HeapEntry {
                    start: next,
                    length: block.start - next,
                });
            }
            next = block.end();
        }
        let heap_extent = next - heap_address;

        let wanted = backing.end_mem().max(next);
        if wanted != backing.end_mem() && !backing.resize(wanted) {
            return None;
        }
        let end_mem = backing.end_mem();

        Some(HeapAllocator {
            heap_address,
            end_mem,
            heap_extent,
            max_heap_extent,
            blocks,
            free_list,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Region {
        end: u32,
        limit: u32,
    }

    impl HeapBacking for Region {
        fn end_mem(&self) -> u32 {
            self.end
        }

        fn resize(&mut self, new_end: u32) -> bool {
            if new_end > self.limit {
                return false;
            }
            self.end = new_end;
            true
        }
    }

    fn region() -> Region {
        Region {
            end: 0x1000,
            limit: 0x10000,
        }
    }

    #[test]
    fn test_alloc_grows_region() {
        let mut backing = region();
        let mut heap = HeapAllocator::new(0x1000, 0);
        assert_eq!(heap.alloc(16, &mut backing), Some(0x1000));
        assert_eq!(heap.alloc(32, &mut backing), Some(0x1010));
        assert_eq!(heap.block_count(), 2);
        assert_eq!(heap.extent(), 48);
        assert!(backing.end >= 0x1030);
    }

    #[test]
    fn test_free_top_block_shrinks_extent() {
        let mut backing = region();
        let mut heap = HeapAllocator::new(0x1000, 0);
        let a = heap.alloc(16, &mut backing).unwrap();
        let b = heap.alloc(16, &mut backing).unwrap();
        assert!(heap.free(b, &mut backing));
        assert_eq!(heap.extent(), 16);
        assert!(heap.free_list().is_empty());
        assert!(heap.free(a, &mut backing));
        assert_eq!(heap.extent(), 0);
        assert_eq!(heap.block_count(), 0);
    }

    #[test]
    fn test_free_inner_block_is_reused() {
        let mut backing = region();
        let mut heap = HeapAllocator::new(0x1000, 0);
        let a = heap.alloc(16, &mut backing).unwrap();
        let _b = heap.alloc(16, &mut backing).unwrap();
        assert!(heap.free(a, &mut backing));
        assert_eq!(heap.free_list().len(), 1);
        let extent = heap.extent();
        assert_eq!(heap.alloc(16, &mut backing), Some(a));
        assert_eq!(heap.extent(), extent);
        assert!(heap.free_list().is_empty());
    }

    #[test]
    fn test_partial_reuse_shrinks_free_entry() {
        let mut backing = region();
        let mut heap = HeapAllocator::new(0x1000, 0);
        let a = heap.alloc(32, &mut backing).unwrap();
        let _b = heap.alloc(8, &mut backing).unwrap();
        heap.free(a, &mut backing);
        assert_eq!(heap.alloc(8, &mut backing), Some(a));
        assert_eq!(
            heap.free_list(),
            &[HeapEntry {
                start: a + 8,
                length: 24
            }]
        );
    }

    #[test]
    fn test_max_extent_refuses_growth() {
        let mut backing = region();
        let mut heap = HeapAllocator::new(0x1000, 64);
        assert!(heap.alloc(60, &mut backing).is_some());
        assert_eq!(heap.alloc(8, &mut backing), None);
    }

    #[test]
    fn test_free_unknown_address() {
        let mut backing = region();
        let mut heap = HeapAllocator::new(0x1000, 0);
        heap.alloc(8, &mut backing);
        assert!(!heap.free(0x1004, &mut backing));
    }

    #[test]
    fn test_save_and_restore_recomputes_free_list() {
        let mut backing = region();
        let mut heap = HeapAllocator::new(0x1000, 0);
        let a = heap.alloc(16, &mut backing).unwrap();
        let b = heap.alloc(8, &mut backing).unwrap();
        let _c = heap.alloc(4, &mut backing).unwrap();
        heap.free(a, &mut backing);

        let data = heap.save();
        assert_eq!(data.len(), 8 + 8 * 2);
        assert_eq!(&data[8..12], &b.to_be_bytes());
        assert_eq!(&data[12..16], &8u32.to_be_bytes());

        let mut fresh = Region {
            end: 0x1000,
            limit: 0x10000,
        };
        let restored = HeapAllocator::restore(&data, 0, &mut fresh).unwrap();
        assert_eq!(restored.block_count(), 2);
        assert_eq!(restored.extent(), 28);
        assert_eq!(
            restored.free_list(),
            &[HeapEntry {
                start: 0x1000,
                length: 16
            }]
        );
        assert!(fresh.end >= 0x1000 + 28);
    }

    #[test]
    fn test_restore_fails_when_backing_cannot_grow() {
        let mut backing = region();
        let mut heap = HeapAllocator::new(0x1000, 0);
        heap.alloc(64, &mut backing);
        let data = heap.save();
        let mut tiny = Region {
            end: 0x1000,
            limit: 0x1010,
        };
        assert!(HeapAllocator::restore(&data, 0, &mut tiny).is_none());
    }
}
