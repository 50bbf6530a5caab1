use bytes::BytesMut;

/// Fixed-capacity pool of byte slots.
///
/// Slots are allocated once at their maximum size and reused after
/// [`ChunksArray::remove_at`], so holding a packet copy costs no heap
/// allocation in steady state.
#[derive(Debug)]
pub struct ChunksArray {
    storage: BytesMut,
    slot_size: usize,
    sizes: Vec<usize>,
    used: Vec<bool>,
    count: usize,
}

impl ChunksArray {
    /// Creates a pool of `capacity` slots, each `slot_size` bytes.
    pub fn new(slot_size: usize, capacity: usize) -> Self {
        Self {
            storage: BytesMut::zeroed(slot_size * capacity),
            slot_size,
            sizes: vec![0; capacity],
            used: vec![false; capacity],
            count: 0,
        }
    }

    /// Copies `chunk` into a free slot and returns its index.
    ///
    /// Returns `None` when the pool is full or the chunk exceeds the slot size.
    pub fn add(&mut self, chunk: &[u8]) -> Option<usize> {
        if chunk.len() > self.slot_size {
            return None;
        }
        let index = self.used.iter().position(|used| !used)?;
        let start = index * self.slot_size;
        self.storage[start..start + chunk.len()].copy_from_slice(chunk);
        self.sizes[index] = chunk.len();
        self.used[index] = true;
        self.count += 1;
        Some(index)
    }

    /// Returns the bytes held in slot `index`.
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        if !*self.used.get(index)? {
            return None;
        }
        let start = index * self.slot_size;
        Some(&self.storage[start..start + self.sizes[index]])
    }

    /// Frees slot `index` for reuse.
    pub fn remove_at(&mut self, index: usize) {
        if let Some(used) = self.used.get_mut(index) {
            if *used {
                *used = false;
                self.sizes[index] = 0;
                self.count -= 1;
            }
        }
    }

    /// Frees every slot.
    pub fn clear(&mut self) {
        self.used.iter_mut().for_each(|used| *used = false);
        self.sizes.iter_mut().for_each(|size| *size = 0);
        self.count = 0;
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true when no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.used.len()
    }
}
