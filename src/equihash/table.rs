//! Working tables of the generalized-birthday collision search.
//!
//! A table is a flat `Vec<u32>` of fixed-width rows: `hash_width` words of
//! (partially XORed) hash fragment followed by `index_tuple_width` input
//! indices. Each collision round consumes one table and produces the next.
use super::hasher::HashPrefix;
use std::collections::HashMap;

const SHORT_LIST_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct XorTable {
    hash_width: usize,
    index_tuple_width: usize,
    values: Vec<u32>,
}

impl XorTable {
    fn new(hash_width: usize, index_tuple_width: usize, values: Vec<u32>) -> Self {
        debug_assert_eq!(values.len() % (hash_width + index_tuple_width), 0);
        XorTable {
            hash_width,
            index_tuple_width,
            values,
        }
    }

    /// Stage 0: one row per input `i < domain_size`, holding the first `k + 1`
    /// digest words masked to `input_bits - 1` bits, then `i` itself.
    pub(crate) fn initial(prefix: &HashPrefix, k: usize, domain_size: u32) -> Self {
        let mask = domain_size / 2 - 1;
        let hash_width = k + 1;
        let mut values = Vec::with_capacity(domain_size as usize * (hash_width + 1));
        for i in 0..domain_size {
            let hash = prefix.hash_inputs(&[i]);
            values.extend(hash[..hash_width].iter().map(|word| word & mask));
            values.push(i);
        }
        XorTable::new(hash_width, 1, values)
    }

    pub(crate) fn hash_width(&self) -> usize {
        self.hash_width
    }

    pub(crate) fn index_tuple_width(&self) -> usize {
        self.index_tuple_width
    }

    fn row_width(&self) -> usize {
        self.hash_width + self.index_tuple_width
    }

    pub(crate) fn num_rows(&self) -> usize {
        self.values.len() / self.row_width()
    }

    pub(crate) fn row(&self, i: usize) -> &[u32] {
        let width = self.row_width();
        &self.values[i * width..(i + 1) * width]
    }

    /// Index tuples of every row, in table order.
    pub(crate) fn index_tuples(&self) -> impl Iterator<Item = &[u32]> + '_ {
        let hash_width = self.hash_width;
        self.values
            .chunks_exact(self.row_width())
            .map(move |row| &row[hash_width..])
    }

    /// Pair up every two rows sharing their first hash word.
    ///
    /// In a partial round the remaining words of each pair are XORed, dropping
    /// the (now zero) first word. In the final round a pair only survives if its
    /// whole fragment matches, and the new table carries no hash at all. Index
    /// tuples are concatenated earlier row first. `key_bound` is the exclusive
    /// upper bound of first-word values.
    pub(crate) fn find_collisions(&self, is_partial: bool, key_bound: usize) -> XorTable {
        let hash_width = self.hash_width;
        let new_hash_width = if is_partial { hash_width - 1 } else { 0 };
        let new_index_tuple_width = self.index_tuple_width * 2;

        let mut values = Vec::with_capacity(self.values.len());
        let mut index_multimap = IndexMultimap::new(key_bound);

        for i in 0..self.num_rows() {
            let row = self.row(i);
            let key = row[0];
            for j in index_multimap.get(key) {
                let colliding_row = self.row(j);
                if is_partial {
                    values.extend(
                        colliding_row[1..hash_width]
                            .iter()
                            .zip(&row[1..hash_width])
                            .map(|(a, b)| a ^ b),
                    );
                } else if colliding_row[..hash_width] != row[..hash_width] {
                    continue;
                }
                values.extend_from_slice(&colliding_row[hash_width..]);
                values.extend_from_slice(&row[hash_width..]);
            }
            index_multimap.put(key, i as u32);
        }

        XorTable::new(new_hash_width, new_index_tuple_width, values)
    }
}

/// Multimap from a first hash word to the rows carrying it.
///
/// Keys below the bound get four inline slots (row + 1, zero meaning free);
/// anything beyond that spills into a `HashMap`. Lookups yield rows in
/// insertion order.
struct IndexMultimap {
    short_lists: Vec<u32>,
    overspill: HashMap<u32, Vec<u32>>,
}

impl IndexMultimap {
    fn new(key_bound: usize) -> Self {
        IndexMultimap {
            short_lists: vec![0; key_bound * SHORT_LIST_LEN],
            overspill: HashMap::new(),
        }
    }

    fn slots(&self, key: u32) -> &[u32] {
        let start = key as usize * SHORT_LIST_LEN;
        self.short_lists
            .get(start..start + SHORT_LIST_LEN)
            .unwrap_or(&[])
    }

    fn get(&self, key: u32) -> impl Iterator<Item = usize> + '_ {
        let inline = self
            .slots(key)
            .iter()
            .take_while(|slot| **slot != 0)
            .map(|slot| (*slot - 1) as usize);
        let spilled = self
            .overspill
            .get(&key)
            .into_iter()
            .flatten()
            .map(|row| *row as usize);
        inline.chain(spilled)
    }

    fn put(&mut self, key: u32, row: u32) {
        let start = key as usize * SHORT_LIST_LEN;
        if let Some(slots) = self.short_lists.get_mut(start..start + SHORT_LIST_LEN) {
            if let Some(free) = slots.iter_mut().find(|slot| **slot == 0) {
                *free = row + 1;
                return;
            }
        }
        self.overspill.entry(key).or_default().push(row);
    }
}
