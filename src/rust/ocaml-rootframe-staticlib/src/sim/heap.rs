// A small copying collector with OCaml's block layout.
//
// Everything is allocated in one space. When it fills up (or on every `collect_every`-th
// allocation) live blocks are evacuated to a fresh space, Cheney style, starting from the
// `local_roots` list and the global roots. That makes every collection move every live block,
// which is exactly what a test of the rooting code wants.

use std::ops::Range;
use std::ptr;

use crate::caml::mlvalues::{Color, Header, Tag, Value};
use crate::caml::roots::{for_each_local_root, CamlRootsBlock};

/// Written over an evacuated space, so a value that wasn't rooted reads back as garbage
pub const POISON: u64 = 0xDEAD_BEEF_DEAD_BEEF;

// Header of a block that has already been copied, its first field holds the new address
const FORWARDED: u64 = 0;

const MIN_HEAP_WORDS: usize = 64;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SimConfig {
    pub heap_words: usize,
    // Force a collection on every n-th allocation
    pub collect_every: Option<usize>,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            heap_words: 4096,
            collect_every: None,
        }
    }
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct SimStats {
    pub allocations: usize,
    pub collections: usize,
    pub blocks_copied: usize,
    pub words_copied: usize,
    pub roots_scanned: usize,
    pub heap_words: usize,
    pub live_words: usize,
}

#[repr(C, align(8))]
struct AtomTable([u64; 257]);

const fn build_atom_table() -> AtomTable {
    let mut table = [0; 257];
    let mut tag = 0;
    while tag < 256 {
        table[tag] = Header::make(0, Tag(tag as u8), Color::Black).0;
        tag += 1;
    }
    AtomTable(table)
}

// Zero sized blocks live outside the heap and are never moved, as in the real runtime
static ATOM_TABLE: AtomTable = build_atom_table();

pub fn atom(tag: Tag) -> Value {
    let address = unsafe { ATOM_TABLE.0.as_ptr().add(tag.0 as usize + 1) };
    Value::from_raw(address as i64)
}

pub struct SimHeap {
    config: SimConfig,
    space: Vec<u64>,
    used: usize,
    // The last evacuated space, kept (poisoned) until the next collection
    retired: Vec<u64>,
    global_roots: Vec<*mut Value>,
    stats: SimStats,
}

impl SimHeap {
    pub fn new(config: SimConfig) -> SimHeap {
        let words = config.heap_words.max(MIN_HEAP_WORDS);
        SimHeap {
            config,
            space: vec![0; words],
            used: 0,
            retired: Vec::new(),
            global_roots: Vec::new(),
            stats: SimStats {
                heap_words: words,
                ..SimStats::default()
            },
        }
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    fn address_of(&self, index: usize) -> usize {
        self.space.as_ptr() as usize + index * 8
    }

    fn used_range(&self) -> Range<usize> {
        self.address_of(0)..self.address_of(self.used)
    }

    /// Is this something a value can currently be: an int, an atom, or a block in the live space
    pub fn is_live(&self, value: Value) -> bool {
        if value.is_long() {
            return true;
        }

        let address = value.as_block().address();
        let atoms = ATOM_TABLE.0.as_ptr_range();
        (atoms.start as usize..=atoms.end as usize).contains(&address)
            || self.used_range().contains(&address)
    }

    /// Allocate a block, which may collect first. Scannable blocks are filled with `()`.
    pub fn alloc(&mut self, wosize: usize, tag: Tag, local_roots: *mut CamlRootsBlock) -> Value {
        if wosize == 0 {
            return atom(tag);
        }

        self.stats.allocations += 1;
        let needed = wosize + 1;

        let forced = match self.config.collect_every {
            Some(n) if n > 0 => self.stats.allocations % n == 0,
            _ => false,
        };
        if forced || self.used + needed > self.space.len() {
            self.collect(local_roots, needed);
        }

        let header_index = self.used;
        self.space[header_index] = Header::make(wosize, tag, Color::White).0;

        let fill = if tag < Tag::NO_SCAN {
            Value::UNIT.raw() as u64
        } else {
            0
        };
        for word in &mut self.space[header_index + 1..header_index + needed] {
            *word = fill;
        }

        self.used += needed;
        self.stats.live_words = self.used;
        Value::from_raw(self.address_of(header_index + 1) as i64)
    }

    pub fn register_global_root(&mut self, slot: *mut Value) {
        self.global_roots.push(slot);
    }

    pub fn remove_global_root(&mut self, slot: *mut Value) {
        self.global_roots.retain(|&s| s != slot);
    }

    pub fn global_roots(&self) -> usize {
        self.global_roots.len()
    }

    /// Evacuate everything reachable into a new space with room for at least `extra_words` more
    pub fn collect(&mut self, local_roots: *mut CamlRootsBlock, extra_words: usize) {
        let to_words = self
            .config
            .heap_words
            .max(self.space.len())
            .max(self.used + extra_words);
        let mut to_space = vec![0; to_words];

        let mut evacuation = Evacuation {
            from: self.used_range(),
            to: &mut to_space,
            to_used: 0,
            blocks_copied: 0,
        };

        let mut roots_scanned = 0;
        unsafe {
            for_each_local_root(local_roots, |slot| {
                *slot = evacuation.forward(*slot);
                roots_scanned += 1;
            });
            for &slot in &self.global_roots {
                *slot = evacuation.forward(*slot);
                roots_scanned += 1;
            }
            evacuation.scan();
        }

        let to_used = evacuation.to_used;
        let blocks_copied = evacuation.blocks_copied;

        let mut old_space = std::mem::replace(&mut self.space, to_space);
        for word in old_space.iter_mut() {
            *word = POISON;
        }
        self.retired = old_space;
        self.used = to_used;

        self.stats.collections += 1;
        self.stats.blocks_copied += blocks_copied;
        self.stats.words_copied += to_used;
        self.stats.roots_scanned += roots_scanned;
        self.stats.heap_words = self.space.len();
        self.stats.live_words = to_used;
    }
}

struct Evacuation<'a> {
    from: Range<usize>,
    to: &'a mut [u64],
    to_used: usize,
    blocks_copied: usize,
}

impl Evacuation<'_> {
    unsafe fn forward(&mut self, value: Value) -> Value {
        if value.is_long() {
            return value;
        }

        let block = value.as_block();
        if !self.from.contains(&block.address()) {
            // Atoms, and anything else outside the heap
            return value;
        }

        let header = block.header();
        if header.0 == FORWARDED {
            return block.get_field(0);
        }

        let wosize = header.wosize();
        let dest = self.to_used;
        self.to[dest] = header.0;
        ptr::copy_nonoverlapping(
            block.field_pointer(0) as *const u64,
            self.to.as_mut_ptr().add(dest + 1),
            wosize,
        );
        self.to_used += wosize + 1;
        self.blocks_copied += 1;

        let moved = Value::from_raw(self.to.as_ptr().add(dest + 1) as i64);
        *block.header_pointer() = Header(FORWARDED);
        block.initialize_field(0, moved);
        moved
    }

    unsafe fn scan(&mut self) {
        let mut scan = 0;
        while scan < self.to_used {
            let header = Header(self.to[scan]);
            let wosize = header.wosize();

            if header.is_scannable() {
                for index in scan + 1..=scan + wosize {
                    let forwarded = self.forward(Value::from_raw(self.to[index] as i64));
                    self.to[index] = forwarded.raw() as u64;
                }
            }

            scan += wosize + 1;
        }
    }
}
