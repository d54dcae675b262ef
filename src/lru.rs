/// Number of bits in a simulated address.
pub const ADDRESS_BITS: u32 = u64::BITS;

/// Shape of the simulated cache.
///
/// An address is split, from least to most significant bit, into
/// `block_offset_bits` offset bits, `set_index_bits` set-index bits and the
/// remaining tag bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Geometry {
    /// `s`: there are `2^s` sets
    pub set_index_bits: u32,
    /// `E`: number of cache-lines in a set
    pub lines_per_set: usize,
    /// `b`: a block holds `2^b` bytes
    pub block_offset_bits: u32,
}

impl Geometry {
    pub fn new(set_index_bits: u32, lines_per_set: usize, block_offset_bits: u32) -> Self {
        Self {
            set_index_bits,
            lines_per_set,
            block_offset_bits,
        }
    }

    fn tag_bits(&self) -> u32 {
        ADDRESS_BITS.saturating_sub(self.set_index_bits.saturating_add(self.block_offset_bits))
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "s={} E={} b={} | {} tag bits | {} set bits | {} offset bits |",
            self.set_index_bits,
            self.lines_per_set,
            self.block_offset_bits,
            self.tag_bits(),
            self.set_index_bits,
            self.block_offset_bits
        ))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GeometryError {
    NoLines,
    AddressTooNarrow {
        set_index_bits: u32,
        block_offset_bits: u32,
    },
    TooLarge {
        set_index_bits: u32,
        lines_per_set: usize,
    },
}

impl std::fmt::Display for GeometryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeometryError::NoLines => f.write_str("a set needs at least one line (E >= 1)"),
            GeometryError::AddressTooNarrow {
                set_index_bits,
                block_offset_bits,
            } => f.write_fmt(format_args!(
                "{set_index_bits} set bits + {block_offset_bits} offset bits do not fit in a {ADDRESS_BITS}-bit address"
            )),
            GeometryError::TooLarge {
                set_index_bits,
                lines_per_set,
            } => f.write_fmt(format_args!(
                "2^{set_index_bits} sets with {lines_per_set} lines each cannot be allocated"
            )),
        }
    }
}

impl std::error::Error for GeometryError {}

/// Set-associative cache state with LRU bookkeeping.
///
/// Recency is a logical timestamp per line rather than a move-to-front list,
/// the caller supplies the current time on every access.
#[derive(Debug)]
pub struct LruCache {
    geometry: Geometry,
    set_index_mask: u64,
    sets: Vec<CacheSet>,
}

impl LruCache {
    pub fn new(geometry: Geometry) -> Result<Self, GeometryError> {
        let Geometry {
            set_index_bits,
            lines_per_set,
            block_offset_bits,
        } = geometry;

        if lines_per_set < 1 {
            return Err(GeometryError::NoLines);
        }

        if set_index_bits
            .checked_add(block_offset_bits)
            .is_none_or(|bits| bits > ADDRESS_BITS)
        {
            return Err(GeometryError::AddressTooNarrow {
                set_index_bits,
                block_offset_bits,
            });
        }

        let too_large = GeometryError::TooLarge {
            set_index_bits,
            lines_per_set,
        };
        let num_sets = 1usize.checked_shl(set_index_bits).ok_or(too_large)?;
        let bytes = num_sets
            .checked_mul(lines_per_set)
            .and_then(|lines| lines.checked_mul(size_of::<CacheLine>()))
            .ok_or(too_large)?;
        if bytes > isize::MAX as usize {
            return Err(too_large);
        }

        let set_index_mask = !(!0u64).checked_shl(set_index_bits).unwrap_or(0);

        tracing::debug!(%geometry, num_sets, bytes, "allocating cache");

        let mut sets = Vec::new();
        sets.try_reserve_exact(num_sets).map_err(|_| too_large)?;
        for _ in 0..num_sets {
            sets.push(CacheSet::new(lines_per_set).ok_or(too_large)?);
        }

        Ok(Self {
            geometry,
            set_index_mask,
            sets,
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    /// Invalidates every line.
    pub fn reset(&mut self) {
        self.sets.iter_mut().for_each(CacheSet::invalidate);
    }

    /// Splits `address` into `(set_index, tag)`. The block offset is dropped.
    pub fn decompose(&self, address: u64) -> (usize, u64) {
        let Geometry {
            set_index_bits,
            block_offset_bits,
            ..
        } = self.geometry;

        let set_index = shr(address, block_offset_bits) & self.set_index_mask;
        let tag = shr(address, block_offset_bits + set_index_bits);

        // the mask keeps the index below num_sets, which fits in usize
        (set_index as usize, tag)
    }

    /// Panics if `set_index` is out of range, which `decompose` never produces.
    pub fn lines_of(&mut self, set_index: usize) -> &mut CacheSet {
        &mut self.sets[set_index]
    }
}

// shifting a u64 by 64 or more leaves nothing behind
fn shr(value: u64, bits: u32) -> u64 {
    value.checked_shr(bits).unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct CacheSet {
    lines: Vec<CacheLine>,
}

impl CacheSet {
    /// `None` if the lines cannot be allocated.
    fn new(lines_per_set: usize) -> Option<Self> {
        let mut lines = Vec::new();
        lines.try_reserve_exact(lines_per_set).ok()?;
        lines.resize(lines_per_set, CacheLine::default());

        Some(Self { lines })
    }

    fn invalidate(&mut self) {
        self.lines.fill(CacheLine::default());
    }

    pub fn lines(&self) -> &[CacheLine] {
        &self.lines
    }

    /// Single pass over the set: either finds the line holding `tag` or
    /// reports where a new block would have to go.
    pub fn scan(&self, tag: u64) -> Lookup {
        let mut scan = Scan::default();

        for (line_idx, line) in self.lines.iter().enumerate() {
            match line.tag {
                Some(line_tag) if line_tag == tag => return Lookup::Hit(line_idx),
                Some(_) => scan.note_resident(line_idx, line.last_used),
                None => scan.note_empty(line_idx),
            }
        }

        scan.placement()
    }

    pub fn touch(&mut self, line_idx: usize, time: u64) {
        self.lines[line_idx].last_used = time;
    }

    /// Places `tag` into `line_idx`, returning the tag that was there before.
    pub fn install(&mut self, line_idx: usize, tag: u64, time: u64) -> Option<u64> {
        let prev = self.lines[line_idx].tag.replace(tag);
        self.lines[line_idx].last_used = time;

        debug_assert!(
            self.lines.iter().filter(|line| line.tag == Some(tag)).count() == 1,
            "tag {tag:#x} resident twice in one set"
        );

        prev
    }
}

/// Result of scanning a set for a tag.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit(usize),
    /// no match, `0` is a free line
    Empty(usize),
    /// no match and the set is full, `0` is the least recently used line
    Evict(usize),
}

/// Candidates collected while scanning a set that did not contain the tag.
///
/// Both candidates keep the first line that qualified: the first free line
/// in storage order, and among resident lines the first one with the
/// smallest timestamp (`<` never replaces an equally old candidate).
#[derive(Debug, Default)]
struct Scan {
    empty: Option<usize>,
    lru: Option<(usize, u64)>,
}

impl Scan {
    fn note_empty(&mut self, line_idx: usize) {
        if self.empty.is_none() {
            self.empty = Some(line_idx);
        }
    }

    fn note_resident(&mut self, line_idx: usize, last_used: u64) {
        match self.lru {
            Some((_, oldest)) if last_used >= oldest => {}
            _ => self.lru = Some((line_idx, last_used)),
        }
    }

    fn placement(self) -> Lookup {
        match (self.empty, self.lru) {
            (Some(line_idx), _) => Lookup::Empty(line_idx),
            (None, Some((line_idx, _))) => Lookup::Evict(line_idx),
            (None, None) => unreachable!("a cache set always holds at least one line"),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CacheLine {
    /// `None` while the line is invalid
    tag: Option<u64>,
    last_used: u64,
}

impl CacheLine {
    pub fn is_valid(&self) -> bool {
        self.tag.is_some()
    }

    pub fn tag(&self) -> Option<u64> {
        self.tag
    }

    pub fn last_used(&self) -> u64 {
        self.last_used
    }
}
