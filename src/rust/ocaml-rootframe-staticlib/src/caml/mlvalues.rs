// Wrappers for OCaml values. The shim itself never looks inside a value, this is only used by the
// simulated runtime and by tests.

/*******************
 * Types of values *
 *******************/

// Reminder - in OCaml ints are 63 bits with the lsb always 1, and heap pointers have 0

/// An OCaml `value`, the same size and ABI as `intnat`
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Value(i64);

#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct LongValue(i64);

#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct BlockValue(i64);

impl From<LongValue> for Value {
    fn from(x: LongValue) -> Self {
        Value(x.0)
    }
}

impl From<BlockValue> for Value {
    fn from(x: BlockValue) -> Self {
        Value(x.0)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ValueType {
    Long(LongValue),
    Block(BlockValue),
}

impl Value {
    pub const UNIT: Value = Value(LongValue::UNIT.0);

    #[inline]
    pub const fn from_raw(raw: i64) -> Value {
        Value(raw)
    }

    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    pub fn int(i: i64) -> Value {
        LongValue::from(i).into()
    }

    pub fn is_long(&self) -> bool {
        self.0 & 1 != 0
    }

    pub fn is_block(&self) -> bool {
        !self.is_long()
    }

    pub fn decode_type(&self) -> ValueType {
        if self.is_long() {
            ValueType::Long(LongValue(self.0))
        } else {
            ValueType::Block(BlockValue(self.0))
        }
    }

    pub fn as_long(&self) -> LongValue {
        debug_assert!(self.is_long());

        LongValue(self.0)
    }

    pub fn as_block(&self) -> BlockValue {
        debug_assert!(self.is_block());

        BlockValue(self.0)
    }

    pub fn int_val(&self) -> i64 {
        self.as_long().into()
    }
}

/* Long values */

impl LongValue {
    pub const UNIT: LongValue = LongValue::from_i64(0);

    #[inline]
    const fn from_i64(i: i64) -> LongValue {
        LongValue((((i as u64) << 1) as i64) + 1)
    }

    #[inline]
    fn to_i64(self) -> i64 {
        self.0 >> 1
    }
}

impl From<i64> for LongValue {
    #[inline]
    fn from(i: i64) -> Self {
        LongValue::from_i64(i)
    }
}

impl From<LongValue> for i64 {
    #[inline]
    fn from(i: LongValue) -> Self {
        i.to_i64()
    }
}

/* Block values */

#[repr(C)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct Tag(pub u8);

impl Tag {
    pub const CLOSURE: Tag = Tag(247);
    pub const INFIX: Tag = Tag(249);
    pub const FORWARD: Tag = Tag(250);
    // Blocks with this tag or above hold raw data the collector must not scan
    pub const NO_SCAN: Tag = Tag(251);
    pub const STRING: Tag = Tag(252);
    pub const DOUBLE: Tag = Tag(253);
}

#[repr(C)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct Header(pub u64);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub enum Color {
    White = 0,
    Gray = 1,
    Blue = 2,
    Black = 3,
}

impl Color {
    const fn mask(self) -> u64 {
        (self as u64) << 8
    }
}

impl Header {
    pub const fn make(wosize: usize, tag: Tag, color: Color) -> Header {
        Header((wosize as u64) << 10 | color.mask() | tag.0 as u64)
    }

    pub fn tag(&self) -> Tag {
        // This truncates to just the bottom 8 bits
        Tag(self.0 as u8)
    }

    pub fn wosize(&self) -> usize {
        (self.0 >> 10) as usize
    }

    pub fn is_scannable(&self) -> bool {
        self.tag() < Tag::NO_SCAN
    }
}

// Nothing here is checked: the caller has to know the block is real and the index is in range
impl BlockValue {
    pub fn address(&self) -> usize {
        self.0 as usize
    }

    pub fn field_pointer(&self, index: usize) -> *mut Value {
        unsafe { (self.0 as *mut Value).add(index) }
    }

    pub fn header_pointer(&self) -> *mut Header {
        unsafe { (self.0 as *mut Header).offset(-1) }
    }

    pub fn header(&self) -> Header {
        unsafe { *self.header_pointer() }
    }

    pub fn tag(&self) -> Tag {
        self.header().tag()
    }

    pub fn wosize(&self) -> usize {
        self.header().wosize()
    }

    pub fn get_field(&self, index: usize) -> Value {
        unsafe { *self.field_pointer(index) }
    }

    // Only valid on a freshly allocated block, there's no write barrier here
    pub fn initialize_field(&self, index: usize, value: Value) {
        unsafe { *self.field_pointer(index) = value }
    }

    pub fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.0 as *const u8, self.wosize() * 8) }
    }
}
