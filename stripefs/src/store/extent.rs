//! Splits a logical byte range of a striped file into per-object extents.

/// Striping parameters of one file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StripeLayout {
    pub stripe_unit: u64,
    pub stripe_count: u32,
    pub object_size: u64,
}

impl StripeLayout {
    fn stripes_per_object(&self) -> u64 {
        self.object_size / self.stripe_unit
    }
}

/// Part of a logical range that lives in one physical object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectExtent {
    pub object_no: u64,
    pub offset_in_object: u64,
    /// Offset of this extent inside the requested buffer.
    pub buffer_offset: usize,
    pub len: usize,
}

/// Maps `[offset, offset + len)` onto objects, one extent per stripe unit
/// touched, in logical order.
pub fn file_to_extents(layout: StripeLayout, mut offset: u64, len: usize) -> Vec<ObjectExtent> {
    let mut out = Vec::new();
    let mut remaining = len as u64;
    let su = layout.stripe_unit;
    let sc = u64::from(layout.stripe_count);
    let per_object = layout.stripes_per_object();
    let mut buffer_offset = 0usize;

    while remaining > 0 {
        let block_no = offset / su;
        let stripe_no = block_no / sc;
        let stripe_pos = block_no % sc;
        let object_set = stripe_no / per_object;
        let object_no = object_set * sc + stripe_pos;
        let within_block = offset % su;
        let offset_in_object = (stripe_no % per_object) * su + within_block;
        let take = (su - within_block).min(remaining);

        out.push(ObjectExtent {
            object_no,
            offset_in_object,
            buffer_offset,
            len: take as usize,
        });
        offset += take;
        remaining -= take;
        buffer_offset += take as usize;
    }
    out
}

/// Number of objects a file of `size` bytes spans, never less than one.
pub fn object_count(layout: StripeLayout, size: u64) -> u64 {
    if size == 0 {
        return 1;
    }
    let su = layout.stripe_unit;
    let sc = u64::from(layout.stripe_count);
    let blocks = size.div_ceil(su);
    // a set wider than u64 holds every possible block
    let per_set = sc.saturating_mul(layout.stripes_per_object());
    let full_sets = (blocks - 1) / per_set;
    let last_set_blocks = blocks - full_sets * per_set;
    full_sets * sc + last_set_blocks.min(sc)
}
