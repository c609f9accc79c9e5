// Shelf packing of chart rectangles.
//
// Rectangles are placed tallest first, left to right, opening a new shelf
// when the current one is full. The atlas width is either fixed by the
// target resolution or estimated from the total rectangle area.

use crate::options::PackOptions;

/// Fraction of the atlas the estimated width assumes will be covered.
const FILL_RATIO: f32 = 0.85;

/// Width multipliers tried by brute-force packing.
const BRUTE_FORCE_FACTORS: [f32; 8] = [0.75, 0.85, 1.0, 1.15, 1.3, 1.5, 1.75, 2.0];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Packed {
    /// Top-left texel of each rectangle, in input order.
    pub origins: Vec<[u32; 2]>,
    pub width: u32,
    pub height: u32,
}

#[inline]
pub(super) fn align4(v: u32) -> u32 {
    v.div_ceil(4).saturating_mul(4)
}

/// Place every rectangle (`[w, h]` in texels) into one atlas.
pub(super) fn pack_rects(sizes: &[[u32; 2]], opts: &PackOptions) -> Packed {
    let max_w = sizes.iter().map(|s| s[0]).max().unwrap_or(1).max(1);

    let mut packed = if opts.resolution > 0 {
        let width = opts.resolution.max(max_w);
        let mut packed = shelf_pack(sizes, width);
        packed.width = width;
        packed.height = packed.height.max(opts.resolution);
        packed
    } else {
        let total: u64 = sizes.iter().map(|s| s[0] as u64 * s[1] as u64).sum();
        let estimate = ((total as f32 / FILL_RATIO).sqrt().ceil() as u32).max(max_w);

        if opts.brute_force {
            BRUTE_FORCE_FACTORS
                .iter()
                .map(|f| ((estimate as f32 * f).ceil() as u32).max(max_w))
                .map(|width| shelf_pack(sizes, width))
                .min_by_key(|p| {
                    let area = p.width as u64 * p.height as u64;
                    (area, p.width.abs_diff(p.height), p.width)
                })
                .unwrap_or_else(|| shelf_pack(sizes, estimate))
        } else {
            shelf_pack(sizes, estimate)
        }
    };

    if opts.block_align {
        packed.width = align4(packed.width);
        packed.height = align4(packed.height);
    }

    packed.width = packed.width.max(1);
    packed.height = packed.height.max(1);
    packed
}

/// Shelf-pack into at most `width` texels; the result's width is the width
/// actually used. `width` must fit the widest rectangle.
pub(super) fn shelf_pack(sizes: &[[u32; 2]], width: u32) -> Packed {
    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| {
        sizes[b][1]
            .cmp(&sizes[a][1])
            .then(sizes[b][0].cmp(&sizes[a][0]))
            .then(a.cmp(&b))
    });

    let mut origins = vec![[0u32; 2]; sizes.len()];
    let (mut x, mut shelf_y, mut shelf_h) = (0u32, 0u32, 0u32);
    let mut used_w = 0u32;

    for i in order {
        let [w, h] = sizes[i];

        if x > 0 && x.checked_add(w).map_or(true, |end| end > width) {
            shelf_y = shelf_y.saturating_add(shelf_h);
            x = 0;
            shelf_h = 0;
        }

        origins[i] = [x, shelf_y];
        x = x.saturating_add(w);
        shelf_h = shelf_h.max(h);
        used_w = used_w.max(x);
    }

    Packed {
        origins,
        width: used_w,
        height: shelf_y.saturating_add(shelf_h),
    }
}
