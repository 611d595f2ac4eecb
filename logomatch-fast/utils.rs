/// Utility functions for the segment test

/// Arc length of FAST-9
pub const ARC_LENGTH: usize = 9;

/// Pack a 16-pixel circle of flags into a mask, bit `i` = pixel `i`
pub fn circle_mask(pixels: &[bool; 16]) -> u16 {
    pixels
        .iter()
        .enumerate()
        .fold(0u16, |mask, (i, &set)| mask | ((set as u16) << i))
}

/// Check if `mask` holds at least `min_count` consecutive set bits on the
/// 16-pixel circle, wrap-around included. Branch-free rotation test.
pub fn has_contiguous_arc(mask: u16, min_count: usize) -> bool {
    if min_count == 0 || min_count > 16 {
        return false;
    }
    if mask == u16::MAX {
        return true;
    }

    // A run of length n survives n-1 rotate-and-AND steps
    let mut test_mask = mask;
    for i in 1..min_count {
        test_mask &= mask.rotate_left(i as u32);
        if test_mask == 0 {
            return false;
        }
    }

    test_mask != 0
}

/// Linear scan kept for cross-checking the bitmask version
pub fn has_contiguous_arc_scan(mask: u16, min_count: usize) -> bool {
    if min_count == 0 || min_count > 16 {
        return false;
    }

    let mut run = 0;
    for i in 0..32 {
        if mask & (1 << (i % 16)) != 0 {
            run += 1;
            if run >= min_count {
                return true;
            }
        } else {
            run = 0;
        }
    }

    false
}
