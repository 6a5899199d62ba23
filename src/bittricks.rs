// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
alignment arithmetic.
*/

/// Uniform buffers are sized and offset in multiples of this many bytes.
pub const CONSTANT_BUFFER_ALIGNMENT: usize = 256;

/// Staging allocations are rounded to this so offsets stay valid map/copy offsets.
pub const STAGING_ALIGNMENT: usize = 8;

/**
Rounds `value` up to the next multiple of `alignment`.

`alignment` must be a power of two.
*/
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Rounds a uniform payload size up to a whole number of 256-byte blocks.
pub const fn constant_buffer_byte_size(byte_size: usize) -> usize {
    align_up(byte_size, CONSTANT_BUFFER_ALIGNMENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_multiple() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(300, 8), 304);
    }

    #[test]
    fn constant_buffer_sizes() {
        assert_eq!(constant_buffer_byte_size(32), 256);
        assert_eq!(constant_buffer_byte_size(256), 256);
        assert_eq!(constant_buffer_byte_size(257), 512);
        assert_eq!(constant_buffer_byte_size(256 * 100), 25_600);
    }
}
