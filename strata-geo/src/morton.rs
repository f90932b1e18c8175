/// Bit-interleaved indices used to address tiles inside an implicit-tiling
/// availability buffer.

fn spread_2(v: u32) -> u64 {
    let mut x = v as u64;
    x &= 0xffff_ffff;
    x = (x | (x << 16)) & 0x0000_ffff_0000_ffff;
    x = (x | (x << 8)) & 0x00ff_00ff_00ff_00ff;
    x = (x | (x << 4)) & 0x0f0f_0f0f_0f0f_0f0f;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    x = (x | (x << 1)) & 0x5555_5555_5555_5555;
    x
}

fn spread_3(v: u32) -> u64 {
    // 21 bits per component fit in a 64-bit interleave.
    let mut x = (v as u64) & 0x1f_ffff;
    x = (x | (x << 32)) & 0x001f_0000_0000_ffff;
    x = (x | (x << 16)) & 0x001f_0000_ff00_00ff;
    x = (x | (x << 8)) & 0x100f_00f0_0f00_f00f;
    x = (x | (x << 4)) & 0x10c3_0c30_c30c_30c3;
    x = (x | (x << 2)) & 0x1249_2492_4924_9249;
    x
}

/// 2D Morton index: interleaves the bits of `x` and `y`, with `x` in the
/// even positions.
pub fn morton2(x: u32, y: u32) -> u64 {
    spread_2(x) | (spread_2(y) << 1)
}

/// 3D Morton index with `x` in the lowest interleaved positions.
pub fn morton3(x: u32, y: u32, z: u32) -> u64 {
    spread_3(x) | (spread_3(y) << 1) | (spread_3(z) << 2)
}
