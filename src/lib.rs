// TODO:
// - SAH-based builder as an alternative to the median split
// - repack leaves forced by the depth bound once the builder reports them
// - triangle batch primitive next to the quad one

pub mod spatial;
pub mod bvh;
