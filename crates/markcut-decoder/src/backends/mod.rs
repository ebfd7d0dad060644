pub mod raw_yuv;
pub mod synthetic;
