/// 工具模块
/// Utility modules
pub mod letterbox;

pub use letterbox::{cap_width, letterbox, to_nchw, Letterbox, PAD_VALUE};
