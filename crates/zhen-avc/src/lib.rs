//! # zhen-avc
//!
//! Zhen H.264 (AVC) 码流辅助库.
//!
//! 两部分职责, 均为纯函数式计算, 不涉及 I/O:
//! - [`avcc`]: 解析 MP4 采样描述中内嵌的 AVCDecoderConfigurationRecord
//!   (avcC box), 取得 SPS/PPS 参数集与 NAL 长度前缀宽度;
//! - [`annexb`]: 把 MP4 内以长度前缀存储的压缩采样重组为外部解码器
//!   期望的 Annex-B 字节流 (起始码分隔, 参数集前置).

pub mod annexb;
pub mod avcc;

// 重导出常用类型
pub use annexb::{NalUnitType, assemble_annex_b};
pub use avcc::AvcConfig;
