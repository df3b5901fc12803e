//! # Zhen (帧)
//!
//! 纯 Rust 实现的 MP4 视频预览帧提取引擎.
//!
//! 给定一个 MP4 来源和一个目标时刻, Zhen 解析容器元数据, 定位
//! 对应的压缩采样, 并把它重组为外部 H.264 解码器可以直接消费的
//! Annex-B 访问单元 (起始码分隔, SPS/PPS 前置):
//!
//! ```text
//! MediaSource ──▶ 顶层 box 扫描 ──▶ moov 解析 ──▶ 轨道模型
//!                                                   │
//!      目标时刻 ──▶ 采样定位 ──▶ 字节区间取回 ──▶ Annex-B 组装
//!                                                   │
//!                                        FrameDecoder (注入) ──▶ 像素
//! ```
//!
//! 传输 (HTTP range 请求、本地文件读取) 与解码器本体均为外部
//! 协作者: 引擎只消费 [`MediaSource`] 返回的字节缓冲区, 只产出
//! [`FrameDecoder`] 期望的码流, 自身不发起任何网络 I/O.
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use zhen::{FileSource, PreviewExtractor};
//!
//! fn main() -> zhen::core::ZhenResult<()> {
//!     let source = FileSource::open("movie.mp4")?;
//!     let mut extractor = PreviewExtractor::new(source);
//!     // 取 3.5 秒处最近的关键帧, 组装为 Annex-B 码流
//!     let frame = extractor.extract_annex_b(3.5, true)?;
//!     println!("{}x{}, {} 字节", frame.width, frame.height, frame.data.len());
//!     Ok(())
//! }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `zhen-core` | 错误类型与字节读取工具 |
//! | `zhen-mp4` | box 树遍历、采样表、轨道模型 |
//! | `zhen-avc` | avcC 配置解析与 Annex-B 组装 |

pub mod decoder;
pub mod preview;
pub mod source;

/// 核心类型与工具
pub use zhen_core as core;

/// MP4 容器解析
pub use zhen_mp4 as mp4;

/// H.264 码流辅助
pub use zhen_avc as avc;

// 重导出常用类型
pub use decoder::{DecodedFrame, FrameDecoder};
pub use preview::{AnnexBFrame, PreviewExtractor};
pub use source::{FileSource, MediaSource, MemorySource};

/// 获取 Zhen 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
