//! # zhen-core
//!
//! Zhen 预览帧提取引擎核心库, 提供统一错误类型和字节读取工具.
//!
//! 引擎自身不发起任何 I/O (传输层是外部协作者), 因此这里只提供
//! 针对内存缓冲区的大端字节游标.

pub mod error;
pub mod reader;

// 重导出常用类型
pub use error::{ZhenError, ZhenResult};
pub use reader::ByteReader;
