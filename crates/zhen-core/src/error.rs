//! 统一错误类型定义.
//!
//! 所有 Zhen crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// Zhen 引擎统一错误类型
#[derive(Debug, Error)]
pub enum ZhenError {
    /// Box 结构错误 (大小字段不一致、越界或采样表互相矛盾)
    #[error("Box 结构错误: {0}")]
    MalformedBox(String),

    /// 轨道缺少必需的采样表 box
    #[error("缺少必需的 box: {0}")]
    MissingBox(&'static str),

    /// 不支持的轨道 (非视频 handler, 或非 H.264 编码)
    #[error("不支持的轨道: {0}")]
    UnsupportedTrack(String),

    /// 解码器配置中缺少 SPS 或 PPS
    #[error("缺少参数集: {0}")]
    MissingParameterSets(String),

    /// avcC 配置记录不一致 (声明数量与实际条目不符等)
    #[error("avcC 配置错误: {0}")]
    MalformedConfig(String),

    /// 请求时间超出轨道时长范围
    #[error("时间超出范围: {0}")]
    OutOfRange(String),

    /// 无效数据 (采样内 NAL 长度前缀截断等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 传输层失败 (原样转发外部协作者的错误)
    #[error("传输失败: {0}")]
    Transport(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// Zhen 引擎统一 Result 类型
pub type ZhenResult<T> = Result<T, ZhenError>;
