//! 解码器协作者接口.
//!
//! 引擎本身不解码像素: 它把组装好的 Annex-B 访问单元连同显示
//! 尺寸一起交给注入的解码器实现 (WebCodecs 风格的硬件解码器、
//! FFI 封装的软件解码器, 或测试用的假实现).

use zhen_core::ZhenResult;

/// 解码输出的一帧像素
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// 像素宽度
    pub width: u32,
    /// 像素高度
    pub height: u32,
    /// 像素数据 (格式由解码器实现约定)
    pub data: Vec<u8>,
}

/// 帧解码器 (解码协作者)
pub trait FrameDecoder: Send {
    /// 解码一个完整的 Annex-B 访问单元
    ///
    /// `width`/`height` 来自轨道元数据, 供需要预先配置输出
    /// 缓冲区的解码器使用. 解码失败时错误原样向上转发.
    fn decode(&mut self, annex_b: &[u8], width: u32, height: u32) -> ZhenResult<DecodedFrame>;
}
