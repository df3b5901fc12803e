//! Annex-B 码流组装.
//!
//! MP4 采样内的 NAL 单元以长度前缀存储:
//! ```text
//! [length: 1/2/4 bytes BE] [NAL data: length bytes] ...
//! ```
//! 外部解码器期望的则是 Annex-B 格式: 每个 NAL 以 `00 00 00 01`
//! 起始码分隔, 且参数集 (SPS/PPS) 必须位于编码图像之前.
//!
//! 组装器额外剥离采样开头的 SEI NAL (类型 6): 对单帧静态预览而言
//! 它不携带解码器需要的任何信息.

use log::debug;
use zhen_core::{ZhenError, ZhenResult};

/// 4 字节起始码
const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// NAL 单元类型 (本引擎关心的子集)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// 非 IDR 图像切片
    Slice,
    /// IDR 图像切片 (关键帧)
    SliceIdr,
    /// 增补增强信息 (SEI)
    Sei,
    /// 序列参数集 (SPS)
    Sps,
    /// 图像参数集 (PPS)
    Pps,
    /// 其余类型
    Unknown(u8),
}

impl NalUnitType {
    /// 从 NAL 头部字节解析类型 (低 5 位)
    pub fn from_header(header: u8) -> Self {
        match header & 0x1F {
            1 => Self::Slice,
            5 => Self::SliceIdr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            id => Self::Unknown(id),
        }
    }
}

/// 把 MP4 压缩采样重组为 Annex-B 访问单元
///
/// 输出顺序: 起始码+SPS, 起始码+PPS, 然后按原顺序输出采样内的
/// 每个 NAL (剥离开头的 SEI, 如有). 输出缓冲区按总长一次性
/// 预分配, 热路径上无反复扩容.
///
/// `length_size` 来自轨道 avcC 配置的实际值 (1/2/4) —— 不再假定
/// 固定 4 字节前缀.
pub fn assemble_annex_b(
    sample: &[u8],
    sps: &[u8],
    pps: &[u8],
    length_size: usize,
) -> ZhenResult<Vec<u8>> {
    if !matches!(length_size, 1 | 2 | 4) {
        return Err(ZhenError::MalformedConfig(format!(
            "NAL 长度前缀宽度非法: {length_size}"
        )));
    }

    // 第一遍: 定位所有 NAL 的 payload 区间
    let nal_ranges = split_length_prefixed(sample, length_size)?;

    // 采样开头的 SEI 对单帧预览没有意义, 整体剥离
    let skip_first = match nal_ranges.first() {
        Some(&(start, _)) => NalUnitType::from_header(sample[start]) == NalUnitType::Sei,
        None => false,
    };
    let kept = if skip_first {
        let (start, len) = nal_ranges[0];
        debug!("剥离采样开头的 SEI NAL: 偏移 {start}, {len} 字节");
        &nal_ranges[1..]
    } else {
        &nal_ranges[..]
    };

    // 第二遍: 按总长一次性分配, 顺序写入
    let total = (START_CODE.len() + sps.len())
        + (START_CODE.len() + pps.len())
        + kept
            .iter()
            .map(|&(_, len)| START_CODE.len() + len)
            .sum::<usize>();
    let mut out = Vec::with_capacity(total);

    out.extend_from_slice(&START_CODE);
    out.extend_from_slice(sps);
    out.extend_from_slice(&START_CODE);
    out.extend_from_slice(pps);
    for &(start, len) in kept {
        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(&sample[start..start + len]);
    }

    debug_assert_eq!(out.len(), total);
    Ok(out)
}

/// 遍历长度前缀记录, 返回每个 NAL payload 的 `(起始偏移, 长度)`
fn split_length_prefixed(sample: &[u8], length_size: usize) -> ZhenResult<Vec<(usize, usize)>> {
    let mut ranges = Vec::new();
    let mut pos = 0;

    while pos < sample.len() {
        if pos + length_size > sample.len() {
            return Err(ZhenError::InvalidData(format!(
                "NAL 长度前缀截断: 偏移 {pos}, 剩余 {} 字节",
                sample.len() - pos
            )));
        }
        let mut nal_len = 0usize;
        for i in 0..length_size {
            nal_len = (nal_len << 8) | sample[pos + i] as usize;
        }
        pos += length_size;

        if nal_len == 0 {
            return Err(ZhenError::InvalidData(format!(
                "NAL 长度为 0: 偏移 {}",
                pos - length_size
            )));
        }
        if pos + nal_len > sample.len() {
            return Err(ZhenError::InvalidData(format!(
                "NAL 数据截断: 声明 {nal_len} 字节, 剩余 {} 字节",
                sample.len() - pos
            )));
        }

        ranges.push((pos, nal_len));
        pos += nal_len;
    }

    Ok(ranges)
}
