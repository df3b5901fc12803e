//! MP4 Box (Atom) 解析.
//!
//! ISO 14496-12 定义的 Box 结构:
//! ```text
//! Size:       4 bytes (big-endian, 含头部本身)
//! Type:       4 bytes (FourCC)
//! [ExtSize]:  8 bytes (仅当 Size==1 时存在, 64-bit 大小)
//! ```
//!
//! 特殊大小值:
//! - 0: Box 延伸到缓冲区末尾 (仅对最后一个 box 合法)
//! - 1: 使用 64-bit 扩展大小
//!
//! 解析策略: 只递归进入已知的容器 box (moov/trak/mdia/minf/stbl/mvex),
//! 其余类型一律视为不透明叶子, 原样保留 payload 供上层解释.

use bytes::Bytes;
use log::warn;
use zhen_core::{ByteReader, ZhenError, ZhenResult};

/// Box 类型枚举 (本引擎消费的 FourCC 子集)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxType {
    /// ftyp - 文件类型
    Ftyp,
    /// moov - 影片元数据
    Moov,
    /// mvhd - 影片头部
    Mvhd,
    /// trak - 轨道
    Trak,
    /// tkhd - 轨道头部
    Tkhd,
    /// mdia - 媒体
    Mdia,
    /// mdhd - 媒体头部
    Mdhd,
    /// hdlr - 处理器引用
    Hdlr,
    /// minf - 媒体信息
    Minf,
    /// stbl - 采样表
    Stbl,
    /// stsd - 采样描述
    Stsd,
    /// stts - 时间→采样映射
    Stts,
    /// stsc - 采样→块映射
    Stsc,
    /// stsz - 采样大小
    Stsz,
    /// stco - 块偏移 (32位)
    Stco,
    /// co64 - 块偏移 (64位)
    Co64,
    /// stss - 同步采样
    Stss,
    /// mvex - 分片扩展 (仅识别, 不消费)
    Mvex,
    /// mdat - 媒体数据
    Mdat,
    /// free - 自由空间
    Free,
    /// 未知 box 类型
    Unknown([u8; 4]),
}

impl BoxType {
    /// 从 4 字节 FourCC 创建
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Self {
        match fourcc {
            b"ftyp" => Self::Ftyp,
            b"moov" => Self::Moov,
            b"mvhd" => Self::Mvhd,
            b"trak" => Self::Trak,
            b"tkhd" => Self::Tkhd,
            b"mdia" => Self::Mdia,
            b"mdhd" => Self::Mdhd,
            b"hdlr" => Self::Hdlr,
            b"minf" => Self::Minf,
            b"stbl" => Self::Stbl,
            b"stsd" => Self::Stsd,
            b"stts" => Self::Stts,
            b"stsc" => Self::Stsc,
            b"stsz" => Self::Stsz,
            b"stco" => Self::Stco,
            b"co64" => Self::Co64,
            b"stss" => Self::Stss,
            b"mvex" => Self::Mvex,
            b"mdat" => Self::Mdat,
            b"free" => Self::Free,
            _ => Self::Unknown(*fourcc),
        }
    }

    /// 是否为已知的容器 box (递归解析白名单)
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Self::Moov | Self::Trak | Self::Mdia | Self::Minf | Self::Stbl | Self::Mvex
        )
    }
}

impl std::fmt::Display for BoxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(cc) => {
                let s = std::str::from_utf8(cc).unwrap_or("????");
                write!(f, "{s}")
            }
            _ => {
                let s = format!("{self:?}").to_lowercase();
                write!(f, "{s}")
            }
        }
    }
}

/// 已解析的 Box 头部
#[derive(Debug)]
pub struct BoxHeader {
    /// Box 声明总大小 (含头部, 0 表示延伸到缓冲区/文件末尾)
    pub size: u64,
    /// Box 类型
    pub box_type: BoxType,
    /// 头部大小 (8 或 16 字节)
    pub header_size: u64,
}

impl BoxHeader {
    /// 从字节缓冲区起始处解析一个 Box 头部
    ///
    /// 只消费头部字段, 不校验 payload 是否完整;
    /// 供顶层扫描使用 (跳过 mdat 时无需读入其内容).
    pub fn parse(data: &[u8]) -> ZhenResult<Self> {
        let mut r = ByteReader::new(data);
        let size32 = r.read_u32_be()?;
        let fourcc = r.read_tag()?;
        let box_type = BoxType::from_fourcc(&fourcc);

        let (size, header_size) = if size32 == 1 {
            // 64-bit 扩展大小 (14496-12 largesize 约定)
            (r.read_u64_be()?, 16u64)
        } else {
            (u64::from(size32), 8u64)
        };

        Ok(Self {
            size,
            box_type,
            header_size,
        })
    }
}

/// 已解析的 Box
///
/// payload 是对所属缓冲区的零拷贝切片; 容器类型的 children
/// 在解析时即递归构建, 叶子类型 children 恒为空.
#[derive(Debug)]
pub struct Mp4Box {
    /// Box 类型
    pub box_type: BoxType,
    /// 实际总大小 (含头部, size==0 已按缓冲区末尾解析)
    pub size: u64,
    /// 内容区域 (不含头部)
    pub payload: Bytes,
    /// 子 box (仅容器类型非空)
    pub children: Vec<Mp4Box>,
}

impl Mp4Box {
    /// 查找第一个指定类型的直接子 box
    pub fn find_child(&self, box_type: BoxType) -> Option<&Mp4Box> {
        self.children.iter().find(|b| b.box_type == box_type)
    }
}

/// 在 box 序列中查找第一个指定类型的 box
pub fn find_box(boxes: &[Mp4Box], box_type: BoxType) -> Option<&Mp4Box> {
    boxes.iter().find(|b| b.box_type == box_type)
}

/// 解析缓冲区内的全部 box, 返回有序序列
///
/// 容器白名单内的 box 会递归构建子树; 其余类型保留 payload 为叶子.
///
/// 错误策略:
/// - 声明大小小于头部大小 → [`ZhenError::MalformedBox`];
/// - 第一个 box 即越过缓冲区 → [`ZhenError::MalformedBox`] (整段数据不可信);
/// - 后续兄弟 box 越过缓冲区 → 记录 warn, 返回已解析的 box
///   (不会返回残缺的 box, 也不尝试跳过坏 box 继续).
pub fn parse_boxes(buf: &Bytes) -> ZhenResult<Vec<Mp4Box>> {
    let mut boxes = Vec::new();
    let mut pos = 0usize;
    let len = buf.len();

    while pos < len {
        let remaining = len - pos;
        if remaining < 8 {
            if boxes.is_empty() {
                return Err(ZhenError::MalformedBox(format!(
                    "剩余 {remaining} 字节, 不足以容纳 box 头部"
                )));
            }
            warn!("box 序列末尾残留 {remaining} 字节, 已忽略");
            break;
        }

        let header = match BoxHeader::parse(&buf[pos..]) {
            Ok(h) => h,
            Err(e) => {
                // 扩展大小字段被截断
                if boxes.is_empty() {
                    return Err(e);
                }
                warn!("box 头部解析失败, 停止遍历: {e}");
                break;
            }
        };

        // size==0: 延伸到缓冲区末尾 (只可能是最后一个 box)
        let size = if header.size == 0 {
            remaining as u64
        } else {
            header.size
        };

        if size < header.header_size {
            return Err(ZhenError::MalformedBox(format!(
                "box '{}' 声明大小 {} 小于头部大小 {}",
                header.box_type, size, header.header_size
            )));
        }
        if size > remaining as u64 {
            if boxes.is_empty() {
                return Err(ZhenError::MalformedBox(format!(
                    "box '{}' 声明大小 {} 超出剩余 {} 字节",
                    header.box_type, size, remaining
                )));
            }
            warn!(
                "box '{}' 声明大小 {} 超出剩余 {} 字节, 返回已解析的 {} 个 box",
                header.box_type,
                size,
                remaining,
                boxes.len()
            );
            break;
        }

        let payload = buf.slice(pos + header.header_size as usize..pos + size as usize);
        let children = if header.box_type.is_container() {
            parse_boxes(&payload)?
        } else {
            Vec::new()
        };

        boxes.push(Mp4Box {
            box_type: header.box_type,
            size,
            payload,
            children,
        });
        pos += size as usize;
    }

    Ok(boxes)
}
