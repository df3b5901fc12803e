//! 传输层抽象.
//!
//! 引擎对数据来源只有两个要求: 知道总大小, 能取回任意字节区间.
//! HTTP range 请求、本地文件、内存缓冲区都可以实现此接口;
//! 传输失败会被引擎原样向上转发, 不做重试或超时处理.

use std::io::{Read, Seek, SeekFrom};

use bytes::Bytes;
use zhen_core::{ZhenError, ZhenResult};

/// 媒体数据来源 (传输层协作者)
pub trait MediaSource: Send {
    /// 数据总大小 (字节)
    fn size(&mut self) -> ZhenResult<u64>;

    /// 取回 `[offset, offset + size)` 区间的字节
    ///
    /// 实现必须返回恰好 `size` 字节, 区间越界时返回错误.
    fn read_range(&mut self, offset: u64, size: u64) -> ZhenResult<Bytes>;
}

/// 内存缓冲区来源
///
/// 用于测试和已完整载入内存的小文件.
pub struct MemorySource {
    /// 数据缓冲区
    data: Bytes,
}

impl MemorySource {
    /// 从已有数据创建
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl MediaSource for MemorySource {
    fn size(&mut self) -> ZhenResult<u64> {
        Ok(self.data.len() as u64)
    }

    fn read_range(&mut self, offset: u64, size: u64) -> ZhenResult<Bytes> {
        let end = offset
            .checked_add(size)
            .filter(|&e| e <= self.data.len() as u64)
            .ok_or_else(|| {
                ZhenError::Transport(format!(
                    "range 请求越界: offset={offset}, size={size}, 总大小={}",
                    self.data.len()
                ))
            })?;
        Ok(self.data.slice(offset as usize..end as usize))
    }
}

/// 本地文件来源
pub struct FileSource {
    /// 底层文件
    file: std::fs::File,
    /// 文件大小 (打开时缓存)
    size: u64,
}

impl FileSource {
    /// 以只读方式打开文件
    pub fn open(path: &str) -> ZhenResult<Self> {
        let file = std::fs::File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }
}

impl MediaSource for FileSource {
    fn size(&mut self) -> ZhenResult<u64> {
        Ok(self.size)
    }

    fn read_range(&mut self, offset: u64, size: u64) -> ZhenResult<Bytes> {
        let end = offset.checked_add(size).filter(|&e| e <= self.size);
        if end.is_none() {
            return Err(ZhenError::Transport(format!(
                "range 请求越界: offset={offset}, size={size}, 文件大小={}",
                self.size
            )));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; size as usize];
        self.file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_内存来源_区间读取() {
        let mut src = MemorySource::new(vec![0u8, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(src.size().unwrap(), 8);
        assert_eq!(&src.read_range(2, 3).unwrap()[..], &[2, 3, 4]);
        assert_eq!(src.read_range(8, 0).unwrap().len(), 0);
    }

    #[test]
    fn test_内存来源_越界返回传输错误() {
        let mut src = MemorySource::new(vec![0u8; 4]);
        assert!(matches!(
            src.read_range(2, 3),
            Err(ZhenError::Transport(_))
        ));
        assert!(matches!(
            src.read_range(u64::MAX, 2),
            Err(ZhenError::Transport(_))
        ));
    }
}
