//! 内存缓冲区大端字节游标.
//!
//! MP4 (ISO 14496-12) 的所有整数字段均为大端编码.
//! 引擎假定整个 moov (以及按需取回的采样区间) 已在内存中,
//! 因此读取器只需要针对 `&[u8]` 的顺序游标, 不涉及任何 I/O.

use crate::error::{ZhenError, ZhenResult};

/// 大端字节读取器
///
/// 所有读取方法在缓冲区耗尽时返回 [`ZhenError::MalformedBox`]:
/// 对本引擎而言, 越过缓冲区末尾读取只可能由 box 的大小字段
/// 与实际数据不符导致.
pub struct ByteReader<'a> {
    /// 底层数据
    data: &'a [u8],
    /// 当前读取位置
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// 从字节切片创建读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// 当前读取位置
    pub fn position(&self) -> usize {
        self.pos
    }

    /// 剩余可读字节数
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// 读取 1 个字节
    pub fn read_u8(&mut self) -> ZhenResult<u8> {
        let b = self.read_bytes(1)?;
        Ok(b[0])
    }

    /// 读取 u16 大端
    pub fn read_u16_be(&mut self) -> ZhenResult<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// 读取 u24 大端 (3 字节无符号整数)
    pub fn read_u24_be(&mut self) -> ZhenResult<u32> {
        let b = self.read_bytes(3)?;
        Ok((u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]))
    }

    /// 读取 u32 大端
    pub fn read_u32_be(&mut self) -> ZhenResult<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// 读取 u64 大端
    pub fn read_u64_be(&mut self) -> ZhenResult<u64> {
        let hi = self.read_u32_be()? as u64;
        let lo = self.read_u32_be()? as u64;
        Ok((hi << 32) | lo)
    }

    /// 读取 4 字节标签 (FourCC)
    pub fn read_tag(&mut self) -> ZhenResult<[u8; 4]> {
        let b = self.read_bytes(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    /// 读取指定数量的字节
    pub fn read_bytes(&mut self, count: usize) -> ZhenResult<&'a [u8]> {
        if count > self.remaining() {
            return Err(ZhenError::MalformedBox(format!(
                "读取越界: 需要 {} 字节, 剩余 {} 字节",
                count,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    /// 跳过指定字节数
    pub fn skip(&mut self, count: usize) -> ZhenResult<()> {
        self.read_bytes(count)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_读取_大端整数() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u8().unwrap(), 0x01);
        assert_eq!(r.read_u16_be().unwrap(), 0x0203);
        assert_eq!(r.read_u32_be().unwrap(), 0x04050607);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_读取_u24_u64() {
        let data = [0x01, 0x02, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u24_be().unwrap(), 0x010203);
        assert_eq!(r.read_u64_be().unwrap(), 0x0000_0001_0000_0002);
    }

    #[test]
    fn test_读取_tag() {
        let mut r = ByteReader::new(b"moovrest");
        assert_eq!(&r.read_tag().unwrap(), b"moov");
        assert_eq!(r.position(), 4);
    }

    #[test]
    fn test_skip_与位置() {
        let data = [0u8; 10];
        let mut r = ByteReader::new(&data);
        r.skip(6).unwrap();
        assert_eq!(r.position(), 6);
        assert_eq!(r.remaining(), 4);
    }

    #[test]
    fn test_越界读取_返回错误() {
        let data = [0x00, 0x01];
        let mut r = ByteReader::new(&data);
        assert!(matches!(r.read_u32_be(), Err(ZhenError::MalformedBox(_))));
        // 失败的读取不前进位置
        assert_eq!(r.position(), 0);
        assert_eq!(r.read_u16_be().unwrap(), 1);
    }
}
