//! 预览帧提取流程编排.
//!
//! 把各层能力串成一条流水线: 顶层 box 扫描 → moov 解析 → 轨道
//! 模型 → 采样定位 → 字节区间取回 → Annex-B 组装 → (可选) 解码.
//!
//! 顶层扫描只读取每个 box 的头部字节, 按声明大小跳进:
//! mdat 可能有几百 MB, 但扫描阶段对它的开销只有一次 16 字节的
//! range 请求. 只有 moov 的 payload 会被完整取回.

use bytes::Bytes;
use log::{debug, warn};
use zhen_core::{ZhenError, ZhenResult};
use zhen_mp4::boxes::{BoxHeader, BoxType, parse_boxes};
use zhen_mp4::track::{Track, TrackMetadata};

use crate::decoder::{DecodedFrame, FrameDecoder};
use crate::source::MediaSource;

/// 组装完成的 Annex-B 访问单元
#[derive(Debug, Clone)]
pub struct AnnexBFrame {
    /// Annex-B 字节流 (起始码分隔, SPS/PPS 前置)
    pub data: Vec<u8>,
    /// 来源采样索引 (0-based, 回退后的实际采样)
    pub sample_index: u32,
    /// 视频宽度 (像素)
    pub width: u32,
    /// 视频高度 (像素)
    pub height: u32,
}

/// 预览帧提取器
///
/// 轨道模型在首次查询时构建并缓存: 同一实例上的后续提取只产生
/// 采样数据本身的 range 请求. 实例之间不共享任何状态.
pub struct PreviewExtractor<S: MediaSource> {
    /// 数据来源
    source: S,
    /// 已构建的轨道模型 (惰性)
    track: Option<Track>,
}

impl<S: MediaSource> PreviewExtractor<S> {
    /// 创建提取器 (不发起任何 I/O)
    pub fn new(source: S) -> Self {
        Self {
            source,
            track: None,
        }
    }

    /// 轨道元数据 (首次调用时触发 moov 解析)
    pub fn metadata(&mut self) -> ZhenResult<&TrackMetadata> {
        self.ensure_track()?;
        let Some(track) = self.track.as_ref() else {
            return Err(ZhenError::MissingBox("trak"));
        };
        Ok(track.metadata())
    }

    /// 提取指定时刻的采样并组装为 Annex-B 访问单元
    ///
    /// `require_sync` 为 true 时回退到不晚于目标时刻的同步采样,
    /// 保证输出的访问单元可独立解码.
    pub fn extract_annex_b(&mut self, seconds: f64, require_sync: bool) -> ZhenResult<AnnexBFrame> {
        self.ensure_track()?;
        let Some(track) = self.track.as_ref() else {
            return Err(ZhenError::MissingBox("trak"));
        };

        let location = track.locate(seconds, require_sync)?;
        debug!(
            "定位 {seconds} 秒 → 采样 {}, 字节区间 [{}, {})",
            location.sample_index,
            location.offset,
            location.offset + u64::from(location.size),
        );

        let sample = self
            .source
            .read_range(location.offset, u64::from(location.size))?;
        if sample.len() != location.size as usize {
            return Err(ZhenError::Transport(format!(
                "range 请求返回 {} 字节, 期望 {} 字节",
                sample.len(),
                location.size
            )));
        }

        let config = track.avc_config();
        let data = zhen_avc::assemble_annex_b(&sample, config.sps(), config.pps(), config.length_size)?;
        let metadata = track.metadata();
        Ok(AnnexBFrame {
            data,
            sample_index: location.sample_index,
            width: metadata.width,
            height: metadata.height,
        })
    }

    /// 提取并解码指定时刻的预览帧
    ///
    /// 预览帧必须可独立解码, 因此总是要求同步采样.
    pub fn extract_frame(
        &mut self,
        decoder: &mut dyn FrameDecoder,
        seconds: f64,
    ) -> ZhenResult<DecodedFrame> {
        let frame = self.extract_annex_b(seconds, true)?;
        decoder.decode(&frame.data, frame.width, frame.height)
    }

    /// 惰性构建轨道模型: 顶层扫描找到 moov, 解析其中第一条
    /// 可用的 H.264 视频轨道
    fn ensure_track(&mut self) -> ZhenResult<()> {
        if self.track.is_some() {
            return Ok(());
        }

        let moov_payload = self.scan_for_moov()?;
        let children = parse_boxes(&moov_payload)?;

        let mut first_error = None;
        for child in &children {
            if child.box_type != BoxType::Trak {
                continue;
            }
            match Track::from_trak(child) {
                Ok(track) => {
                    self.track = Some(track);
                    return Ok(());
                }
                Err(e) => {
                    debug!("跳过不可用轨道: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        Err(first_error.unwrap_or(ZhenError::MissingBox("trak")))
    }

    /// 顶层 box 扫描, 返回 moov 的 payload
    ///
    /// 每个 box 只取回头部字节; 声明大小越过文件末尾时记录
    /// warn 并停止, 与容器内的兄弟 box 策略一致.
    fn scan_for_moov(&mut self) -> ZhenResult<Bytes> {
        let file_size = self.source.size()?;
        let mut offset = 0u64;

        while offset + 8 <= file_size {
            let header_len = 16.min(file_size - offset);
            let header_bytes = self.source.read_range(offset, header_len)?;
            let header = BoxHeader::parse(&header_bytes)?;

            // size==0: 延伸到文件末尾
            let size = if header.size == 0 {
                file_size - offset
            } else {
                header.size
            };
            if size < header.header_size {
                return Err(ZhenError::MalformedBox(format!(
                    "box '{}' 声明大小 {} 小于头部大小 {}",
                    header.box_type, size, header.header_size
                )));
            }
            if offset + size > file_size {
                if offset == 0 {
                    return Err(ZhenError::MalformedBox(format!(
                        "box '{}' 声明大小 {} 超出文件大小 {}",
                        header.box_type, size, file_size
                    )));
                }
                warn!(
                    "box '{}' @ {offset} 声明大小 {size} 超出文件大小 {file_size}, 停止扫描",
                    header.box_type
                );
                break;
            }

            debug!("顶层 box '{}' @ {offset}, {size} 字节", header.box_type);
            if header.box_type == BoxType::Moov {
                return self
                    .source
                    .read_range(offset + header.header_size, size - header.header_size);
            }
            offset += size;
        }

        Err(ZhenError::MissingBox("moov"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn build_box(box_type: &[u8; 4], content: &[u8]) -> Vec<u8> {
        let size = (8 + content.len()) as u32;
        let mut data = Vec::new();
        data.extend_from_slice(&size.to_be_bytes());
        data.extend_from_slice(box_type);
        data.extend_from_slice(content);
        data
    }

    #[test]
    fn test_无moov_返回缺box() {
        let mut data = build_box(b"ftyp", b"isom");
        data.extend_from_slice(&build_box(b"mdat", &[0u8; 32]));

        let mut extractor = PreviewExtractor::new(MemorySource::new(data));
        assert!(matches!(
            extractor.metadata(),
            Err(ZhenError::MissingBox("moov"))
        ));
    }

    #[test]
    fn test_moov无轨道_返回缺box() {
        let moov = build_box(b"moov", &build_box(b"mvhd", &[0u8; 100]));
        let mut data = build_box(b"ftyp", b"isom");
        data.extend_from_slice(&moov);

        let mut extractor = PreviewExtractor::new(MemorySource::new(data));
        assert!(matches!(
            extractor.metadata(),
            Err(ZhenError::MissingBox("trak"))
        ));
    }

    #[test]
    fn test_首个box越过文件末尾_返回错误() {
        let mut data = Vec::new();
        data.extend_from_slice(&9999u32.to_be_bytes());
        data.extend_from_slice(b"moov");
        data.extend_from_slice(&[0u8; 16]);

        let mut extractor = PreviewExtractor::new(MemorySource::new(data));
        assert!(matches!(
            extractor.metadata(),
            Err(ZhenError::MalformedBox(_))
        ));
    }
}
