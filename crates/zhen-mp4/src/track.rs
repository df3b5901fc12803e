//! 轨道模型 (TrackModel) 与采样定位.
//!
//! 把一个 `trak` box 解释为内存索引: 轨道元数据 (宽高、时间刻度、
//! 时长)、解码器配置 (SPS/PPS) 和采样表. 构建完成后不可变,
//! 之后的定位查询全部是纯计算.

use log::debug;
use zhen_avc::AvcConfig;
use zhen_core::{ByteReader, ZhenError, ZhenResult};

use crate::boxes::{BoxType, Mp4Box};
use crate::sample_table::SampleTable;

/// 轨道元数据
///
/// 由 `tkhd`/`mdhd`/`stsd` 构建, 之后只读.
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    /// 视频宽度 (像素)
    pub width: u32,
    /// 视频高度 (像素)
    pub height: u32,
    /// 时间刻度 (ticks 每秒)
    pub timescale: u32,
    /// 轨道时长 (ticks)
    pub duration: u64,
}

/// 采样定位结果
///
/// 字节区间语义为 `[offset, offset + size)`, 可直接作为
/// 传输层的 range 请求参数.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLocation {
    /// 采样索引 (0-based)
    pub sample_index: u32,
    /// 文件绝对字节偏移
    pub offset: u64,
    /// 字节大小
    pub size: u32,
}

/// H.264 视频轨道模型
#[derive(Debug)]
pub struct Track {
    /// 轨道元数据
    metadata: TrackMetadata,
    /// 解码器配置 (SPS/PPS + NAL 长度前缀宽度)
    avc_config: AvcConfig,
    /// 采样表
    sample_table: SampleTable,
}

impl Track {
    /// 从已解析的 `trak` box 构建轨道模型
    ///
    /// # 错误
    /// - [`ZhenError::UnsupportedTrack`]: handler 非 `vide`, 或采样
    ///   描述不是 H.264 (`avc1`/`avc3`);
    /// - [`ZhenError::MissingBox`]: `stsz`/`stco`(或 `co64`)/`stsc`/
    ///   `stts` 任一缺失;
    /// - [`ZhenError::MalformedBox`]: 采样表跨表计数不一致;
    /// - [`ZhenError::MissingParameterSets`]: avcC 中无 SPS 或无 PPS.
    pub fn from_trak(trak: &Mp4Box) -> ZhenResult<Self> {
        if trak.box_type != BoxType::Trak {
            return Err(ZhenError::MalformedBox(format!(
                "期望 trak box, 实际为 '{}'",
                trak.box_type
            )));
        }

        // tkhd 的 16.16 定点宽高仅作为 stsd 缺失时的回退
        let (tkhd_width, tkhd_height) = match trak.find_child(BoxType::Tkhd) {
            Some(tkhd) => parse_tkhd(&tkhd.payload)?,
            None => (0, 0),
        };

        let mdia = trak
            .find_child(BoxType::Mdia)
            .ok_or(ZhenError::MissingBox("mdia"))?;
        let mdhd = mdia
            .find_child(BoxType::Mdhd)
            .ok_or(ZhenError::MissingBox("mdhd"))?;
        let (timescale, duration) = parse_mdhd(&mdhd.payload)?;

        let hdlr = mdia
            .find_child(BoxType::Hdlr)
            .ok_or(ZhenError::MissingBox("hdlr"))?;
        let handler = parse_hdlr(&hdlr.payload)?;
        if &handler != b"vide" {
            return Err(ZhenError::UnsupportedTrack(format!(
                "handler '{}' 不是视频轨道",
                String::from_utf8_lossy(&handler)
            )));
        }

        let stbl = mdia
            .find_child(BoxType::Minf)
            .ok_or(ZhenError::MissingBox("minf"))?
            .find_child(BoxType::Stbl)
            .ok_or(ZhenError::MissingBox("stbl"))?;

        let stsd = stbl
            .find_child(BoxType::Stsd)
            .ok_or(ZhenError::MissingBox("stsd"))?;
        let (width, height, avc_config) = parse_stsd(&stsd.payload)?;

        let mut sample_table = SampleTable::new();
        sample_table.parse_stsz(
            &stbl
                .find_child(BoxType::Stsz)
                .ok_or(ZhenError::MissingBox("stsz"))?
                .payload,
        )?;
        match stbl.find_child(BoxType::Stco) {
            Some(stco) => sample_table.parse_stco(&stco.payload, false)?,
            None => {
                let co64 = stbl
                    .find_child(BoxType::Co64)
                    .ok_or(ZhenError::MissingBox("stco"))?;
                sample_table.parse_stco(&co64.payload, true)?;
            }
        }
        sample_table.parse_stsc(
            &stbl
                .find_child(BoxType::Stsc)
                .ok_or(ZhenError::MissingBox("stsc"))?
                .payload,
        )?;
        sample_table.parse_stts(
            &stbl
                .find_child(BoxType::Stts)
                .ok_or(ZhenError::MissingBox("stts"))?
                .payload,
        )?;
        if let Some(stss) = stbl.find_child(BoxType::Stss) {
            sample_table.parse_stss(&stss.payload)?;
        }

        // 三张表只能按位置对齐, 计数不一致会静默产生错误的字节区间,
        // 因此在这里整体拒绝
        sample_table.validate()?;

        let metadata = TrackMetadata {
            width: if width > 0 { width } else { tkhd_width },
            height: if height > 0 { height } else { tkhd_height },
            timescale,
            duration,
        };
        debug!(
            "轨道构建完成: {}x{}, timescale={}, duration={}, samples={}",
            metadata.width,
            metadata.height,
            metadata.timescale,
            metadata.duration,
            sample_table.sample_count(),
        );

        Ok(Self {
            metadata,
            avc_config,
            sample_table,
        })
    }

    /// 轨道元数据
    pub fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }

    /// 解码器配置
    pub fn avc_config(&self) -> &AvcConfig {
        &self.avc_config
    }

    /// 采样表
    pub fn sample_table(&self) -> &SampleTable {
        &self.sample_table
    }

    /// 定位指定时刻的采样, 返回其索引与字节区间
    ///
    /// 采用 last-at-or-before 语义: 取解码时间不晚于目标时刻的
    /// 最后一个采样. `require_sync` 时向前回退到最近的同步采样.
    ///
    /// # 错误
    /// [`ZhenError::OutOfRange`]: `seconds` 为负、非有限值, 或超出
    /// 轨道时长.
    pub fn locate(&self, seconds: f64, require_sync: bool) -> ZhenResult<SampleLocation> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(ZhenError::OutOfRange(format!(
                "请求时间非法: {seconds} 秒"
            )));
        }

        let ticks = (seconds * f64::from(self.metadata.timescale)) as u64;
        // mdhd 时长为 0 (未知) 时退回 stts 累计时长
        let duration = if self.metadata.duration > 0 {
            self.metadata.duration
        } else {
            self.sample_table.total_duration()
        };
        if ticks > duration {
            return Err(ZhenError::OutOfRange(format!(
                "请求时间 {seconds} 秒 ({ticks} ticks) 超出轨道时长 {duration} ticks"
            )));
        }

        let mut index = self
            .sample_table
            .sample_at_or_before(ticks)
            .ok_or_else(|| ZhenError::OutOfRange("轨道没有任何采样".into()))?;

        if require_sync && !self.sample_table.is_sync(index) {
            let sync = self.sample_table.sync_at_or_before(index);
            debug!("采样 {index} 不是同步采样, 回退到 {sync}");
            index = sync;
        }

        Ok(SampleLocation {
            sample_index: index,
            offset: self.sample_table.sample_offset(index),
            size: self.sample_table.sample_size(index),
        })
    }
}

/// 解析 tkhd (Track Header Box), 返回 16.16 定点编码的 (宽, 高)
fn parse_tkhd(payload: &[u8]) -> ZhenResult<(u32, u32)> {
    let mut r = ByteReader::new(payload);
    let version = r.read_u8()?;
    r.skip(3)?; // flags

    if version == 0 {
        r.skip(4 + 4 + 4 + 4 + 4)?; // creation/modification/track_id/reserved/duration
    } else {
        r.skip(8 + 8 + 4 + 4 + 8)?; // 64-bit 时间戳版本
    }
    r.skip(8)?; // reserved
    r.skip(2 + 2 + 2 + 2)?; // layer/alternate_group/volume/reserved
    r.skip(36)?; // matrix

    let width = r.read_u32_be()? >> 16;
    let height = r.read_u32_be()? >> 16;
    Ok((width, height))
}

/// 解析 mdhd (Media Header Box), 返回 (timescale, duration)
fn parse_mdhd(payload: &[u8]) -> ZhenResult<(u32, u64)> {
    let mut r = ByteReader::new(payload);
    let version = r.read_u8()?;
    r.skip(3)?; // flags

    if version == 0 {
        r.skip(4 + 4)?; // creation/modification
        let timescale = r.read_u32_be()?;
        let duration = u64::from(r.read_u32_be()?);
        Ok((timescale, duration))
    } else {
        r.skip(8 + 8)?;
        let timescale = r.read_u32_be()?;
        let duration = r.read_u64_be()?;
        Ok((timescale, duration))
    }
}

/// 解析 hdlr (Handler Reference Box), 返回 handler type
fn parse_hdlr(payload: &[u8]) -> ZhenResult<[u8; 4]> {
    let mut r = ByteReader::new(payload);
    r.skip(4)?; // version + flags
    r.skip(4)?; // pre_defined
    r.read_tag()
}

/// 解析 stsd (Sample Description Box)
///
/// 只消费第一个采样条目; 返回 (宽, 高, avcC 配置).
fn parse_stsd(payload: &[u8]) -> ZhenResult<(u32, u32, AvcConfig)> {
    let mut r = ByteReader::new(payload);
    r.skip(4)?; // version + flags
    let entry_count = r.read_u32_be()?;
    if entry_count == 0 {
        return Err(ZhenError::MalformedBox("stsd 没有任何采样条目".into()));
    }

    let entry_size = r.read_u32_be()? as usize;
    let entry_format = r.read_tag()?;
    if entry_size < 8 {
        return Err(ZhenError::MalformedBox(format!(
            "stsd 条目大小非法: {entry_size}"
        )));
    }
    // 条目起始于 payload 偏移 8 (version/flags/entry_count 之后)
    let entry_end = (8 + entry_size).min(payload.len());

    match &entry_format {
        b"avc1" | b"avc3" => {}
        other => {
            return Err(ZhenError::UnsupportedTrack(format!(
                "采样描述 '{}' 不是 H.264",
                String::from_utf8_lossy(other)
            )));
        }
    }

    // VisualSampleEntry (ISO 14496-12)
    r.skip(6)?; // reserved
    r.skip(2)?; // data_reference_index
    r.skip(2 + 2 + 12)?; // pre_defined + reserved + pre_defined[3]
    let width = u32::from(r.read_u16_be()?);
    let height = u32::from(r.read_u16_be()?);
    r.skip(4 + 4 + 4)?; // horizresolution/vertresolution/reserved
    r.skip(2)?; // frame_count
    r.skip(32)?; // compressorname
    r.skip(2 + 2)?; // depth + pre_defined

    // 条目内嵌套的配置 box, 定位 avcC
    while r.position() + 8 <= entry_end {
        let box_size = r.read_u32_be()? as usize;
        let tag = r.read_tag()?;
        if box_size < 8 || r.position() + (box_size - 8) > entry_end {
            break;
        }
        let content = r.read_bytes(box_size - 8)?;
        if &tag == b"avcC" {
            return Ok((width, height, AvcConfig::parse(content)?));
        }
    }

    Err(ZhenError::MissingParameterSets(
        "stsd 采样条目中未找到 avcC 配置".into(),
    ))
}
