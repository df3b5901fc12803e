//! # zhen-mp4
//!
//! Zhen MP4 (ISO Base Media File Format) 容器解析库.
//!
//! 基于 ISO 14496-12 标准, 覆盖单个 H.264 视频轨道预览提取所需的
//! box 子集:
//!
//! ```text
//! ftyp                  文件类型
//! moov                  影片元数据
//! ├── mvhd              影片头部
//! └── trak              轨道
//!     ├── tkhd          轨道头部 (宽高)
//!     └── mdia          媒体信息
//!         ├── mdhd      媒体头部 (时间刻度, 时长)
//!         ├── hdlr      处理器引用 (vide)
//!         └── minf
//!             └── stbl  采样表
//!                 ├── stsd  采样描述 (avc1 → avcC)
//!                 ├── stts  时间→采样映射
//!                 ├── stsc  采样→块映射
//!                 ├── stsz  采样大小
//!                 ├── stco  块偏移 (32位)
//!                 ├── co64  块偏移 (64位)
//!                 └── stss  同步采样 (关键帧)
//! mdat                  媒体数据
//! ```
//!
//! 分片 MP4 (moof/mdat) 与音频轨道不在覆盖范围内.

pub mod boxes;
pub mod sample_table;
pub mod track;

// 重导出常用类型
pub use boxes::{BoxHeader, BoxType, Mp4Box, parse_boxes};
pub use sample_table::SampleTable;
pub use track::{SampleLocation, Track, TrackMetadata};
