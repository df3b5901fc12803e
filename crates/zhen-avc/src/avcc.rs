//! AVCDecoderConfigurationRecord (avcC) 解析.
//!
//! MP4 的 H.264 解码器配置存放在 `stsd → avc1 → avcC` 中,
//! 布局 (ISO 14496-15):
//! ```text
//! configurationVersion(1) profile(1) compat(1) level(1)
//! 0b111111xx             xx = lengthSizeMinusOne
//! 0b111xxxxx             xxxxx = numOfSequenceParameterSets
//! { len(2, BE) + SPS NAL } * numOfSPS
//! numOfPictureParameterSets(1)
//! { len(2, BE) + PPS NAL } * numOfPPS
//! ```

use zhen_core::{ZhenError, ZhenResult};

/// 解码器配置解析结果
#[derive(Debug, Clone)]
pub struct AvcConfig {
    /// SPS NAL 列表 (含 NAL 头部字节, 不含任何分帧)
    pub sps_list: Vec<Vec<u8>>,
    /// PPS NAL 列表
    pub pps_list: Vec<Vec<u8>>,
    /// 采样内 NAL 长度前缀宽度 (1/2/4 字节)
    pub length_size: usize,
}

impl AvcConfig {
    /// 解析 avcC box 的 payload
    ///
    /// 纯函数, 无 I/O. 声明的记录数量与实际长度前缀条目不符时
    /// 返回 [`ZhenError::MalformedConfig`]; 任一参数集列表为空时
    /// 返回 [`ZhenError::MissingParameterSets`].
    pub fn parse(data: &[u8]) -> ZhenResult<Self> {
        if data.len() < 7 {
            return Err(ZhenError::MalformedConfig(format!(
                "avcC 数据太短: {} 字节",
                data.len()
            )));
        }

        let _version = data[0];
        let _profile = data[1];
        let _compat = data[2];
        let _level = data[3];
        // 2-bit 字段: 编码值 0/1/3 对应前缀宽度 1/2/4, 编码值 2 为保留值
        let length_size = ((data[4] & 0x03) + 1) as usize;
        if length_size == 3 {
            return Err(ZhenError::MalformedConfig(
                "lengthSizeMinusOne=2 为保留值, NAL 长度前缀只能是 1/2/4 字节".into(),
            ));
        }

        let num_sps = (data[5] & 0x1F) as usize;
        let mut pos = 6;
        let sps_list = read_parameter_sets(data, &mut pos, num_sps, "SPS")?;

        if pos >= data.len() {
            return Err(ZhenError::MalformedConfig(
                "avcC 缺少 numOfPictureParameterSets 字段".into(),
            ));
        }
        let num_pps = data[pos] as usize;
        pos += 1;
        let pps_list = read_parameter_sets(data, &mut pos, num_pps, "PPS")?;

        if sps_list.is_empty() {
            return Err(ZhenError::MissingParameterSets("未解析到任何 SPS".into()));
        }
        if pps_list.is_empty() {
            return Err(ZhenError::MissingParameterSets("未解析到任何 PPS".into()));
        }

        Ok(Self {
            sps_list,
            pps_list,
            length_size,
        })
    }

    /// 第一个 SPS (引擎组装单个访问单元时使用)
    pub fn sps(&self) -> &[u8] {
        &self.sps_list[0]
    }

    /// 第一个 PPS
    pub fn pps(&self) -> &[u8] {
        &self.pps_list[0]
    }
}

/// 读取 count 个 `len(2, BE) + payload` 形式的参数集记录
fn read_parameter_sets(
    data: &[u8],
    pos: &mut usize,
    count: usize,
    kind: &str,
) -> ZhenResult<Vec<Vec<u8>>> {
    let mut list = Vec::with_capacity(count);

    for i in 0..count {
        if *pos + 2 > data.len() {
            return Err(ZhenError::MalformedConfig(format!(
                "avcC {kind} 长度字段截断, index={i}"
            )));
        }
        let len = ((u16::from(data[*pos]) << 8) | u16::from(data[*pos + 1])) as usize;
        *pos += 2;
        if len == 0 {
            return Err(ZhenError::MalformedConfig(format!(
                "avcC {kind} 长度非法, index={i}, len=0"
            )));
        }
        if *pos + len > data.len() {
            return Err(ZhenError::MalformedConfig(format!(
                "avcC {kind} 数据截断, index={i}, declared_len={len}, remain={}",
                data.len() - *pos
            )));
        }
        list.push(data[*pos..*pos + len].to_vec());
        *pos += len;
    }

    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 构造 avcC payload
    fn build_avcc(length_code: u8, sps_list: &[&[u8]], pps_list: &[&[u8]]) -> Vec<u8> {
        let mut out = vec![
            1,    // configurationVersion
            0x64, // profile
            0x00, // compat
            0x1E, // level
            0xFC | length_code,
            0xE0 | (sps_list.len() as u8),
        ];
        for sps in sps_list {
            out.extend_from_slice(&(sps.len() as u16).to_be_bytes());
            out.extend_from_slice(sps);
        }
        out.push(pps_list.len() as u8);
        for pps in pps_list {
            out.extend_from_slice(&(pps.len() as u16).to_be_bytes());
            out.extend_from_slice(pps);
        }
        out
    }

    #[test]
    fn test_解析_基本配置() {
        // lengthSize 编码 0x03 → 4 字节前缀; SPS=[1,2], PPS=[3,4]
        let data = build_avcc(0x03, &[&[0x01, 0x02]], &[&[0x03, 0x04]]);
        let config = AvcConfig::parse(&data).unwrap();
        assert_eq!(config.length_size, 4);
        assert_eq!(config.sps_list, vec![vec![0x01, 0x02]]);
        assert_eq!(config.pps_list, vec![vec![0x03, 0x04]]);
        assert_eq!(config.sps(), &[0x01, 0x02]);
        assert_eq!(config.pps(), &[0x03, 0x04]);
    }

    #[test]
    fn test_解析_多参数集与短前缀() {
        let data = build_avcc(0x01, &[&[0x67, 0xAA], &[0x67, 0xBB]], &[&[0x68, 0xCC]]);
        let config = AvcConfig::parse(&data).unwrap();
        assert_eq!(config.length_size, 2);
        assert_eq!(config.sps_list.len(), 2);
        assert_eq!(config.sps(), &[0x67, 0xAA]);
    }

    #[test]
    fn test_保留的长度前缀值_返回错误() {
        let data = build_avcc(0x02, &[&[0x67]], &[&[0x68]]);
        assert!(matches!(
            AvcConfig::parse(&data),
            Err(ZhenError::MalformedConfig(_))
        ));
    }

    #[test]
    fn test_数据太短_返回错误() {
        assert!(matches!(
            AvcConfig::parse(&[1, 0x64, 0, 0x1E, 0xFF]),
            Err(ZhenError::MalformedConfig(_))
        ));
    }

    #[test]
    fn test_记录数与实际条目不符_返回错误() {
        // 声明 1 个 SPS, 但长度字段只剩 1 字节
        let data = [0x01, 0x64, 0x00, 0x1E, 0xFF, 0xE1, 0x00];
        let err = AvcConfig::parse(&data).expect_err("SPS 截断应返回错误");
        assert!(matches!(err, ZhenError::MalformedConfig(_)));

        // 声明长度 4, 实际仅 2 字节
        let data = [0x01, 0x64, 0x00, 0x1E, 0xFF, 0xE1, 0x00, 0x04, 0x67, 0x64];
        assert!(matches!(
            AvcConfig::parse(&data),
            Err(ZhenError::MalformedConfig(_))
        ));
    }

    #[test]
    fn test_缺少pps计数字段_返回错误() {
        let data = [0x01, 0x64, 0x00, 0x1E, 0xFF, 0xE1, 0x00, 0x01, 0x67];
        assert!(matches!(
            AvcConfig::parse(&data),
            Err(ZhenError::MalformedConfig(_))
        ));
    }

    #[test]
    fn test_空参数集列表_返回缺少参数集() {
        // num_sps = 0
        let data = [0x01, 0x64, 0x00, 0x1E, 0xFF, 0xE0, 0x01, 0x00, 0x01, 0x68];
        assert!(matches!(
            AvcConfig::parse(&data),
            Err(ZhenError::MissingParameterSets(_))
        ));

        // num_pps = 0
        let data = [0x01, 0x64, 0x00, 0x1E, 0xFF, 0xE1, 0x00, 0x01, 0x67, 0x00];
        assert!(matches!(
            AvcConfig::parse(&data),
            Err(ZhenError::MissingParameterSets(_))
        ));
    }

    #[test]
    fn test_尾部扩展字节_容忍() {
        // High profile 的 avcC 末尾可能带 chroma 等扩展字段
        let mut data = build_avcc(0x03, &[&[0x67, 0x64]], &[&[0x68, 0xCE]]);
        data.extend_from_slice(&[0xFD, 0xF8, 0xF8, 0x00]);
        let config = AvcConfig::parse(&data).unwrap();
        assert_eq!(config.sps_list.len(), 1);
        assert_eq!(config.pps_list.len(), 1);
    }
}
