//! zhen-preview - MP4 预览帧提取命令行工具
//!
//! 从本地 MP4 文件提取指定时刻的压缩采样, 组装为 Annex-B 码流
//! 写入输出文件, 供 `ffplay`/`ffprobe` 等外部解码器验证.

use std::fs;
use std::process;

use clap::Parser;
use serde::Serialize;

use zhen::{FileSource, PreviewExtractor};

/// Zhen MP4 预览帧提取工具
#[derive(Parser, Debug)]
#[command(name = "zhen-preview", version, about = "纯 Rust MP4 预览帧提取工具")]
struct Cli {
    /// 输入 MP4 文件路径
    input: Option<String>,

    /// 目标时刻 (秒)
    #[arg(short, long, default_value_t = 0.0)]
    seconds: f64,

    /// Annex-B 码流输出路径 (省略时只打印信息)
    #[arg(short, long)]
    out: Option<String>,

    /// 不回退到同步采样 (直接取目标时刻的采样)
    #[arg(long)]
    no_sync: bool,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 静默模式 (只输出提取结果)
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================
// JSON 输出结构体
// ============================================================

/// 完整提取结果
#[derive(Serialize)]
struct PreviewOutput {
    track: TrackInfo,
    frame: FrameInfo,
}

/// 轨道信息
#[derive(Serialize)]
struct TrackInfo {
    width: u32,
    height: u32,
    timescale: u32,
    duration_ticks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_seconds: Option<f64>,
}

/// 帧信息
#[derive(Serialize)]
struct FrameInfo {
    requested_seconds: f64,
    sample_index: u32,
    annex_b_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_path: Option<String>,
}

// ============================================================
// 主逻辑
// ============================================================

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if cli.input.is_none() {
        print_banner();
        return;
    }

    let input_path = cli.input.as_ref().unwrap();

    if !cli.quiet {
        eprintln!(
            "zhen-preview 版本 {} -- 纯 Rust MP4 预览帧提取工具",
            env!("CARGO_PKG_VERSION")
        );
        eprintln!("输入文件: {input_path}");
    }

    // 打开文件
    let source = match FileSource::open(input_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("错误: 无法打开文件 '{input_path}': {e}");
            process::exit(1);
        }
    };
    let mut extractor = PreviewExtractor::new(source);

    // 解析轨道元数据
    let track_info = match extractor.metadata() {
        Ok(md) => TrackInfo {
            width: md.width,
            height: md.height,
            timescale: md.timescale,
            duration_ticks: md.duration,
            duration_seconds: if md.timescale > 0 && md.duration > 0 {
                Some(md.duration as f64 / f64::from(md.timescale))
            } else {
                None
            },
        },
        Err(e) => {
            eprintln!("错误: 无法解析轨道: {e}");
            process::exit(1);
        }
    };

    // 提取并组装
    let frame = match extractor.extract_annex_b(cli.seconds, !cli.no_sync) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("错误: 提取 {} 秒处的采样失败: {e}", cli.seconds);
            process::exit(1);
        }
    };

    // 写出码流
    if let Some(ref out_path) = cli.out {
        if let Err(e) = fs::write(out_path, &frame.data) {
            eprintln!("错误: 无法写入 '{out_path}': {e}");
            process::exit(1);
        }
    }

    let frame_info = FrameInfo {
        requested_seconds: cli.seconds,
        sample_index: frame.sample_index,
        annex_b_bytes: frame.data.len(),
        output_path: cli.out.clone(),
    };

    // 输出结果
    if cli.json {
        let output = PreviewOutput {
            track: track_info,
            frame: frame_info,
        };
        match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("错误: JSON 序列化失败: {e}");
                process::exit(1);
            }
        }
    } else {
        print_track_text(&track_info);
        print_frame_text(&frame_info);
    }
}

/// 文本输出: 轨道信息
fn print_track_text(info: &TrackInfo) {
    println!("[TRACK]");
    println!("  分辨率       : {}x{}", info.width, info.height);
    println!("  时间刻度     : {} ticks/秒", info.timescale);
    if let Some(dur) = info.duration_seconds {
        println!("  时长         : {dur:.3} 秒 ({} ticks)", info.duration_ticks);
    }
    println!("[/TRACK]");
    println!();
}

/// 文本输出: 帧信息
fn print_frame_text(info: &FrameInfo) {
    println!("[FRAME]");
    println!("  请求时刻     : {:.3} 秒", info.requested_seconds);
    println!("  采样索引     : {}", info.sample_index);
    println!(
        "  Annex-B 大小 : {} 字节 ({:.2} KB)",
        info.annex_b_bytes,
        info.annex_b_bytes as f64 / 1024.0
    );
    if let Some(ref path) = info.output_path {
        println!("  输出文件     : {path}");
    }
    println!("[/FRAME]");
    println!();
}

/// 打印版本横幅
fn print_banner() {
    println!(
        "zhen-preview 版本 {} -- 纯 Rust MP4 预览帧提取工具",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("用法: zhen-preview [选项] <输入文件>");
    println!();
    println!("选项:");
    println!("  -s, --seconds <N>  目标时刻 (秒, 默认 0)");
    println!("  -o, --out <路径>   Annex-B 码流输出路径");
    println!("  --no-sync          不回退到同步采样");
    println!("  --json             以 JSON 格式输出");
    println!("  -q, --quiet        静默模式");
    println!();
    println!("使用 --help 查看完整用法.");
}
