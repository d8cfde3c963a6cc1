use anyhow::{Context, Result};
use clap::Parser;
use emu_core::cpu_z80::CpuZ80;
use emu_core::logging::{LogCategory, LogConfig, LogLevel};
use emu_core::System;
use emu_gg::{GgConfig, GgSystem, Host, FRAME_PIXELS, SCREEN_HEIGHT, SCREEN_WIDTH};
use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Headless Game Gear runner
#[derive(Parser)]
struct Args {
    /// Cartridge image (.gg or .sms)
    rom: PathBuf,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// JSON session configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the per-line sprite limit (8..=64)
    #[arg(long)]
    sprite_limit: Option<usize>,

    /// Restore this snapshot before running
    #[arg(long)]
    load: Option<PathBuf>,

    /// Write a snapshot here after running
    #[arg(long)]
    save: Option<PathBuf>,

    /// Write the last completed frame as a binary PPM
    #[arg(long)]
    dump_frame: Option<PathBuf>,

    /// Print the cartridge header as JSON and exit
    #[arg(long, default_value_t = false)]
    header_only: bool,

    /// Level for every category without its own level
    #[arg(long, default_value = "warn")]
    log_level: LogLevel,

    #[arg(long)]
    log_cpu: Option<LogLevel>,

    #[arg(long)]
    log_mapper: Option<LogLevel>,

    #[arg(long)]
    log_vdp: Option<LogLevel>,

    #[arg(long)]
    log_psg: Option<LogLevel>,

    #[arg(long)]
    log_interrupts: Option<LogLevel>,

    #[arg(long)]
    log_state: Option<LogLevel>,
}

impl Args {
    fn configure_logging(&self) {
        let config = LogConfig::global();
        config.set_global_level(self.log_level);
        let overrides = [
            (LogCategory::CPU, self.log_cpu),
            (LogCategory::Mapper, self.log_mapper),
            (LogCategory::VDP, self.log_vdp),
            (LogCategory::PSG, self.log_psg),
            (LogCategory::Interrupts, self.log_interrupts),
            (LogCategory::State, self.log_state),
        ];
        for (category, level) in overrides {
            if let Some(level) = level {
                config.set_level(category, level);
            }
        }

        let filter = config
            .max_level()
            .to_log_level()
            .map_or(log::LevelFilter::Off, |l| l.to_level_filter());
        env_logger::Builder::new().filter_level(filter).init();
    }

    fn session_config(&self) -> Result<GgConfig> {
        let mut config = match &self.config {
            Some(path) => GgConfig::load(path)?,
            None => GgConfig::default(),
        };
        if let Some(limit) = self.sprite_limit {
            config.sprite_limit = limit;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Frames seen by the display sink
#[derive(Default)]
struct FrameLog {
    count: u32,
    last: Vec<u16>,
}

/// Convert 12-bit xBGR to 8-bit RGB
fn rgb(pixel: u16) -> [u8; 3] {
    let r = (pixel & 0xF) as u8;
    let g = ((pixel >> 4) & 0xF) as u8;
    let b = ((pixel >> 8) & 0xF) as u8;
    [r * 17, g * 17, b * 17]
}

fn write_ppm(path: &Path, frame: &[u16]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write!(out, "P6\n{} {}\n255\n", SCREEN_WIDTH, SCREEN_HEIGHT)?;
    for &pixel in frame {
        out.write_all(&rgb(pixel))?;
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.configure_logging();

    let image =
        fs::read(&args.rom).with_context(|| format!("reading {}", args.rom.display()))?;

    let frames = Rc::new(RefCell::new(FrameLog::default()));
    let sink = Rc::clone(&frames);
    let watch = Rc::clone(&frames);
    let target = args.frames;
    let host = Host::new()
        .with_display(move |frame: &[u16]| {
            let mut seen = sink.borrow_mut();
            seen.count += 1;
            seen.last.clear();
            seen.last.extend_from_slice(frame);
        })
        .with_signals(move || watch.borrow().count >= target)
        .with_diagnostics(|msg: &str| eprintln!("warning: {}", msg));

    let mut sys = GgSystem::new(CpuZ80::new(), host, args.session_config()?)?;
    sys.load_rom(&image)?;

    if args.header_only {
        let header = sys.rom_header();
        println!("{}", serde_json::to_string_pretty(&header)?);
        return Ok(());
    }

    if let Some(path) = &args.load {
        let mut input = BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        );
        sys.load_state(&mut input)?;
    }

    if args.frames > 0 {
        sys.run()?;
    }
    let frames = frames.borrow();
    println!(
        "ran {} frames, {} CPU cycles",
        frames.count,
        sys.cpu().cycles
    );

    if let Some(path) = &args.dump_frame {
        if frames.last.len() == FRAME_PIXELS {
            write_ppm(path, &frames.last)?;
        } else {
            anyhow::bail!("no frame completed, nothing to dump");
        }
    }

    if let Some(path) = &args.save {
        let mut out = BufWriter::new(File::create(path)?);
        sys.save_state(&mut out)?;
    }

    Ok(())
}
