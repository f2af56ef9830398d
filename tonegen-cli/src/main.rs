//! tonegen CLI: play a steady tone on an output device.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::bounded;
use tonegen_engine::{
    output_device_names, CpalBackend, EngineConfig, EngineEvent, SoundGenerator, Waveform,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    list_devices: bool,
    device_name: Option<String>,
    sample_rate: Option<u32>,
    freq: Option<f32>,
    glide_to: Option<f32>,
    amp: Option<f32>,
    wave: Option<Waveform>,
    volume: Option<f32>,
    db: Option<f32>,
    balance: Option<f32>,
    fade_ms: Option<u32>,
    duration_sec: Option<f32>,
    clean_start: bool,
    print_cycle: bool,
}

fn parse_args() -> Args {
    let mut a = Args::default();
    for s in std::env::args().skip(1) {
        if s == "--list-devices" { a.list_devices = true; continue; }
        if s == "--clean-start"  { a.clean_start  = true; continue; }
        if s == "--print-cycle"  { a.print_cycle  = true; continue; }
        if let Some(rest) = s.strip_prefix("--device=")      { a.device_name  = Some(rest.to_string()); continue; }
        if let Some(rest) = s.strip_prefix("--sample-rate=") { a.sample_rate  = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--freq=")        { a.freq         = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--glide-to=")    { a.glide_to     = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--amp=")         { a.amp          = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--volume=")      { a.volume       = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--db=")          { a.db           = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--balance=")     { a.balance      = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--fade-ms=")     { a.fade_ms      = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--duration=")    { a.duration_sec = rest.parse().ok();      continue; }
        if let Some(rest) = s.strip_prefix("--wave=") {
            match rest.parse() {
                Ok(w) => a.wave = Some(w),
                Err(e) => warn!("{e}; keeping default waveform"),
            }
            continue;
        }
        warn!("unknown arg: {s}");
    }
    a
}

fn config_from(args: &Args) -> EngineConfig {
    let mut cfg = EngineConfig::default();
    if let Some(sr) = args.sample_rate { cfg.sample_rate  = sr; }
    if let Some(f)  = args.freq        { cfg.frequency_hz = f; }
    if let Some(a)  = args.amp         { cfg.amplitude    = a; }
    if let Some(w)  = args.wave        { cfg.waveform     = w; }
    if let Some(v)  = args.volume      { cfg.volume       = v; }
    if let Some(b)  = args.balance     { cfg.balance      = b; }
    if let Some(ms) = args.fade_ms     { cfg.fade_ms      = ms; }
    cfg.clean_start = args.clean_start;
    cfg
}

/// `--duration` as a `Duration`; negative, NaN or overflowing values play
/// nothing.
fn play_duration(secs: f32) -> Duration {
    match Duration::try_from_secs_f32(secs) {
        Ok(d) => d,
        Err(e) => {
            warn!(secs, "invalid --duration ({e}); stopping now");
            Duration::ZERO
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // parsed after the subscriber is up so argument warnings are visible
    let args = parse_args();

    if args.list_devices {
        println!("Available output devices:");
        for name in output_device_names()? {
            println!("- {name}");
        }
        return Ok(());
    }

    let backend = match &args.device_name {
        Some(name) => CpalBackend::with_device(name.clone()),
        None => CpalBackend::new(),
    };
    let cfg = config_from(&args);
    let (events_tx, events) = bounded(16);
    let gen = SoundGenerator::with_listener(backend, cfg, Arc::new(events_tx));
    if let Some(db) = args.db {
        gen.set_decibel(db);
    }

    gen.try_init(cfg.sample_rate)?;

    if args.print_cycle {
        gen.refresh_one_cycle_data();
        if let Ok(EngineEvent::OneCycle(cycle)) = events.try_recv() {
            println!("One cycle ({} samples):", cycle.len());
            println!("{cycle:?}");
        }
    }

    info!(
        freq = gen.frequency(),
        wave = %gen.waveform(),
        amp = gen.amplitude(),
        volume = gen.volume(),
        db = gen.decibel(),
        balance = gen.balance(),
        fade_ms = gen.fade_duration(),
        "playing"
    );
    gen.start();

    let Some(secs) = args.duration_sec else {
        println!("Press Ctrl+C to stop…");
        loop { std::thread::sleep(Duration::from_millis(500)); }
    };

    let total = play_duration(secs);
    match args.glide_to {
        Some(target) => {
            std::thread::sleep(total / 2);
            info!(from = gen.frequency(), to = target, "gliding");
            gen.set_frequency(target);
            std::thread::sleep(total / 2);
        }
        None => std::thread::sleep(total),
    }

    gen.stop();
    gen.wait_until_idle();
    gen.release();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_rejects_unrepresentable_values() {
        assert_eq!(play_duration(1.5), Duration::from_millis(1500));
        assert_eq!(play_duration(f32::INFINITY), Duration::ZERO);
        assert_eq!(play_duration(f32::NAN), Duration::ZERO);
        assert_eq!(play_duration(-3.0), Duration::ZERO);
    }
}
