use anyhow::{anyhow, bail, Context};
use eyerig::preview::encode_jpeg;
use eyerig::timing::StopSignal;
use eyerig::{Backends, CameraManager, DeviceRegistry, RecordingManager, RigConfig};
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

fn usage() -> ! {
    eprintln!("Usage: eyerig-cli [--config <path>] [--json] <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  devices                      List devices and the resolved camera profile");
    eprintln!("  status                       Start every camera briefly and report status");
    eprintln!("  snapshot <camera> <file>     Save one JPEG from a camera");
    eprintln!("  record <seconds> [ids...]    Record cameras into a session directory");
    std::process::exit(1);
}

struct Options {
    config: RigConfig,
    json: bool,
    command: String,
    args: Vec<String>,
}

fn parse_args() -> anyhow::Result<Options> {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut config_path = None;
    let mut json = false;
    let mut rest = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let path = args.get(i).ok_or_else(|| anyhow!("--config needs a path"))?;
                config_path = Some(path.clone());
            }
            "--json" => json = true,
            "-h" | "--help" => usage(),
            _ => rest.push(args[i].clone()),
        }
        i += 1;
    }

    if rest.is_empty() {
        usage();
    }
    let command = rest.remove(0);
    let config = match config_path {
        Some(path) => {
            RigConfig::load_from_file(&path).with_context(|| format!("loading {}", path))?
        }
        None => RigConfig::load_or_default(),
    };

    Ok(Options {
        config,
        json,
        command,
        args: rest,
    })
}

fn main() -> anyhow::Result<()> {
    eyerig::init_logging();
    let opts = parse_args()?;

    let backends = Backends::native();
    let registry = DeviceRegistry::new(opts.config.devices.clone(), backends.uvc.clone());

    match opts.command.as_str() {
        "devices" => cmd_devices(&opts, &registry),
        "status" => cmd_status(&opts, &registry, &backends),
        "snapshot" => cmd_snapshot(&opts, &registry, &backends),
        "record" => cmd_record(&opts, &registry, &backends),
        other => {
            eprintln!("Unknown command: {}", other);
            usage();
        }
    }
}

fn cmd_devices(opts: &Options, registry: &DeviceRegistry) -> anyhow::Result<()> {
    let devices = registry.enumerate();
    let profile = registry.resolve();

    if opts.json {
        let out = serde_json::json!({ "devices": devices, "cameras": profile });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Devices:");
    if devices.is_empty() {
        println!("  (none enumerated)");
    }
    for d in &devices {
        println!(
            "  {} {:04x}:{:04x} addr {} serial {} - {}",
            d.uid,
            d.vendor_id,
            d.product_id,
            d.address,
            d.serial.as_deref().unwrap_or("-"),
            d.name
        );
    }
    println!("Cameras:");
    for c in &profile {
        println!(
            "  {:<6} {:?} index {} {}x{}@{} - {}",
            c.camera_id,
            c.access_method,
            c.device_index,
            c.frame_width,
            c.frame_height,
            c.fps,
            c.display_name
        );
    }
    Ok(())
}

fn build_manager(
    opts: &Options,
    registry: &DeviceRegistry,
    backends: &Backends,
) -> Arc<CameraManager> {
    Arc::new(CameraManager::new(
        registry.resolve(),
        backends,
        opts.config.capture.clone(),
    ))
}

fn install_interrupt(stop: &StopSignal) -> anyhow::Result<()> {
    let signal = stop.clone();
    ctrlc::set_handler(move || {
        eprintln!("Interrupted, stopping...");
        signal.stop();
    })
    .context("installing Ctrl-C handler")
}

/// Wait until every camera has published, or the timeout passes
fn wait_for_frames(cameras: &CameraManager, ids: &[String], stop: &StopSignal) -> bool {
    let deadline = Instant::now() + FIRST_FRAME_TIMEOUT;
    while Instant::now() < deadline {
        if ids.iter().all(|id| cameras.get_frame(id).is_some()) {
            return true;
        }
        if stop.wait_timeout(Duration::from_millis(50)) {
            return false;
        }
    }
    false
}

fn cmd_status(
    opts: &Options,
    registry: &DeviceRegistry,
    backends: &Backends,
) -> anyhow::Result<()> {
    let cameras = build_manager(opts, registry, backends);
    let stop = StopSignal::new();
    install_interrupt(&stop)?;

    let ids = cameras.camera_ids();
    for id in &ids {
        cameras.ensure_started(id);
    }
    wait_for_frames(&cameras, &ids, &stop);
    let snapshot = cameras.status_snapshot();
    cameras.stop_all();

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }
    for (id, status) in &snapshot {
        let frame = if status.timestamp > 0.0 {
            format!("last frame at {:.3}", status.timestamp)
        } else {
            "no frame".to_string()
        };
        println!(
            "{:<6} {:<8} {}",
            id,
            if status.running { "running" } else { "stopped" },
            frame
        );
    }
    Ok(())
}

fn cmd_snapshot(
    opts: &Options,
    registry: &DeviceRegistry,
    backends: &Backends,
) -> anyhow::Result<()> {
    let [camera_id, path] = opts.args.as_slice() else {
        bail!("Usage: eyerig-cli snapshot <camera> <file.jpg>");
    };
    let cameras = build_manager(opts, registry, backends);
    cameras.get_config(camera_id)?;
    let stop = StopSignal::new();
    install_interrupt(&stop)?;

    if !cameras.ensure_started(camera_id) {
        bail!("Camera {} failed to start", camera_id);
    }
    let ids = vec![camera_id.clone()];
    let ready = wait_for_frames(&cameras, &ids, &stop);
    let frame = cameras.get_frame(camera_id);
    cameras.stop_all();

    let frame = match (ready, frame) {
        (true, Some(frame)) => frame,
        _ => bail!("Camera {} produced no frame", camera_id),
    };
    let jpeg = encode_jpeg(&frame, opts.config.preview.jpeg_quality)?;
    std::fs::write(path, &jpeg).with_context(|| format!("writing {}", path))?;

    if opts.json {
        let out = serde_json::json!({
            "camera_id": camera_id,
            "path": path,
            "shape": frame.shape(),
            "bytes": jpeg.len(),
        });
        println!("{}", serde_json::to_string(&out)?);
    } else {
        println!("Saved {}x{} frame from {} to {}", frame.width, frame.height, camera_id, path);
    }
    Ok(())
}

/// Recording length in seconds; finite and non-negative
fn parse_duration(arg: &str) -> anyhow::Result<Duration> {
    let seconds: f64 = arg.parse().context("seconds must be a number")?;
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| anyhow!("seconds must be finite and not negative, got {}", arg))
}

fn cmd_record(
    opts: &Options,
    registry: &DeviceRegistry,
    backends: &Backends,
) -> anyhow::Result<()> {
    let length = parse_duration(
        opts.args
            .first()
            .ok_or_else(|| anyhow!("Usage: eyerig-cli record <seconds> [ids...]"))?,
    )?;
    let cameras = build_manager(opts, registry, backends);
    let ids: Vec<String> = if opts.args.len() > 1 {
        opts.args[1..].to_vec()
    } else {
        cameras.camera_ids()
    };
    let stop = StopSignal::new();
    install_interrupt(&stop)?;

    for id in &ids {
        cameras.get_config(id)?;
        cameras.ensure_started(id);
    }
    if !wait_for_frames(&cameras, &ids, &stop) {
        cameras.stop_all();
        bail!("Not every camera produced a frame; nothing recorded");
    }

    let recordings = RecordingManager::new(cameras.clone(), opts.config.recording.clone())?;
    let directory = recordings.start(Some(&ids))?;
    if !opts.json {
        println!("Recording {:?} to {}", ids, directory.display());
    }

    stop.wait_timeout(length);
    recordings.stop();
    cameras.stop_all();

    if opts.json {
        let out = serde_json::json!({ "directory": directory, "cameras": ids });
        println!("{}", serde_json::to_string(&out)?);
    } else {
        println!("Saved recording in {}", directory.display());
    }
    Ok(())
}
