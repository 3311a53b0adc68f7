mod asset_fs;
mod bootstrap;
mod command_runner;
mod data_loaders;
mod diagnostics;
mod display;
mod encoder;
mod error;
mod identity;
mod layout;
mod lockscreen;
mod logging;
mod ownership;
mod paths;
mod persist;
mod purger;
mod replicator;
mod temp_dirs;
mod utility;

#[cfg(test)]
mod test_support;

use std::{
	path::PathBuf,
	process::ExitCode,
	sync::Arc,
};

use clap::{Parser, Subcommand};

use crate::{
	data_loaders::config::AppConfig,
	encoder::{ClipEncoder, ClipRequest, FfmpegGifEncoder},
	lockscreen::LockscreenService,
	logging::{FileLog, Level, LogSink, StderrLog},
	temp_dirs::TempDirs,
};

pub const DEBUG_NAME: &str = "LOCKSCREEN";

/// Deploys an animated image to the Windows lock screen.
#[derive(Parser, Debug)]
#[command(name = "lockscreen-gif", version)]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
	/// Replicate an image over the lock-screen asset tree.
	Apply {
		image: PathBuf,
	},
	/// Delete the deployed resolution variants.
	Remove,
	/// Encode a video clip to GIF, optionally applying it.
	Convert(ConvertArgs),
}

#[derive(Parser, Debug, PartialEq)]
struct ConvertArgs {
	/// Input video.
	video: PathBuf,

	/// Clip start in seconds.
	#[arg(long)]
	start: f64,

	/// Clip end in seconds.
	#[arg(long)]
	end: f64,

	/// Frames per second (1-60); defaults to the configured value.
	#[arg(long)]
	fps: Option<f64>,

	/// Output width in pixels (16-7680); defaults to the configured value.
	#[arg(long)]
	width: Option<u32>,

	/// Apply the GIF to the lock screen instead of writing it beside the video.
	#[arg(long, default_value_t = false)]
	apply: bool,
}

fn open_log(config: &AppConfig) -> Arc<dyn LogSink> {
	let threshold = if config.debug {
		Level::Debug
	} else {
		Level::parse(&config.log_level).unwrap_or(Level::Info)
	};

	match FileLog::open(&paths::log_path(), threshold) {
		Ok(log) => Arc::new(log),
		Err(e) => {
			eprintln!("cannot open {}: {e}; logging to stderr", paths::log_path().display());
			Arc::new(StderrLog { threshold })
		}
	}
}

fn run(command: Command, config: &AppConfig, temps: &Arc<TempDirs>, log: Arc<dyn LogSink>) -> bool {
	match command {
		Command::Apply { image } => {
			let service = LockscreenService::system(config, Arc::clone(&log));
			service.set_current_image(Some(image));
			match service.try_apply() {
				Ok(report) => {
					println!(
						"applied: {} file(s) written, {} failed",
						report.written,
						report.failed.len()
					);
					true
				}
				Err(e) => {
					println!("apply failed: {e}");
					false
				}
			}
		}
		Command::Remove => {
			let service = LockscreenService::system(config, Arc::clone(&log));
			match service.remove() {
				Some(outcome) => {
					match serde_json::to_string(&outcome) {
						Ok(json) => println!("{json}"),
						Err(e) => error!(log, "[{}] Cannot serialize outcome: {}", DEBUG_NAME, e),
					}
					true
				}
				None => {
					println!("remove failed; see {}", paths::log_path().display());
					false
				}
			}
		}
		Command::Convert(ConvertArgs { video, start, end, fps, width, apply }) => {
			let settings = &config.settings.encoder;
			let request = ClipRequest {
				input: video.clone(),
				start,
				end,
				fps: fps.unwrap_or(settings.fps).clamp(1.0, 60.0),
				width: width.unwrap_or(settings.width).clamp(16, 7680),
			};
			let encoder = FfmpegGifEncoder::new(settings.ffmpeg.clone(), Arc::clone(temps), Arc::clone(&log));

			let mut shown = -1.0_f64;
			let encoded = encoder.encode(&request, &mut |pct| {
				if pct >= 100.0 || pct - shown >= 5.0 {
					eprint!("\rencoding {pct:5.1}%");
					shown = pct;
				}
			});
			eprintln!();

			let gif = match encoded {
				Ok(gif) => gif,
				Err(e) => {
					error!(log, "[{}][ENCODER] {}", DEBUG_NAME, e);
					println!("convert failed: {e}");
					return false;
				}
			};

			if apply {
				let service = LockscreenService::system(config, Arc::clone(&log));
				service.set_current_image(Some(gif));
				let applied = service.apply();
				println!("{}", if applied { "converted and applied" } else { "converted, but apply failed" });
				return applied;
			}

			let target = video.with_extension("gif");
			match std::fs::copy(&gif, &target) {
				Ok(_) => {
					println!("wrote {}", target.display());
					true
				}
				Err(e) => {
					println!("cannot write {}: {e}", target.display());
					false
				}
			}
		}
	}
}

fn main() -> ExitCode {
	let cli = Cli::parse();

	let bootstrap_log = StderrLog { threshold: Level::Warn };
	bootstrap::bootstrap(&bootstrap_log);

	let config_path = paths::config_path();
	let config = AppConfig::load(&config_path).unwrap_or_default();
	let log = open_log(&config);

	let hook_log = Arc::clone(&log);
	std::panic::set_hook(Box::new(move |panic_info| {
		error!(hook_log, "[{}] Panic: {}", DEBUG_NAME, panic_info);
	}));

	info!(log, "!---------- [{}] Starting ({:?}) ----------!", DEBUG_NAME, cli.command);
	info!(log, "[{}] Config loaded from {}", DEBUG_NAME, config_path.display());

	let temps = Arc::new(TempDirs::new(
		paths::temp_root(),
		config.settings.encoder.temp_prefix.clone(),
		Arc::clone(&log),
	));
	temps.cleanup();

	let ok = run(cli.command, &config, &temps, Arc::clone(&log));
	temps.cleanup();

	// Release the hook's handle so the file log drains before exit.
	drop(std::panic::take_hook());
	drop(temps);
	drop(log);

	if ok {
		ExitCode::SUCCESS
	} else {
		ExitCode::FAILURE
	}
}
