mod detect;
mod layout;
mod simulate;
mod wiring;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use organ_scan::sim::SimulatedLines;

use simulate::Script;
use wiring::Wiring;

#[derive(Parser)]
#[command(name = "organ-cli")]
#[command(about = "Organ console wiring checker and scan simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a console wiring
    Check {
        /// TOML wiring file (default: the firmware's built-in wiring)
        #[arg(long)]
        wiring: Option<PathBuf>,
    },
    /// Print the key number of every matrix cell
    Layout {
        #[arg(long)]
        wiring: Option<PathBuf>,
        /// Only show this device
        #[arg(long)]
        device: Option<String>,
    },
    /// Run a switch script through the scan loop and print the notes sent
    Simulate {
        /// TOML script file
        script: PathBuf,
        #[arg(long)]
        wiring: Option<PathBuf>,
        /// No progress bar
        #[arg(short, long)]
        quiet: bool,
    },
    /// Detect a connected Arduino Mega
    Detect,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Check { wiring } => {
            let wiring = Wiring::load(wiring.as_deref())?;
            let console = wiring.begin(&mut SimulatedLines::new())?;
            for (device, id) in wiring.devices.iter().zip(console.scanner.ids()) {
                let config = &device.config;
                println!(
                    "{} {:<14} {:<8} ch {}  {} strobes x {} senses, {} keys",
                    id,
                    device.name,
                    device.division,
                    device.division.channel(),
                    config.strobes.len(),
                    config.senses.len(),
                    config.cells().count()
                );
            }
            if let Some(t) = wiring.transpose {
                println!("transpose buttons on {} and {}", t.up, t.down);
            }
            println!("Wiring OK.");
        }
        Command::Layout { wiring, device } => {
            let wiring = Wiring::load(wiring.as_deref())?;
            if let Some(name) = &device {
                if wiring.find(name).is_none() {
                    bail!("no device named `{}`", name);
                }
            }
            print!("{}", layout::render(&wiring, device.as_deref()));
        }
        Command::Simulate {
            script,
            wiring,
            quiet,
        } => {
            let wiring = Wiring::load(wiring.as_deref())?;
            let script = Script::load(&script)?;

            let pb = if quiet {
                None
            } else {
                let pb = ProgressBar::new(script.frames());
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} scans")?
                        .progress_chars("=> "),
                );
                pb.set_message("Scanning");
                Some(pb)
            };

            let events = simulate::run(&wiring, &script, pb.as_ref())?;
            if let Some(pb) = &pb {
                pb.finish_with_message("Scanned");
            }

            for event in &events {
                println!("{}", event);
            }
            println!("{} events", events.len());
        }
        Command::Detect => {
            let boards = detect::find_boards()?;
            if boards.is_empty() {
                println!("No Arduino Mega detected.");
                println!("Check the USB cable; the console enumerates as a serial device.");
            }
            for board in boards {
                println!(
                    "Arduino Mega 2560 on bus {:03} device {:03} ({:04x}:{:04x})",
                    board.bus, board.address, board.vendor_id, board.product_id
                );
            }
        }
    }

    Ok(())
}
