//! Render a JSON catalog onto the detectors of a session and write FITS
//! composites.
//!
//! Prints one line per object with the detectors it illuminated, `None`
//! when it fell between or outside them.

use std::path::PathBuf;

use clap::Parser;
use imsim::{load_catalog, FitsImageWriter, SessionConfig};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Composite a catalog onto a multi-detector focal plane")]
struct Args {
    /// Session configuration (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Object catalog (JSON array)
    #[arg(long)]
    catalog: PathBuf,

    /// Prefix for output files, `<root>_<detector>_<band>.fits`
    #[arg(long)]
    output_root: Option<String>,

    /// Overrides the configured seed
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = SessionConfig::load(&args.config)?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    let mut compositor = config.build()?;
    let objects = load_catalog(&args.catalog, &config.observation())?;

    let pb = ProgressBar::new(objects.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) ETA: {eta}")?
            .progress_chars("█▉▊▋▌▍▎▏ "),
    );
    pb.set_message("Drawing objects");

    for object in &objects {
        let label = compositor.draw_object(object)?;
        pb.println(format!("{} {}", object.id(), label.as_deref().unwrap_or("None")));
        pb.inc(1);
    }
    pb.finish_with_message(format!("Drew {} objects", objects.len()));

    let written = compositor.write_images(args.output_root.as_deref(), &FitsImageWriter)?;
    info!("Output root: {}", args.output_root.as_deref().unwrap_or("(none)"));
    println!("Wrote {} image(s)", written.len());
    Ok(())
}
