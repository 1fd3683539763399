use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use levelsmith::directory::{BaseLayout, Directory, ExtendedLayout, TableLayout};
use levelsmith::image::Image;
use levelsmith::patcher::Patcher;
use levelsmith::workspace;

#[derive(Parser)]
#[command(name = "levelsmith", about = "Extract and patch cartridge level data")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LayoutArg {
    Base,
    Extended,
}

impl LayoutArg {
    fn build(self) -> Box<dyn TableLayout> {
        match self {
            LayoutArg::Base => Box::new(BaseLayout),
            LayoutArg::Extended => Box::new(ExtendedLayout),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Extract every level into editable text files
    Extract {
        /// Cartridge image to read
        #[arg(long)]
        rom: PathBuf,

        /// Which table layout the image uses
        #[arg(long, value_enum)]
        layout: LayoutArg,

        /// Output directory for the text files and manifest
        #[arg(long)]
        out: PathBuf,

        /// Optional progress sidecar file
        #[arg(long)]
        progress: Option<PathBuf>,
    },

    /// Write edited text files back into the image
    Patch {
        /// Cartridge image to modify
        #[arg(long)]
        rom: PathBuf,

        /// Which table layout the image uses
        #[arg(long, value_enum)]
        layout: LayoutArg,

        /// Directory holding the edited text files
        #[arg(long)]
        src: PathBuf,

        /// Levels to patch, comma separated (default: all with files)
        #[arg(long, value_delimiter = ',')]
        levels: Vec<usize>,

        /// Append changed levels at the image end instead of rewriting in
        /// place (the extended layout always does this)
        #[arg(long)]
        relocate: bool,

        /// Write the patched image here instead of back over --rom
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> levelsmith::Result<()> {
    match cli.command {
        Command::Extract {
            rom,
            layout,
            out,
            progress,
        } => {
            let image = Image::open(&rom)?;
            println!("Image: {:?} ({} bytes)", rom, image.len());

            let directory = Directory::read(&image, layout.build())?;
            println!(
                "Layout: {} ({} levels)",
                directory.layout().name(),
                directory.level_count()
            );

            let manifest = workspace::export_all(&image, &directory, &out, progress.as_deref())?;
            println!("Extracted {} level(s) to {:?}", manifest.len(), out);
        }

        Command::Patch {
            rom,
            layout,
            src,
            levels,
            relocate,
            out,
        } => {
            let mut image = Image::open(&rom)?;
            let mut directory = Directory::read(&image, layout.build())?;

            let targets: Vec<usize> = if levels.is_empty() {
                (0..directory.level_count()).collect()
            } else {
                levels
            };

            let mut patched = 0;
            for level in targets {
                // A bad text file stops this level only, not the batch.
                let patch = match workspace::load_level_patch(&src, &directory, level) {
                    Ok(patch) => patch,
                    Err(e) => {
                        eprintln!("Level {:02}: {}", level, e);
                        continue;
                    }
                };
                if patch.is_empty() {
                    continue;
                }

                let mut patcher = Patcher::new(&mut image, &mut directory);
                match patcher.apply_level_patch(level, &patch, relocate) {
                    Ok(true) => {
                        println!("Patched level {:02}", level);
                        patched += 1;
                    }
                    Ok(false) => println!("Level {:02} unchanged", level),
                    Err(e) => eprintln!("Level {:02}: {}", level, e),
                }
            }

            match out {
                Some(path) => image.save_as(&path)?,
                None => image.save()?,
            }
            println!("{} level(s) patched", patched);
        }
    }

    Ok(())
}
