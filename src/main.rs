use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;

use thor::colour::Notation;
use thor::pipeline::{colour_sketches, hammer, ColourConfig, HammerConfig};

#[derive(Parser)]
#[command(name = "thor")]
#[command(about = "Transforming Hashed OTUs to RGB.", long_about = None)]
struct Args {
    /// Directory and basename for the output file(s).
    #[arg(short = 'o', long = "out", value_name = "PREFIX", default_value = "./thor", global = true)]
    out: PathBuf,

    // Threading
    /// Number of threads to use for parallel operations.
    #[arg(short = 't', long = "threads", value_name = "N", global = true)]
    threads: Option<usize>,

    // Logging
    /// Verbosity level (0 = error, 1 = info, 2 = debug).
    #[arg(short = 'v', long = "verbose", value_name = "N", default_value_t = 1, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Colour a reference set of sketches.
    Colour {
        /// The directory containing the sketches to colour.
        #[arg(short = 'd', long = "sketch-dir", value_name = "DIR", default_value = "./")]
        sketch_dir: PathBuf,

        /// Recursively search the sketch directory.
        #[arg(long = "recursive")]
        recursive: bool,

        /// Also write the colour sketches to a plain text csv file.
        #[arg(long = "store-csv")]
        store_csv: bool,

        /// Write the csv colours as rgba(r,g,b,a) instead of hex.
        #[arg(long = "rgba", requires = "store_csv")]
        rgba: bool,
    },

    /// Hammer OTU tables into images.
    Hammer {
        /// Input OTU tables (QIIME format).
        #[arg(short = 'i', long = "otu-tables", value_name = "FILE", num_args = 1.., required = true)]
        otu_tables: Vec<PathBuf>,

        /// The reference colour sketches (from `thor colour`).
        #[arg(short = 'c', long = "colour-sketches", value_name = "FILE")]
        colour_sketches: PathBuf,

        /// Number of most abundant OTUs per image (default: the sketch length).
        #[arg(short = 'n', long = "top-n", value_name = "N")]
        top_n: Option<usize>,

        /// Crop images with fewer OTUs than the sketch length instead of padding them.
        #[arg(long = "no-padding")]
        no_padding: bool,

        /// Replace the alpha channel of each row with the OTU's relative abundance.
        #[arg(long = "alpha-abundance")]
        alpha_abundance: bool,
    },
}

fn main() {
    let args = Args::parse();

    // Initialize logger based on verbosity
    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    if let Some(threads) = args.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
            error!("Could not set up {} threads: {}", threads, e);
            std::process::exit(1);
        }
    }

    info!("thor (version {})", env!("CARGO_PKG_VERSION"));

    let result = match args.command {
        Command::Colour {
            sketch_dir,
            recursive,
            store_csv,
            rgba,
        } => {
            info!("Starting the colour subcommand...");
            let config = ColourConfig {
                sketch_dir,
                recursive,
                out_prefix: args.out,
                csv: store_csv.then_some(if rgba { Notation::Rgba } else { Notation::Hex }),
            };
            colour_sketches(&config).map(|path| info!("Colour sketches saved to {:?}", path))
        }
        Command::Hammer {
            otu_tables,
            colour_sketches,
            top_n,
            no_padding,
            alpha_abundance,
        } => {
            info!("Starting the hammer subcommand...");
            let config = HammerConfig {
                out_prefix: args.out,
                top_n,
                pad: !no_padding,
                alpha_abundance,
            };
            hammer(&otu_tables, &colour_sketches, &config)
                .map(|images| info!("Wrote {} images", images.len()))
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }

    info!("Done.");
}
