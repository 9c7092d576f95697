//! The `colour` and `hammer` workflows.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::canvas::Canvas;
use crate::colour::{ColourSketch, Notation};
use crate::error::{Result, ThorError};
use crate::otu_table::{OtuTable, TableFormat, TopEntry};
use crate::raw_sketch::collect_sketch_dir;
use crate::store::ColourSketchStore;

pub const STORE_SUFFIX: &str = "-coloursketches.thor";
pub const CSV_SUFFIX: &str = "-coloursketches.csv";

/// Settings for building a colour sketch store.
#[derive(Debug, Clone)]
pub struct ColourConfig {
    pub sketch_dir: PathBuf,
    pub recursive: bool,
    pub out_prefix: PathBuf,
    /// Also write the store as text in this notation.
    pub csv: Option<Notation>,
}

/// Settings for rendering OTU tables.
#[derive(Debug, Clone)]
pub struct HammerConfig {
    pub out_prefix: PathBuf,
    /// Rows per image; defaults to the sketch length.
    pub top_n: Option<usize>,
    /// Fill short images with padding rows instead of cropping them.
    pub pad: bool,
    /// Replace each row's alpha channel with the OTU's relative abundance.
    pub alpha_abundance: bool,
}

/// `prefix` with `suffix` appended to its final component.
pub fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Make a sample name safe to use inside a file name.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn ensure_parent_dir(prefix: &Path) -> Result<()> {
    if let Some(parent) = prefix.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| ThorError::input(parent, e))?;
        }
    }
    Ok(())
}

/// Colour every sketch in `config.sketch_dir` and dump the store.
/// Returns the store file written.
pub fn colour_sketches(config: &ColourConfig) -> Result<PathBuf> {
    info!("Reading sketches from {:?}", config.sketch_dir);
    let raw = collect_sketch_dir(&config.sketch_dir, config.recursive)?;
    if raw.is_empty() {
        return Err(ThorError::Format(format!(
            "need at least 1 sketch, none found in {}",
            config.sketch_dir.display()
        )));
    }

    info!("Colouring {} sketches", raw.len());
    let mut store = ColourSketchStore::from_raw(raw)?;
    store.seed_padding()?;

    ensure_parent_dir(&config.out_prefix)?;
    if let Some(notation) = config.csv {
        store.write_csv(&with_suffix(&config.out_prefix, CSV_SUFFIX), notation)?;
    }
    let store_path = with_suffix(&config.out_prefix, STORE_SUFFIX);
    store.dump(&store_path)?;
    Ok(store_path)
}

fn alpha_for(abundance: u64, max: u64) -> u8 {
    if max == 0 {
        return 0;
    }
    (255.0 * abundance as f64 / max as f64).round() as u8
}

/// Draw one sample: a row per top-N slot, padding rows where there is no data.
fn render_sample(
    side: u32,
    rows: &[Option<&ColourSketch>],
    window: &[TopEntry],
    alpha_abundance: bool,
) -> Result<Canvas> {
    let mut canvas = Canvas::new(side, rows.len())?;
    let max = window.iter().map(TopEntry::abundance).max().unwrap_or(0);
    for (row, entry) in rows.iter().zip(window) {
        match row {
            Some(sketch) if alpha_abundance => {
                let alpha = alpha_for(entry.abundance(), max);
                canvas.draw_row(&sketch.with_alpha(alpha).pixels())?
            }
            Some(sketch) => canvas.draw_row(&sketch.pixels())?,
            None => canvas.draw_padding_row()?,
        }
    }
    Ok(canvas)
}

/// Output image paths already handed out, mapped to the sample that owns each.
type ClaimedPaths = FxHashMap<PathBuf, String>;

/// Image paths for every sample of a table, in sample order. Fails before
/// anything is written if two samples would share a file.
fn plan_image_paths(
    table_path: &Path,
    sample_names: &[String],
    out_prefix: &Path,
    claimed: &mut ClaimedPaths,
) -> Result<Vec<PathBuf>> {
    let stem = table_path
        .file_stem()
        .map(|s| sanitize_name(&s.to_string_lossy()))
        .unwrap_or_else(|| "table".to_string());

    let mut paths = Vec::with_capacity(sample_names.len());
    for sample in sample_names {
        let path = with_suffix(out_prefix, &format!("-{}-{}.png", stem, sanitize_name(sample)));
        let owner = format!("sample `{}` of {}", sample, table_path.display());
        if let Some(previous) = claimed.get(&path) {
            return Err(ThorError::Format(format!(
                "{} and {} would both be written to {}",
                previous,
                owner,
                path.display()
            )));
        }
        claimed.insert(path.clone(), owner);
        paths.push(path);
    }
    Ok(paths)
}

/// Render every sample of one QIIME table into its own PNG.
/// Returns the image paths in sample order.
pub fn hammer_table(
    table_path: &Path,
    store: &ColourSketchStore,
    config: &HammerConfig,
) -> Result<Vec<PathBuf>> {
    render_table(table_path, store, config, &mut ClaimedPaths::default())
}

fn render_table(
    table_path: &Path,
    store: &ColourSketchStore,
    config: &HammerConfig,
    claimed: &mut ClaimedPaths,
) -> Result<Vec<PathBuf>> {
    let sketch_length = store.sketch_length()?;
    let side = u32::try_from(sketch_length).map_err(|_| {
        ThorError::Format(format!("sketch length {} is too large for an image", sketch_length))
    })?;
    let wanted = config.top_n.unwrap_or(sketch_length);
    if wanted > sketch_length {
        return Err(ThorError::TooManyRows { rows: wanted, side });
    }

    let mut table = OtuTable::open(table_path, TableFormat::Qiime)?;
    let paths = plan_image_paths(table_path, table.sample_names(), &config.out_prefix, claimed)?;

    let n = wanted.min(table.total_otus());
    if n < wanted {
        warn!(
            "{:?} only holds {} genera, images will have {} rows of data",
            table_path,
            table.total_otus(),
            n
        );
    }
    table.keep_top_n(n)?;
    let rows = table.colour_top_n(store)?;

    let table = &table;
    table
        .sample_names()
        .par_iter()
        .zip(rows.par_iter())
        .zip(paths.par_iter())
        .enumerate()
        .try_for_each(|(i, ((sample, sample_rows), path))| {
            let window = table.top_n(i)?;
            render_sample(side, sample_rows, window, config.alpha_abundance)
                .and_then(|canvas| canvas.save(path, config.pad))
                .map_err(|e| e.context(format!("sample {}", sample)))?;
            debug!("Wrote {:?}", path);
            Ok::<(), ThorError>(())
        })?;

    info!("Rendered {} images from {:?}", paths.len(), table_path);
    Ok(paths)
}

/// Load the store once and render every table.
pub fn hammer(
    tables: &[PathBuf],
    store_path: &Path,
    config: &HammerConfig,
) -> Result<Vec<PathBuf>> {
    for table in tables {
        if !table.is_file() {
            return Err(ThorError::input(
                table,
                std::io::Error::new(std::io::ErrorKind::NotFound, "OTU table does not exist"),
            ));
        }
    }

    info!("Loading colour sketches from {:?}", store_path);
    let mut store = ColourSketchStore::new();
    store.load(store_path)?;
    info!(
        "Loaded {} colour sketches of length {}",
        store.len(),
        store.sketch_length()?
    );

    ensure_parent_dir(&config.out_prefix)?;

    // image names are shared across tables, so collisions are checked over the whole run
    let mut claimed = ClaimedPaths::default();
    let mut images = Vec::new();
    for table in tables {
        let written = render_table(table, &store, config, &mut claimed)
            .map_err(|e| e.context(format!("OTU table {}", table.display())))?;
        images.extend(written);
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::PAD_COLOUR;
    use crate::colour::Colour;
    use image::Rgba;

    #[test]
    fn file_names() {
        assert_eq!(with_suffix(Path::new("out/thor"), ".png"), PathBuf::from("out/thor.png"));
        assert_eq!(sanitize_name("sample 1/a"), "sample_1_a");
        assert_eq!(sanitize_name("S-1.x_y"), "S-1.x_y");
    }

    #[test]
    fn colliding_sample_names_are_rejected() {
        let mut claimed = ClaimedPaths::default();
        let samples = vec!["s 1".to_string(), "s_1".to_string()];
        let err = plan_image_paths(Path::new("t.txt"), &samples, Path::new("img"), &mut claimed)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("`s 1`"), "{message}");
        assert!(message.contains("`s_1`"), "{message}");
    }

    #[test]
    fn colliding_tables_are_rejected() {
        let mut claimed = ClaimedPaths::default();
        let samples = vec!["gut".to_string()];
        let first =
            plan_image_paths(Path::new("run1/table.txt"), &samples, Path::new("img"), &mut claimed)
                .unwrap();
        assert_eq!(first, vec![PathBuf::from("img-table-gut.png")]);
        let err =
            plan_image_paths(Path::new("run2/table.txt"), &samples, Path::new("img"), &mut claimed)
                .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("run1"), "{message}");
        assert!(message.contains("run2"), "{message}");
    }

    #[test]
    fn alpha_scales_to_window_maximum() {
        assert_eq!(alpha_for(10, 10), 255);
        assert_eq!(alpha_for(5, 10), 128);
        assert_eq!(alpha_for(0, 0), 0);
    }

    #[test]
    fn render_sample_pads_absent_rows() {
        let a = ColourSketch::new("A", &[0xFF00_0001, 2, 3]).unwrap();
        let rows = vec![Some(&a), None];
        let window = vec![
            TopEntry::Otu { name: "A".into(), abundance: 4 },
            TopEntry::Padding,
        ];
        let image = render_sample(3, &rows, &window, false).unwrap().finish(true).unwrap();
        assert_eq!(*image.get_pixel(0, 0), Colour::from_u32(0xFF00_0001).to_pixel());
        assert_eq!(*image.get_pixel(1, 1), PAD_COLOUR);
        assert_eq!(*image.get_pixel(2, 2), PAD_COLOUR);

        let image = render_sample(3, &rows, &window, true).unwrap().finish(false).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(*image.get_pixel(1, 0), Rgba([2, 0, 0, 255]));
    }
}
