//! Reading raw (uncoloured) sketch files produced by an external sketcher.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Result, ThorError};

pub const SKETCH_EXTENSION: &str = "sketch";

/// A sketch as handed over by the sketcher: one unsigned integer per element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSketch {
    pub id: String,
    pub values: Vec<u64>,
}

/// The genus identifier for a sketch file: its file name minus `.sketch`.
pub fn sketch_id_from_path(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.strip_suffix(".sketch") {
        Some(stem) => stem.to_string(),
        None => name,
    }
}

/// Read one sketch file: unsigned integers separated by whitespace or commas,
/// `#` lines are comments.
pub fn read_sketch_file(path: &Path) -> Result<RawSketch> {
    let file = File::open(path).map_err(|e| ThorError::input(path, e))?;
    let reader = BufReader::new(file);
    let mut values = Vec::new();

    for line in reader.lines() {
        let line = line.map_err(|e| ThorError::input(path, e))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        for token in line.split(|c: char| c == ',' || c.is_whitespace()) {
            if token.is_empty() {
                continue;
            }
            let value = token.parse::<u64>().map_err(|_| {
                ThorError::Format(format!(
                    "{}: `{}` is not an unsigned integer",
                    path.display(),
                    token
                ))
            })?;
            values.push(value);
        }
    }

    if values.is_empty() {
        return Err(ThorError::Format(format!(
            "{}: no sketch values found",
            path.display()
        )));
    }

    Ok(RawSketch {
        id: sketch_id_from_path(path),
        values,
    })
}

fn find_sketch_files(dir: &Path, recursive: bool, found: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| ThorError::input(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| ThorError::input(dir, e))?.path();
        if path.is_dir() {
            if recursive {
                find_sketch_files(&path, recursive, found)?;
            }
        } else if path.extension().is_some_and(|ext| ext == SKETCH_EXTENSION) {
            found.push(path);
        }
    }
    Ok(())
}

/// Read every `*.sketch` file under `dir`, ordered by path.
pub fn collect_sketch_dir(dir: &Path, recursive: bool) -> Result<Vec<RawSketch>> {
    let mut paths = Vec::new();
    find_sketch_files(dir, recursive, &mut paths)?;
    paths.sort();
    debug!("Found {} sketch files in {:?}", paths.len(), dir);
    paths.iter().map(|p| read_sketch_file(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_drop_directory_and_extension() {
        assert_eq!(sketch_id_from_path(Path::new("refs/Escherichia.sketch")), "Escherichia");
        assert_eq!(sketch_id_from_path(Path::new("Bacillus")), "Bacillus");
    }

    #[test]
    fn reads_mixed_separators_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Vibrio.sketch");
        fs::write(&path, "# sketch size 5\n1, 2 3\n4294967296\t0\n").unwrap();
        let raw = read_sketch_file(&path).unwrap();
        assert_eq!(raw.id, "Vibrio");
        assert_eq!(raw.values, vec![1, 2, 3, 1 << 32, 0]);
    }

    #[test]
    fn rejects_bad_tokens_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.sketch");
        fs::write(&bad, "1 2 -3\n").unwrap();
        assert!(matches!(read_sketch_file(&bad), Err(ThorError::Format(_))));

        let empty = dir.path().join("empty.sketch");
        fs::write(&empty, "# nothing\n").unwrap();
        assert!(matches!(read_sketch_file(&empty), Err(ThorError::Format(_))));

        assert!(matches!(
            read_sketch_file(&dir.path().join("missing.sketch")),
            Err(ThorError::Input { .. })
        ));
    }

    #[test]
    fn directory_walk_honours_recursion() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.sketch"), "1 2").unwrap();
        fs::write(dir.path().join("a.sketch"), "3 4").unwrap();
        fs::write(dir.path().join("notes.txt"), "not a sketch").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/c.sketch"), "5 6").unwrap();

        let flat = collect_sketch_dir(dir.path(), false).unwrap();
        let ids: Vec<_> = flat.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let deep = collect_sketch_dir(dir.path(), true).unwrap();
        assert_eq!(deep.len(), 3);
    }
}
