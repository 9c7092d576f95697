//! The keyed colour sketch store and its on-disk artifact.
//!
//! Artifact layout (all bincode, little endian, fixed-width integers):
//!
//! ```text
//! StoreHeader { magic: b"THOR", version, sketch_length, count, digest }
//! body: Vec<(id, Vec<[r, g, b, a]>)>   sorted by id
//! ```
//!
//! `digest` is the SHA-256 of the body bytes. The header has a fixed size so
//! [`ColourSketchStore::read_sketch_length`] can answer without touching the
//! body.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use log::{debug, info, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::colour::{encode_raw, Colour, ColourSketch, Notation};
use crate::error::{Result, ThorError};
use crate::raw_sketch::RawSketch;

/// Reserved identifier of the "no data" sketch.
pub const PADDING_KEY: &str = "padding";

const MAGIC: [u8; 4] = *b"THOR";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreHeader {
    magic: [u8; 4],
    version: u32,
    sketch_length: u64,
    count: u64,
    digest: [u8; 32],
}

type StoreBody = Vec<(String, Vec<[u8; 4]>)>;

#[derive(Debug, Default, Clone)]
pub struct ColourSketchStore {
    sketches: FxHashMap<String, ColourSketch>,
    sketch_length: Option<usize>,
}

impl ColourSketchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode raw sketches in parallel and collect them into a new store.
    ///
    /// Every sketch is encoded before anything is inserted; inserts then run
    /// on this thread in input order and the first failure is returned.
    pub fn from_raw(raw: Vec<RawSketch>) -> Result<Self> {
        let total = raw.len();
        let encoded: Vec<Result<ColourSketch>> = raw
            .into_par_iter()
            .map(|sketch| {
                let colours = encode_raw(&sketch.id, &sketch.values)?;
                ColourSketch::from_colours(sketch.id, colours)
            })
            .collect();

        let failed = encoded.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!("{} of {} sketches could not be coloured", failed, total);
        }

        let mut store = Self::new();
        for sketch in encoded {
            store.insert(sketch?)?;
        }
        debug!("Coloured {} sketches", store.len());
        Ok(store)
    }

    pub fn insert(&mut self, sketch: ColourSketch) -> Result<()> {
        if self.sketches.contains_key(sketch.id()) {
            return Err(ThorError::DuplicateKey(sketch.id().to_string()));
        }
        match self.sketch_length {
            Some(expected) if expected != sketch.len() => {
                return Err(ThorError::LengthMismatch {
                    id: sketch.id().to_string(),
                    expected,
                    found: sketch.len(),
                });
            }
            Some(_) => {}
            None => self.sketch_length = Some(sketch.len()),
        }
        self.sketches.insert(sketch.id().to_string(), sketch);
        Ok(())
    }

    /// Add the reserved padding sketch: `sketch_length` copies of the colour
    /// for 0.
    pub fn seed_padding(&mut self) -> Result<()> {
        let length = self.sketch_length()?;
        let padding = ColourSketch::from_colours(PADDING_KEY, vec![Colour::from_u32(0); length])?;
        self.insert(padding)
    }

    pub fn get(&self, id: &str) -> Option<&ColourSketch> {
        self.sketches.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sketches.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sketches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sketches.is_empty()
    }

    /// Element count shared by every sketch in the store.
    pub fn sketch_length(&self) -> Result<usize> {
        self.sketch_length.ok_or(ThorError::EmptyStore)
    }

    /// Identifiers in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.sketches.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Write the whole store to `path`, replacing any existing file.
    pub fn dump(&self, path: &Path) -> Result<()> {
        let body: StoreBody = self
            .ids()
            .into_iter()
            .map(|id| {
                let colours = self.sketches[id].colours().iter().map(|c| c.to_bytes()).collect();
                (id.to_string(), colours)
            })
            .collect();
        let body = bincode::serialize(&body)?;

        let header = StoreHeader {
            magic: MAGIC,
            version: FORMAT_VERSION,
            sketch_length: self.sketch_length.unwrap_or(0) as u64,
            count: self.sketches.len() as u64,
            digest: Sha256::digest(&body).into(),
        };

        let file = File::create(path).map_err(|e| ThorError::input(path, e))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &header)?;
        writer.write_all(&body)?;
        writer.flush()?;

        info!("Saved {} colour sketches to {:?}", self.sketches.len(), path);
        Ok(())
    }

    fn read_header<R: Read>(reader: &mut R, path: &Path) -> Result<StoreHeader> {
        let header: StoreHeader = bincode::deserialize_from(reader).map_err(|e| {
            ThorError::Format(format!("{}: not a colour sketch store ({})", path.display(), e))
        })?;
        if header.magic != MAGIC {
            return Err(ThorError::Format(format!(
                "{}: not a colour sketch store (bad magic)",
                path.display()
            )));
        }
        if header.version != FORMAT_VERSION {
            return Err(ThorError::Format(format!(
                "{}: unsupported colour sketch store version {}",
                path.display(),
                header.version
            )));
        }
        Ok(header)
    }

    /// Sketch length recorded in a store artifact, read from the header only.
    pub fn read_sketch_length(path: &Path) -> Result<usize> {
        let file = File::open(path).map_err(|e| ThorError::input(path, e))?;
        let header = Self::read_header(&mut BufReader::new(file), path)?;
        Ok(header.sketch_length as usize)
    }

    /// Replace the contents of this store with the artifact at `path`.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|e| ThorError::input(path, e))?;
        let mut reader = BufReader::new(file);
        let header = Self::read_header(&mut reader, path)?;

        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|e| ThorError::input(path, e))?;
        let corrupt = |what: String| ThorError::Format(format!("{}: {}", path.display(), what));

        let digest: [u8; 32] = Sha256::digest(&body).into();
        if digest != header.digest {
            return Err(corrupt("checksum mismatch, store file is corrupt".to_string()));
        }
        let entries: StoreBody =
            bincode::deserialize(&body).map_err(|e| corrupt(format!("undecodable body ({})", e)))?;
        if entries.len() as u64 != header.count {
            return Err(corrupt(format!(
                "header lists {} sketches, found {}",
                header.count,
                entries.len()
            )));
        }

        let mut loaded = Self::new();
        for (id, colours) in entries {
            if colours.len() as u64 != header.sketch_length {
                return Err(corrupt(format!(
                    "sketch `{}` has length {}, header says {}",
                    id,
                    colours.len(),
                    header.sketch_length
                )));
            }
            let colours = colours.into_iter().map(Colour::from_bytes).collect();
            let sketch = ColourSketch::from_colours(id, colours)
                .map_err(|e| corrupt(e.to_string()))?;
            loaded.insert(sketch).map_err(|e| corrupt(e.to_string()))?;
        }

        debug!(
            "Loaded {} colour sketches of length {} from {:?}",
            loaded.len(),
            header.sketch_length,
            path
        );
        *self = loaded;
        Ok(())
    }

    /// Plain text export: `id,colour,colour,...` per line, sorted by id.
    pub fn write_csv(&self, path: &Path, notation: Notation) -> Result<()> {
        let file = File::create(path).map_err(|e| ThorError::input(path, e))?;
        let mut writer = BufWriter::new(file);
        for id in self.ids() {
            writeln!(writer, "{},{}", id, self.sketches[id].csv_line(notation))?;
        }
        writer.flush()?;
        info!("Colour sketches written as text to {:?}", path);
        Ok(())
    }
}
