//! OTU abundance tables: parsing, top-N reduction and colour resolution.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use log::{debug, info};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::colour::ColourSketch;
use crate::error::{Result, ThorError};
use crate::store::ColourSketchStore;

const COMMENT_PREFIX: char = '#';
const HEADER_PREFIX: &str = "#OTU";
const GENUS_MARKER: &str = "g__";

/// Supported abundance table dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// QIIME "classic" tab separated OTU table.
    Qiime,
}

impl FromStr for TableFormat {
    type Err = ThorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "qiime" => Ok(TableFormat::Qiime),
            _ => Err(ThorError::UnsupportedFormat(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Unparsed,
    Parsed,
    Reduced,
}

/// One slot of a sample's top-N window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopEntry {
    Otu { name: String, abundance: u64 },
    /// A slot the sample has no reads for.
    Padding,
}

impl TopEntry {
    pub fn abundance(&self) -> u64 {
        match self {
            TopEntry::Otu { abundance, .. } => *abundance,
            TopEntry::Padding => 0,
        }
    }
}

#[derive(Debug)]
pub struct OtuTable {
    format: TableFormat,
    state: TableState,
    comments: Vec<String>,
    // sample_names, sample_data and top_n share the same sample ordering
    sample_names: Vec<String>,
    sample_data: Vec<FxHashMap<String, u64>>,
    top_n: Vec<Vec<TopEntry>>,
    total_otus: usize,
}

/// Extract the genus from a `;` separated consensus lineage.
fn genus_of(lineage: &str) -> Option<&str> {
    lineage
        .split(';')
        .map(str::trim)
        .find_map(|rank| rank.strip_prefix(GENUS_MARKER))
        .map(str::trim)
        .filter(|genus| !genus.is_empty())
}

fn parse_count(field: &str, line_no: usize, sample: &str) -> Result<u64> {
    let field = field.trim();
    if let Ok(count) = field.parse::<u64>() {
        return Ok(count);
    }
    match field.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value < u64::MAX as f64 => {
            Ok(value as u64)
        }
        _ => Err(ThorError::Format(format!(
            "line {}: sample {}: `{}` is not a non-negative count",
            line_no, sample, field
        ))),
    }
}

/// Order a sample's OTUs by descending abundance, then ascending name, and
/// keep the first `n`.
fn rank_sample(counts: FxHashMap<String, u64>, n: usize) -> Vec<TopEntry> {
    let mut otus: Vec<(String, u64)> = counts.into_iter().collect();
    otus.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    otus.into_iter()
        .take(n)
        .map(|(name, abundance)| {
            if abundance == 0 {
                TopEntry::Padding
            } else {
                TopEntry::Otu { name, abundance }
            }
        })
        .collect()
}

impl OtuTable {
    pub fn new(format: TableFormat) -> Self {
        OtuTable {
            format,
            state: TableState::Unparsed,
            comments: Vec::new(),
            sample_names: Vec::new(),
            sample_data: Vec::new(),
            top_n: Vec::new(),
            total_otus: 0,
        }
    }

    /// Open and parse the table at `path`.
    pub fn open(path: &Path, format: TableFormat) -> Result<Self> {
        let file = File::open(path).map_err(|e| ThorError::input(path, e))?;
        let mut table = Self::new(format);
        table.ingest(BufReader::new(file)).map_err(|e| match e {
            ThorError::Format(msg) => ThorError::Format(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;
        info!(
            "Loaded OTU table {:?}: {} samples, {} genera",
            path,
            table.num_samples(),
            table.total_otus()
        );
        Ok(table)
    }

    pub fn ingest<R: BufRead>(&mut self, reader: R) -> Result<()> {
        if self.state != TableState::Unparsed {
            return Err(ThorError::AlreadyParsed);
        }
        let mut parsed = Self::new(self.format);
        match self.format {
            TableFormat::Qiime => parsed.read_qiime(reader)?,
        }
        parsed.state = TableState::Parsed;
        *self = parsed;
        Ok(())
    }

    fn read_qiime<R: BufRead>(&mut self, reader: R) -> Result<()> {
        let mut lines = reader.lines().enumerate();

        // comments, then the `#OTU` header naming the samples
        loop {
            let (idx, line) = lines
                .next()
                .ok_or_else(|| ThorError::Format("no header line found in QIIME OTU table".to_string()))?;
            let line = line.map_err(|e| ThorError::Format(format!("line {}: {}", idx + 1, e)))?;
            if line.starts_with(HEADER_PREFIX) {
                let columns: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
                if columns.len() < 3 {
                    return Err(ThorError::Format(format!(
                        "line {}: header must name at least one sample and a lineage column",
                        idx + 1
                    )));
                }
                self.sample_names = columns[1..columns.len() - 1]
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
                self.sample_data = vec![FxHashMap::default(); self.sample_names.len()];
                break;
            } else if line.starts_with(COMMENT_PREFIX) {
                self.comments.push(line);
            } else {
                return Err(ThorError::Format(format!(
                    "line {}: no comment or header lines found in QIIME OTU table",
                    idx + 1
                )));
            }
        }

        let num_samples = self.sample_names.len();
        let mut genera: FxHashSet<String> = FxHashSet::default();
        let mut skipped = 0usize;

        for (idx, line) in lines {
            let line = line.map_err(|e| ThorError::Format(format!("line {}: {}", idx + 1, e)))?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let line_no = idx + 1;
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < num_samples + 2 {
                return Err(ThorError::Format(format!(
                    "line {}: expected {} columns, found {}",
                    line_no,
                    num_samples + 2,
                    fields.len()
                )));
            }

            let lineage = fields[fields.len() - 1];
            let Some(genus) = genus_of(lineage) else {
                skipped += 1;
                continue;
            };

            for (i, field) in fields[1..=num_samples].iter().enumerate() {
                let sample = &self.sample_names[i];
                let count = parse_count(field, line_no, sample)?;
                let total = self.sample_data[i].entry(genus.to_string()).or_insert(0);
                *total = total.checked_add(count).ok_or_else(|| {
                    ThorError::Format(format!(
                        "line {}: sample {}: abundance of genus {} overflows",
                        line_no, sample, genus
                    ))
                })?;
            }
            genera.insert(genus.to_string());
        }

        self.total_otus = genera.len();
        debug!(
            "Read {} genera, skipped {} rows without a genus assignment",
            self.total_otus, skipped
        );
        Ok(())
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    pub fn format(&self) -> TableFormat {
        self.format
    }

    /// Comment lines in file order, without line terminators.
    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    pub fn comment_text(&self) -> String {
        self.comments.iter().map(|c| format!("{}\n", c)).collect()
    }

    pub fn num_samples(&self) -> usize {
        self.sample_names.len()
    }

    pub fn sample_name(&self, index: usize) -> Result<&str> {
        self.sample_names
            .get(index)
            .map(String::as_str)
            .ok_or(ThorError::SampleIndex {
                index,
                samples: self.sample_names.len(),
            })
    }

    pub fn sample_names(&self) -> &[String] {
        &self.sample_names
    }

    /// Number of distinct genera in the table.
    pub fn total_otus(&self) -> usize {
        self.total_otus
    }

    /// Abundance of `genus` in a sample, available until the table is reduced.
    pub fn abundance(&self, sample: usize, genus: &str) -> Option<u64> {
        self.sample_data.get(sample)?.get(genus).copied()
    }

    /// The reduced window of one sample, after [`OtuTable::keep_top_n`].
    pub fn top_n(&self, sample: usize) -> Result<&[TopEntry]> {
        if self.state != TableState::Reduced {
            return Err(ThorError::NotReduced);
        }
        self.top_n
            .get(sample)
            .map(Vec::as_slice)
            .ok_or(ThorError::SampleIndex {
                index: sample,
                samples: self.sample_names.len(),
            })
    }

    /// Reduce every sample to its `n` most abundant genera. Runs once.
    pub fn keep_top_n(&mut self, n: usize) -> Result<()> {
        match self.state {
            TableState::Unparsed => return Err(ThorError::NotParsed),
            TableState::Reduced => return Err(ThorError::AlreadyReduced),
            TableState::Parsed => {}
        }
        if n > self.total_otus {
            return Err(ThorError::InsufficientData {
                requested: n,
                available: self.total_otus,
            });
        }

        self.top_n = std::mem::take(&mut self.sample_data)
            .into_par_iter()
            .map(|counts| rank_sample(counts, n))
            .collect();
        self.state = TableState::Reduced;
        debug!("Kept top {} genera for {} samples", n, self.top_n.len());
        Ok(())
    }

    /// Resolve each sample's window against `store`. Padding slots are `None`
    /// and never looked up.
    pub fn colour_top_n<'s>(
        &self,
        store: &'s ColourSketchStore,
    ) -> Result<Vec<Vec<Option<&'s ColourSketch>>>> {
        if self.state != TableState::Reduced {
            return Err(ThorError::NotReduced);
        }
        self.sample_names
            .iter()
            .zip(&self.top_n)
            .map(|(sample, window)| {
                window
                    .iter()
                    .map(|entry| match entry {
                        TopEntry::Padding => Ok(None),
                        TopEntry::Otu { name, abundance } => store
                            .get(name)
                            .map(Some)
                            .ok_or_else(|| ThorError::Lookup {
                                sample: sample.clone(),
                                otu: name.clone(),
                                abundance: *abundance,
                            }),
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TABLE: &str = "\
# Constructed from biom file
#OTU ID\tsampleA\tsampleB\tConsensus Lineage
1\t10\t0\tk__Bacteria; p__Firmicutes; c__Bacilli; o__Bacillales; f__Bacillaceae; g__Bacillus; s__
2\t4\t7\tk__Bacteria; p__Proteobacteria; g__Escherichia
3\t4\t0\tk__Bacteria;p__Proteobacteria;g__Vibrio
4\t1\t1\tk__Bacteria; p__Firmicutes; g__
5\t2\t3\tk__Bacteria; p__Actinobacteria; g__Streptomyces
6\t3\t2\tk__Bacteria; p__Firmicutes; c__Bacilli; o__Bacillales; f__Bacillaceae; g__Bacillus
";

    fn parsed(text: &str) -> OtuTable {
        let mut table = OtuTable::new(TableFormat::Qiime);
        table.ingest(Cursor::new(text)).unwrap();
        table
    }

    fn names(window: &[TopEntry]) -> Vec<&str> {
        window
            .iter()
            .map(|e| match e {
                TopEntry::Otu { name, .. } => name.as_str(),
                TopEntry::Padding => "<pad>",
            })
            .collect()
    }

    #[test]
    fn parses_header_comments_and_genera() {
        let table = parsed(TABLE);
        assert_eq!(table.state(), TableState::Parsed);
        assert_eq!(table.comments(), ["# Constructed from biom file"]);
        assert_eq!(table.comment_text(), "# Constructed from biom file\n");
        assert_eq!(table.sample_names(), ["sampleA", "sampleB"]);
        assert_eq!(table.sample_name(1).unwrap(), "sampleB");
        assert!(matches!(table.sample_name(2), Err(ThorError::SampleIndex { index: 2, samples: 2 })));
        // the empty `g__` row is skipped and the two Bacillus rows are merged
        assert_eq!(table.total_otus(), 4);
        assert_eq!(table.abundance(0, "Bacillus"), Some(13));
        assert_eq!(table.abundance(1, "Escherichia"), Some(7));
        assert_eq!(table.abundance(0, "Firmicutes"), None);
    }

    #[test]
    fn format_names() {
        assert_eq!("qiime".parse::<TableFormat>().unwrap(), TableFormat::Qiime);
        assert!(matches!("biom".parse::<TableFormat>(), Err(ThorError::UnsupportedFormat(_))));
    }

    #[test]
    fn missing_header_is_rejected() {
        let mut table = OtuTable::new(TableFormat::Qiime);
        let err = table.ingest(Cursor::new("1\t2\tg__Foo\n")).unwrap_err();
        assert!(matches!(err, ThorError::Format(_)));

        let mut table = OtuTable::new(TableFormat::Qiime);
        assert!(table.ingest(Cursor::new("# only a comment\n")).is_err());
        assert_eq!(table.state(), TableState::Unparsed);
    }

    #[test]
    fn bad_counts_name_the_line_and_sample() {
        let mut table = OtuTable::new(TableFormat::Qiime);
        let text = "#OTU ID\ts1\ts2\tlineage\n1\t3\tmany\tg__Foo\n";
        match table.ingest(Cursor::new(text)) {
            Err(ThorError::Format(msg)) => {
                assert!(msg.contains("line 2"), "{msg}");
                assert!(msg.contains("s2"), "{msg}");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let mut table = OtuTable::new(TableFormat::Qiime);
        assert!(table.ingest(Cursor::new("#OTU ID\ts1\ts2\tlineage\n1\t3\tg__Foo\n")).is_err());
    }

    #[test]
    fn decimal_counts_are_accepted_when_integral() {
        let table = parsed("#OTU ID\ts1\tlineage\n1\t3.0\tg__Foo\n2\t0.0\tg__Bar\n");
        assert_eq!(table.abundance(0, "Foo"), Some(3));
        let mut table = OtuTable::new(TableFormat::Qiime);
        assert!(table.ingest(Cursor::new("#OTU ID\ts1\tlineage\n1\t2.5\tg__Foo\n")).is_err());
        let mut table = OtuTable::new(TableFormat::Qiime);
        let text = "#OTU ID\ts1\tlineage\n1\t18446744073709551616.0\tg__Foo\n";
        assert!(matches!(table.ingest(Cursor::new(text)), Err(ThorError::Format(_))));
    }

    #[test]
    fn merged_counts_that_overflow_are_rejected() {
        let mut table = OtuTable::new(TableFormat::Qiime);
        let text = format!(
            "#OTU ID\ts1\tlineage\n1\t{max}\tk__B; g__A\n2\t{max}\tk__B; g__A\n",
            max = u64::MAX
        );
        match table.ingest(Cursor::new(text)) {
            Err(ThorError::Format(msg)) => {
                assert!(msg.contains("line 3"), "{msg}");
                assert!(msg.contains("s1"), "{msg}");
                assert!(msg.contains("A"), "{msg}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(table.state(), TableState::Unparsed);
    }

    #[test]
    fn unreadable_lines_name_the_line() {
        let mut bytes = b"#OTU ID\ts1\tlineage\n1\t3\tg__Foo\n".to_vec();
        bytes.extend_from_slice(b"2\t\xff\xfe\tg__Bar\n");
        let mut table = OtuTable::new(TableFormat::Qiime);
        match table.ingest(Cursor::new(bytes)) {
            Err(ThorError::Format(msg)) => assert!(msg.contains("line 3"), "{msg}"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn keep_top_n_orders_truncates_and_runs_once() {
        let mut table = parsed(TABLE);
        table.keep_top_n(3).unwrap();
        assert_eq!(table.state(), TableState::Reduced);

        let a = table.top_n(0).unwrap();
        assert_eq!(names(a), ["Bacillus", "Escherichia", "Vibrio"]);
        assert_eq!(a.iter().map(TopEntry::abundance).collect::<Vec<_>>(), [13, 4, 4]);

        let b = table.top_n(1).unwrap();
        assert_eq!(names(b), ["Escherichia", "Streptomyces", "Bacillus"]);

        assert!(matches!(table.keep_top_n(3), Err(ThorError::AlreadyReduced)));
        // the sparse maps are gone
        assert_eq!(table.abundance(0, "Bacillus"), None);
    }

    #[test]
    fn keep_top_n_rejects_more_than_available() {
        let mut table = parsed(TABLE);
        assert!(matches!(
            table.keep_top_n(5),
            Err(ThorError::InsufficientData { requested: 5, available: 4 })
        ));
        assert_eq!(table.state(), TableState::Parsed);
        table.keep_top_n(4).unwrap();

        let mut unparsed = OtuTable::new(TableFormat::Qiime);
        assert!(matches!(unparsed.keep_top_n(0), Err(ThorError::NotParsed)));
    }

    #[test]
    fn zero_abundance_becomes_padding() {
        let mut table = parsed("#OTU ID\ts\tlineage\n1\t5\tg__A\n2\t3\tg__B\n3\t0\tg__C\n");
        table.keep_top_n(3).unwrap();
        let window = table.top_n(0).unwrap();
        assert_eq!(
            window,
            [
                TopEntry::Otu { name: "A".into(), abundance: 5 },
                TopEntry::Otu { name: "B".into(), abundance: 3 },
                TopEntry::Padding,
            ]
        );
    }

    #[test]
    fn ties_break_on_name() {
        let text = "#OTU ID\ts\tlineage\n1\t2\tg__Zeta\n2\t2\tg__Alpha\n3\t2\tg__Mu\n4\t9\tg__Top\n";
        for _ in 0..8 {
            let mut table = parsed(text);
            table.keep_top_n(4).unwrap();
            assert_eq!(names(table.top_n(0).unwrap()), ["Top", "Alpha", "Mu", "Zeta"]);
        }
    }

    #[test]
    fn colour_top_n_skips_padding_and_reports_missing() {
        let mut store = ColourSketchStore::new();
        store.insert(ColourSketch::new("A", &[1, 2, 3]).unwrap()).unwrap();
        store.insert(ColourSketch::new("B", &[4, 5, 6]).unwrap()).unwrap();

        // C has zero reads, so it is never looked up even though the store lacks it
        let mut table = parsed("#OTU ID\ts\tlineage\n1\t5\tg__A\n2\t3\tg__B\n3\t0\tg__C\n");
        assert!(matches!(table.colour_top_n(&store), Err(ThorError::NotReduced)));
        table.keep_top_n(3).unwrap();
        let rows = table.colour_top_n(&store).unwrap();
        assert_eq!(rows.len(), 1);
        let ids: Vec<Option<&str>> = rows[0].iter().map(|r| r.map(ColourSketch::id)).collect();
        assert_eq!(ids, [Some("A"), Some("B"), None]);

        let mut table = parsed("#OTU ID\ts\tlineage\n1\t5\tg__A\n2\t3\tg__Missing\n");
        table.keep_top_n(2).unwrap();
        match table.colour_top_n(&store) {
            Err(ThorError::Lookup { sample, otu, abundance }) => {
                assert_eq!((sample.as_str(), otu.as_str(), abundance), ("s", "Missing", 3));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
