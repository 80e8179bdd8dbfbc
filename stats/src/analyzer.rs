use crate::{
    report::{
        FsImageReport,
        Stats,
    },
    selection::{
        ReportOptions,
        Selected,
    },
};
use eyre::{
    bail,
    Context as _,
    Result,
};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{
        BufRead,
        BufReader,
    },
    path::Path,
};

/// Turns an image file into a report. Runs on a blocking thread and may take minutes.
pub trait ImageAnalyzer: Send + Sync {
    fn analyze(&self, image: &Path) -> Result<FsImageReport>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum INodeKind {
    Directory,
    File,
    Symlink,
}

#[derive(Debug, Clone)]
pub struct INode<'a> {
    pub path: &'a str,
    pub kind: INodeKind,
    pub replication: u32,
    pub blocks: u64,
    pub file_size: u64,
    pub user: &'a str,
    pub group: &'a str,
}

/// Folds inodes into an [`FsImageReport`].
pub struct ReportBuilder<'o> {
    options: &'o ReportOptions,
    report: FsImageReport,
    inodes: u64,
}

impl<'o> ReportBuilder<'o> {
    pub fn new(options: &'o ReportOptions) -> Self {
        Self {
            options,
            report: FsImageReport {
                overall: Stats::new(Some(&options.bucket_bounds)),
                ..Default::default()
            },
            inodes: 0,
        }
    }

    pub fn inodes(&self) -> u64 {
        self.inodes
    }

    pub fn record(&mut self, inode: &INode<'_>) {
        let options = self.options;
        let bounds = |skip: bool| (!skip).then_some(options.bucket_bounds.as_slice());
        self.inodes += 1;

        apply(&mut self.report.overall, inode);
        apply(
            stats_for(&mut self.report.users, inode.user, bounds(options.skip_user_distribution)),
            inode,
        );
        apply(
            stats_for(&mut self.report.groups, inode.group, bounds(options.skip_group_distribution)),
            inode,
        );

        for selector in &options.paths {
            if let Some(selected) = selector.select(inode.path) {
                let stats = stats_for(
                    &mut self.report.paths,
                    selected.key(),
                    bounds(options.skip_path_distribution),
                );
                if matches!(selected, Selected::Descendant(_)) {
                    apply(stats, inode);
                }
            }
        }

        for (name, selectors) in &options.path_sets {
            let mut selected = selectors.iter().filter_map(|selector| selector.select(inode.path));
            let Some(first) = selected.next() else {
                continue;
            };
            let below = matches!(first, Selected::Descendant(_))
                || selected.any(|other| matches!(other, Selected::Descendant(_)));
            let stats = stats_for(
                &mut self.report.path_sets,
                name,
                bounds(options.skip_path_set_distribution),
            );
            // Overlapping paths of one set still count an inode once.
            if below {
                apply(stats, inode);
            }
        }
    }

    pub fn finish(self) -> FsImageReport {
        self.report
    }
}

fn stats_for<'m>(map: &'m mut BTreeMap<String, Stats>, key: &str, bounds: Option<&[u64]>) -> &'m mut Stats {
    map.entry(key.to_owned()).or_insert_with(|| Stats::new(bounds))
}

fn apply(stats: &mut Stats, inode: &INode<'_>) {
    match inode.kind {
        INodeKind::Directory => stats.add_dir(),
        INodeKind::Symlink => stats.add_link(),
        INodeKind::File => stats.add_file(inode.file_size, inode.blocks, inode.replication),
    }
}

/// Reads the text export written by `hdfs oiv -p Delimited`.
///
/// Expected columns: Path, Replication, ModificationTime, AccessTime, PreferredBlockSize,
/// BlocksCount, FileSize, NSQUOTA, DSQUOTA, Permission, UserName, GroupName. Any further
/// columns (e.g. the storage policy) are ignored.
#[derive(Debug, Clone)]
pub struct DelimitedImageAnalyzer {
    options: ReportOptions,
    delimiter: char,
}

const COLUMNS: usize = 12;

impl DelimitedImageAnalyzer {
    pub fn new(options: ReportOptions) -> Self {
        Self {
            options,
            delimiter: '\t',
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn analyze_reader(&self, reader: impl BufRead) -> Result<FsImageReport> {
        let mut builder = ReportBuilder::new(&self.options);

        for (idx, line) in reader.lines().enumerate() {
            let line_number = idx + 1;
            let line = line.wrap_err_with(|| format!("Failed to read line {line_number}"))?;
            if line.is_empty() || (idx == 0 && line.starts_with("Path")) {
                continue;
            }
            let inode = parse_row(&line, self.delimiter).wrap_err_with(|| format!("Malformed row at line {line_number}"))?;
            builder.record(&inode);
        }

        if builder.inodes() == 0 {
            bail!("The image contains no inodes");
        }
        trace!(inodes = builder.inodes(), "aggregated image");
        Ok(builder.finish())
    }
}

impl ImageAnalyzer for DelimitedImageAnalyzer {
    fn analyze(&self, image: &Path) -> Result<FsImageReport> {
        let file = File::open(image).wrap_err_with(|| format!("Failed to open {}", image.display()))?;
        self.analyze_reader(BufReader::with_capacity(1 << 20, file))
            .wrap_err_with(|| format!("Failed to analyze {}", image.display()))
    }
}

fn parse_row(line: &str, delimiter: char) -> Result<INode<'_>> {
    let fields = line.split(delimiter).collect::<Vec<_>>();
    if fields.len() < COLUMNS {
        bail!("expected at least {COLUMNS} columns, found {}", fields.len());
    }

    let kind = match fields[9].chars().next() {
        Some('d') => INodeKind::Directory,
        Some('l') => INodeKind::Symlink,
        Some(_) => INodeKind::File,
        None => bail!("empty permission column"),
    };

    Ok(INode {
        path: fields[0],
        kind,
        replication: fields[1].parse().wrap_err("invalid replication")?,
        blocks: fields[5].parse().wrap_err("invalid block count")?,
        file_size: fields[6].parse().wrap_err("invalid file size")?,
        user: fields[10],
        group: fields[11],
    })
}
