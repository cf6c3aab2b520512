//! Built-in phase runners.
//!
//! Phase 6 is the heart of the pipeline and delegates to
//! [`EdgeProjector`]; the remaining phases are thin line-oriented
//! transforms between gzip streams. Only the two corpus phases decompose
//! into subphases; the later phases are single transforms and run whole.
//!
//! Every runner is tolerant of malformed records (counted, skipped) and
//! fatal only on resource-level I/O failures, matching the projector.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{info, warn};

use crate::phase::PhaseId;
use crate::projector::{EdgeProjector, ProjectorConfig};

use super::runner::{PhaseContext, PhaseRunner};
use super::spec::{
    CRAWL_ARCHIVE_FILE, CRAWL_USERS_FILE, CRAWL_USER_MAP_FILE, GRAPHML_FILE, GRAPHML_SAMPLE_FILE,
    INTERSECTION_FILE, LABEL_LEXICON_FILE, PROJECTED_EDGES_FILE, UID_LABELS_FILE, UID_MAP_FILE,
    USER_LABELS_FILE, USER_LIST_FILE,
};
use super::PipelineError;

/// Edges included in the GraphML head sample.
pub const GRAPHML_SAMPLE_EDGES: u64 = 1000;

fn io_error(what: impl Into<String>) -> impl FnOnce(std::io::Error) -> PipelineError {
    let what = what.into();
    move |source| PipelineError::Io { what, source }
}

fn open_gz(path: &Path) -> Result<BufReader<GzDecoder<File>>, PipelineError> {
    let file = File::open(path).map_err(io_error(format!("opening {}", path.display())))?;
    Ok(BufReader::new(GzDecoder::new(file)))
}

fn create_gz(path: &Path) -> Result<GzEncoder<BufWriter<File>>, PipelineError> {
    let file = File::create(path).map_err(io_error(format!("creating {}", path.display())))?;
    Ok(GzEncoder::new(BufWriter::new(file), Compression::default()))
}

fn finish_gz(
    encoder: GzEncoder<BufWriter<File>>,
    path: &Path,
) -> Result<(), PipelineError> {
    let mut inner = encoder
        .finish()
        .map_err(io_error(format!("finishing {}", path.display())))?;
    inner
        .flush()
        .map_err(io_error(format!("flushing {}", path.display())))
}

/// Phase 1: collect the deduplicated user list of the microblog export.
///
/// Scans every `*.txt.gz` file in the export directory; the first
/// whitespace-delimited token of each line is a screen name, normalized to
/// lowercase. Subphases: 1.1 scan, 1.2 write.
pub struct CorpusUsersPhase;

impl PhaseRunner for CorpusUsersPhase {
    fn run(&self, ctx: &mut PhaseContext) -> Result<(), PipelineError> {
        let export = ctx.inputs[0].clone();
        let mut users: BTreeSet<String> = BTreeSet::new();
        let mut files_read = 0u64;
        let mut lines_read = 0u64;

        if ctx.wants_subphase(1) {
            let mut paths: Vec<PathBuf> = std::fs::read_dir(&export)
                .map_err(io_error(format!("scanning {}", export.display())))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| {
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .map_or(false, |n| n.ends_with(".txt.gz"))
                })
                .collect();
            paths.sort();

            for path in paths {
                let reader = open_gz(&path)?;
                for line in reader.lines() {
                    let line = line.map_err(io_error(format!("reading {}", path.display())))?;
                    lines_read += 1;
                    if let Some(name) = line.split_whitespace().next() {
                        users.insert(name.to_lowercase());
                    }
                }
                files_read += 1;
            }
        }

        if ctx.wants_subphase(2) {
            let out_path = ctx.output_dpath.join(USER_LIST_FILE);
            let mut out = create_gz(&out_path)?;
            for user in &users {
                writeln!(out, "{user}").map_err(io_error("writing user list"))?;
            }
            finish_gz(out, &out_path)?;
        }

        info!(files_read, lines_read, users = users.len(), "corpus user list collected");
        ctx.report.line(&format!(
            "{} users from {} lines in {} files",
            users.len(),
            lines_read,
            files_read
        ));
        Ok(())
    }
}

/// Phase 2: normalize the crawl user map into a sorted user list and a
/// `<screen_name> <uid>` map. Subphases: 2.1 read, 2.2 write.
pub struct CrawlUsersPhase;

impl PhaseRunner for CrawlUsersPhase {
    fn run(&self, ctx: &mut PhaseContext) -> Result<(), PipelineError> {
        let map_path = ctx.inputs[0].join(CRAWL_USER_MAP_FILE);
        let mut by_name: BTreeMap<String, u64> = BTreeMap::new();
        let mut malformed = 0u64;

        if ctx.wants_subphase(1) {
            let reader = open_gz(&map_path)?;
            for line in reader.lines() {
                let line = line.map_err(io_error(format!("reading {}", map_path.display())))?;
                let mut tokens = line.split_whitespace();
                match (
                    tokens.next().and_then(|t| t.parse::<u64>().ok()),
                    tokens.next(),
                ) {
                    (Some(uid), Some(name)) => {
                        by_name.insert(name.to_lowercase(), uid);
                    }
                    _ => {
                        if !line.is_empty() {
                            malformed += 1;
                        }
                    }
                }
            }
        }

        if ctx.wants_subphase(2) {
            let users_path = ctx.output_dpath.join(CRAWL_USERS_FILE);
            let mut users_out = create_gz(&users_path)?;
            let map_out_path = ctx.output_dpath.join(UID_MAP_FILE);
            let mut map_out = create_gz(&map_out_path)?;
            for (name, uid) in &by_name {
                writeln!(users_out, "{name}").map_err(io_error("writing crawl user list"))?;
                writeln!(map_out, "{name} {uid}").map_err(io_error("writing uid map"))?;
            }
            finish_gz(users_out, &users_path)?;
            finish_gz(map_out, &map_out_path)?;
        }

        info!(users = by_name.len(), malformed, "crawl user map normalized");
        ctx.report.line(&format!(
            "{} crawl users; {} malformed lines",
            by_name.len(),
            malformed
        ));
        Ok(())
    }
}

fn next_line<R: BufRead>(
    lines: &mut std::io::Lines<R>,
    what: &str,
) -> Result<Option<String>, PipelineError> {
    match lines.next() {
        Some(line) => line.map(Some).map_err(io_error(format!("reading {what}"))),
        None => Ok(None),
    }
}

/// Phase 3: streaming merge-join of the two sorted user lists.
pub struct IntersectionPhase;

impl PhaseRunner for IntersectionPhase {
    fn run(&self, ctx: &mut PhaseContext) -> Result<(), PipelineError> {
        let corpus_path = ctx.inputs[0].join(USER_LIST_FILE);
        let crawl_path = ctx.inputs[1].join(CRAWL_USERS_FILE);
        let out_path = ctx.output_dpath.join(INTERSECTION_FILE);

        let mut corpus = open_gz(&corpus_path)?.lines();
        let mut crawl = open_gz(&crawl_path)?.lines();
        let mut out = create_gz(&out_path)?;

        let mut shared = 0u64;
        let mut left = next_line(&mut corpus, "corpus user list")?;
        let mut right = next_line(&mut crawl, "crawl user list")?;
        while let (Some(a), Some(b)) = (&left, &right) {
            match a.cmp(b) {
                std::cmp::Ordering::Less => left = next_line(&mut corpus, "corpus user list")?,
                std::cmp::Ordering::Greater => right = next_line(&mut crawl, "crawl user list")?,
                std::cmp::Ordering::Equal => {
                    writeln!(out, "{a}").map_err(io_error("writing intersection"))?;
                    shared += 1;
                    left = next_line(&mut corpus, "corpus user list")?;
                    right = next_line(&mut crawl, "crawl user list")?;
                }
            }
        }
        finish_gz(out, &out_path)?;

        info!(shared, "user intersection computed");
        ctx.report.line(&format!("{shared} users in both corpora"));
        Ok(())
    }
}

/// Phase 4: attach a binary label to every intersection user.
///
/// Labels come from an optional lexicon beside the microblog export;
/// users without a lexicon entry default to 0.
pub struct LabelPhase;

impl PhaseRunner for LabelPhase {
    fn run(&self, ctx: &mut PhaseContext) -> Result<(), PipelineError> {
        let intersection_path = ctx.inputs[0].join(INTERSECTION_FILE);
        let lexicon_path = ctx.inputs[1].join(LABEL_LEXICON_FILE);
        let out_path = ctx.output_dpath.join(USER_LABELS_FILE);

        let lexicon = if lexicon_path.exists() {
            let mut map: HashMap<String, u8> = HashMap::new();
            let reader = open_gz(&lexicon_path)?;
            for line in reader.lines() {
                let line =
                    line.map_err(io_error(format!("reading {}", lexicon_path.display())))?;
                let mut tokens = line.split_whitespace();
                if let (Some(name), Some(flag)) = (
                    tokens.next(),
                    tokens.next().and_then(|t| t.parse::<u8>().ok()),
                ) {
                    map.insert(name.to_lowercase(), flag.min(1));
                }
            }
            map
        } else {
            warn!(path = %lexicon_path.display(), "no label lexicon; defaulting all labels to 0");
            HashMap::new()
        };

        let reader = open_gz(&intersection_path)?;
        let mut out = create_gz(&out_path)?;
        let mut labeled = 0u64;
        let mut flagged = 0u64;
        for line in reader.lines() {
            let line =
                line.map_err(io_error(format!("reading {}", intersection_path.display())))?;
            if line.is_empty() {
                continue;
            }
            let flag = lexicon.get(&line).copied().unwrap_or(0);
            writeln!(out, "{line} {flag}").map_err(io_error("writing user labels"))?;
            labeled += 1;
            flagged += u64::from(flag);
        }
        finish_gz(out, &out_path)?;

        info!(labeled, flagged, "user labels attached");
        ctx.report
            .line(&format!("{labeled} users labeled; {flagged} flagged"));
        Ok(())
    }
}

/// Phase 5: join user labels with crawl uids into the `<uid> <flag>`
/// membership source consumed by the projection phase.
pub struct LabelJoinPhase;

impl PhaseRunner for LabelJoinPhase {
    fn run(&self, ctx: &mut PhaseContext) -> Result<(), PipelineError> {
        let uid_map_path = ctx.inputs[0].join(UID_MAP_FILE);
        let labels_path = ctx.inputs[1].join(USER_LABELS_FILE);
        let out_path = ctx.output_dpath.join(UID_LABELS_FILE);

        let mut uids: HashMap<String, u64> = HashMap::new();
        let reader = open_gz(&uid_map_path)?;
        for line in reader.lines() {
            let line = line.map_err(io_error(format!("reading {}", uid_map_path.display())))?;
            let mut tokens = line.split_whitespace();
            if let (Some(name), Some(uid)) = (
                tokens.next(),
                tokens.next().and_then(|t| t.parse::<u64>().ok()),
            ) {
                uids.insert(name.to_string(), uid);
            }
        }

        let reader = open_gz(&labels_path)?;
        let mut out = create_gz(&out_path)?;
        let mut joined = 0u64;
        let mut unmapped = 0u64;
        for line in reader.lines() {
            let line = line.map_err(io_error(format!("reading {}", labels_path.display())))?;
            let mut tokens = line.split_whitespace();
            match (tokens.next(), tokens.next()) {
                (Some(name), Some(flag)) => match uids.get(name) {
                    Some(uid) => {
                        writeln!(out, "{uid} {flag}").map_err(io_error("writing uid labels"))?;
                        joined += 1;
                    }
                    None => unmapped += 1,
                },
                _ => {
                    if !line.is_empty() {
                        unmapped += 1;
                    }
                }
            }
        }
        finish_gz(out, &out_path)?;

        info!(joined, unmapped, "uid labels joined");
        ctx.report
            .line(&format!("{joined} uid labels; {unmapped} unmapped users"));
        Ok(())
    }
}

/// Phase 6: project the crawl edge list onto the known-user intersection.
pub struct ProjectionPhase {
    config: ProjectorConfig,
}

impl ProjectionPhase {
    /// Create the projection phase with a custom projector configuration.
    pub fn new(config: ProjectorConfig) -> Self {
        Self { config }
    }

    /// Create the projection phase with the default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ProjectorConfig::default())
    }
}

impl PhaseRunner for ProjectionPhase {
    fn run(&self, ctx: &mut PhaseContext) -> Result<(), PipelineError> {
        let membership = ctx.inputs[0].join(UID_LABELS_FILE);
        let archive = ctx.inputs[1].join(CRAWL_ARCHIVE_FILE);
        let output = ctx.output_dpath.join(PROJECTED_EDGES_FILE);

        let projector = EdgeProjector::new(self.config.clone());
        let summary = projector.project(&archive, &membership, &output, &mut ctx.report)?;

        info!(
            edges_kept = summary.edges_kept,
            edges_thrown = summary.edges_thrown,
            "social graph projected"
        );
        Ok(())
    }
}

fn write_graphml_header(out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        out,
        r#"<graphml xmlns="http://graphml.graphdrawing.org/xmlns">"#
    )?;
    writeln!(out, r#"  <graph id="social" edgedefault="directed">"#)
}

fn write_graphml_footer(out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "  </graph>")?;
    writeln!(out, "</graphml>")
}

/// Phase 7: assemble the projected edges into GraphML deliverables, plus a
/// head sample of [`GRAPHML_SAMPLE_EDGES`] edges for quick inspection.
pub struct GraphAssemblyPhase;

impl PhaseRunner for GraphAssemblyPhase {
    fn run(&self, ctx: &mut PhaseContext) -> Result<(), PipelineError> {
        let edges_path = ctx.inputs[0].join(PROJECTED_EDGES_FILE);
        let full_path = ctx.output_dpath.join(GRAPHML_FILE);
        let sample_path = ctx.output_dpath.join(GRAPHML_SAMPLE_FILE);

        let reader = open_gz(&edges_path)?;
        let mut full = create_gz(&full_path)?;
        let mut sample = create_gz(&sample_path)?;
        write_graphml_header(&mut full).map_err(io_error("writing graphml"))?;
        write_graphml_header(&mut sample).map_err(io_error("writing graphml sample"))?;

        let mut edges = 0u64;
        let mut malformed = 0u64;
        for line in reader.lines() {
            let line = line.map_err(io_error(format!("reading {}", edges_path.display())))?;
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            match (tokens.next(), tokens.next()) {
                (Some(source), Some(target)) => {
                    let element = format!(r#"    <edge source="{source}" target="{target}"/>"#);
                    writeln!(full, "{element}").map_err(io_error("writing graphml"))?;
                    if edges < GRAPHML_SAMPLE_EDGES {
                        writeln!(sample, "{element}")
                            .map_err(io_error("writing graphml sample"))?;
                    }
                    edges += 1;
                }
                _ => malformed += 1,
            }
        }

        write_graphml_footer(&mut full).map_err(io_error("writing graphml"))?;
        write_graphml_footer(&mut sample).map_err(io_error("writing graphml sample"))?;
        finish_gz(full, &full_path)?;
        finish_gz(sample, &sample_path)?;

        info!(edges, malformed, "graphml assembled");
        ctx.report
            .line(&format!("{edges} edges in graphml; {malformed} malformed"));
        Ok(())
    }
}

/// The production runner set, one per phase-table row.
pub fn standard_runners() -> BTreeMap<PhaseId, Box<dyn PhaseRunner>> {
    let mut runners: BTreeMap<PhaseId, Box<dyn PhaseRunner>> = BTreeMap::new();
    runners.insert(PhaseId::new_unchecked(1), Box::new(CorpusUsersPhase));
    runners.insert(PhaseId::new_unchecked(2), Box::new(CrawlUsersPhase));
    runners.insert(PhaseId::new_unchecked(3), Box::new(IntersectionPhase));
    runners.insert(PhaseId::new_unchecked(4), Box::new(LabelPhase));
    runners.insert(PhaseId::new_unchecked(5), Box::new(LabelJoinPhase));
    runners.insert(
        PhaseId::new_unchecked(6),
        Box::new(ProjectionPhase::with_defaults()),
    );
    runners.insert(PhaseId::new_unchecked(7), Box::new(GraphAssemblyPhase));
    runners
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RunReport;

    fn write_gz(path: &Path, content: &str) {
        let file = File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    fn read_gz(path: &Path) -> String {
        let mut out = String::new();
        std::io::Read::read_to_string(&mut GzDecoder::new(File::open(path).unwrap()), &mut out)
            .unwrap();
        out
    }

    fn make_ctx(inputs: Vec<PathBuf>, output_dpath: PathBuf) -> PhaseContext {
        PhaseContext {
            inputs,
            output_dpath,
            subphases: None,
            report: RunReport::disabled(),
        }
    }

    #[test]
    fn test_corpus_users_dedupes_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("export");
        let out = dir.path().join("out");
        std::fs::create_dir_all(&export).unwrap();
        std::fs::create_dir_all(&out).unwrap();
        write_gz(&export.join("a.txt.gz"), "Carol some text\nalice more\n");
        write_gz(&export.join("b.txt.gz"), "bob hi\nalice again\n");
        // Not part of the export naming convention; must be ignored.
        std::fs::write(export.join("notes.txt"), "zed ignored").unwrap();

        let mut ctx = make_ctx(vec![export], out.clone());
        CorpusUsersPhase.run(&mut ctx).unwrap();

        assert_eq!(read_gz(&out.join(USER_LIST_FILE)), "alice\nbob\ncarol\n");
    }

    #[test]
    fn test_corpus_users_subphase_filter() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("export");
        let out = dir.path().join("out");
        std::fs::create_dir_all(&export).unwrap();
        std::fs::create_dir_all(&out).unwrap();
        write_gz(&export.join("a.txt.gz"), "alice hi\n");

        let mut ctx = make_ctx(vec![export], out.clone());
        ctx.subphases = Some(vec![1]);
        CorpusUsersPhase.run(&mut ctx).unwrap();

        // Subphase 1.2 (write) was not requested.
        assert!(!out.join(USER_LIST_FILE).exists());
    }

    #[test]
    fn test_crawl_users_normalization() {
        let dir = tempfile::tempdir().unwrap();
        let crawl = dir.path().join("crawl");
        let out = dir.path().join("out");
        std::fs::create_dir_all(&crawl).unwrap();
        std::fs::create_dir_all(&out).unwrap();
        write_gz(
            &crawl.join(CRAWL_USER_MAP_FILE),
            "20 Bob\n10 alice\nnot-a-uid carol\n",
        );

        let mut ctx = make_ctx(vec![crawl], out.clone());
        CrawlUsersPhase.run(&mut ctx).unwrap();

        assert_eq!(read_gz(&out.join(CRAWL_USERS_FILE)), "alice\nbob\n");
        assert_eq!(read_gz(&out.join(UID_MAP_FILE)), "alice 10\nbob 20\n");
    }

    #[test]
    fn test_intersection_merge_join() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = dir.path().join("p1");
        let p2 = dir.path().join("p2");
        let out = dir.path().join("out");
        for d in [&p1, &p2, &out] {
            std::fs::create_dir_all(d).unwrap();
        }
        write_gz(&p1.join(USER_LIST_FILE), "alice\nbob\ndan\n");
        write_gz(&p2.join(CRAWL_USERS_FILE), "bob\ncarol\ndan\neve\n");

        let mut ctx = make_ctx(vec![p1, p2], out.clone());
        IntersectionPhase.run(&mut ctx).unwrap();

        assert_eq!(read_gz(&out.join(INTERSECTION_FILE)), "bob\ndan\n");
    }

    #[test]
    fn test_labels_default_to_zero_without_lexicon() {
        let dir = tempfile::tempdir().unwrap();
        let p3 = dir.path().join("p3");
        let export = dir.path().join("export");
        let out = dir.path().join("out");
        for d in [&p3, &export, &out] {
            std::fs::create_dir_all(d).unwrap();
        }
        write_gz(&p3.join(INTERSECTION_FILE), "alice\nbob\n");

        let mut ctx = make_ctx(vec![p3, export], out.clone());
        LabelPhase.run(&mut ctx).unwrap();

        assert_eq!(read_gz(&out.join(USER_LABELS_FILE)), "alice 0\nbob 0\n");
    }

    #[test]
    fn test_labels_use_lexicon_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let p3 = dir.path().join("p3");
        let export = dir.path().join("export");
        let out = dir.path().join("out");
        for d in [&p3, &export, &out] {
            std::fs::create_dir_all(d).unwrap();
        }
        write_gz(&p3.join(INTERSECTION_FILE), "alice\nbob\n");
        write_gz(&export.join(LABEL_LEXICON_FILE), "alice 1\nzed 1\n");

        let mut ctx = make_ctx(vec![p3, export], out.clone());
        LabelPhase.run(&mut ctx).unwrap();

        assert_eq!(read_gz(&out.join(USER_LABELS_FILE)), "alice 1\nbob 0\n");
    }

    #[test]
    fn test_label_join_produces_membership_source() {
        let dir = tempfile::tempdir().unwrap();
        let p2 = dir.path().join("p2");
        let p4 = dir.path().join("p4");
        let out = dir.path().join("out");
        for d in [&p2, &p4, &out] {
            std::fs::create_dir_all(d).unwrap();
        }
        write_gz(&p2.join(UID_MAP_FILE), "alice 10\nbob 20\n");
        write_gz(&p4.join(USER_LABELS_FILE), "alice 1\nbob 0\nghost 1\n");

        let mut ctx = make_ctx(vec![p2, p4], out.clone());
        LabelJoinPhase.run(&mut ctx).unwrap();

        assert_eq!(read_gz(&out.join(UID_LABELS_FILE)), "10 1\n20 0\n");
    }

    #[test]
    fn test_graph_assembly_writes_graphml_and_sample() {
        let dir = tempfile::tempdir().unwrap();
        let p6 = dir.path().join("p6");
        let out = dir.path().join("out");
        for d in [&p6, &out] {
            std::fs::create_dir_all(d).unwrap();
        }
        write_gz(&p6.join(PROJECTED_EDGES_FILE), "10 20\n20 30\n");

        let mut ctx = make_ctx(vec![p6], out.clone());
        GraphAssemblyPhase.run(&mut ctx).unwrap();

        let full = read_gz(&out.join(GRAPHML_FILE));
        assert!(full.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(full.contains(r#"<edge source="10" target="20"/>"#));
        assert!(full.contains(r#"<edge source="20" target="30"/>"#));
        assert!(full.trim_end().ends_with("</graphml>"));

        // Both edges fit inside the sample window.
        let sample = read_gz(&out.join(GRAPHML_SAMPLE_FILE));
        assert_eq!(sample.matches("<edge ").count(), 2);
    }

    #[test]
    fn test_standard_runners_cover_every_phase() {
        let runners = standard_runners();
        assert_eq!(runners.len(), 7);
        for id in PhaseId::all() {
            assert!(runners.contains_key(&id), "phase {id}");
        }
    }
}
