use crate::config::ReaderConfig;
use crate::cursor::RecordCursor;
use crate::document::DocumentRecord;
use crate::error::LoadResult;
use crate::io::compression::CodecRegistry;
use crate::io::open_reader;
use crate::io::source::ContainerSource;
use crate::planner::Plan;
use crate::split::SplitDescriptor;
use anyhow::{Context, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecMode {
    Sequential,
    Parallel { threads: Option<usize> },
}

/// What a failed split does to the job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SplitFailure {
    /// The first failed split fails the whole job.
    #[default]
    FailJob,
    /// The failed split's records are dropped and the job goes on.
    DropSplit,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobStats {
    pub splits: usize,
    pub records: u64,
    pub skipped: u64,
    pub failed_splits: usize,
}

/// Records of every split, in plan order.
#[derive(Clone, Debug, Default)]
pub struct JobOutput {
    pub records: Vec<DocumentRecord>,
    pub stats: JobStats,
}

pub struct Runner {
    pub mode: ExecMode,
    pub on_split_error: SplitFailure,
}

impl Default for Runner {
    fn default() -> Self {
        Self {
            mode: ExecMode::Parallel {
                threads: Some(num_cpus::get().max(2)),
            },
            on_split_error: SplitFailure::FailJob,
        }
    }
}

impl Runner {
    pub fn sequential() -> Self {
        Self {
            mode: ExecMode::Sequential,
            ..Self::default()
        }
    }

    pub fn run(
        &self,
        source: &dyn ContainerSource,
        registry: &CodecRegistry,
        config: &ReaderConfig,
        plan: &Plan,
    ) -> Result<JobOutput> {
        let results = match self.mode {
            ExecMode::Sequential => exec_seq(source, registry, config, &plan.splits),
            ExecMode::Parallel { threads } => {
                exec_parallel(source, registry, config, &plan.splits, threads)?
            }
        };

        let mut out = JobOutput::default();
        out.stats.splits = plan.splits.len();
        for (split, result) in plan.splits.iter().zip(results) {
            match result {
                Ok(records) => {
                    out.stats.skipped += records.iter().filter(|r| r.skip).count() as u64;
                    out.stats.records += records.len() as u64;
                    out.records.extend(records);
                }
                Err(e) => match self.on_split_error {
                    SplitFailure::FailJob => {
                        return Err(e).with_context(|| format!("split {split} failed"));
                    }
                    SplitFailure::DropSplit => {
                        tracing::warn!(split = %split, error = %e, "dropping failed split");
                        out.stats.failed_splits += 1;
                    }
                },
            }
        }
        tracing::info!(
            splits = out.stats.splits,
            records = out.stats.records,
            skipped = out.stats.skipped,
            failed = out.stats.failed_splits,
            "job finished"
        );
        Ok(out)
    }
}

/// Read one split to the end with its own reader.
pub fn read_split(
    source: &dyn ContainerSource,
    registry: &CodecRegistry,
    config: &ReaderConfig,
    split: &SplitDescriptor,
) -> LoadResult<Vec<DocumentRecord>> {
    let reader = open_reader(source, registry, config, split.clone())?;
    let mut cursor = RecordCursor::new(reader);
    let mut records = Vec::new();
    let pulled = loop {
        match cursor.next_record() {
            Ok(Some(record)) => records.push(record),
            Ok(None) => break Ok(records),
            Err(e) => break Err(e),
        }
    };
    cursor.close()?;
    tracing::debug!(split = %split, ok = pulled.is_ok(), "split read");
    pulled
}

fn exec_seq(
    source: &dyn ContainerSource,
    registry: &CodecRegistry,
    config: &ReaderConfig,
    splits: &[SplitDescriptor],
) -> Vec<LoadResult<Vec<DocumentRecord>>> {
    splits
        .iter()
        .map(|s| read_split(source, registry, config, s))
        .collect()
}

#[cfg(feature = "parallel-io")]
fn exec_parallel(
    source: &dyn ContainerSource,
    registry: &CodecRegistry,
    config: &ReaderConfig,
    splits: &[SplitDescriptor],
    threads: Option<usize>,
) -> Result<Vec<LoadResult<Vec<DocumentRecord>>>> {
    use rayon::prelude::*;

    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("ironload-split-{i}"));
    if let Some(t) = threads {
        builder = builder.num_threads(t);
    }
    let pool = builder.build().context("build split thread pool")?;
    Ok(pool.install(|| {
        splits
            .par_iter()
            .map(|s| read_split(source, registry, config, s))
            .collect()
    }))
}

#[cfg(not(feature = "parallel-io"))]
fn exec_parallel(
    source: &dyn ContainerSource,
    registry: &CodecRegistry,
    config: &ReaderConfig,
    splits: &[SplitDescriptor],
    _threads: Option<usize>,
) -> Result<Vec<LoadResult<Vec<DocumentRecord>>>> {
    Ok(exec_seq(source, registry, config, splits))
}
