//! Processing pipeline: datasource → transformer → accumulator.
//!
//! Events are pulled from the source in fixed-size chunks. Each chunk is
//! transformed on the rayon pool, the results are collected back in source
//! order, and the batches are ingested one by one. The accumulator therefore
//! sees exactly the same sequence of batches whether or not the transform
//! step ran in parallel.

use serde::{Deserialize, Serialize};

use crate::event::{DataSource, EventRecord};
use crate::graph::GraphAccumulator;
use crate::transform::Transformer;

/// Pipeline tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Events transformed per parallel chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Transform chunks on the rayon pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_chunk_size() -> usize {
    1024
}
fn default_parallel() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            parallel: default_parallel(),
        }
    }
}

/// Counters for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records read successfully from the source.
    pub events: usize,
    /// Records the transformer turned into nodes.
    pub transformed: usize,
    /// Records the transformer declared irrelevant.
    pub ignored: usize,
    pub source_errors: usize,
    pub transform_errors: usize,
    /// Nodes dropped as malformed by the accumulator.
    pub malformed_nodes: usize,
    /// Event batches rejected whole under
    /// [`MalformedPolicy::Abort`](crate::graph::MalformedPolicy::Abort).
    pub aborted_batches: usize,
    pub inserted: usize,
    pub merged: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} events ({} transformed, {} ignored, {} failed, {} unreadable); \
             {} nodes inserted, {} merged, {} malformed, {} batches aborted",
            self.events,
            self.transformed,
            self.ignored,
            self.transform_errors,
            self.source_errors,
            self.inserted,
            self.merged,
            self.malformed_nodes,
            self.aborted_batches
        )
    }
}

/// Drives one transformer over one datasource into an accumulator.
pub struct Pipeline<'a> {
    transformer: &'a dyn Transformer,
    config: PipelineConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(transformer: &'a dyn Transformer, config: PipelineConfig) -> Self {
        Self {
            transformer,
            config,
        }
    }

    /// Run the source to completion.
    ///
    /// Every failure is confined to its event: source, transformer and
    /// ingest errors are counted and logged, and the next event is processed.
    /// Under the abort policy a malformed node rejects its whole batch.
    pub fn run(
        &self,
        source: &mut dyn DataSource,
        accumulator: &mut GraphAccumulator,
    ) -> RunSummary {
        let chunk_size = self.config.chunk_size.max(1);
        let mut summary = RunSummary::default();
        let mut chunk: Vec<EventRecord> = Vec::with_capacity(chunk_size);

        tracing::info!(
            source = source.name(),
            transformer = self.transformer.name(),
            "starting pipeline"
        );

        for (index, event) in source.events().enumerate() {
            match event {
                Ok(event) => {
                    summary.events += 1;
                    chunk.push(event);
                }
                Err(error) => {
                    summary.source_errors += 1;
                    tracing::warn!(event = index, error = %error, "unreadable event");
                }
            }
            if chunk.len() >= chunk_size {
                self.process_chunk(std::mem::take(&mut chunk), accumulator, &mut summary);
            }
        }
        if !chunk.is_empty() {
            self.process_chunk(chunk, accumulator, &mut summary);
        }

        tracing::info!(
            events = summary.events,
            inserted = summary.inserted,
            merged = summary.merged,
            malformed = summary.malformed_nodes,
            aborted = summary.aborted_batches,
            failed = summary.transform_errors,
            nodes = accumulator.len(),
            "pipeline finished"
        );
        summary
    }

    fn process_chunk(
        &self,
        chunk: Vec<EventRecord>,
        accumulator: &mut GraphAccumulator,
        summary: &mut RunSummary,
    ) {
        let transformer = self.transformer;
        let results: Vec<_> = if self.config.parallel {
            use rayon::prelude::*;
            chunk.par_iter().map(|e| transformer.transform(e)).collect()
        } else {
            chunk.iter().map(|e| transformer.transform(e)).collect()
        };

        for result in results {
            match result {
                Ok(Some(nodes)) => {
                    summary.transformed += 1;
                    match accumulator.ingest(nodes) {
                        Ok(report) => {
                            summary.inserted += report.inserted;
                            summary.merged += report.merged;
                            summary.malformed_nodes += report.skipped.len();
                        }
                        Err(error) => {
                            summary.aborted_batches += 1;
                            tracing::warn!(error = %error, "rejected event batch");
                        }
                    }
                }
                Ok(None) => summary.ignored += 1,
                Err(error) => {
                    summary.transform_errors += 1;
                    tracing::warn!(
                        transformer = transformer.name(),
                        error = %error,
                        "event could not be transformed"
                    );
                }
            }
        }
        tracing::debug!(events = chunk.len(), nodes = accumulator.len(), "processed chunk");
    }
}
