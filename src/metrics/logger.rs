use crate::simulation::log::EpisodeSummary;
use anyhow::Result;
use csv::Writer;
use std::fs::File;
use std::path::Path;

/// Appends one CSV row per finished episode.
pub struct SummaryLogger {
    writer: Writer<File>,
}

impl SummaryLogger {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let writer = Writer::from_path(path)?;
        Ok(Self { writer })
    }

    pub fn log_batch(&mut self, summaries: &[EpisodeSummary]) -> Result<()> {
        for summary in summaries {
            self.writer.serialize(summary)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
