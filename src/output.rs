use std::io::{self, Write};

use serde::Serialize;

use crate::catalog::ResolvedArtifact;
use crate::ingest::IngestReport;
use crate::store::EntrySummary;
use crate::tiles::TileReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_ingest(reports: &[IngestReport]) -> io::Result<()> {
        Self::print_json(&reports)
    }

    pub fn print_tiles(report: &TileReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_status(entries: &[EntrySummary]) -> io::Result<()> {
        Self::print_json(&entries)
    }

    pub fn print_lookup(resolved: &ResolvedArtifact) -> io::Result<()> {
        Self::print_json(resolved)
    }

    pub fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
