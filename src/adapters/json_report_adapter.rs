//! JSON report adapter implementing ReportPort.
//!
//! A single result is written as one object; several results (a scan) are
//! written as an array in the order given.

use std::fs;
use std::path::Path;

use crate::domain::decision::AnalysisResult;
use crate::domain::error::SignalDeskError;
use crate::ports::report_port::ReportPort;

pub struct JsonReportAdapter;

impl JsonReportAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Pretty-printed JSON for `results`, as it would be written to disk.
    pub fn render(&self, results: &[AnalysisResult]) -> Result<String, SignalDeskError> {
        let rendered = match results {
            [single] => serde_json::to_string_pretty(single),
            many => serde_json::to_string_pretty(many),
        };
        rendered.map_err(|e| SignalDeskError::Report {
            reason: format!("failed to serialise analysis: {e}"),
        })
    }
}

impl Default for JsonReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(&self, results: &[AnalysisResult], output_path: &str) -> Result<(), SignalDeskError> {
        let json = self.render(results)?;

        let path = Path::new(output_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(SignalDeskError::Io)?;
        }
        fs::write(path, json + "\n").map_err(SignalDeskError::Io)?;

        Ok(())
    }
}
