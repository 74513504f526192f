//! Report output port.

use crate::domain::decision::AnalysisResult;
use crate::domain::error::SignalDeskError;

/// Port for persisting analysis results.
pub trait ReportPort {
    fn write(&self, results: &[AnalysisResult], output_path: &str) -> Result<(), SignalDeskError>;
}
