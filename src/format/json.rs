//! JSON output formatter

use crate::change_detection::AddressChangeEvent;
use crate::error::Result;
use crate::format::{AddressReport, OutputFormatter};

/// JSON formatter - one compact document per report, suitable for piping
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn name(&self) -> &str {
        "json"
    }

    fn description(&self) -> &str {
        "JSON document per report"
    }

    fn format(&self, report: &AddressReport) -> Result<String> {
        Ok(serde_json::to_string(report)?)
    }

    fn format_change(&self, event: &AddressChangeEvent) -> Result<String> {
        Ok(serde_json::to_string(event)?)
    }
}
