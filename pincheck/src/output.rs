use std::io::Write;

use crate::report::ScanReport;

pub trait OutputFormatter {
    fn write_report(
        &self,
        report: &ScanReport,
        writer: &mut dyn Write,
    ) -> std::io::Result<()>;
}

pub struct TextOutput;

impl OutputFormatter for TextOutput {
    fn write_report(
        &self,
        report: &ScanReport,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        for file in &report.files {
            if file.all_pinned {
                writeln!(writer, "{} ({}): pinned", file.path, file.kind)?;
                continue;
            }
            writeln!(writer, "{} ({}): unpinned", file.path, file.kind)?;
            for finding in &file.findings {
                writeln!(writer, "  line {}: {}", finding.line, finding.message)?;
                writeln!(writer, "    {}", finding.snippet)?;
            }
        }
        writeln!(
            writer,
            "{} files checked, {} findings",
            report.files.len(),
            report.finding_count()
        )?;
        Ok(())
    }
}

pub struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn write_report(
        &self,
        report: &ScanReport,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, report)?;
        writeln!(writer)?;
        Ok(())
    }
}

pub fn formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonOutput)
    } else {
        Box::new(TextOutput)
    }
}
