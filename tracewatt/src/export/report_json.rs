//! JSON reading and writing of [`ProjectReport`]s.

use crate::domain::ReportIoError;
use crate::model::{ProjectReport, REPORT_VERSION};
use log::{debug, info};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Writes one report as JSON.
pub struct ReportExporter<'a> {
    report: &'a ProjectReport,
    pretty: bool,
}

impl<'a> ReportExporter<'a> {
    #[must_use]
    pub fn new(report: &'a ProjectReport) -> Self {
        Self {
            report,
            pretty: false,
        }
    }

    /// Indent the output.
    #[must_use]
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Write the report to `writer`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportIoError::Json`] if serialization fails and
    /// [`ReportIoError::Io`] if the writer fails.
    pub fn export<W: Write>(&self, mut writer: W) -> Result<(), ReportIoError> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut writer, self.report)?;
        } else {
            serde_json::to_writer(&mut writer, self.report)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the report to a file, replacing it.
    ///
    /// # Errors
    ///
    /// See [`ReportExporter::export`].
    pub fn export_to_file(&self, path: impl AsRef<Path>) -> Result<(), ReportIoError> {
        let path = path.as_ref();
        self.export(BufWriter::new(File::create(path)?))?;
        info!("Wrote report to {}", path.display());
        Ok(())
    }
}

/// Read a report and check its format version.
///
/// # Errors
///
/// - [`ReportIoError::Json`] for malformed JSON or an inconsistent index
/// - [`ReportIoError::UnsupportedVersion`] for other format versions
pub fn read_report(reader: impl Read) -> Result<ProjectReport, ReportIoError> {
    let report: ProjectReport = serde_json::from_reader(reader)?;
    if report.report_version != REPORT_VERSION {
        return Err(ReportIoError::UnsupportedVersion {
            found: report.report_version,
            expected: REPORT_VERSION,
        });
    }
    debug!(
        "report: {} ids, {} module reports",
        report.global_index.current_id(),
        report.report.extern_.len()
    );
    Ok(report)
}

/// Read a report file.
///
/// # Errors
///
/// See [`read_report`]; [`ReportIoError::Io`] if the file can't be opened.
pub fn load_report(path: impl AsRef<Path>) -> Result<ProjectReport, ReportIoError> {
    read_report(BufReader::new(File::open(path)?))
}
