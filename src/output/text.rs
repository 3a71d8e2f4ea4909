//! Human-readable report for the terminal.

use std::io::{self, Write};

use yansi::{Condition, Paint};

use crate::duplicates::{format_size, DedupeReport, Verdict};

/// Plain-text report: clusters, errored files and a summary.
pub struct TextOutput<'a> {
    report: &'a DedupeReport,
    color: bool,
}

impl<'a> TextOutput<'a> {
    /// Create a formatter with color enabled.
    #[must_use]
    pub fn new(report: &'a DedupeReport) -> Self {
        Self {
            report,
            color: true,
        }
    }

    /// Enable or disable ANSI colors.
    #[must_use]
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    fn condition(&self) -> Condition {
        if self.color {
            Condition::ALWAYS
        } else {
            Condition::NEVER
        }
    }

    /// Write the report.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let when = self.condition();
        let summary = &self.report.summary;

        for cluster in &self.report.clusters {
            writeln!(
                writer,
                "{} {} files, {} each, {} reclaimable",
                format!("Cluster {}:", cluster.id).bold().whenever(when),
                cluster.len(),
                format_size(cluster.size),
                format_size(cluster.wasted_space()).green().whenever(when),
            )?;
            for path in &cluster.files {
                writeln!(writer, "  {}", path.display())?;
            }
            writeln!(writer)?;
        }

        let errored: Vec<_> = self.report.errored().collect();
        if !errored.is_empty() {
            writeln!(
                writer,
                "{}",
                format!("Errored ({}):", errored.len()).red().bold().whenever(when)
            )?;
            for entry in errored {
                if let Verdict::Errored { reason } = &entry.verdict {
                    writeln!(writer, "  {}: {}", entry.record.path.display(), reason)?;
                }
            }
            writeln!(writer)?;
        }

        if summary.interrupted {
            writeln!(
                writer,
                "{}",
                format!(
                    "Cancelled: {} file(s) left unresolved",
                    summary.cancelled_files
                )
                .yellow()
                .bold()
                .whenever(when)
            )?;
        }

        writeln!(
            writer,
            "Scanned {} files ({}), {} resolved by size alone",
            summary.total_files,
            summary.total_size_display(),
            summary.eliminated_by_size
        )?;
        writeln!(
            writer,
            "Read {} of {} a whole-file comparison needs ({:.1}% saved), peak {} in flight",
            summary.bytes_read_display(),
            format_size(summary.full_read_bytes),
            summary.read_savings_percentage(),
            format_size(summary.peak_in_flight)
        )?;

        if self.report.has_duplicates() {
            writeln!(
                writer,
                "{} {} cluster(s), {} duplicate file(s), {} reclaimable ({:.1}%)",
                "Duplicates:".bold().whenever(when),
                summary.duplicate_clusters,
                summary.duplicate_files,
                summary.reclaimable_display().green().bold().whenever(when),
                summary.wasted_percentage()
            )?;
        } else {
            writeln!(writer, "{}", "No duplicates found.".bold().whenever(when))?;
        }
        writeln!(
            writer,
            "Finished in {:.2}s",
            summary.scan_duration.as_secs_f64()
        )?;
        Ok(())
    }

    /// Render the report to a string.
    #[must_use]
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        // Writing to a Vec cannot fail
        let _ = self.write_to(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
