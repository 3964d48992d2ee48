//! Human-readable run summary and commit message.

use std::fmt::Write as _;

use expectify_core::output::{AnalysisStatus, FileStatus, RunResponse};
use expectify_core::report::SummaryEntry;

fn pluralize(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Grouped conversions, one `from`/`to` block per distinct record.
///
/// Each line after the first is prefixed with `indent`.
fn write_entries(out: &mut String, entries: &[SummaryEntry], bullet: &str, indent: &str) {
    for entry in entries {
        let _ = writeln!(out, "{bullet}{}", pluralize(entry.count, "conversion"));
        let _ = writeln!(out, "{indent}  from: {}", entry.original);
        let _ = writeln!(out, "{indent}    to: {}", entry.converted);
    }
}

/// Render the text form of a run.
pub fn render_text(response: &RunResponse) -> String {
    let mut out = String::new();

    for file in &response.files {
        match (&file.status, &file.error) {
            (FileStatus::Converted, _) => {
                let _ = writeln!(
                    out,
                    "Converted {} ({})",
                    file.path,
                    pluralize(file.conversions, "conversion")
                );
            }
            (FileStatus::Failed, Some(error)) => {
                let _ = writeln!(out, "Failed {}: {}", file.path, error.message);
            }
            (FileStatus::Failed, None) => {
                let _ = writeln!(out, "Failed {}", file.path);
            }
            (FileStatus::Unchanged, _) => {}
        }
    }

    match &response.dynamic_analysis {
        AnalysisStatus::Completed { facts } => {
            let _ = writeln!(out, "Dynamic analysis: {}", pluralize(*facts, "fact"));
        }
        AnalysisStatus::Skipped => {}
        AnalysisStatus::Failed { message } => {
            let _ = writeln!(
                out,
                "Dynamic analysis failed ({message}); converted with static analysis only"
            );
        }
    }

    if !response.summary.is_empty() {
        out.push_str("\nSummary:\n\n");
        write_entries(&mut out, &response.summary, "", "");
    }

    let changed = response
        .files
        .iter()
        .filter(|f| f.status == FileStatus::Converted)
        .count();
    let failed = response
        .files
        .iter()
        .filter(|f| f.status == FileStatus::Failed)
        .count();
    let _ = writeln!(
        out,
        "\n{}, {} changed, {} failed",
        pluralize(response.conversions, "conversion"),
        pluralize(changed, "file"),
        pluralize(failed, "file"),
    );
    out
}

/// Commit message describing the conversions of a run.
///
/// `command` is the invocation as typed, used to let readers reproduce it.
pub fn commit_message(entries: &[SummaryEntry], command: &str) -> String {
    let mut out = String::new();
    out.push_str("Convert specs to the expect syntax with expectify\n\n");
    let _ = writeln!(
        out,
        "This conversion is done by expectify {} with the following command:",
        env!("CARGO_PKG_VERSION")
    );
    let _ = writeln!(out, "    {command}");
    out.push('\n');
    write_entries(&mut out, entries, "* ", "  ");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use expectify_core::output::{ErrorInfo, FileOutcome};

    fn entry(original: &str, converted: &str, count: usize) -> SummaryEntry {
        SummaryEntry {
            original: original.to_string(),
            converted: converted.to_string(),
            count,
        }
    }

    #[test]
    fn commit_message_lists_entries() {
        let message = commit_message(
            &[
                entry("obj.should", "expect(obj).to", 3),
                entry("mock('something')", "double('something')", 1),
            ],
            "expectify -s spec",
        );
        assert!(message.starts_with("Convert specs to the expect syntax with expectify\n\n"));
        assert!(message.contains("\n    expectify -s spec\n"));
        assert!(message.contains(
            "* 3 conversions\n    from: obj.should\n      to: expect(obj).to\n"
        ));
        assert!(message.ends_with(
            "* 1 conversion\n    from: mock('something')\n      to: double('something')\n"
        ));
    }

    #[test]
    fn text_lists_files_and_totals() {
        let files = vec![
            FileOutcome {
                path: "spec/a_spec.rb".to_string(),
                status: FileStatus::Converted,
                conversions: 2,
                error: None,
            },
            FileOutcome {
                path: "spec/b_spec.rb".to_string(),
                status: FileStatus::Unchanged,
                conversions: 0,
                error: None,
            },
            FileOutcome {
                path: "spec/c_spec.rb".to_string(),
                status: FileStatus::Failed,
                conversions: 0,
                error: Some(ErrorInfo {
                    code: 4,
                    message: "syntax error".to_string(),
                    line: Some(1),
                    col: Some(3),
                }),
            },
        ];
        let response = RunResponse::new(
            "2024-01-01T00:00:00+00:00",
            AnalysisStatus::Skipped,
            vec![entry("obj.should", "expect(obj).to", 2)],
            files,
        );
        let text = render_text(&response);
        assert!(text.contains("Converted spec/a_spec.rb (2 conversions)\n"));
        assert!(!text.contains("spec/b_spec.rb"));
        assert!(text.contains("Failed spec/c_spec.rb: syntax error\n"));
        assert!(text.contains("2 conversions\n  from: obj.should\n    to: expect(obj).to\n"));
        assert!(text.ends_with("\n2 conversions, 1 file changed, 1 file failed\n"));
    }

    #[test]
    fn failed_analysis_is_reported() {
        let response = RunResponse::new(
            "2024-01-01T00:00:00+00:00",
            AnalysisStatus::Failed {
                message: "spec run timed out after 5s".to_string(),
            },
            Vec::new(),
            Vec::new(),
        );
        assert!(render_text(&response).contains(
            "Dynamic analysis failed (spec run timed out after 5s); converted with static analysis only"
        ));
    }
}
