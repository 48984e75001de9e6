use console::Style;
use flume::Receiver;

use crate::classifier::Classification;
use crate::classifier::Outcome;

/// Accumulated pass/fail/skip counts. Purely additive: outcomes are
/// recorded as they arrive and only ever read back as a summary.
#[derive(Debug, Default)]
pub struct ReportSink {
    total: usize,
    passed: usize,
    failed: usize,
    skipped: usize,
    flagged: Vec<Outcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ReportSink {
    pub fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome.classification {
            Classification::Pass => self.passed += 1,
            Classification::Fail => {
                self.failed += 1;
                self.flagged.push(outcome);
            }
            Classification::Skip => {
                self.skipped += 1;
                self.flagged.push(outcome);
            }
        }
    }

    pub fn summary(&self) -> Summary {
        Summary {
            total: self.total,
            passed: self.passed,
            failed: self.failed,
            skipped: self.skipped,
        }
    }

    fn flagged(&self) -> &[Outcome] {
        &self.flagged
    }
}

pub struct OutPutter;

impl OutPutter {
    pub async fn start(
        rx: Receiver<Outcome>,
        config_path: &str,
        n_scenarios: usize,
        detail: bool,
    ) -> Summary {
        let style = Style::new().bold().cyan();
        let open_text =
            &format!("Running suite from: {config_path} Planned {n_scenarios} scenarios...");
        let open_text = style.apply_to(open_text);

        println!("{open_text}");
        let mut sink = ReportSink::default();
        let mut i = 1;

        while let Ok(outcome) = rx.recv_async().await {
            println!("[{i}/{n_scenarios}] {outcome}");
            sink.record(outcome);
            i += 1;
        }

        let summary = sink.summary();

        if summary.failed > 0 || summary.skipped > 0 {
            println!();
            println!(
                "{}",
                console::style("Scenarios that did not pass:").bold().red()
            );
            for (index, outcome) in sink.flagged().iter().enumerate() {
                println!("\n{}. {outcome}", index + 1);
                if detail && let Some(body_detail) = &outcome.detail {
                    println!("   {}", console::style(body_detail).dim());
                }
            }
        } else {
            println!();
            println!(
                "{}",
                console::style("All scenarios passed! 🎉").bold().green()
            );
        }

        println!();
        println!(
            "{} {} total, {} passed, {} failed, {} skipped",
            console::style("Summary:").bold(),
            summary.total,
            console::style(summary.passed.to_string()).green(),
            console::style(summary.failed.to_string()).red(),
            console::style(summary.skipped.to_string()).yellow(),
        );

        summary
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::ReportSink;
    use crate::classifier::Classification;
    use crate::classifier::Outcome;
    use crate::scenario::StatusSet;

    fn outcome(name: &str, classification: Classification) -> Outcome {
        Outcome {
            name: name.into(),
            method: "GET".into(),
            path: "/orders".into(),
            classification,
            expected: StatusSet::of(&[200]),
            actual: None,
            duration: Duration::from_millis(5),
            detail: None,
        }
    }

    #[test]
    fn counts_add_up() {
        let mut sink = ReportSink::default();

        sink.record(outcome("a", Classification::Pass));
        sink.record(outcome("b", Classification::Pass));
        sink.record(outcome("c", Classification::Fail));
        sink.record(outcome("d", Classification::Skip));

        let summary = sink.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(
            summary.total,
            summary.passed + summary.failed + summary.skipped
        );
    }

    #[test]
    fn only_non_passing_outcomes_are_flagged_for_detail() {
        let mut sink = ReportSink::default();

        sink.record(outcome("a", Classification::Pass));
        sink.record(outcome("b", Classification::Fail));
        sink.record(outcome("c", Classification::Skip));

        let flagged: Vec<&str> = sink
            .flagged()
            .iter()
            .map(|outcome| outcome.name.as_str())
            .collect();
        assert_eq!(flagged, vec!["b", "c"]);
    }

    #[test]
    fn empty_sink_summary_is_all_zeroes() {
        let summary = ReportSink::default().summary();

        assert_eq!(summary.total, 0);
        assert_eq!(summary.passed, 0);
    }
}
