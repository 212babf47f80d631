//! Interface de terminal do gradesync.
//!
//! Usa a crate `console` para saída colorida de relatórios, da fila de
//! avaliadores e do outbox.

use console::Style;

use crate::model::{AssessorQueueEntry, OutboxRecord, QueueState};
use crate::pipeline::{DeliveryOutcome, SyncReport};

pub struct Printer {
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl Default for Printer {
    fn default() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }
}

impl Printer {
    /// Uma linha por resultado, seguida do relatório em JSON.
    pub fn render_report(&self, report: &SyncReport) -> String {
        let mut lines = Vec::new();
        if let Some(reason) = &report.skipped {
            lines.push(format!("  {} Skipped: {reason}", self.yellow.apply_to("-")));
        }
        if let Some(queue) = &report.queue {
            lines.push(format!("  {} Queue: {queue:?}", self.dim.apply_to("•")));
        }
        if let Some(allowance) = &report.allowance {
            lines.push(format!("  {} Override: {allowance:?}", self.dim.apply_to("•")));
        }
        if report.carried > 0 {
            lines.push(format!(
                "  {} Carried {} grade(s) onto resit",
                self.dim.apply_to("•"),
                report.carried
            ));
        }
        for delivery in &report.deliveries {
            match &delivery.outcome {
                DeliveryOutcome::Delivered => lines.push(format!(
                    "  {} Delivered {}",
                    self.green.apply_to("✓"),
                    delivery.delivery_type
                )),
                DeliveryOutcome::Failed { error, outbox } => lines.push(format!(
                    "  {} {} failed ({error}), outbox: {outbox:?}",
                    self.red.apply_to("✗"),
                    delivery.delivery_type
                )),
            }
        }
        lines.push(serde_json::to_string_pretty(report).unwrap_or_default());
        lines.join("\n")
    }

    pub fn render_queue(&self, entries: &[AssessorQueueEntry]) -> String {
        if entries.is_empty() {
            return self.dim.apply_to("Assessor queue is empty").to_string();
        }
        entries
            .iter()
            .map(|e| {
                let state = match e.state {
                    QueueState::Pending => self.yellow.apply_to(e.state.to_string()),
                    QueueState::Finished => self.green.apply_to(e.state.to_string()),
                };
                format!(
                    "attempt {:>6}  {state:<8}  assignee {:<8}  prior {:<8}  #{}",
                    e.attempt_id,
                    display_opt(e.assignee),
                    display_opt(e.prior_attempt_id),
                    e.attempt_number,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn render_outbox(&self, records: &[OutboxRecord]) -> String {
        if records.is_empty() {
            return self.dim.apply_to("No pending deliveries").to_string();
        }
        records
            .iter()
            .map(|r| {
                format!(
                    "{} {}  added {}",
                    self.red.apply_to("↻"),
                    r.dedup_key(),
                    r.time_added
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn print_report(&self, report: &SyncReport) {
        println!("{}", self.render_report(report));
    }

    pub fn print_queue(&self, entries: &[AssessorQueueEntry]) {
        println!("{}", self.render_queue(entries));
    }

    pub fn print_outbox(&self, records: &[OutboxRecord]) {
        println!("{}", self.render_outbox(records));
    }
}

fn display_opt(value: Option<i64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}
