//! Interface de terminal do analisador: spinner e saída colorida.
//!
//! Usa as crates `indicatif` para o spinner de progresso e `console` para
//! estilização com cores. O [`WorkflowProgress`] acompanha visualmente
//! uma execução do fluxo de três etapas.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use dam_compliance::workflow::{Step, WorkflowReport, WorkflowState};

/// Situação de uma etapa ao fim de uma execução.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMark {
    Done,
    Failed,
    Pending,
}

impl StepMark {
    pub fn of(state: &WorkflowState, step: Step) -> Self {
        if state.is_step_completed(step) {
            StepMark::Done
        } else if state.error_step == Some(step) {
            StepMark::Failed
        } else {
            StepMark::Pending
        }
    }
}

/// Indicador visual de progresso para uma execução do fluxo.
pub struct WorkflowProgress {
    // Spinner do indicatif.
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl WorkflowProgress {
    /// Inicia o spinner com o nome da imagem analisada.
    pub fn start(image: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Analyzing {image}"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    /// Mensagem de retentativa a partir da etapa que falhou.
    pub fn retry(&self, attempt: u32, max: u32, step: Step, reason: &str) {
        self.pb.println(format!(
            "  {} Retry {attempt}/{max} from Step {}: {reason}",
            self.yellow.apply_to("↻"),
            step.number()
        ));
        self.pb
            .set_message(format!("Resuming at Step {}: {}", step.number(), step.title()));
    }

    /// Finaliza o spinner e imprime uma linha por etapa.
    pub fn complete(&self, state: &WorkflowState) {
        self.pb.finish_and_clear();
        for step in Step::ALL {
            let label = format!("Step {}: {}", step.number(), step.title());
            match StepMark::of(state, step) {
                StepMark::Done => println!("  {} {label}", self.green.apply_to("✓")),
                StepMark::Failed => println!("  {} {label}", self.red.apply_to("✗")),
                StepMark::Pending => println!("  {} {label}", self.dim.apply_to("·")),
            }
        }
        if let Some(error) = &state.error {
            println!("  {}", self.red.apply_to(error));
        }
    }

    /// Imprime o relatório final: JSON completo ou o relatório legível da etapa 3.
    pub fn print_report(&self, report: &WorkflowReport, as_json: bool) {
        println!();
        if as_json {
            println!(
                "{}",
                serde_json::to_string_pretty(report).unwrap_or_default()
            );
            return;
        }

        let readable = report
            .step3_result
            .as_ref()
            .and_then(|r| r.get("human_readable_report"))
            .and_then(|r| r.as_str());
        match (readable, &report.error) {
            (Some(text), _) => println!("{text}"),
            (None, Some(error)) => println!("{}", self.red.apply_to(error)),
            (None, None) => println!("{}", self.yellow.apply_to("No report produced")),
        }
    }
}
