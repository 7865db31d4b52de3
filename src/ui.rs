//! Renderização no terminal do progresso e do resultado dos jobs.
//!
//! Usa `indicatif` para a barra de progresso e `console` para saída colorida.
//! O [`ProgressRenderer`] acompanha um [`Progress`] pela sua lista de
//! assinantes, então a barra avança na thread que executa o trabalho.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::JobResult;
use crate::progress::{Progress, ProgressSnapshot};
use crate::state_machine::{JobReport, StatusKind};

/// Desenha um [`Progress`] como barra de progresso no terminal.
pub struct ProgressRenderer {
    // Barra de progresso do indicatif.
    pb: ProgressBar,
    // Estilos para sucesso, falha e estados intermediários.
    green: Style,
    red: Style,
    yellow: Style,
}

impl ProgressRenderer {
    /// Cria uma nova barra em stderr acompanhando `progress`.
    pub fn attach(progress: &Progress) -> Self {
        let pb = ProgressBar::new(u64::from(progress.max_steps()));
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        Self::attach_to(progress, pb)
    }

    /// Acompanha `progress` numa barra fornecida pelo chamador (ex.: `ProgressBar::hidden()`).
    pub fn attach_to(progress: &Progress, pb: ProgressBar) -> Self {
        apply(&pb, &progress.snapshot());
        let bar = pb.clone();
        progress.subscribe(move |snapshot| apply(&bar, snapshot));
        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Retorna a barra subjacente.
    pub fn bar(&self) -> &ProgressBar {
        &self.pb
    }

    /// Finaliza a barra e imprime o resultado do job.
    ///
    /// Sucesso é mostrado em verde com checkmark; falha em vermelho com X.
    pub fn complete<T>(&self, result: &JobResult<T>) {
        self.pb.finish_and_clear();
        self.pb.println(self.outcome_line(result));
    }

    fn outcome_line<T>(&self, result: &JobResult<T>) -> String {
        match result {
            Ok(_) => format!("  {} Job completed successfully", self.green.apply_to("✓")),
            Err(err) => format!("  {} Job failed: {err}", self.red.apply_to("✗")),
        }
    }

    /// Imprime o relatório do job como JSON formatado, colorido pelo status final.
    pub fn print_report(&self, report: &JobReport) {
        let style = match (report.status, report.succeeded()) {
            (_, true) => &self.green,
            (StatusKind::Done | StatusKind::DoneWithResult, false) => &self.red,
            _ => &self.yellow,
        };
        self.pb.println(format!("{}", style.apply_to("─── Job Report ───")));
        self.pb
            .println(serde_json::to_string_pretty(report).unwrap_or_default());
    }
}

// Copia o snapshot para a barra: posição, tamanho e mensagem com ETA.
fn apply(pb: &ProgressBar, snapshot: &ProgressSnapshot) {
    pb.set_length(u64::from(snapshot.max_steps));
    pb.set_position(u64::from(snapshot.steps));
    let mut msg = snapshot.status.clone().unwrap_or_default();
    if let Some(eta) = snapshot.eta {
        if !msg.is_empty() {
            msg.push(' ');
        }
        msg.push_str(&format!("(eta {}s)", eta.as_secs()));
    }
    pb.set_message(msg);
}
