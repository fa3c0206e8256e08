// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EVENTOS E CONTROLE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Stream ordenado: um `Transition` por transição concluída, seguido de um
// evento terminal (`Report`, `Stopped` ou `Error`).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::state::{Phase, ResearchState, StateDelta};

/// Evento emitido pelo loop
#[derive(Debug, Clone)]
pub enum ResearchEvent {
    /// Uma fase terminou e seu delta foi aplicado
    Transition {
        phase: Phase,
        iteration: u32,
        delta: StateDelta,
    },
    /// Relatório final (completo ou parcial sinalizado)
    Report { final_report: String },
    /// Parada cooperativa atendida
    Stopped { iteration: u32 },
    /// Erro fatal do loop
    Error { message: String },
}

impl ResearchEvent {
    /// Nome curto para logs e UI
    pub fn name(&self) -> &'static str {
        match self {
            Self::Transition { phase, .. } => phase.as_str(),
            Self::Report { .. } => "report",
            Self::Stopped { .. } => "stopped",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Transition { .. })
    }
}

/// Callback para acompanhar o loop sem consumir o stream
pub type EventCallback = Arc<dyn Fn(&ResearchEvent) + Send + Sync>;

/// Motivo de término de uma execução
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Nenhuma pergunta pendente restou
    Converged,
    /// Teto de iterações atingido (pode ser estendido e retomado)
    CeilingReached,
    /// `stop()` solicitado; o estado é parcial
    Stopped,
    /// O estado já chegou completo
    AlreadyComplete,
}

/// Estado final + motivo
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: ResearchState,
    pub termination: Termination,
}

impl RunOutcome {
    pub fn is_partial(&self) -> bool {
        self.termination == Termination::Stopped
    }
}

/// Flag de parada compartilhável entre threads
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Solicita parada após a transição corrente
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_handle_shared_between_clones() {
        let handle = StopHandle::new();
        let clone = handle.clone();
        clone.request();
        assert!(handle.is_requested());
        handle.reset();
        assert!(!clone.is_requested());
    }

    #[test]
    fn test_event_names() {
        let event = ResearchEvent::Transition {
            phase: Phase::GapAnalysis,
            iteration: 1,
            delta: StateDelta::default(),
        };
        assert_eq!(event.name(), "gap_analysis");
        assert!(!event.is_terminal());
        assert!(ResearchEvent::Stopped { iteration: 1 }.is_terminal());
    }
}
