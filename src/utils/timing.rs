// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TIMING UTILITIES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Medição de duração por fase do loop.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::collections::BTreeMap;
use std::time::Instant;

/// Timer para medir duração de uma ação
pub struct ActionTimer {
    start: Instant,
    action_name: String,
}

impl ActionTimer {
    /// Inicia um novo timer
    pub fn start(action_name: &str) -> Self {
        Self {
            start: Instant::now(),
            action_name: action_name.to_string(),
        }
    }

    /// Tempo decorrido em milissegundos
    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }

    /// Para o timer e loga o tempo decorrido
    pub fn stop_and_log(self) -> u128 {
        let elapsed = self.elapsed_ms();
        log::debug!("⏱️  {} completado em {}ms", self.action_name, elapsed);
        elapsed
    }
}

/// Tempos acumulados por fase
#[derive(Debug, Clone, Default)]
pub struct PhaseTimings {
    entries: BTreeMap<String, Vec<u128>>,
}

impl PhaseTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra a duração de uma execução da fase
    pub fn record(&mut self, phase: &str, ms: u128) {
        self.entries.entry(phase.to_string()).or_default().push(ms);
    }

    /// Número de execuções registradas da fase
    pub fn count(&self, phase: &str) -> usize {
        self.entries.get(phase).map_or(0, Vec::len)
    }

    /// Média da fase (0.0 sem registros)
    pub fn avg(&self, phase: &str) -> f64 {
        match self.entries.get(phase) {
            Some(times) if !times.is_empty() => {
                times.iter().sum::<u128>() as f64 / times.len() as f64
            }
            _ => 0.0,
        }
    }

    /// Soma de todas as fases
    pub fn total_ms(&self) -> u128 {
        self.entries.values().flatten().sum()
    }

    /// Resumo de uma linha por fase
    pub fn summary(&self) -> String {
        let mut out = String::from("Timing por fase:");
        for (phase, times) in &self.entries {
            out.push_str(&format!(
                "\n - {}: {}x, média {:.1}ms, total {}ms",
                phase,
                times.len(),
                self.avg(phase),
                times.iter().sum::<u128>()
            ));
        }
        out.push_str(&format!("\n - Total: {}ms", self.total_ms()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_action_timer() {
        let timer = ActionTimer::start("test");
        sleep(Duration::from_millis(10));
        assert!(timer.stop_and_log() >= 10);
    }

    #[test]
    fn test_phase_timings() {
        let mut timings = PhaseTimings::new();
        timings.record("planning", 100);
        timings.record("planning", 200);
        timings.record("synthesis", 50);

        assert_eq!(timings.count("planning"), 2);
        assert_eq!(timings.avg("planning"), 150.0);
        assert_eq!(timings.avg("missing"), 0.0);
        assert_eq!(timings.total_ms(), 350);
        assert!(timings.summary().contains("synthesis: 1x"));
    }
}
