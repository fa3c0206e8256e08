// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TOKEN TRACKER
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Contabiliza uso de tokens por chave `role:model`.
// Compartilhado entre os ramos de descoberta (Mutex interno); o driver do
// loop drena o delta após cada transição e o soma ao estado.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::types::UsageTotals;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Mapa de uso por chave `role:model`
pub type UsageMap = BTreeMap<String, UsageTotals>;

/// Monta a chave de uso
pub fn usage_key(role: &str, model: &str) -> String {
    format!("{}:{}", role, model)
}

/// Soma `delta` em `target` (merge aditivo)
pub fn merge_usage(target: &mut UsageMap, delta: &UsageMap) {
    for (key, usage) in delta {
        target.entry(key.clone()).or_default().add(usage);
    }
}

/// Tracker de uso de tokens
#[derive(Debug, Default)]
pub struct TokenTracker {
    inner: Mutex<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    /// Totais desde a criação
    totals: UsageMap,
    /// Uso ainda não drenado pelo loop
    pending: UsageMap,
    /// Número de chamadas registradas
    calls: u64,
}

impl TokenTracker {
    /// Cria tracker vazio
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registra uma chamada
    pub fn record(&self, role: &str, model: &str, input: u64, output: u64) {
        let usage = UsageTotals::new(input, output);
        let key = usage_key(role, model);

        let mut inner = self.lock();
        inner.totals.entry(key.clone()).or_default().add(&usage);
        inner.pending.entry(key.clone()).or_default().add(&usage);
        inner.calls += 1;

        log::debug!("Token usage [{}]: {} + {} = {}", key, input, output, usage.total);
    }

    /// Totais acumulados
    pub fn snapshot(&self) -> UsageMap {
        self.lock().totals.clone()
    }

    /// Drena o uso registrado desde a última drenagem
    pub fn take_delta(&self) -> UsageMap {
        std::mem::take(&mut self.lock().pending)
    }

    /// Estatísticas agregadas
    pub fn stats(&self) -> TrackerStats {
        let inner = self.lock();
        let mut total = UsageTotals::default();
        for usage in inner.totals.values() {
            total.add(usage);
        }
        TrackerStats {
            calls: inner.calls,
            keys: inner.totals.len(),
            input_tokens: total.input,
            output_tokens: total.output,
            total_tokens: total.total,
        }
    }
}

/// Estatísticas do tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerStats {
    pub calls: u64,
    pub keys: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}
