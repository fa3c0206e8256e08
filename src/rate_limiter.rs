// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RATE LIMITER
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Espaçamento mínimo entre chamadas de descoberta, compartilhado pelos ramos
// web e acadêmico e por todas as iterações.
//
// A reserva acontece sob o mutex (calcula o slot e avança `next_available`);
// a espera acontece fora dele. Dois slots concedidos nunca ficam a menos de
// `interval` um do outro, e a reserva nunca falha.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Limitador de taxa por intervalo fixo.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_available: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Cria limitador com o intervalo mínimo entre chamadas
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_available: Mutex::new(None),
        }
    }

    /// Intervalo configurado
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Reserva o próximo slot e devolve o instante concedido.
    fn claim(&self) -> Instant {
        let now = Instant::now();
        let mut next = self
            .next_available
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let slot = match *next {
            Some(at) if at > now => at,
            _ => now,
        };
        *next = Some(slot + self.interval);
        slot
    }

    /// Aguarda (async) até o slot reservado.
    pub async fn reserve(&self) -> Instant {
        let slot = self.claim();
        if slot > Instant::now() {
            log::debug!("⏳ Rate limit: aguardando {:?}", slot - Instant::now());
            tokio::time::sleep_until(slot).await;
        }
        slot
    }

    /// Aguarda bloqueando a thread atual até o slot reservado.
    pub fn reserve_blocking(&self) -> Instant {
        let slot = self.claim();
        let now = Instant::now();
        if slot > now {
            std::thread::sleep(slot - now);
        }
        slot
    }
}
