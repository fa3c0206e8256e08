// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CHECKPOINTS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// session id → último snapshot completo do estado, sobrescrito a cada
// transição. Backends:
// - `LocalCheckpointStore`: um arquivo JSON por sessão
// - `InMemoryCheckpointStore`: testes e execuções efêmeras
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

use super::state::ResearchState;

/// Erros de persistência de checkpoint
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),
}

/// Armazenamento de snapshots por sessão
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Nome do backend
    fn name(&self) -> &'static str;

    /// Sobrescreve o snapshot da sessão
    async fn save(&self, session_id: &str, state: &ResearchState) -> Result<(), CheckpointError>;

    /// Último snapshot da sessão, se existir
    async fn load(&self, session_id: &str) -> Result<Option<ResearchState>, CheckpointError>;
}

fn validate_session_id(session_id: &str) -> Result<(), CheckpointError> {
    let valid = !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CheckpointError::InvalidSessionId(session_id.to_string()))
    }
}

/// Um arquivo `{dir}/{session_id}.json` por sessão
pub struct LocalCheckpointStore {
    dir: PathBuf,
}

impl LocalCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }
}

#[async_trait]
impl CheckpointStore for LocalCheckpointStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn save(&self, session_id: &str, state: &ResearchState) -> Result<(), CheckpointError> {
        validate_session_id(session_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let json = serde_json::to_vec_pretty(state)?;
        let path = self.path_for(session_id);
        let tmp = path.with_extension("json.tmp");

        // rename atômico: um leitor nunca vê snapshot pela metade
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        log::debug!("💾 Checkpoint salvo: {}", path.display());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<ResearchState>, CheckpointError> {
        validate_session_id(session_id)?;
        let path = self.path_for(session_id);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

/// Checkpoints em memória
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    snapshots: RwLock<HashMap<String, ResearchState>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn save(&self, session_id: &str, state: &ResearchState) -> Result<(), CheckpointError> {
        validate_session_id(session_id)?;
        self.snapshots
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id.to_string(), state.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<ResearchState>, CheckpointError> {
        validate_session_id(session_id)?;
        Ok(self
            .snapshots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Constraints;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("gauntlet-{}-{}", name, uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_local_store_overwrites_snapshot() {
        let dir = temp_dir("ckpt");
        let store = LocalCheckpointStore::new(&dir);
        let mut state = ResearchState::new("topic", Constraints::new()).with_session_id("s-1");

        store.save("s-1", &state).await.unwrap();
        state.iteration_count = 2;
        store.save("s-1", &state).await.unwrap();

        let loaded = store.load("s-1").await.unwrap().unwrap();
        assert_eq!(loaded.iteration_count, 2);
        assert!(store.load("other").await.unwrap().is_none());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_rejects_path_like_session_ids() {
        let store = LocalCheckpointStore::new(temp_dir("bad"));
        let state = ResearchState::new("t", Constraints::new());
        assert!(matches!(
            store.save("../escape", &state).await,
            Err(CheckpointError::InvalidSessionId(_))
        ));
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryCheckpointStore::new();
        let state = ResearchState::new("t", Constraints::new());
        tokio_test::block_on(store.save(&state.session_id, &state)).unwrap();
        assert_eq!(store.len(), 1);
        let loaded = tokio_test::block_on(store.load(&state.session_id)).unwrap();
        assert_eq!(loaded, Some(state));
    }
}
