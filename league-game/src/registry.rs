//! A small in-process registry mapping `game_type` to its adapter,
//! populated once at startup from the fixed list named in `Config::game_registry`
//! (SPEC_FULL.md §6) — there is no dynamic plugin loading (spec §1 Non-goals).

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::GameAdapter;
use crate::tic_tac_toe::TicTacToeAdapter;

pub struct GameRegistry {
    adapters: HashMap<String, Arc<dyn GameAdapter>>,
    default_game_type: String,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            default_game_type: String::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn GameAdapter>) {
        let game_type = adapter.game_type().to_string();
        if self.adapters.is_empty() {
            self.default_game_type = game_type.clone();
        }
        self.adapters.insert(game_type, adapter);
    }

    pub fn get(&self, game_type: &str) -> Option<Arc<dyn GameAdapter>> {
        self.adapters.get(game_type).cloned()
    }

    /// The `game_type` the scheduler assigns when generating a schedule
    /// (spec §4.3). This spec ships a single reference game, so it is
    /// simply the first one registered.
    pub fn default_game_type(&self) -> &str {
        &self.default_game_type
    }

    /// The registry shipped by this spec: Tic-Tac-Toe only (spec §4.6).
    pub fn with_reference_games() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TicTacToeAdapter));
        registry
    }
}

impl Default for GameRegistry {
    fn default() -> Self {
        Self::with_reference_games()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_registry_knows_tic_tac_toe() {
        let registry = GameRegistry::with_reference_games();
        assert!(registry.get("tic_tac_toe").is_some());
        assert!(registry.get("chess").is_none());
    }
}
