//! Instrument registry (spec §4.3.2, §9 "single registry object").
//!
//! Symbol↔InstrumentId and venue-token↔InstrumentId mappings, touched only
//! off the hot path (subscribe/unsubscribe time). Grounded in the
//! teacher's `parking_lot::RwLock`-guarded maps in `edge/client.rs`: one
//! lock, explicit operations, never touched on a per-tick path — the hot
//! path only ever carries the resolved `InstrumentId`.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::types::InstrumentId;

#[derive(Default)]
struct Tables {
    symbol_to_id: HashMap<String, InstrumentId>,
    id_to_symbol: HashMap<InstrumentId, String>,
    token_to_id: HashMap<u64, InstrumentId>,
    id_to_token: HashMap<InstrumentId, u64>,
}

pub struct InstrumentRegistry {
    tables: RwLock<Tables>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Register a venue symbol (and optional venue-native numeric token)
    /// under a dense `InstrumentId`. Idempotent: re-registering the same
    /// symbol with the same id is a no-op.
    pub fn register(&self, symbol: &str, venue_token: Option<u64>, id: InstrumentId) {
        let mut t = self.tables.write();
        t.symbol_to_id.insert(symbol.to_string(), id);
        t.id_to_symbol.insert(id, symbol.to_string());
        if let Some(tok) = venue_token {
            t.token_to_id.insert(tok, id);
            t.id_to_token.insert(id, tok);
        }
    }

    pub fn instrument_id_for_symbol(&self, symbol: &str) -> Option<InstrumentId> {
        self.tables.read().symbol_to_id.get(symbol).copied()
    }

    pub fn instrument_id_for_token(&self, token: u64) -> Option<InstrumentId> {
        self.tables.read().token_to_id.get(&token).copied()
    }

    pub fn symbol_for_instrument(&self, id: InstrumentId) -> Option<String> {
        self.tables.read().id_to_symbol.get(&id).cloned()
    }

    pub fn token_for_instrument(&self, id: InstrumentId) -> Option<u64> {
        self.tables.read().id_to_token.get(&id).copied()
    }

    pub fn is_registered(&self, id: InstrumentId) -> bool {
        self.tables.read().id_to_symbol.contains_key(&id)
    }
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
