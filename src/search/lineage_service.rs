//! `lineage(mrn, depth)` read path (§4.3, C1), thin wrapper over the
//! store-level traversal that enforces the request-side depth bound.

use crate::error::Error;
use crate::model::{LineageGraph, Mrn};
use crate::store::lineage::{LineageStore, MAX_DEPTH};

pub struct LineageService<'a> {
    store: LineageStore<'a>,
}

impl<'a> LineageService<'a> {
    pub fn new(pool: &'a sqlx::PgPool) -> Self {
        LineageService {
            store: LineageStore::new(pool),
        }
    }

    pub async fn lineage(&self, mrn: &Mrn, depth: u32) -> Result<LineageGraph, Error> {
        if depth == 0 {
            return Err(Error::validation("depth", "must be at least 1"));
        }
        self.store.traverse(mrn, depth.min(MAX_DEPTH)).await
    }
}
