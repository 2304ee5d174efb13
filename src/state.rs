use std::sync::Arc;

use crate::{
    db::{DbPool, OrmConn},
    storage::FileStorage,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub storage: Arc<dyn FileStorage>,
}
