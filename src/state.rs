use std::sync::Arc;

use crate::{
    db::{DbPool, OrmConn},
    push::PushTransport,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub push: Arc<dyn PushTransport>,
}

impl AppState {
    pub fn new(pool: DbPool, orm: OrmConn, push: Arc<dyn PushTransport>) -> Self {
        Self { pool, orm, push }
    }
}
