use crate::db::{Database, DbError, Statement};
use async_trait::async_trait;

/// A database handle that accepts every statement and stores nothing.
///
/// Useful for measuring the overhead of the handler itself without any
/// external I/O, and for tests that don't care about persistence.
#[derive(Clone, Debug, Default)]
pub struct NoopDatabase;

#[async_trait]
impl Database for NoopDatabase {
    async fn execute(&self, _statement: &Statement) -> Result<(), DbError> {
        Ok(())
    }
}
