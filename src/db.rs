use async_trait::async_trait;
use std::error::Error;

/// Error reported by a [`Database`] implementation, passed through to the
/// caller untouched.
pub type DbError = Box<dyn Error + Send + Sync>;

/// A value bound to a named placeholder of a [`Statement`].
///
/// Placeholders use the ClickHouse `{name:Type}` syntax; `value` is the
/// textual form the server parses into `kind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub kind: &'static str,
    pub value: String,
}

impl Param {
    pub fn string(name: &'static str, value: impl Into<String>) -> Self {
        Param { name, kind: "String", value: value.into() }
    }

    /// The `{name:kind}` placeholder this parameter binds to.
    pub fn placeholder(&self) -> String {
        format!("{{{}:{}}}", self.name, self.kind)
    }
}

/// Statement text plus the parameters bound to its placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

impl Statement {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

/// Handle able to execute one parameterized statement.
///
/// Connection setup, pooling and lifecycle belong to the implementation;
/// the handler only ever calls [`Database::execute`], once per record.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute `statement`.
    ///
    /// **Returns**
    /// - `Ok(())` if the store accepted the statement.
    /// - `Err(..)` with the driver's error otherwise. The handler never
    ///   retries; the error goes back to whoever logged the record.
    async fn execute(&self, statement: &Statement) -> Result<(), DbError>;
}
