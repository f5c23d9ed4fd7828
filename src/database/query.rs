use rusqlite::{types::Value, Row};
use std::collections::BTreeMap;
use std::fmt;

pub type RowCallback<'a> = Box<dyn FnMut(&Row<'_>) -> rusqlite::Result<()> + 'a>;

/// A named, parameterized unit of work for [`Database::run_query`].
///
/// Without a row callback the caller only learns whether the statement
/// succeeded; rows are still stepped through so the statement runs to
/// completion.
///
/// [`Database::run_query`]: super::Database::run_query
pub struct Query<'a> {
    pub name: &'static str,
    pub sql: String,
    /// Selects a read-write connection instead of a read-only one.
    pub performs_update: bool,
    /// Named parameters, keys include their `:` prefix.
    pub named: BTreeMap<&'static str, Value>,
    pub on_row: Option<RowCallback<'a>>,
}

impl<'a> Query<'a> {
    /// A read-only query with no parameters and no row callback.
    pub fn new<S: Into<String>>(name: &'static str, sql: S) -> Self {
        Query {
            name,
            sql: sql.into(),
            performs_update: false,
            named: BTreeMap::new(),
            on_row: None,
        }
    }

    pub fn performs_update(mut self) -> Self {
        self.performs_update = true;
        self
    }

    pub fn bind<V: Into<Value>>(mut self, key: &'static str, value: V) -> Self {
        self.named.insert(key, value.into());
        self
    }

    pub fn on_row<F>(mut self, on_row: F) -> Self
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<()> + 'a,
    {
        self.on_row = Some(Box::new(on_row));
        self
    }
}

impl fmt::Display for Query<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query {} {}", self.name, self.sql)
    }
}

impl fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("name", &self.name)
            .field("sql", &self.sql)
            .field("performs_update", &self.performs_update)
            .field("named", &self.named)
            .field("on_row", &self.on_row.is_some())
            .finish()
    }
}
