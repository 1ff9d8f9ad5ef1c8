pub mod checkpoint;
pub mod format;
pub mod project;
pub mod ranking;
pub mod retention;
pub mod search;
pub mod stats;
pub mod store;
pub mod types;

use rusqlite::types::ToSql;

/// `?1, ?2, ..., ?n` for a parameterized `IN (...)` list.
pub(crate) fn sql_placeholders(n: usize) -> String {
    (1..=n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Borrow ids as positional SQL parameters.
pub(crate) fn id_params(ids: &[i64]) -> Vec<&dyn ToSql> {
    ids.iter().map(|id| id as &dyn ToSql).collect()
}
