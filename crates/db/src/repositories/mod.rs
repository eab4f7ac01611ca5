//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument and return `sqlx::Error`.

pub mod connection_repo;
pub mod data_repo;
pub mod log_repo;
pub mod mapping_repo;
pub mod media_file_repo;
pub mod reference_repo;
pub mod run_repo;

pub use connection_repo::ConnectionRepo;
pub use data_repo::DataRepo;
pub use log_repo::LogRepo;
pub use mapping_repo::MappingRepo;
pub use media_file_repo::MediaFileRepo;
pub use reference_repo::ReferenceRepo;
pub use run_repo::RunRepo;

/// Postgres accepts at most this many bind parameters per statement.
const MAX_BIND_PARAMS: usize = 65_535;

/// Rows per multi-row INSERT for a table with `columns` bound columns.
pub(crate) fn rows_per_insert(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).min(1000)
}

/// `($1, $2, ..), ($n, ..)` for `rows` rows of `columns` parameters each.
pub(crate) fn values_placeholders(rows: usize, columns: usize) -> String {
    let mut clause = String::new();
    let mut param_idx = 1usize;

    for row in 0..rows {
        if row > 0 {
            clause.push_str(", ");
        }
        clause.push('(');
        for col in 0..columns {
            if col > 0 {
                clause.push_str(", ");
            }
            clause.push_str(&format!("${param_idx}"));
            param_idx += 1;
        }
        clause.push(')');
    }

    clause
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_numbered_across_rows() {
        assert_eq!(values_placeholders(2, 3), "($1, $2, $3), ($4, $5, $6)");
        assert_eq!(values_placeholders(0, 3), "");
    }

    #[test]
    fn chunk_size_stays_under_bind_limit() {
        assert_eq!(rows_per_insert(7), 1000);
        assert!(rows_per_insert(100) * 100 <= MAX_BIND_PARAMS);
    }
}
