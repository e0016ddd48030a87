//! Retry classification for PostgreSQL errors.

use metrond_common::classify::is_retriable_io;
use metrond_common::retry::Classification;
use sea_orm::{DbErr, RuntimeErr};

/// Classifies a database error for the retry engine.
///
/// Connection failures (SQLSTATE class 08), transaction rollbacks (40000,
/// serialization failure 40001, deadlock 40P01) and cannot-connect-now
/// (57P03) are retriable, as are transient socket errors surfaced below the
/// driver. Data (22*), integrity (23*) and syntax/access (42*) errors are
/// permanent.
pub fn classify_db(err: &DbErr) -> Classification {
    if let Some(code) = sqlstate(err) {
        return classify_sqlstate(&code);
    }
    if is_retriable_io(err) {
        Classification::Retriable
    } else {
        Classification::NonRetriable
    }
}

fn sqlstate(err: &DbErr) -> Option<String> {
    let runtime = match err {
        DbErr::Conn(e) | DbErr::Exec(e) | DbErr::Query(e) => e,
        _ => return None,
    };
    match runtime {
        RuntimeErr::SqlxError(sqlx_err) => sqlx_err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code.to_string()),
        _ => None,
    }
}

pub(crate) fn classify_sqlstate(code: &str) -> Classification {
    if code.starts_with("08") {
        return Classification::Retriable;
    }
    match code {
        "40000" | "40001" | "40P01" | "57P03" => Classification::Retriable,
        _ => Classification::NonRetriable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_and_rollback_classes_are_retriable() {
        for code in ["08000", "08006", "08003", "40000", "40001", "40P01", "57P03"] {
            assert_eq!(classify_sqlstate(code), Classification::Retriable, "{code}");
        }
    }

    #[test]
    fn data_integrity_and_syntax_classes_are_permanent() {
        for code in ["22000", "22004", "23505", "23503", "42601", "42P01"] {
            assert_eq!(
                classify_sqlstate(code),
                Classification::NonRetriable,
                "{code}"
            );
        }
    }

    #[test]
    fn custom_errors_without_sqlstate_are_permanent() {
        let err = DbErr::Custom("no code here".into());
        assert_eq!(classify_db(&err), Classification::NonRetriable);
    }

    #[test]
    fn internal_runtime_errors_are_permanent() {
        let err = DbErr::Conn(RuntimeErr::Internal("pool exhausted".into()));
        assert_eq!(classify_db(&err), Classification::NonRetriable);
    }
}
