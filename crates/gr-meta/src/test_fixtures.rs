//! Fixtures shared by the unit tests.

use crate::registry::{resolve_or_create, SeriesAttributes};
use crate::runs::open;
use crate::sources::register_source;
use crate::MetaDb;
use chrono::{DateTime, TimeZone, Utc};
use gr_core::{AgentId, JobKind, LocalKey, SourceCode};

pub(crate) fn wasde() -> SourceCode {
    SourceCode::new("wasde")
}

/// In-memory store with the `wasde` source registered.
pub(crate) fn open_db() -> MetaDb {
    let db = MetaDb::open_memory().unwrap();
    register_source(&db, &wasde(), "World Agricultural Supply and Demand Estimates", None)
        .unwrap();
    db
}

pub(crate) fn open_run(db: &MetaDb) -> i64 {
    open(
        db,
        &wasde(),
        &JobKind::new("monthly_report"),
        &AgentId::new("collector-1"),
        None,
    )
    .unwrap()
}

pub(crate) fn corn_entity(db: &MetaDb) -> i64 {
    resolve_or_create(
        db,
        &wasde(),
        &LocalKey::new("corn.us.production"),
        &SeriesAttributes::named("US corn production").with_unit("million bushels"),
    )
    .unwrap()
}

/// Marketing year 2024/25 start.
pub(crate) fn my_2024() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap()
}

pub(crate) fn count(db: &MetaDb, sql: &str) -> i64 {
    db.conn()
        .query_row(sql, [], |row| row.get::<_, i64>(0))
        .unwrap()
}
