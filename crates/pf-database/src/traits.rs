/// Table metadata and DDL generation for a persisted entity.
///
/// `creates()` must be idempotent (`CREATE TABLE IF NOT EXISTS`) so bootstrap
/// can run on every startup; `indices()` likewise.
pub trait Schema {
    fn name() -> &'static str;
    fn creates() -> &'static str;
    fn indices() -> &'static str {
        ""
    }
}
