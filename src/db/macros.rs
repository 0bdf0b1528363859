//! Backend dispatch macros.
//!
//! The backend enums in [`factory`](crate::db::factory) all share the same
//! three variants; these macros expand the repetitive match arms.

/// Dispatch over the backend enums.
///
/// The first form matches a single enum value:
///
/// ```ignore
/// impl_db_dispatch!(BackendPool, pool, {
///     MySql(p) => p.size(),
///     Postgres(p) => p.size(),
///     SQLite(_) => 1,
/// });
/// ```
///
/// The second form pairs an adapter with a value of the same backend and
/// evaluates `$body` once per variant, falling back when the variants differ:
///
/// ```ignore
/// impl_db_dispatch!(self, BackendHandle, handle, |a, h| a.begin(h).await, else Err(mismatch()));
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($enum:ident, $value:expr, { $($variant:ident($p:pat) => $body:expr),+ $(,)? }) => {
        match $value {
            $(
                $crate::db::factory::$enum::$variant($p) => $body,
            )+
        }
    };
    ($adapter:expr, $enum:ident, $value:expr, |$a:ident, $v:ident| $body:expr, else $fallback:expr) => {
        match ($adapter, $value) {
            (
                $crate::db::factory::BackendAdapter::MySql($a),
                $crate::db::factory::$enum::MySql($v),
            ) => $body,
            (
                $crate::db::factory::BackendAdapter::Postgres($a),
                $crate::db::factory::$enum::Postgres($v),
            ) => $body,
            (
                $crate::db::factory::BackendAdapter::SQLite($a),
                $crate::db::factory::$enum::SQLite($v),
            ) => $body,
            #[allow(unreachable_patterns)]
            _ => $fallback,
        }
    };
}

pub use impl_db_dispatch;
