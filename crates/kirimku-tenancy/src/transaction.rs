// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transaction runner.
//!
//! Runs a unit of work inside one transaction on the pool chosen for a
//! tenant. The transaction is committed when the work returns `Ok`, rolled
//! back when it returns `Err`, and rolled back before the panic is resumed
//! when the work panics.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{error, warn};

use crate::context::TenantContext;
use crate::error::DbError;
use crate::manager::ConnectionManager;
use crate::pool::{ManagedPool, PoolConnector, TxControl};

/// Run `work` in a transaction on the pool serving `tenant`.
///
/// ```ignore
/// let inserted = run_in_tx(&manager, Some(&tenant), |tx| {
///     Box::pin(async move {
///         sqlx::query("INSERT INTO notes (body) VALUES ($1)")
///             .bind("hello")
///             .execute(&mut **tx)
///             .await
///             .map_err(DbError::from)
///     })
/// })
/// .await?;
/// ```
pub async fn run_in_tx<C, T, E, F>(
    manager: &ConnectionManager<C>,
    tenant: Option<&TenantContext>,
    work: F,
) -> Result<T, E>
where
    C: PoolConnector,
    E: From<DbError>,
    F: for<'t> FnOnce(&'t mut <C::Pool as ManagedPool>::Tx) -> BoxFuture<'t, Result<T, E>>,
{
    let handle = manager.get_connection(tenant).await?;
    run_on_pool(handle.pool(), work).await
}

/// Run `work` in a transaction on `pool`.
pub async fn run_on_pool<P, T, E, F>(pool: &P, work: F) -> Result<T, E>
where
    P: ManagedPool,
    E: From<DbError>,
    F: for<'t> FnOnce(&'t mut P::Tx) -> BoxFuture<'t, Result<T, E>>,
{
    let mut tx = pool.begin().await?;

    // The closure itself may panic before handing back its future.
    let tx_ref = &mut tx;
    let outcome = match std::panic::catch_unwind(AssertUnwindSafe(move || work(tx_ref))) {
        Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
        Err(panic) => Err(panic),
    };

    match outcome {
        Ok(Ok(value)) => {
            tx.commit().await?;
            Ok(value)
        }
        Ok(Err(e)) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback after failed transaction failed");
            }
            Err(e)
        }
        Err(panic) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback after panic failed");
            }
            error!(panic = %panic_message(&*panic), "Transaction work panicked, rolled back");
            std::panic::resume_unwind(panic)
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*boxed), "bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }
}
