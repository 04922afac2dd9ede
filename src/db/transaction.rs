//! Unit-of-work helper over sea-orm transactions.

use crate::errors::ServiceError;
use sea_orm::{DatabaseTransaction, TransactionError, TransactionTrait};
use std::future::Future;
use std::pin::Pin;

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute a function within a database transaction.
///
/// Commits when the callback returns `Ok`, rolls back on any error. The callback's
/// `ServiceError` is returned unchanged, so business failures raised mid-transaction
/// (e.g. `AlreadyPaid`) reach the caller with their original variant.
///
/// ```rust,ignore
/// let order = with_transaction(&db, |txn| {
///     Box::pin(async move {
///         let order = order_active.insert(txn).await?;
///         for item in items {
///             item.insert(txn).await?;
///         }
///         Ok(order)
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<C, F, T>(db: &C, f: F) -> Result<T, ServiceError>
where
    C: TransactionTrait,
    F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, ServiceError>> + Send,
    T: Send,
{
    db.transaction::<_, T, ServiceError>(f)
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
            TransactionError::Transaction(service_err) => service_err,
        })
}
