//! Execution port
//!
//! Runs one named, parameterized query against a pooled connection and
//! returns its rows. Every attempt borrows its own connection and returns
//! it on every exit path, including cancellation: connections are RAII
//! guards released on drop.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::error::QueryError;
use super::retry::RetryPolicy;
use super::row::{Param, Row};

/// A catalog query: a stable name plus SQL text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Stable name used for logging and routing, e.g. `budgets.team`
    pub name: Cow<'static, str>,
    /// SQL text with positional `$n` placeholders
    pub sql: Cow<'static, str>,
}

impl Query {
    pub const fn fixed(name: &'static str, sql: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            sql: Cow::Borrowed(sql),
        }
    }

    pub fn dynamic(name: impl Into<Cow<'static, str>>, sql: String) -> Self {
        Self {
            name: name.into(),
            sql: Cow::Owned(sql),
        }
    }
}

/// Anything that can execute catalog queries
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &Query, params: &[Param]) -> Result<Vec<Row>, QueryError>;
}

#[async_trait]
impl<T: QueryExecutor + ?Sized> QueryExecutor for Arc<T> {
    async fn execute(&self, query: &Query, params: &[Param]) -> Result<Vec<Row>, QueryError> {
        (**self).execute(query, params).await
    }
}

/// A borrowed connection; dropping it returns it to the pool
#[async_trait]
pub trait PooledConnection: Send {
    async fn fetch_all(&mut self, sql: &str, params: &[Param]) -> Result<Vec<Row>, QueryError>;
}

/// Bounded pool of connections
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    type Connection: PooledConnection;

    async fn acquire(&self) -> Result<Self::Connection, QueryError>;
}

/// Pool-backed executor with a per-call retry policy
pub struct ExecutionPort<S> {
    source: S,
    retry: RetryPolicy,
}

impl<S: ConnectionSource> ExecutionPort<S> {
    pub fn new(source: S, retry: RetryPolicy) -> Self {
        Self { source, retry }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    async fn attempt(&self, query: &Query, params: &[Param]) -> Result<Vec<Row>, QueryError> {
        let mut conn = self.source.acquire().await?;
        conn.fetch_all(&query.sql, params).await
        // conn dropped here: released on success and on error alike
    }
}

#[async_trait]
impl<S: ConnectionSource> QueryExecutor for ExecutionPort<S> {
    #[instrument(skip(self, query, params), fields(query = %query.name))]
    async fn execute(&self, query: &Query, params: &[Param]) -> Result<Vec<Row>, QueryError> {
        let rows = self
            .retry
            .run(&query.name, |_| self.attempt(query, params))
            .await?;
        debug!(rows = rows.len(), "Query executed");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Source that counts acquisitions and releases
    #[derive(Default)]
    struct CountingSource {
        acquired: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
        script: parking_lot::Mutex<VecDeque<Step>>,
    }

    #[derive(Clone, Copy)]
    enum Step {
        AcquireFails,
        QueryFails,
        QueryHangs,
        Ok,
    }

    struct CountingConnection {
        released: Arc<AtomicUsize>,
        step: Step,
    }

    impl Drop for CountingConnection {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl PooledConnection for CountingConnection {
        async fn fetch_all(&mut self, _sql: &str, _params: &[Param]) -> Result<Vec<Row>, QueryError> {
            match self.step {
                Step::QueryFails => Err(QueryError::Database {
                    code: Some("55P03".into()),
                    message: "lock not available".into(),
                }),
                Step::QueryHangs => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                _ => Ok(vec![Row::new().with("exists", true)]),
            }
        }
    }

    #[async_trait]
    impl ConnectionSource for CountingSource {
        type Connection = CountingConnection;

        async fn acquire(&self) -> Result<CountingConnection, QueryError> {
            let step = self.script.lock().pop_front().unwrap_or(Step::Ok);
            if let Step::AcquireFails = step {
                return Err(QueryError::Timeout("pool exhausted".into()));
            }
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(CountingConnection {
                released: self.released.clone(),
                step,
            })
        }
    }

    fn port(steps: &[Step]) -> ExecutionPort<CountingSource> {
        let source = CountingSource::default();
        source.script.lock().extend(steps.iter().copied());
        ExecutionPort::new(
            source,
            RetryPolicy::new(5, Duration::from_millis(10), Duration::from_millis(100), 2.0),
        )
    }

    const PING: Query = Query::fixed("ping", "SELECT true AS exists");

    #[tokio::test(start_paused = true)]
    async fn test_acquire_release_balanced_across_failures() {
        let port = port(&[
            Step::QueryFails,
            Step::AcquireFails,
            Step::Ok,
            Step::QueryFails,
            Step::QueryFails,
            Step::QueryFails,
            Step::QueryFails,
            Step::QueryFails,
            Step::Ok,
        ]);

        // recovers on the third attempt
        assert!(port.execute(&PING, &[]).await.is_ok());
        // five failing attempts exhaust the policy
        assert!(matches!(
            port.execute(&PING, &[]).await,
            Err(QueryError::RetriesExhausted { attempts: 5, .. })
        ));
        assert!(port.execute(&PING, &[]).await.is_ok());

        let acquired = port.source().acquired.load(Ordering::SeqCst);
        let released = port.source().released.load(Ordering::SeqCst);
        assert_eq!(acquired, 8);
        assert_eq!(acquired, released);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_query_releases_connection() {
        let port = port(&[Step::QueryHangs]);

        let result = tokio::time::timeout(Duration::from_secs(1), port.execute(&PING, &[])).await;

        assert!(result.is_err());
        assert_eq!(port.source().acquired.load(Ordering::SeqCst), 1);
        assert_eq!(port.source().released.load(Ordering::SeqCst), 1);
    }
}
