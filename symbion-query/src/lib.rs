//! Typed boundary to the remote management-query service
//!
//! Everything the poller knows about the query transport lives here:
//! - `QueryService`: the async collaborator that executes a statement on a host
//! - `Row` / `Value`: the loosely typed rows the transport hands back
//! - `FromRow`: decoding of a row into an explicit, immutable row struct
//! - `TransportError` / `DecodeError`: the two failure families at this boundary
//!
//! Untyped rows never travel past this crate: callers go through
//! [`QueryServiceExt::fetch_all`] / [`QueryServiceExt::fetch_first`] and get
//! their own row structs back.

mod cim;
mod error;
mod row;

pub use cim::parse_cim_datetime;
pub use error::{DecodeError, TransportError};
pub use row::{Row, Value};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Namespace used when a query does not name one.
pub const DEFAULT_NAMESPACE: &str = r"root\cimv2";

/// Namespace holding the network teaming (LBFO) classes.
pub const STANDARD_CIMV2_NAMESPACE: &str = r"root\standardcimv2";

/// Remote, schema-typed query interface of a managed host.
///
/// Implementations own connection, authentication and timeouts. A statement
/// referencing a class the host does not support fails like any other
/// transport problem.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Run `statement` against `endpoint`, in `namespace` or [`DEFAULT_NAMESPACE`].
    async fn query(
        &self,
        endpoint: &str,
        statement: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<Row>, TransportError>;
}

#[async_trait]
impl<T: QueryService + ?Sized> QueryService for Arc<T> {
    async fn query(
        &self,
        endpoint: &str,
        statement: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<Row>, TransportError> {
        (**self).query(endpoint, statement, namespace).await
    }
}

/// Decodes a raw row into a named row shape.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self, DecodeError>;
}

/// Typed fetch helpers available on every [`QueryService`].
#[async_trait]
pub trait QueryServiceExt: QueryService {
    /// All decodable rows of `statement`; rows that fail to decode are skipped.
    async fn fetch_all<T: FromRow + Send + 'static>(
        &self,
        endpoint: &str,
        statement: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<T>, TransportError> {
        let rows = self.query(endpoint, statement, namespace).await?;
        Ok(decode_rows(statement, &rows))
    }

    /// First row of `statement` that decodes; undecodable leading rows are skipped.
    async fn fetch_first<T: FromRow + Send + 'static>(
        &self,
        endpoint: &str,
        statement: &str,
        namespace: Option<&str>,
    ) -> Result<Option<T>, TransportError> {
        let rows = self.query(endpoint, statement, namespace).await?;
        Ok(rows.iter().find_map(|row| decode_one(statement, row)))
    }
}

impl<Q: QueryService + ?Sized> QueryServiceExt for Q {}

/// Decode every row, dropping the ones that do not fit `T`.
pub fn decode_rows<T: FromRow>(statement: &str, rows: &[Row]) -> Vec<T> {
    rows.iter().filter_map(|row| decode_one(statement, row)).collect()
}

fn decode_one<T: FromRow>(statement: &str, row: &Row) -> Option<T> {
    match T::from_row(row) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            debug!("Skipping row of '{}': {}", first_line(statement), e);
            None
        }
    }
}

fn first_line(statement: &str) -> &str {
    statement.trim().lines().next().unwrap_or_default()
}
