/*!
# Symbion DevKit - stubs and fixtures for poller development

Library for developing and testing the poller without a managed host:
- Scripted `QueryService` stub that records every query
- Row fixtures shaped like the management classes the poller reads
- `HostFixture` to script a complete host in one call
*/

pub mod fixtures;
pub mod query_stub;

pub use fixtures::{adapter, AdapterFixture, HostFixture};
pub use query_stub::{FailureKind, RecordedQuery, ScriptedQueryService, Unscripted};
