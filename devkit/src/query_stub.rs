/*!
Scripted QueryService for developing and testing without a managed host

Replies are scripted per queried class (optionally narrowed by a substring
of the statement) and every call is recorded for assertions.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use symbion_query::{QueryService, Row, TransportError};

/// One query as seen by the stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedQuery {
    pub endpoint: String,
    pub statement: String,
    pub namespace: Option<String>,
    pub class: Option<String>,
}

/// Transport failure to simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unreachable,
    AccessDenied,
    InvalidQuery,
    Protocol,
}

impl FailureKind {
    fn to_error(self, endpoint: &str, statement: &str) -> TransportError {
        let endpoint = endpoint.to_string();
        let reason = format!("[stub] {}", statement.split_whitespace().collect::<Vec<_>>().join(" "));
        match self {
            FailureKind::Unreachable => TransportError::Unreachable { endpoint, reason },
            FailureKind::AccessDenied => TransportError::AccessDenied { endpoint },
            FailureKind::InvalidQuery => TransportError::InvalidQuery { endpoint, reason },
            FailureKind::Protocol => TransportError::Protocol { endpoint, reason },
        }
    }
}

/// What the stub answers for a statement nobody scripted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unscripted {
    /// Behave like a host that does not know the class.
    #[default]
    InvalidQuery,
    /// Answer with zero rows.
    Empty,
}

#[derive(Debug, Clone)]
enum Reply {
    Rows(Vec<Row>),
    Fail(FailureKind),
}

#[derive(Debug, Clone)]
struct Script {
    class: String,
    filter: Option<String>,
    reply: Reply,
}

#[derive(Debug, Default)]
struct StubState {
    scripts: Vec<Script>,
    delays: HashMap<String, Duration>,
    calls: Vec<RecordedQuery>,
    unscripted: Unscripted,
}

/// In-memory QueryService compatible with every poller entry point
#[derive(Clone, Default)]
pub struct ScriptedQueryService {
    state: Arc<Mutex<StubState>>,
}

impl ScriptedQueryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer queries against `class` with `rows`.
    pub fn respond(&self, class: &str, rows: Vec<Row>) -> &Self {
        self.script(class, None, Reply::Rows(rows))
    }

    /// Answer queries against `class` whose statement contains `filter`.
    ///
    /// Filtered scripts win over the class-wide one.
    pub fn respond_where(&self, class: &str, filter: &str, rows: Vec<Row>) -> &Self {
        self.script(class, Some(filter), Reply::Rows(rows))
    }

    /// Fail every query against `class`.
    pub fn fail(&self, class: &str, kind: FailureKind) -> &Self {
        self.script(class, None, Reply::Fail(kind))
    }

    /// Delay every reply for `class`, to shape how concurrent sub-queries interleave.
    pub fn delay(&self, class: &str, delay: Duration) -> &Self {
        self.state.lock().delays.insert(class.to_ascii_lowercase(), delay);
        self
    }

    pub fn unscripted(&self, behavior: Unscripted) -> &Self {
        self.state.lock().unscripted = behavior;
        self
    }

    /// Every query received so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedQuery> {
        self.state.lock().calls.clone()
    }

    /// Number of queries received against `class`.
    pub fn calls_to(&self, class: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.class.as_deref().is_some_and(|k| k.eq_ignore_ascii_case(class)))
            .count()
    }

    fn script(&self, class: &str, filter: Option<&str>, reply: Reply) -> &Self {
        let mut state = self.state.lock();
        state.scripts.retain(|s| !(s.class.eq_ignore_ascii_case(class) && s.filter.as_deref() == filter));
        state.scripts.push(Script {
            class: class.to_string(),
            filter: filter.map(String::from),
            reply,
        });
        self
    }

    fn lookup(state: &StubState, class: &str, statement: &str) -> Option<Reply> {
        let mut class_wide = None;
        for script in state.scripts.iter().rev().filter(|s| s.class.eq_ignore_ascii_case(class)) {
            match script.filter.as_deref() {
                Some(filter) if statement.contains(filter) => return Some(script.reply.clone()),
                Some(_) => {}
                None if class_wide.is_none() => class_wide = Some(script.reply.clone()),
                None => {}
            }
        }
        class_wide
    }
}

/// Class named after the `FROM` keyword of a statement.
pub fn statement_class(statement: &str) -> Option<&str> {
    let mut tokens = statement.split_whitespace();
    while let Some(token) = tokens.next() {
        if token.eq_ignore_ascii_case("from") {
            return tokens.next();
        }
    }
    None
}

#[async_trait]
impl QueryService for ScriptedQueryService {
    async fn query(
        &self,
        endpoint: &str,
        statement: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<Row>, TransportError> {
        let class = statement_class(statement).map(String::from);

        let (reply, delay) = {
            let mut state = self.state.lock();
            state.calls.push(RecordedQuery {
                endpoint: endpoint.to_string(),
                statement: statement.to_string(),
                namespace: namespace.map(String::from),
                class: class.clone(),
            });

            let reply = class.as_deref().and_then(|c| Self::lookup(&state, c, statement));
            let delay = class
                .as_deref()
                .and_then(|c| state.delays.get(&c.to_ascii_lowercase()).copied());
            let reply = reply.unwrap_or(match state.unscripted {
                Unscripted::InvalidQuery => Reply::Fail(FailureKind::InvalidQuery),
                Unscripted::Empty => Reply::Rows(Vec::new()),
            });
            (reply, delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Reply::Rows(rows) => {
                log::debug!("[stub] {} row(s) for {:?} on {}", rows.len(), class, endpoint);
                Ok(rows)
            }
            Reply::Fail(kind) => {
                log::debug!("[stub] failing {:?} on {} with {:?}", class, endpoint, kind);
                Err(kind.to_error(endpoint, statement))
            }
        }
    }
}
