//! QueryService backed by an external bridge program
//!
//! The management-query protocol itself is not spoken here. The configured
//! program is run once per statement as `<command> [args..] <endpoint> <namespace> <statement>`
//! and must print a JSON array of objects (one per row) on stdout.
//!
//! Exit status mapping:
//! - 0: rows on stdout
//! - 3: access denied
//! - 4: statement rejected by the host (unknown class...)
//! - anything else, spawn failure or timeout: endpoint unreachable

use crate::config::BridgeConf;
use async_trait::async_trait;
use serde_json::Value as Json;
use std::process::Stdio;
use std::time::Duration;
use symbion_query::{QueryService, Row, TransportError, Value, DEFAULT_NAMESPACE};
use tokio::process::Command as AsyncCommand;
use tracing::debug;

const EXIT_ACCESS_DENIED: i32 = 3;
const EXIT_INVALID_QUERY: i32 = 4;

#[derive(Debug, Clone)]
pub struct CommandQueryService {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandQueryService {
    pub fn new(conf: &BridgeConf) -> Self {
        Self {
            command: conf.command.clone(),
            args: conf.args.clone(),
            timeout: Duration::from_secs(conf.timeout_secs),
        }
    }
}

#[async_trait]
impl QueryService for CommandQueryService {
    async fn query(
        &self,
        endpoint: &str,
        statement: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<Row>, TransportError> {
        let namespace = namespace.unwrap_or(DEFAULT_NAMESPACE);
        debug!("[bridge] {} ({}): {}", endpoint, namespace, statement);

        let output = tokio::time::timeout(
            self.timeout,
            AsyncCommand::new(&self.command)
                .args(&self.args)
                .arg(endpoint)
                .arg(namespace)
                .arg(statement)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| TransportError::Unreachable {
            endpoint: endpoint.to_string(),
            reason: format!("bridge timed out after {}s", self.timeout.as_secs()),
        })?
        .map_err(|e| TransportError::Unreachable {
            endpoint: endpoint.to_string(),
            reason: format!("cannot run bridge '{}': {}", self.command, e),
        })?;

        if !output.status.success() {
            let reason = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let endpoint = endpoint.to_string();
            return Err(match output.status.code() {
                Some(EXIT_ACCESS_DENIED) => TransportError::AccessDenied { endpoint },
                Some(EXIT_INVALID_QUERY) => TransportError::InvalidQuery { endpoint, reason },
                _ => TransportError::Unreachable { endpoint, reason },
            });
        }

        parse_rows(&output.stdout).map_err(|reason| TransportError::Protocol {
            endpoint: endpoint.to_string(),
            reason,
        })
    }
}

/// Decode bridge output: a JSON array of flat objects.
pub fn parse_rows(stdout: &[u8]) -> Result<Vec<Row>, String> {
    let parsed: Json = serde_json::from_slice(stdout).map_err(|e| format!("invalid JSON from bridge: {}", e))?;
    let Json::Array(items) = parsed else {
        return Err("bridge output is not a JSON array".to_string());
    };

    items
        .into_iter()
        .map(|item| match item {
            Json::Object(fields) => Ok(fields.into_iter().map(|(k, v)| (k, to_value(v))).collect::<Row>()),
            other => Err(format!("bridge row is not an object: {}", other)),
        })
        .collect()
}

fn to_value(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => Value::Integer(i),
            (None, Some(u)) => Value::from(u),
            _ => Value::Float(n.as_f64().unwrap_or_default()),
        },
        Json::String(s) => Value::Text(s),
        Json::Array(items) => Value::TextArray(
            items
                .into_iter()
                .map(|item| match item {
                    Json::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
        ),
        Json::Object(_) => Value::Text(json.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rows() {
        let rows = parse_rows(
            br#"[{"DeviceID":"C:","Size":1000,"IPAddress":["10.0.0.5","fe80::1"],"DHCPEnabled":false,"Caption":null}]"#,
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.text("DeviceID").unwrap(), "C:");
        assert_eq!(row.u64("Size").unwrap(), 1000);
        assert_eq!(row.text_array("IPAddress").unwrap().len(), 2);
        assert!(!row.bool("DHCPEnabled").unwrap());
        assert_eq!(row.opt_text("Caption"), None);
    }

    #[test]
    fn test_parse_rows_rejects_non_rows() {
        assert!(parse_rows(b"not json").is_err());
        assert!(parse_rows(br#"{"a":1}"#).is_err());
        assert!(parse_rows(br#"[1, 2]"#).is_err());
        assert!(parse_rows(b"[]").unwrap().is_empty());
    }

    #[cfg(unix)]
    fn sh(script: &str) -> CommandQueryService {
        CommandQueryService::new(&BridgeConf {
            command: "sh".into(),
            args: vec!["-c".into(), script.into(), "bridge".into()],
            timeout_secs: 5,
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bridge_passes_arguments_and_reads_rows() {
        // $1 endpoint, $2 namespace, $3 statement
        let bridge = sh(r#"printf '[{"Endpoint":"%s","Namespace":"%s","Statement":"%s"}]' "$1" "$2" "$3""#);
        let rows = bridge
            .query("web01", "SELECT Name FROM Win32_LogicalDisk", Some("interop"))
            .await
            .unwrap();
        assert_eq!(rows[0].text("Endpoint").unwrap(), "web01");
        assert_eq!(rows[0].text("Namespace").unwrap(), "interop");
        assert_eq!(rows[0].text("Statement").unwrap(), "SELECT Name FROM Win32_LogicalDisk");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_bridge_exit_codes() {
        let denied = sh("exit 3").query("web01", "SELECT 1", None).await.unwrap_err();
        assert_eq!(denied, TransportError::AccessDenied { endpoint: "web01".into() });

        let invalid = sh("echo no such class >&2; exit 4").query("web01", "SELECT 1", None).await.unwrap_err();
        assert_eq!(
            invalid,
            TransportError::InvalidQuery { endpoint: "web01".into(), reason: "no such class".into() }
        );

        let down = sh("exit 1").query("web01", "SELECT 1", None).await.unwrap_err();
        assert!(matches!(down, TransportError::Unreachable { .. }));

        let garbled = sh("echo garbage").query("web01", "SELECT 1", None).await.unwrap_err();
        assert!(matches!(garbled, TransportError::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_missing_bridge_is_unreachable() {
        let bridge = CommandQueryService::new(&BridgeConf {
            command: "/nonexistent/symbion-bridge".into(),
            args: vec![],
            timeout_secs: 5,
        });
        let err = bridge.query("web01", "SELECT 1", None).await.unwrap_err();
        assert!(matches!(err, TransportError::Unreachable { .. }));
    }
}
