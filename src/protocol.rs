//! IPC protocol types for daemon communication.

use crate::export::{ExportFormat, ExportSummary};
use crate::node::GalaxySummary;
use crate::types::{Condition, ConfigObject, ObjectKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Request sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// List the galaxies on the node.
    QueryGalaxies,

    /// Log in to a galaxy for the duration of this connection.
    Login {
        galaxy: String,
        user: String,
        password: String,
    },

    /// Get a single object by tagname, either kind.
    Get { galaxy: String, tagname: String },

    /// Exact-name lookup of objects of one kind.
    QueryByName {
        galaxy: String,
        kind: ObjectKind,
        names: Vec<String>,
    },

    /// Conditional lookup of objects of one kind.
    Query {
        galaxy: String,
        kind: ObjectKind,
        condition: Condition,
    },

    /// Create a new instance from a template.
    CreateInstance {
        galaxy: String,
        template: String,
        tagname: String,
    },

    /// Find or create an instance and place it under a parent.
    EnsureInstance {
        galaxy: String,
        tagname: String,
        template: String,
        parent: Option<String>,
    },

    /// Export named instances to a package file.
    Export {
        galaxy: String,
        names: Vec<String>,
        format: ExportFormat,
        path: PathBuf,
    },

    /// Shutdown the daemon.
    Shutdown,

    /// Ping to check if daemon is alive.
    Ping,
}

impl Request {
    /// Galaxy this request operates on and must be logged in to, if any.
    pub fn requires_login(&self) -> Option<&str> {
        match self {
            Request::Get { galaxy, .. }
            | Request::QueryByName { galaxy, .. }
            | Request::Query { galaxy, .. }
            | Request::CreateInstance { galaxy, .. }
            | Request::EnsureInstance { galaxy, .. }
            | Request::Export { galaxy, .. } => Some(galaxy),
            _ => None,
        }
    }
}

/// Response sent from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Galaxy listing response.
    Galaxies { galaxies: Vec<GalaxySummary> },

    /// Single object response.
    Object { object: ConfigObject },

    /// Multiple objects response, in query order.
    Objects { objects: Vec<ConfigObject> },

    /// Export result response.
    Export { summary: ExportSummary },

    /// Object not found.
    NotFound { tagname: String },

    /// Operation succeeded.
    Ok,

    /// Pong response to ping.
    Pong,

    /// Error response.
    Error { message: String },
}

impl Response {
    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::EnsureInstance {
            galaxy: "Test".to_string(),
            tagname: "MainTank".to_string(),
            template: "$UserDefined".to_string(),
            parent: Some("MainArea".to_string()),
        };

        let json = serde_json::to_string(&req).unwrap();
        let parsed: Request = serde_json::from_str(&json).unwrap();

        if let Request::EnsureInstance { tagname, parent, .. } = parsed {
            assert_eq!(tagname, "MainTank");
            assert_eq!(parent.as_deref(), Some("MainArea"));
        } else {
            panic!("Wrong request type");
        }
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::error("test error");
        let json = serde_json::to_string(&resp).unwrap();

        assert!(json.contains("Error"));
        assert!(json.contains("test error"));
    }

    #[test]
    fn test_requires_login() {
        assert!(Request::QueryGalaxies.requires_login().is_none());
        assert!(Request::Ping.requires_login().is_none());

        let login = Request::Login {
            galaxy: "Test".to_string(),
            user: "".to_string(),
            password: "".to_string(),
        };
        assert!(login.requires_login().is_none());

        let query = Request::Query {
            galaxy: "Test".to_string(),
            kind: ObjectKind::Instance,
            condition: Condition::NamedLike("%".to_string()),
        };
        assert_eq!(query.requires_login(), Some("Test"));
    }
}
