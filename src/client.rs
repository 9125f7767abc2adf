//! Client for connecting to the galax daemon.

use crate::daemon::{DaemonConfig, is_daemon_running, start_daemon};
use crate::export::{ExportFormat, ExportSummary};
use crate::node::GalaxySummary;
use crate::protocol::{Request, Response};
use crate::types::{Condition, ConfigObject, ObjectKind};
use eyre::{Context, Result, bail};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Client for communicating with the galax daemon.
///
/// Login state lives on the connection: call [`Client::login`] for a
/// galaxy before operating on it.
pub struct Client {
    root: PathBuf,
    stream: UnixStream,
}

impl Client {
    /// Connect to the daemon, optionally auto-starting it if not running.
    pub fn connect(root: &Path, auto_start: bool) -> Result<Self> {
        let config = DaemonConfig::new(root);
        let socket_path = config.socket_path();

        // Try to connect, auto-start if needed
        let stream = match UnixStream::connect(&socket_path) {
            Ok(stream) => stream,
            Err(_) if auto_start => {
                if !is_daemon_running(root) {
                    start_daemon(root).context("Failed to auto-start daemon")?;

                    // Wait for daemon to be ready
                    let mut attempts = 0;
                    loop {
                        if attempts > 20 {
                            bail!("Daemon failed to start in time");
                        }
                        std::thread::sleep(Duration::from_millis(50));
                        if let Ok(stream) = UnixStream::connect(&socket_path) {
                            break stream;
                        }
                        attempts += 1;
                    }
                } else {
                    UnixStream::connect(&socket_path).context("Failed to connect to daemon")?
                }
            }
            Err(e) => {
                bail!("Failed to connect to daemon: {}. Is it running?", e);
            }
        };

        // Set read timeout
        stream
            .set_read_timeout(Some(Duration::from_secs(30)))
            .context("Failed to set read timeout")?;

        Ok(Self {
            root: root.to_path_buf(),
            stream,
        })
    }

    /// Get the node root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Send a request and receive a response.
    fn request(&mut self, request: Request) -> Result<Response> {
        let request_json = serde_json::to_string(&request)?;
        writeln!(self.stream, "{}", request_json)?;
        self.stream.flush()?;

        let mut reader = BufReader::new(&self.stream);
        let mut response_line = String::new();
        reader.read_line(&mut response_line)?;

        let response: Response = serde_json::from_str(&response_line)?;
        Ok(response)
    }

    /// List the galaxies on the node.
    pub fn query_galaxies(&mut self) -> Result<Vec<GalaxySummary>> {
        let response = self.request(Request::QueryGalaxies)?;

        match response {
            Response::Galaxies { galaxies } => Ok(galaxies),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Log in to a galaxy for the rest of this connection.
    pub fn login(&mut self, galaxy: &str, user: &str, password: &str) -> Result<()> {
        let response = self.request(Request::Login {
            galaxy: galaxy.to_string(),
            user: user.to_string(),
            password: password.to_string(),
        })?;

        match response {
            Response::Ok => Ok(()),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Get an object by tagname, either kind.
    pub fn get(&mut self, galaxy: &str, tagname: &str) -> Result<Option<ConfigObject>> {
        let response = self.request(Request::Get {
            galaxy: galaxy.to_string(),
            tagname: tagname.to_string(),
        })?;

        match response {
            Response::Object { object } => Ok(Some(object)),
            Response::NotFound { .. } => Ok(None),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Exact-name lookup of objects of one kind, in request order.
    pub fn query_by_name(
        &mut self,
        galaxy: &str,
        kind: ObjectKind,
        names: &[&str],
    ) -> Result<Vec<ConfigObject>> {
        let response = self.request(Request::QueryByName {
            galaxy: galaxy.to_string(),
            kind,
            names: names.iter().map(|s| s.to_string()).collect(),
        })?;

        match response {
            Response::Objects { objects } => Ok(objects),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Conditional lookup of objects of one kind, ordered by tagname.
    pub fn query(
        &mut self,
        galaxy: &str,
        kind: ObjectKind,
        condition: Condition,
    ) -> Result<Vec<ConfigObject>> {
        let response = self.request(Request::Query {
            galaxy: galaxy.to_string(),
            kind,
            condition,
        })?;

        match response {
            Response::Objects { objects } => Ok(objects),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Create a new instance from a template.
    pub fn create_instance(
        &mut self,
        galaxy: &str,
        template: &str,
        tagname: &str,
    ) -> Result<ConfigObject> {
        let response = self.request(Request::CreateInstance {
            galaxy: galaxy.to_string(),
            template: template.to_string(),
            tagname: tagname.to_string(),
        })?;

        match response {
            Response::Object { object } => Ok(object),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Find or create an instance and place it under a parent.
    pub fn ensure_instance(
        &mut self,
        galaxy: &str,
        tagname: &str,
        template: &str,
        parent: Option<&str>,
    ) -> Result<ConfigObject> {
        let response = self.request(Request::EnsureInstance {
            galaxy: galaxy.to_string(),
            tagname: tagname.to_string(),
            template: template.to_string(),
            parent: parent.map(String::from),
        })?;

        match response {
            Response::Object { object } => Ok(object),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Export named instances to a package file.
    pub fn export(
        &mut self,
        galaxy: &str,
        names: &[&str],
        format: ExportFormat,
        path: &Path,
    ) -> Result<ExportSummary> {
        let response = self.request(Request::Export {
            galaxy: galaxy.to_string(),
            names: names.iter().map(|s| s.to_string()).collect(),
            format,
            path: path.to_path_buf(),
        })?;

        match response {
            Response::Export { summary } => Ok(summary),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Shutdown the daemon.
    pub fn shutdown(&mut self) -> Result<()> {
        let response = self.request(Request::Shutdown)?;

        match response {
            Response::Ok => Ok(()),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }

    /// Ping the daemon.
    pub fn ping(&mut self) -> Result<()> {
        let response = self.request(Request::Ping)?;

        match response {
            Response::Pong => Ok(()),
            Response::Error { message } => bail!("{}", message),
            _ => bail!("Unexpected response"),
        }
    }
}
