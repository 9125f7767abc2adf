//! Background daemon for concurrent access to a node's galaxies.
//!
//! The daemon provides:
//! - A single writer per node (serialized appends prevent corruption)
//! - Shared open-galaxy handles across connections
//! - Per-connection login state, so one client's credentials never
//!   leak to another

use crate::ensure;
use crate::galaxy::{Galaxy, GalaxyError};
use crate::node::{GALAX_DIR, Node};
use crate::protocol::{Request, Response};
use eyre::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;

/// Socket file name within the .galax directory.
const SOCKET_FILE: &str = "daemon.sock";

/// PID file name within the .galax directory.
const PID_FILE: &str = "daemon.pid";

/// Default sweep interval in milliseconds.
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1000;

/// Configuration for the daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Node root directory containing .galax
    pub root: PathBuf,

    /// Interval for sweeping cached galaxy handles
    pub sweep_interval: Duration,
}

impl DaemonConfig {
    /// Create config with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> PathBuf {
        self.root.join(GALAX_DIR).join(SOCKET_FILE)
    }

    /// Get the PID file path.
    pub fn pid_path(&self) -> PathBuf {
        self.root.join(GALAX_DIR).join(PID_FILE)
    }
}

/// The galax node daemon.
pub struct Daemon {
    config: DaemonConfig,
    node: Node,
    galaxies: HashMap<String, Galaxy>,
    shutdown: Arc<AtomicBool>,
}

impl Daemon {
    /// Create a new daemon instance for a node.
    pub fn new(config: DaemonConfig) -> Self {
        let node = Node::new(&config.root);

        Self {
            config,
            node,
            galaxies: HashMap::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a shutdown handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the daemon (blocking).
    pub async fn run(&mut self) -> Result<()> {
        let socket_path = self.config.socket_path();
        if let Some(parent) = socket_path.parent() {
            fs::create_dir_all(parent).context("Failed to create node directory")?;
        }

        // Clean up any stale socket
        if socket_path.exists() {
            fs::remove_file(&socket_path).ok();
        }

        // Write PID file
        let pid_path = self.config.pid_path();
        fs::write(&pid_path, std::process::id().to_string()).context("Failed to write PID file")?;

        // Create Unix socket listener
        let listener = UnixListener::bind(&socket_path).context("Failed to bind to Unix socket")?;
        listener
            .set_nonblocking(true)
            .context("Failed to set socket to non-blocking")?;

        log::info!("Daemon listening on {:?}", socket_path);

        // Create channel for client requests
        let (tx, mut rx) = mpsc::channel::<(Request, mpsc::Sender<Response>)>(100);

        // Spawn connection acceptor task
        let shutdown_flag = Arc::clone(&self.shutdown);
        let tx_clone = tx.clone();
        tokio::spawn(async move {
            Self::accept_connections(listener, tx_clone, shutdown_flag).await;
        });

        // Main event loop
        let mut sweep_interval = interval(self.config.sweep_interval);

        loop {
            tokio::select! {
                // Handle incoming request
                Some((request, response_tx)) = rx.recv() => {
                    let response = self.handle_request(request);
                    let _ = response_tx.send(response).await;
                }

                // Drop cached handles for galaxies deleted out from
                // under the daemon
                _ = sweep_interval.tick() => {
                    let node = self.node.clone();
                    self.galaxies.retain(|name, _| node.galaxy_exists(name));
                }
            }

            // Check shutdown flag
            if self.shutdown.load(Ordering::Relaxed) {
                log::info!("Daemon shutting down");
                break;
            }
        }

        // Cleanup
        fs::remove_file(&socket_path).ok();
        fs::remove_file(&pid_path).ok();

        Ok(())
    }

    /// Accept connections in a background task.
    async fn accept_connections(
        listener: UnixListener,
        tx: mpsc::Sender<(Request, mpsc::Sender<Response>)>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            // Try to accept connection with a small delay to allow checking shutdown
            match listener.accept() {
                Ok((stream, _)) => {
                    let tx_clone = tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, tx_clone).await {
                            log::warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    // No pending connections, sleep briefly
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Err(e) => {
                    log::error!("Accept error: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Handle a single client connection.
    ///
    /// Login state is tracked per connection: galaxy operations are
    /// rejected here until this connection has logged in to that galaxy,
    /// regardless of what other connections have done.
    async fn handle_connection(
        stream: UnixStream,
        tx: mpsc::Sender<(Request, mpsc::Sender<Response>)>,
    ) -> Result<()> {
        stream.set_nonblocking(false)?;

        let reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;

        let mut logged_in: HashSet<String> = HashSet::new();

        for line in reader.lines() {
            let line = line.context("Failed to read line")?;
            if line.is_empty() {
                continue;
            }

            let request: Request = serde_json::from_str(&line).context("Failed to parse request")?;

            if let Some(galaxy) = request.requires_login()
                && !logged_in.contains(galaxy)
            {
                let response = Response::error(GalaxyError::NotLoggedIn.to_string());
                let response_json = serde_json::to_string(&response)?;
                writeln!(writer, "{}", response_json)?;
                writer.flush()?;
                continue;
            }

            // Check for shutdown request
            let is_shutdown = matches!(request, Request::Shutdown);
            let login_galaxy = match &request {
                Request::Login { galaxy, .. } => Some(galaxy.clone()),
                _ => None,
            };

            // Send to main loop and wait for response
            let (resp_tx, mut resp_rx) = mpsc::channel(1);
            tx.send((request, resp_tx))
                .await
                .context("Failed to send request to daemon")?;

            if let Some(response) = resp_rx.recv().await {
                if let (Some(galaxy), Response::Ok) = (&login_galaxy, &response) {
                    logged_in.insert(galaxy.clone());
                }

                let response_json = serde_json::to_string(&response)?;
                writeln!(writer, "{}", response_json)?;
                writer.flush()?;
            }

            if is_shutdown {
                break;
            }
        }

        Ok(())
    }

    /// Look up a cached galaxy handle. Only Login populates the cache,
    /// so a miss means no client has authenticated against it yet.
    fn galaxy_mut(&mut self, name: &str) -> Result<&mut Galaxy> {
        self.galaxies
            .get_mut(name)
            .ok_or_else(|| eyre::eyre!(GalaxyError::NotLoggedIn))
    }

    /// Handle a single request.
    fn handle_request(&mut self, request: Request) -> Response {
        match request {
            Request::QueryGalaxies => match self.node.query_galaxies() {
                Ok(galaxies) => Response::Galaxies { galaxies },
                Err(e) => Response::error(e.to_string()),
            },

            Request::Login { galaxy, user, password } => {
                if !self.galaxies.contains_key(&galaxy) {
                    match self.node.open_galaxy(&galaxy) {
                        Ok(handle) => {
                            self.galaxies.insert(galaxy.clone(), handle);
                        }
                        Err(e) => return Response::error(e.to_string()),
                    }
                }

                let Some(handle) = self.galaxies.get_mut(&galaxy) else {
                    return Response::error(GalaxyError::GalaxyNotFound(galaxy).to_string());
                };
                match handle.login(&user, &password) {
                    Ok(()) => Response::Ok,
                    Err(e) => Response::error(e.to_string()),
                }
            }

            Request::Get { galaxy, tagname } => match self.galaxy_mut(&galaxy) {
                Ok(handle) => match handle.get_object(&tagname) {
                    Ok(Some(object)) => Response::Object { object },
                    Ok(None) => Response::NotFound { tagname },
                    Err(e) => Response::error(e.to_string()),
                },
                Err(e) => Response::error(e.to_string()),
            },

            Request::QueryByName { galaxy, kind, names } => match self.galaxy_mut(&galaxy) {
                Ok(handle) => {
                    let name_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
                    match handle.query_objects_by_name(kind, &name_refs) {
                        Ok(set) => Response::Objects {
                            objects: set.into_vec(),
                        },
                        Err(e) => Response::error(e.to_string()),
                    }
                }
                Err(e) => Response::error(e.to_string()),
            },

            Request::Query { galaxy, kind, condition } => match self.galaxy_mut(&galaxy) {
                Ok(handle) => match handle.query_objects(kind, &condition) {
                    Ok(set) => Response::Objects {
                        objects: set.into_vec(),
                    },
                    Err(e) => Response::error(e.to_string()),
                },
                Err(e) => Response::error(e.to_string()),
            },

            Request::CreateInstance { galaxy, template, tagname } => {
                match self.galaxy_mut(&galaxy) {
                    Ok(handle) => match handle.create_instance(&template, &tagname) {
                        Ok(object) => Response::Object { object },
                        Err(e) => Response::error(e.to_string()),
                    },
                    Err(e) => Response::error(e.to_string()),
                }
            }

            Request::EnsureInstance {
                galaxy,
                tagname,
                template,
                parent,
            } => match self.galaxy_mut(&galaxy) {
                Ok(handle) => {
                    let parent_object = match &parent {
                        Some(name) => match ensure::resolve_instance(handle, name) {
                            Ok(object) => Some(object),
                            Err(e) => return Response::error(e.to_string()),
                        },
                        None => None,
                    };

                    match ensure::ensure_instance(handle, &tagname, &template, parent_object.as_ref())
                    {
                        Ok(object) => Response::Object { object },
                        Err(e) => Response::error(e.to_string()),
                    }
                }
                Err(e) => Response::error(e.to_string()),
            },

            Request::Export {
                galaxy,
                names,
                format,
                path,
            } => match self.galaxy_mut(&galaxy) {
                Ok(handle) => {
                    let name_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
                    match handle.export_objects(&name_refs, format, &path) {
                        Ok(summary) => Response::Export { summary },
                        Err(e) => Response::error(e.to_string()),
                    }
                }
                Err(e) => Response::error(e.to_string()),
            },

            Request::Shutdown => {
                self.shutdown.store(true, Ordering::Relaxed);
                Response::Ok
            }

            Request::Ping => Response::Pong,
        }
    }
}

/// Check if a daemon is running for the given node.
pub fn is_daemon_running(root: &Path) -> bool {
    let config = DaemonConfig::new(root);
    let socket_path = config.socket_path();
    let pid_path = config.pid_path();

    // Check if socket exists
    if !socket_path.exists() {
        return false;
    }

    // Check if PID file exists and process is alive
    if let Ok(pid_str) = fs::read_to_string(&pid_path)
        && let Ok(pid) = pid_str.trim().parse::<i32>()
    {
        // Check if process exists (signal 0 doesn't send a signal but checks existence)
        unsafe {
            if libc::kill(pid, 0) == 0 {
                return true;
            }
        }
    }

    // Stale socket, clean up
    fs::remove_file(&socket_path).ok();
    fs::remove_file(&pid_path).ok();
    false
}

/// Start the daemon as a background process.
pub fn start_daemon(root: &Path) -> Result<()> {
    use std::process::Command;

    // Get the path to the current executable
    let exe = std::env::current_exe().context("Failed to get current executable")?;

    // Start daemon in background
    Command::new(exe)
        .args(["--dir", root.to_str().unwrap_or("."), "daemon"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .context("Failed to spawn daemon process")?;

    // Wait a bit for daemon to start
    std::thread::sleep(Duration::from_millis(100));

    Ok(())
}
