//! Socket server and graceful shutdown.
//!
//! [`Server`] owns the listener for an [`App`] and moves through
//! `Stopped → Starting → Running → Stopping → Stopped`.
//!
//! On [`stop`](Server::stop) the server:
//! 1. Runs the `on_stopping` hook.
//! 2. Stops accepting. No new connections are made.
//! 3. With `graceful_shutdown` (the default) asks every open connection to
//!    finish its in-flight request and close; otherwise aborts them.
//! 4. Returns once every connection task has ended.
//!
//! [`serve`](Server::serve) wraps all of this around SIGTERM / Ctrl-C, which
//! is what a container runtime sends before killing the process. Give the
//! runtime a grace period longer than your slowest request.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::app::{App, Started};
use crate::error::Error;

/// Lifecycle phase of a [`Server`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct Inner {
    phase: Phase,
    shutdown: Option<watch::Sender<bool>>,
    accept: Option<JoinHandle<()>>,
    addr: Option<SocketAddr>,
}

/// Serves an [`App`] over TCP, HTTP/1.1 and HTTP/2.
///
/// ```rust,no_run
/// # async fn run() -> Result<(), pipework::Error> {
/// use pipework::{App, Router, Server};
///
/// let app = App::builder().port(8080).router(Router::new()).build()?;
/// Server::new(app).serve().await
/// # }
/// ```
pub struct Server {
    app: Arc<App>,
    inner: Mutex<Inner>,
}

impl Server {
    pub fn new(app: App) -> Self {
        Self {
            app: Arc::new(app),
            inner: Mutex::new(Inner { phase: Phase::Stopped, shutdown: None, accept: None, addr: None }),
        }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock().phase
    }

    /// The bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().addr
    }

    /// Binds the configured hostname and port and starts accepting.
    ///
    /// Returns the bound address; port `0` picks a free one. Fails with
    /// [`Error::AlreadyRunning`] unless the server is stopped.
    pub async fn start(&self) -> Result<SocketAddr, Error> {
        {
            let mut inner = self.inner.lock();
            if inner.phase != Phase::Stopped {
                return Err(Error::AlreadyRunning);
            }
            inner.phase = Phase::Starting;
        }

        let config = self.app.config();
        let (listener, addr) = match bind(&config.hostname, config.port).await {
            Ok(bound) => bound,
            Err(error) => {
                self.inner.lock().phase = Phase::Stopped;
                return Err(error);
            }
        };

        let (shutdown, signal) = watch::channel(false);
        let accept = tokio::spawn(accept_loop(listener, Arc::clone(&self.app), signal, config.graceful_shutdown));

        {
            let mut inner = self.inner.lock();
            inner.phase = Phase::Running;
            inner.shutdown = Some(shutdown);
            inner.accept = Some(accept);
            inner.addr = Some(addr);
        }

        info!(%addr, "pipework listening");
        if let Some(hook) = &self.app.hooks.on_started {
            hook(&Started { port: addr.port(), hostname: config.hostname.clone() });
        }
        Ok(addr)
    }

    /// Stops accepting and waits for open connections to end.
    ///
    /// Fails with [`Error::NotRunning`] unless the server is running.
    pub async fn stop(&self) -> Result<(), Error> {
        let (shutdown, accept) = {
            let mut inner = self.inner.lock();
            if inner.phase != Phase::Running {
                return Err(Error::NotRunning);
            }
            inner.phase = Phase::Stopping;
            (inner.shutdown.take(), inner.accept.take())
        };

        if let Some(hook) = &self.app.hooks.on_stopping {
            hook();
        }

        if let Some(shutdown) = shutdown {
            // Every receiver may already be gone if the accept loop died.
            let _ = shutdown.send(true);
        }
        if let Some(accept) = accept {
            if let Err(e) = accept.await {
                error!("accept loop failed: {e}");
            }
        }

        let mut inner = self.inner.lock();
        inner.phase = Phase::Stopped;
        inner.addr = None;
        info!("pipework stopped");
        Ok(())
    }

    /// Starts, waits for SIGTERM or Ctrl-C, then stops.
    pub async fn serve(&self) -> Result<(), Error> {
        self.start().await?;
        shutdown_signal().await;
        info!("shutdown signal received");
        self.stop().await
    }
}

async fn bind(hostname: &str, port: u16) -> Result<(TcpListener, SocketAddr), Error> {
    let listener = TcpListener::bind((hostname, port)).await?;
    let addr = listener.local_addr()?;
    Ok((listener, addr))
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn accept_loop(listener: TcpListener, app: Arc<App>, mut shutdown: watch::Receiver<bool>, graceful: bool) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            // Shutdown first, so a queued backlog is not drained into new work.
            biased;

            _ = shutdown.changed() => {
                info!(in_flight = tasks.len(), graceful, "closing listener");
                break;
            }

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };
                tasks.spawn(serve_connection(stream, peer, Arc::clone(&app), shutdown.clone()));
            }

            // Reap finished connection tasks so the set stays bounded.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    drop(listener);
    if graceful {
        while tasks.join_next().await.is_some() {}
    } else {
        tasks.shutdown().await;
    }
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, app: Arc<App>, mut shutdown: watch::Receiver<bool>) {
    // Called once per request on the connection.
    let svc = service_fn(move |req| {
        let app = Arc::clone(&app);
        async move { Ok::<_, Infallible>(app.fetch(req).await) }
    });

    let builder = ConnBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(stream), svc);
    tokio::pin!(conn);

    let result = tokio::select! {
        res = conn.as_mut() => res,
        _ = shutdown.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        debug!(%peer, "connection error: {e}");
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or Ctrl-C. On Windows only Ctrl-C exists.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
}
