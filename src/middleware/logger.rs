//! Access logging.
//!
//! One line per request, written after the downstream response (or error)
//! is known. The response itself is never touched.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::Context;
use crate::method::Method;
use crate::pipeline::{BoxFuture, Middleware, Next};
use crate::response::Outcome;

/// What the logger knows about a finished request.
#[derive(Clone, Debug)]
pub struct LogLine {
    pub method: Method,
    pub path: String,
    pub status: u16,
    pub elapsed: Duration,
}

/// `METHOD PATH STATUS DURATIONms`.
impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}ms", self.method, self.path, self.status, self.elapsed.as_millis())
    }
}

type Formatter = Arc<dyn Fn(&LogLine) -> String + Send + Sync>;
type Sink = Arc<dyn Fn(&str) + Send + Sync>;

/// See the [module docs](self).
///
/// Lines go to `tracing` under target `pipework::logger` unless a custom sink
/// is set.
#[derive(Clone, Default)]
pub struct Logger {
    format: Option<Formatter>,
    sink: Option<Sink>,
}

pub fn logger() -> Logger {
    Logger::default()
}

impl Logger {
    pub fn format(mut self, format: impl Fn(&LogLine) -> String + Send + Sync + 'static) -> Self {
        self.format = Some(Arc::new(format));
        self
    }

    pub fn sink(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    fn emit(&self, line: &LogLine) {
        let text = match &self.format {
            Some(format) => format(line),
            None => line.to_string(),
        };
        match &self.sink {
            Some(sink) => sink(&text),
            None => tracing::info!(
                target: "pipework::logger",
                method = %line.method,
                path = %line.path,
                status = line.status,
                elapsed_ms = u64::try_from(line.elapsed.as_millis()).unwrap_or(u64::MAX),
                "{text}"
            ),
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("custom_format", &self.format.is_some())
            .field("custom_sink", &self.sink.is_some())
            .finish()
    }
}

impl Middleware for Logger {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request.method;
            let path = ctx.request.path.clone();

            let outcome = next.run(ctx).await;

            let status = match &outcome {
                Ok(response) => response.status_code,
                Err(error) => error.status_code(),
            };
            self.emit(&LogLine { method, path, status, elapsed: start.elapsed() });
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::middleware::testing::{Ok200, run};
    use crate::pipeline::Endpoint;
    use crate::request::Request;
    use parking_lot::Mutex;

    fn capture() -> (Logger, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        (logger().sink(move |line| sink.lock().push(line.to_owned())), lines)
    }

    #[tokio::test]
    async fn default_format() {
        let (logger, lines) = capture();
        let response = run(logger, Request::new(Method::Post, "/items"), Ok200).await.unwrap();

        assert_eq!(response.status_code, 200);
        let lines = lines.lock();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("POST /items 200 "), "{}", lines[0]);
        assert!(lines[0].ends_with("ms"));
    }

    /// Collects everything a `fmt` subscriber writes.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn default_sink_is_tracing() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        run(logger(), Request::new(Method::Get, "/quiet"), Ok200).await.unwrap();

        let output = String::from_utf8(captured.0.lock().clone()).unwrap();
        assert!(output.contains("INFO"), "{output}");
        assert!(output.contains("pipework::logger"), "{output}");
        assert!(output.contains("GET /quiet 200 "), "{output}");
        assert!(output.contains("status=200"), "{output}");
    }

    #[tokio::test]
    async fn custom_format() {
        let (logger, lines) = capture();
        let logger = logger.format(|line| format!("{}:{}", line.status, line.path));
        run(logger, Request::new(Method::Get, "/x"), Ok200).await.unwrap();
        assert_eq!(*lines.lock(), ["200:/x"]);
    }

    struct Boom;

    impl Endpoint for Boom {
        fn call<'a>(&'a self, _ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
            Box::pin(async { Err(Error::other("boom")) })
        }
    }

    #[tokio::test]
    async fn errors_are_logged_and_passed_on() {
        let (logger, lines) = capture();
        let outcome = run(logger, Request::new(Method::Get, "/fail"), Boom).await;

        assert!(matches!(outcome, Err(Error::Handler(_))));
        assert!(lines.lock()[0].starts_with("GET /fail 500 "));
    }
}
