//! 日志系统：控制台 + `logs/latest.log`，退出时打包为 zip。
//!
//! The file layer always records DEBUG so a failed download can be traced
//! page by page afterwards; the console only shows DEBUG with `--debug`.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, info};
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zip::CompressionMethod;
use zip::write::FileOptions;

const LATEST_LOG: &str = "latest.log";
/// `latest.log` beyond this size is archived before a new run appends to it.
const ROTATE_AT_BYTES: u64 = 8 * 1024 * 1024;
/// Grace period for the non-blocking writer to flush before archiving.
const FLUSH_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("subscriber init failed: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("time formatting failed: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Copy, Debug)]
pub struct LogOptions {
    /// Show DEBUG records and targets on the console.
    pub debug: bool,
    pub use_color: bool,
    /// Zip `latest.log` when the process exits.
    pub archive_on_exit: bool,
    /// Write records to stderr at all.
    pub console: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            debug: false,
            use_color: true,
            archive_on_exit: true,
            console: true,
        }
    }
}

/// Location of the log directory and its live file.
#[derive(Debug, Clone)]
struct LogFiles {
    dir: PathBuf,
    latest: PathBuf,
}

impl LogFiles {
    fn under(base_dir: Option<&Path>) -> Self {
        let dir = base_dir.map_or_else(|| PathBuf::from("logs"), |b| b.join("logs"));
        let latest = dir.join(LATEST_LOG);
        Self { dir, latest }
    }

    /// Creates the directory and rotates an oversized `latest.log`.
    fn prepare(&self) -> Result<(), LogError> {
        fs::create_dir_all(&self.dir)?;
        let oversized = fs::metadata(&self.latest)
            .map(|m| m.len() >= ROTATE_AT_BYTES)
            .unwrap_or(false);
        if oversized {
            self.archive()?;
        }
        Ok(())
    }

    /// Moves `latest.log` into `log_<timestamp>.zip`. An empty log is just
    /// removed.
    fn archive(&self) -> Result<Option<PathBuf>, LogError> {
        let size = match fs::metadata(&self.latest) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if size == 0 {
            let _ = fs::remove_file(&self.latest);
            return Ok(None);
        }

        let stamp = OffsetDateTime::now_utc().format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))?;
        let target = self.dir.join(format!("log_{stamp}.zip"));

        {
            let mut zip = zip::ZipWriter::new(File::create(&target)?);
            let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
            zip.start_file(format!("{stamp}.log"), opts)?;
            io::copy(&mut File::open(&self.latest)?, &mut zip)?;
            zip.finish()?;
        }
        let _ = fs::remove_file(&self.latest);

        info!("log archived to {}", target.display());
        Ok(Some(target))
    }
}

/// Keeps the file writer alive; dropping it flushes and archives the log.
pub struct LogSystem {
    state: Arc<ExitState>,
}

impl LogSystem {
    /// Console + `logs/latest.log` under `base_dir` (or the working directory).
    pub fn init_with_base(options: LogOptions, base_dir: Option<&Path>) -> Result<Self, LogError> {
        let files = LogFiles::under(base_dir);
        files.prepare()?;

        let (file_writer, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .finish(rolling::never(&files.dir, LATEST_LOG));

        tracing_subscriber::registry()
            .with(console_layer(&options))
            .with(file_layer(file_writer))
            .try_init()
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("global") || msg.contains("already") {
                    LogError::AlreadyInitialized
                } else {
                    LogError::SubscriberInit(e)
                }
            })?;

        let state = Arc::new(ExitState::new(files, Some(guard), options.archive_on_exit));
        install_ctrlc(&state);
        install_panic_hook(&state);

        Ok(Self { state })
    }

    /// Flushes the file writer and archives the log. Runs at most once.
    pub fn safe_exit(&self) {
        self.state.finish();
    }

    /// Routes the first Ctrl-C to `hook` so the caller can shut down in
    /// order. A second Ctrl-C still exits immediately.
    pub fn on_interrupt(&self, hook: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut slot) = self.state.on_interrupt.lock() {
            *slot = Some(Box::new(hook));
        }
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.state.finish();
    }
}

fn console_layer<S>(options: &LogOptions) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let writer = if options.console {
        BoxMakeWriter::new(io::stderr)
    } else {
        BoxMakeWriter::new(io::sink)
    };
    let level = if options.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    fmt::layer()
        .with_target(options.debug)
        .with_ansi(options.use_color)
        .with_writer(writer)
        .with_filter(level)
}

fn file_layer<S>(writer: NonBlocking) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(LevelFilter::DEBUG)
}

type InterruptHook = Box<dyn Fn() + Send + Sync>;

struct ExitState {
    files: LogFiles,
    guard: Mutex<Option<WorkerGuard>>,
    finished: AtomicBool,
    archive_on_exit: bool,
    on_interrupt: Mutex<Option<InterruptHook>>,
    interrupts: AtomicUsize,
}

impl ExitState {
    fn new(files: LogFiles, guard: Option<WorkerGuard>, archive_on_exit: bool) -> Self {
        Self {
            files,
            guard: Mutex::new(guard),
            finished: AtomicBool::new(false),
            archive_on_exit,
            on_interrupt: Mutex::new(None),
            interrupts: AtomicUsize::new(0),
        }
    }

    /// Returns `true` when the process should exit right away.
    fn interrupt(&self) -> bool {
        if self.interrupts.fetch_add(1, Ordering::SeqCst) > 0 {
            return true;
        }
        match self.on_interrupt.lock() {
            Ok(hook) => match hook.as_ref() {
                Some(hook) => {
                    hook();
                    false
                }
                None => true,
            },
            Err(_) => true,
        }
    }

    fn finish(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut guard) = self.guard.lock() {
            // dropping the guard flushes pending records
            guard.take();
        }
        if !self.archive_on_exit {
            return;
        }
        std::thread::sleep(FLUSH_GRACE);
        if let Err(err) = self.files.archive() {
            eprintln!("failed to archive log: {err}");
        }
    }
}

fn install_ctrlc(state: &Arc<ExitState>) {
    let state = Arc::clone(state);
    let _ = ctrlc::set_handler(move || {
        if state.interrupt() {
            // Pages already written stay on disk; only the log needs closing.
            state.finish();
            std::process::exit(130);
        }
    });
}

fn install_panic_hook(state: &Arc<ExitState>) {
    let state = Arc::clone(state);
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        match info.location() {
            Some(at) => error!("panic at {}:{}: {info}", at.file(), at.line()),
            None => error!("panic: {info}"),
        }
        state.finish();
        previous(info);
    }));
}
