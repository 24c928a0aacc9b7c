//! ``src/logging.rs``
//! ============================================================================
//! # Logger: tracing setup for the tree and its demo binary
//!
//! Two `fmt` layers share one compact, sequence-numbered formatter:
//! a daily rolling file and (optionally) stderr. Both honour `RUST_LOG`,
//! falling back to the configured level.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
    sync::atomic::{AtomicUsize, Ordering},
};

use anyhow::Context as _;
use tracing::Metadata;
use tracing_appender::rolling::{RollingFileAppender, daily};
use tracing_subscriber::{
    EnvFilter, Registry,
    filter::Filtered,
    fmt::{
        self, FmtContext, Layer,
        format::{DefaultFields, FormatEvent, FormatFields, Writer},
    },
    layer::SubscriberExt,
    prelude::*,
};

use crate::config::LoggingConfig;

pub struct Logger;

impl Logger {
    /// Call **once** near the start of `main`.
    pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
        let log_dir: PathBuf = config
            .directory
            .clone()
            .unwrap_or_else(|| Path::new("logs").to_path_buf());

        fs::create_dir_all(&log_dir)
            .with_context(|| format!("cannot create log dir {}", log_dir.display()))?;

        SEQ.get_or_init(|| AtomicUsize::new(1));

        // daily rolling file appender -> <dir>/<prefix>.YYYY-MM-DD
        let file: RollingFileAppender = daily(&log_dir, &config.file_prefix);

        let file_layer: Filtered<
            Layer<Registry, DefaultFields, SeqFileMod, RollingFileAppender>,
            EnvFilter,
            Registry,
        > = fmt::layer()
            .event_format(SeqFileMod)
            .with_writer(file)
            .with_ansi(false)
            .with_filter(Self::filter(&config.level)?);

        let stderr_layer = config
            .stderr
            .then(|| -> anyhow::Result<_> {
                Ok(fmt::layer()
                    .event_format(SeqFileMod)
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_filter(Self::filter(&config.level)?))
            })
            .transpose()?;

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer)
            .try_init()
            .context("a global tracing subscriber is already installed")?;

        Ok(())
    }

    fn filter(level: &str) -> anyhow::Result<EnvFilter> {
        Ok(EnvFilter::from_default_env().add_directive(
            level
                .parse()
                .with_context(|| format!("invalid log level '{level}'"))?,
        ))
    }
}

static SEQ: OnceLock<AtomicUsize> = OnceLock::new();

/// Custom formatter: `[SEQ] LEVEL [file:line mod::path] message`
struct SeqFileMod;

impl<S, N> FormatEvent<S, N> for SeqFileMod
where
    S: tracing::Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut w: Writer<'_>,
        ev: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        // monotonically-increasing sequence number
        let seq: usize = SEQ
            .get_or_init(|| AtomicUsize::new(1))
            .fetch_add(1, Ordering::Relaxed);

        let meta: &'static Metadata<'static> = ev.metadata();
        write!(
            w,
            "{seq:06} {:5} [{}:{} {}] ",
            meta.level(),
            meta.file().unwrap_or("??"),
            meta.line().unwrap_or(0),
            meta.module_path().unwrap_or("???"),
        )?;

        ctx.field_format().format_fields(w.by_ref(), ev)?;
        writeln!(w)
    }
}
