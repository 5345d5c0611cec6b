//! Log line format for Bosswave programs.
//!
//! Lines look like
//!
//! ```text
//! [2024-05-01 12:00:00.123] [bosswave            ] [ℹ INFO   ] Connected to router at 127.0.0.1:28589
//! ```
//!
//! An event carrying a `component` field is attributed to
//! `bosswave-<component>` instead of the service name. Other structured
//! fields are appended as `key=value`.

use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_CYAN: &str = "\x1b[36m";
const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_BRIGHT_YELLOW: &str = "\x1b[93m";
const COLOR_BRIGHT_RED: &str = "\x1b[91m";
const COLOR_BRIGHT_GRAY: &str = "\x1b[90m";

const SERVICE_NAME_WIDTH: usize = 20;
const LOG_LEVEL_WIDTH: usize = 9;

/// Crates whose events follow the requested level
const CRATE_TARGETS: [&str; 3] = ["bosswave", "bw_client", "bw_wire"];

/// Event formatter producing fixed-width, optionally colored lines
#[derive(Debug, Clone)]
pub struct BosswaveLogFormatter {
    service_name: String,
    color_enabled: bool,
}

impl BosswaveLogFormatter {
    /// Formatter for `service_name`, colored when attached to a terminal
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            color_enabled: is_terminal(),
        }
    }

    /// Force colors on or off
    pub fn with_color(mut self, enabled: bool) -> Self {
        self.color_enabled = enabled;
        self
    }

    fn format_service_name(&self, component: Option<&str>) -> String {
        let name = match component {
            Some(component) => format!("bosswave-{}", component),
            None => self.service_name.clone(),
        };

        if name.chars().count() > SERVICE_NAME_WIDTH {
            let truncated: String = name.chars().take(SERVICE_NAME_WIDTH - 1).collect();
            format!("{}…", truncated)
        } else {
            format!("{:<width$}", name, width = SERVICE_NAME_WIDTH)
        }
    }

    fn format_level(level: &Level) -> String {
        let label = match *level {
            Level::ERROR => "✗ ERROR",
            Level::WARN => "⚠ WARN",
            Level::INFO => "ℹ INFO",
            Level::DEBUG => "◦ DEBUG",
            Level::TRACE => "◦ TRACE",
        };
        format!("{:<width$}", label, width = LOG_LEVEL_WIDTH)
    }

    fn level_color(&self, level: &Level) -> &'static str {
        if !self.color_enabled {
            return "";
        }
        match *level {
            Level::ERROR => COLOR_BRIGHT_RED,
            Level::WARN => COLOR_BRIGHT_YELLOW,
            Level::INFO => COLOR_GREEN,
            Level::DEBUG | Level::TRACE => COLOR_BRIGHT_GRAY,
        }
    }
}

impl<S, N> FormatEvent<S, N> for BosswaveLogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let level = event.metadata().level();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let (cyan, reset) = if self.color_enabled {
            (COLOR_CYAN, COLOR_RESET)
        } else {
            ("", "")
        };

        write!(
            writer,
            "{}[{}] [{}] [{}{}{}] {}",
            cyan,
            timestamp,
            self.format_service_name(visitor.component.as_deref()),
            self.level_color(level),
            Self::format_level(level),
            reset,
            visitor.message
        )?;
        for (key, value) in &visitor.fields {
            write!(writer, " {}={}", key, value)?;
        }
        writeln!(writer, "{}", reset)
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    component: Option<String>,
    fields: Vec<(&'static str, String)>,
}

impl FieldVisitor {
    fn record_value(&mut self, name: &'static str, value: String) {
        match name {
            "message" => self.message = value,
            "component" => self.component = Some(value),
            _ => self.fields.push((name, value)),
        }
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        let formatted = format!("{:?}", value);
        let unquoted = formatted
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .map(str::to_string)
            .unwrap_or(formatted);
        self.record_value(field.name(), unquoted);
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.record_value(field.name(), value.to_string());
    }
}

fn is_terminal() -> bool {
    match std::env::var("TERM") {
        Ok(term) => term != "dumb",
        Err(_) => false,
    }
}

/// Install the global subscriber.
///
/// Events from the Bosswave crates are kept at `level` and above, everything
/// else at `info`. `RUST_LOG`, when set, replaces this filter entirely.
pub fn init_logging(service_name: &str, level: &str) -> anyhow::Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives)?,
        _ => {
            let mut filter = EnvFilter::new("info");
            for target in CRATE_TARGETS {
                filter = filter.add_directive(format!("{}={}", target, level).parse()?);
            }
            filter
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .event_format(BosswaveLogFormatter::new(service_name))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))?;

    Ok(())
}
