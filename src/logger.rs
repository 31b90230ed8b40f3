use std::time::Instant;

use eyre::Result;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::output::OutputFile;
use crate::settings::Settings;

/// Setup logging for the library
///
/// Events are written both to stdout and, without ANSI colours, to the log file in the output
/// folder. The log level is taken from the settings and defaults to `info`.
///
/// Nothing is installed when `log.write` is false. Installing a second global subscriber fails,
/// so callers running several simulations should only set up logging once.
pub fn setup_log(settings: &Settings) -> Result<()> {
    if !settings.log.write {
        return Ok(());
    }

    let env_filter = EnvFilter::try_new(settings.log.level.as_str())?;

    let timestamper = CompactTimestamp {
        start: Instant::now(),
        started_at: chrono::Local::now(),
    };

    let subscriber = Registry::default().with(env_filter);

    let outputfile = OutputFile::new(&settings.output.path, &settings.log.file)?;

    let file_layer = fmt::layer()
        .with_writer(outputfile.file_owned())
        .with_ansi(false)
        .with_timer(timestamper.clone());

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(false)
        .with_timer(timestamper);

    subscriber.with(file_layer).with(stdout_layer).try_init()?;

    Ok(())
}

/// Wall-clock start time followed by the time elapsed since logging was set up
#[derive(Clone)]
struct CompactTimestamp {
    start: Instant,
    started_at: chrono::DateTime<chrono::Local>,
}

impl FormatTime for CompactTimestamp {
    fn format_time(
        &self,
        w: &mut tracing_subscriber::fmt::format::Writer<'_>,
    ) -> Result<(), std::fmt::Error> {
        let elapsed = self.start.elapsed();
        let minutes = elapsed.as_secs() / 60;
        let seconds = elapsed.as_secs_f64() % 60.0;

        write!(
            w,
            "{} +{:02}m {:06.3}s",
            self.started_at.format("%H:%M:%S"),
            minutes,
            seconds
        )
    }
}
