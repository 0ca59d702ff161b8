use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Configures the `log` facade to write to stderr. Info messages are shown by default.
pub(crate) fn setup_logging(verbose: u8, quiet: bool) -> Result<(), log::SetLoggerError> {
    stderrlog::new()
        .verbosity(2 + usize::from(verbose)) // LevelFilter::Info
        .quiet(quiet)
        .init()
}

/// Writes an error with a bold header line to stderr.
pub(crate) fn log_error(header: impl AsRef<str>, body: impl AsRef<str>) {
    let mut stream = StandardStream::stderr(ColorChoice::Auto);

    let result = write_styled_message(
        &mut stream,
        format!("\n[Error: {}]", header.as_ref()),
        ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true),
    )
    .and_then(|()| {
        write_styled_message(
            &mut stream,
            body.as_ref(),
            ColorSpec::new().set_fg(Some(Color::Red)),
        )
    })
    .and_then(|()| stream.flush());

    if result.is_err() {
        eprintln!("[Error: {}]\n{}", header.as_ref(), body.as_ref());
    }
}

// Styles each line separately, so that prefixes added by log collectors stay uncolored.
fn write_styled_message(
    stream: &mut StandardStream,
    message: impl AsRef<str>,
    spec: &ColorSpec,
) -> io::Result<()> {
    for line in message.as_ref().lines() {
        stream.set_color(spec)?;
        write!(stream, "{line}")?;
        stream.reset()?;
        writeln!(stream)?;
    }

    Ok(())
}
