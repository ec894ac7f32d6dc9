//! The read-dispatch-print loop.

use std::io::{BufRead, Write};

use threadneedle_core::command::usage;
use threadneedle_core::{CommandError, Outcome, StepError, World, dispatch};
use tracing::{error, info};

/// Read commands from `input` until `quit` or end of input.
///
/// Interactive sessions show a prompt. A command error is printed and the
/// session goes on, except for a failed step, which prints the state dump
/// and ends the session with that error.
pub fn run(world: &mut World, input: impl BufRead, interactive: bool) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    if interactive {
        writeln!(stdout, "Threadneedle shell. Commands:\n{}", usage())?;
    }
    let mut lines = input.lines();
    loop {
        if interactive {
            write!(stdout, "[{}]> ", world.current_step())?;
            stdout.flush()?;
        }
        let Some(line) = lines.next().transpose()? else {
            break;
        };
        match dispatch(world, &line) {
            Ok(Outcome::Continue(text)) => {
                if !text.is_empty() {
                    writeln!(stdout, "{text}")?;
                }
            }
            Ok(Outcome::Quit) => break,
            Err(err) if err.is_fatal() => {
                if let CommandError::Step {
                    source: StepError::Anomaly { dump, .. },
                } = &err
                {
                    eprintln!("{dump}");
                }
                error!(command = %line, %err, "session aborted");
                return Err(anyhow::Error::new(err).context("simulation aborted"));
            }
            Err(err) => writeln!(stdout, "error: {err}")?,
        }
    }
    info!(step = world.current_step(), "session ended");
    Ok(())
}
