//! The operator's command table.
//!
//! Every verb the shell understands is a row in [`COMMANDS`]: a name, a
//! usage line and a plain function handler. [`validate_commands`] checks the
//! table once at startup; [`dispatch`] splits an input line on whitespace
//! and runs the matching handler against the world.
//!
//! Unknown verbs are not errors; they answer with the usage listing.

use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use rust_decimal::Decimal;
use threadneedle_types::Money;
use tracing::info;

use crate::report;
use crate::snapshot::{Snapshot, SnapshotError};
use crate::world::{StepError, StepSummary, World, WorldError};

/// Errors raised by a command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Wrong number or shape of arguments.
    #[error("usage: {usage}")]
    Usage {
        /// The command's usage line.
        usage: &'static str,
    },

    /// Nothing matches the argument.
    #[error("no {what} matches {key:?}")]
    NotFound {
        /// Kind of thing looked up.
        what: &'static str,
        /// The argument given.
        key: String,
    },

    /// Two rows of the table share a name.
    #[error("command {name:?} is defined twice")]
    DuplicateCommand {
        /// The repeated name.
        name: &'static str,
    },

    /// A row's usage line does not describe it.
    #[error("command {name:?} has no usage line")]
    MissingUsage {
        /// The command.
        name: &'static str,
    },

    /// A step failed. The world must not be stepped again.
    #[error(transparent)]
    Step {
        /// The underlying step error.
        #[from]
        source: StepError,
    },

    /// The world refused an operator action.
    #[error(transparent)]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },

    /// Saving failed.
    #[error(transparent)]
    Snapshot {
        /// The underlying snapshot error.
        #[from]
        source: SnapshotError,
    },
}

impl CommandError {
    /// Whether the session has to end.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Step { .. })
    }
}

/// What the shell does after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Print the text and read the next command.
    Continue(String),
    /// End the session.
    Quit,
}

type Handler = fn(&mut World, &[&str]) -> Result<Outcome, CommandError>;

/// One shell verb.
#[derive(Debug, Clone, Copy)]
pub struct Command {
    /// The verb.
    pub name: &'static str,
    /// Usage line, starting with the verb.
    pub usage: &'static str,
    /// One-line description.
    pub summary: &'static str,
    handler: Handler,
}

/// Every verb, in the order `help` lists them.
pub const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        usage: "help",
        summary: "list commands",
        handler: help,
    },
    Command {
        name: "step",
        usage: "step [n]",
        summary: "run n steps (default 1)",
        handler: step,
    },
    Command {
        name: "printmoney",
        usage: "printmoney <agent> <amount>",
        summary: "create new money in an agent's account",
        handler: print_money,
    },
    Command {
        name: "setbaserate",
        usage: "setbaserate <rate>",
        summary: "set the central bank's base rate, in percent",
        handler: set_base_rate,
    },
    Command {
        name: "set",
        usage: "set seed <n>",
        summary: "reseed the random source",
        handler: set,
    },
    Command {
        name: "reset",
        usage: "reset",
        summary: "rebuild the world from its configuration",
        handler: reset,
    },
    Command {
        name: "agentinfo",
        usage: "agentinfo <agent>",
        summary: "describe an agent",
        handler: agent_info,
    },
    Command {
        name: "ledger",
        usage: "ledger <bank>",
        summary: "show a bank's books and loans",
        handler: ledger,
    },
    Command {
        name: "shareholders",
        usage: "shareholders <bank>",
        summary: "show a bank's share register",
        handler: shareholders,
    },
    Command {
        name: "printorders",
        usage: "printorders <market>",
        summary: "show a market's resting orders",
        handler: print_orders,
    },
    Command {
        name: "save",
        usage: "save <file>",
        summary: "write a snapshot of the world",
        handler: save,
    },
    Command {
        name: "quit",
        usage: "quit",
        summary: "end the session",
        handler: quit,
    },
];

/// Check a command table: names are unique and every usage line starts
/// with its verb.
///
/// # Errors
///
/// [`CommandError::DuplicateCommand`] or [`CommandError::MissingUsage`].
pub fn validate_commands(table: &[Command]) -> Result<(), CommandError> {
    let mut seen = BTreeSet::new();
    for command in table {
        if !seen.insert(command.name) {
            return Err(CommandError::DuplicateCommand { name: command.name });
        }
        if command.usage.split_whitespace().next() != Some(command.name) {
            return Err(CommandError::MissingUsage { name: command.name });
        }
    }
    Ok(())
}

/// The usage listing.
pub fn usage() -> String {
    COMMANDS
        .iter()
        .map(|c| format!("  {:<28} {}", c.usage, c.summary))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run one input line. Blank lines and `#` comments do nothing.
///
/// # Errors
///
/// The handler's error. A fatal one (see [`CommandError::is_fatal`]) means
/// the world is no longer usable.
pub fn dispatch(world: &mut World, line: &str) -> Result<Outcome, CommandError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((verb, args)) = words.split_first() else {
        return Ok(Outcome::Continue(String::new()));
    };
    if verb.starts_with('#') {
        return Ok(Outcome::Continue(String::new()));
    }
    match COMMANDS.iter().find(|c| c.name == *verb) {
        Some(command) => (command.handler)(world, args),
        None => Ok(Outcome::Continue(format!(
            "unknown command {verb:?}\n{}",
            usage()
        ))),
    }
}

fn usage_of(name: &str) -> &'static str {
    COMMANDS
        .iter()
        .find(|c| c.name == name)
        .map_or("", |c| c.usage)
}

fn parse<T: FromStr>(raw: &str, name: &str) -> Result<T, CommandError> {
    raw.parse().map_err(|_parse_failure| CommandError::Usage {
        usage: usage_of(name),
    })
}

/// Single-argument form shared by the lookup verbs.
fn one<'a>(args: &[&'a str], name: &str) -> Result<&'a str, CommandError> {
    match args {
        [only] => Ok(*only),
        _ => Err(CommandError::Usage {
            usage: usage_of(name),
        }),
    }
}

fn found(view: Option<String>, what: &'static str, key: &str) -> Result<Outcome, CommandError> {
    view.map(Outcome::Continue)
        .ok_or_else(|| CommandError::NotFound {
            what,
            key: key.to_owned(),
        })
}

fn summary_line(s: &StepSummary) -> String {
    format!(
        "step {}: {} agents ({} failed), deposits {}, reserves {}, interest {}, \
         {} defaults ({} written off), {} units sold, {} hires, {} employed",
        s.step,
        s.agents,
        s.failures,
        s.deposits,
        s.reserves,
        s.interest,
        s.defaults,
        s.written_off,
        s.units_sold,
        s.hires,
        s.employed
    )
}

fn help(_world: &mut World, _args: &[&str]) -> Result<Outcome, CommandError> {
    Ok(Outcome::Continue(usage()))
}

fn step(world: &mut World, args: &[&str]) -> Result<Outcome, CommandError> {
    let steps = match args {
        [] => 1,
        [n] => parse::<u64>(n, "step")?,
        _ => {
            return Err(CommandError::Usage {
                usage: usage_of("step"),
            });
        }
    };
    let summaries = world.run(steps)?;
    let text = summaries
        .iter()
        .map(summary_line)
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Outcome::Continue(text))
}

fn print_money(world: &mut World, args: &[&str]) -> Result<Outcome, CommandError> {
    let [agent, amount] = args else {
        return Err(CommandError::Usage {
            usage: usage_of("printmoney"),
        });
    };
    let amount: Money = parse(amount, "printmoney")?;
    if amount <= Money::ZERO {
        return Err(CommandError::Usage {
            usage: usage_of("printmoney"),
        });
    }
    let account = world.print_money(agent, amount)?;
    info!(agent, amount = %amount, "operator printed money");
    Ok(Outcome::Continue(format!("printed {amount} into {account}")))
}

fn set_base_rate(world: &mut World, args: &[&str]) -> Result<Outcome, CommandError> {
    let rate: Decimal = parse(one(args, "setbaserate")?, "setbaserate")?;
    world.set_base_rate(rate);
    Ok(Outcome::Continue(format!("base rate {rate}%")))
}

fn set(world: &mut World, args: &[&str]) -> Result<Outcome, CommandError> {
    let ["seed", seed] = args else {
        return Err(CommandError::Usage {
            usage: usage_of("set"),
        });
    };
    let seed: u64 = parse(seed, "set")?;
    world.set_seed(seed);
    Ok(Outcome::Continue(format!("seed {seed}")))
}

fn reset(world: &mut World, _args: &[&str]) -> Result<Outcome, CommandError> {
    world.reset()?;
    Ok(Outcome::Continue(format!(
        "reset to step {} (seed {})",
        world.current_step(),
        world.seed()
    )))
}

fn agent_info(world: &mut World, args: &[&str]) -> Result<Outcome, CommandError> {
    let key = one(args, "agentinfo")?;
    found(report::agent(world, key), "agent", key)
}

fn ledger(world: &mut World, args: &[&str]) -> Result<Outcome, CommandError> {
    let key = one(args, "ledger")?;
    found(report::ledger(world.economy(), key), "bank", key)
}

fn shareholders(world: &mut World, args: &[&str]) -> Result<Outcome, CommandError> {
    let key = one(args, "shareholders")?;
    found(report::shareholders(world.economy(), key), "bank", key)
}

fn print_orders(world: &mut World, args: &[&str]) -> Result<Outcome, CommandError> {
    let key = one(args, "printorders")?;
    found(report::orders(world.economy(), key), "market", key)
}

fn save(world: &mut World, args: &[&str]) -> Result<Outcome, CommandError> {
    let path = Path::new(one(args, "save")?);
    let snapshot = Snapshot::capture(world);
    snapshot.save(path)?;
    Ok(Outcome::Continue(format!(
        "saved step {} to {}",
        snapshot.step,
        path.display()
    )))
}

fn quit(_world: &mut World, _args: &[&str]) -> Result<Outcome, CommandError> {
    Ok(Outcome::Quit)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::config::{AgentCommon, AgentConfig, SaverConfig, SimulationConfig};

    fn world() -> World {
        let mut config = SimulationConfig::default();
        let mut common = AgentCommon::named("Sam");
        common.initial_deposit = dec!(10);
        config.agents.push(AgentConfig::Saver(SaverConfig { common }));
        World::new(config).unwrap()
    }

    fn text(outcome: Outcome) -> String {
        match outcome {
            Outcome::Continue(text) => text,
            Outcome::Quit => String::new(),
        }
    }

    #[test]
    fn table_is_valid() {
        validate_commands(COMMANDS).unwrap();
    }

    #[test]
    fn duplicate_and_bad_rows_are_caught() {
        let row = COMMANDS[0];
        let err = validate_commands(&[row, row]).unwrap_err();
        assert!(matches!(err, CommandError::DuplicateCommand { name: "help" }));

        let bad = Command { usage: "", ..row };
        let err = validate_commands(&[bad]).unwrap_err();
        assert!(matches!(err, CommandError::MissingUsage { name: "help" }));
    }

    #[test]
    fn unknown_verb_answers_with_usage() {
        let mut world = world();
        let out = text(dispatch(&mut world, "fly away").unwrap());
        assert!(out.starts_with("unknown command \"fly\""));
        assert!(out.contains("printorders <market>"));
    }

    #[test]
    fn blank_and_comment_lines_do_nothing() {
        let mut world = world();
        assert_eq!(dispatch(&mut world, "   ").unwrap(), Outcome::Continue(String::new()));
        assert_eq!(
            dispatch(&mut world, "# step 10").unwrap(),
            Outcome::Continue(String::new())
        );
        assert_eq!(world.current_step(), 1);
    }

    #[test]
    fn step_runs_n_steps() {
        let mut world = world();
        let out = text(dispatch(&mut world, "step 3").unwrap());
        assert_eq!(out.lines().count(), 3);
        assert!(out.starts_with("step 1:"));
        assert_eq!(world.current_step(), 4);
        text(dispatch(&mut world, "step").unwrap());
        assert_eq!(world.current_step(), 5);
    }

    #[test]
    fn print_money_then_agent_info() {
        let mut world = world();
        dispatch(&mut world, "printmoney Sam 15").unwrap();
        let out = text(dispatch(&mut world, "agentinfo Sam").unwrap());
        assert!(out.contains("deposit 25"));
        assert!(out.ends_with("lives in Capital"));
    }

    #[test]
    fn bad_arguments_give_usage() {
        let mut world = world();
        let err = dispatch(&mut world, "printmoney Sam lots").unwrap_err();
        assert!(matches!(
            err,
            CommandError::Usage {
                usage: "printmoney <agent> <amount>"
            }
        ));
        let err = dispatch(&mut world, "set speed 3").unwrap_err();
        assert!(matches!(err, CommandError::Usage { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn lookups_report_missing_things() {
        let mut world = world();
        let err = dispatch(&mut world, "ledger Nowhere").unwrap_err();
        assert!(matches!(err, CommandError::NotFound { what: "bank", .. }));
        let err = dispatch(&mut world, "agentinfo Ghost").unwrap_err();
        assert!(matches!(err, CommandError::NotFound { what: "agent", .. }));
    }

    #[test]
    fn operator_settings_apply() {
        let mut world = world();
        dispatch(&mut world, "setbaserate 2.5").unwrap();
        assert_eq!(world.economy().system.central().base_rate(), dec!(2.5));
        dispatch(&mut world, "set seed 42").unwrap();
        assert_eq!(world.seed(), 42);
        dispatch(&mut world, "step 2").unwrap();
        let out = text(dispatch(&mut world, "reset").unwrap());
        assert_eq!(out, "reset to step 1 (seed 42)");
    }

    #[test]
    fn save_writes_a_loadable_snapshot() {
        let mut world = world();
        dispatch(&mut world, "step 2").unwrap();
        let path = std::env::temp_dir().join(format!("threadneedle-{}.json", world.run_id()));
        let line = format!("save {}", path.display());
        let out = text(dispatch(&mut world, &line).unwrap());
        assert!(out.starts_with("saved step 3"));
        let restored = Snapshot::load(&path).unwrap().restore().unwrap();
        assert_eq!(restored.current_step(), 3);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn quit_ends_the_session() {
        let mut world = world();
        assert_eq!(dispatch(&mut world, "quit").unwrap(), Outcome::Quit);
    }
}
