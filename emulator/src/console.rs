//! Command grammar for the emulator console.

use std::fmt;

use winnow::ascii::{Caseless, alpha1, dec_uint, hex_uint, space0, space1};
use winnow::combinator::{alt, eof, opt, preceded};
use winnow::prelude::*;
use winnow::token::rest;

/// Upper bound on `run <n>`.
pub const MAX_RUN_CYCLES: u32 = 1_000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command<'a> {
    /// Run `cycles` duty cycles back to back.
    Run { cycles: u32 },
    Status,
    History,
    Channels,
    /// Queue the next response of the circuit at `address`.
    Respond {
        address: u8,
        status: u8,
        payload: &'a str,
    },
    Unplug(u8),
    Plug(u8),
    Help(Option<&'a str>),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandError {
    /// Input stopped matching the grammar at this byte offset.
    Syntax { offset: usize },
    TooManyCycles(u32),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Syntax { offset } => {
                write!(f, "unrecognised input at column {}", offset + 1)
            }
            CommandError::TooManyCycles(count) => {
                write!(f, "run accepts at most {MAX_RUN_CYCLES} cycles, got {count}")
            }
        }
    }
}

/// Parses one console line.
pub fn parse(line: &str) -> Result<Command<'_>, CommandError> {
    let command = command
        .parse(line)
        .map_err(|err| CommandError::Syntax {
            offset: err.offset(),
        })?;

    match command {
        Command::Run { cycles } if cycles > MAX_RUN_CYCLES => {
            Err(CommandError::TooManyCycles(cycles))
        }
        other => Ok(other),
    }
}

fn command<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    space0.parse_next(input)?;
    let parsed = alt((
        run, status, history, channels, respond, unplug, plug, help,
    ))
    .parse_next(input)?;
    (space0, eof).parse_next(input)?;
    Ok(parsed)
}

fn run<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    preceded(
        Caseless("run"),
        opt(preceded(space1, dec_uint::<_, u32, _>)),
    )
    .map(|cycles| Command::Run {
        cycles: cycles.unwrap_or(1),
    })
    .parse_next(input)
}

fn status<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    Caseless("status").value(Command::Status).parse_next(input)
}

fn history<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    Caseless("history").value(Command::History).parse_next(input)
}

fn channels<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    Caseless("channels").value(Command::Channels).parse_next(input)
}

fn respond<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    let (address, status, payload) = preceded(
        Caseless("respond"),
        (
            preceded(space1, address),
            preceded(space1, dec_uint::<_, u8, _>),
            opt(preceded(space1, rest)),
        ),
    )
    .parse_next(input)?;

    Ok(Command::Respond {
        address,
        status,
        payload: payload.unwrap_or_default().trim_end(),
    })
}

fn unplug<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    preceded((Caseless("unplug"), space1), address)
        .map(Command::Unplug)
        .parse_next(input)
}

fn plug<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    preceded((Caseless("plug"), space1), address)
        .map(Command::Plug)
        .parse_next(input)
}

fn help<'a>(input: &mut &'a str) -> ModalResult<Command<'a>> {
    preceded(Caseless("help"), opt(preceded(space1, alpha1)))
        .map(Command::Help)
        .parse_next(input)
}

/// Decimal or `0x`-prefixed hexadecimal bus address.
fn address(input: &mut &str) -> ModalResult<u8> {
    alt((
        preceded(Caseless("0x"), hex_uint::<_, u8, _>),
        dec_uint::<_, u8, _>,
    ))
    .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults_to_one_cycle() {
        assert_eq!(parse("run"), Ok(Command::Run { cycles: 1 }));
        assert_eq!(parse("  RUN 12  "), Ok(Command::Run { cycles: 12 }));
    }

    #[test]
    fn run_rejects_oversized_batches() {
        assert_eq!(parse("run 5000"), Err(CommandError::TooManyCycles(5000)));
    }

    #[test]
    fn respond_takes_address_status_and_optional_payload() {
        assert_eq!(
            parse("respond 0x64 1 12.34"),
            Ok(Command::Respond {
                address: 0x64,
                status: 1,
                payload: "12.34",
            })
        );
        assert_eq!(
            parse("respond 102 254"),
            Ok(Command::Respond {
                address: 102,
                status: 254,
                payload: "",
            })
        );
    }

    #[test]
    fn plug_commands_accept_both_address_forms() {
        assert_eq!(parse("unplug 100"), Ok(Command::Unplug(100)));
        assert_eq!(parse("plug 0x66"), Ok(Command::Plug(0x66)));
    }

    #[test]
    fn help_topic_is_optional() {
        assert_eq!(parse("help"), Ok(Command::Help(None)));
        assert_eq!(parse("help respond"), Ok(Command::Help(Some("respond"))));
    }

    #[test]
    fn malformed_lines_report_a_syntax_error() {
        assert!(matches!(parse("runx"), Err(CommandError::Syntax { .. })));
        assert!(matches!(parse("respond 300 1"), Err(CommandError::Syntax { .. })));
        assert!(matches!(parse("status now"), Err(CommandError::Syntax { .. })));
        assert!(matches!(parse(""), Err(CommandError::Syntax { .. })));
    }
}
