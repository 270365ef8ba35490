mod circuits;
mod console;
mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::process;

use crossterm::style::Stylize;
use node_core::channels::ChannelList;

use circuits::Profile;
use session::{ConsoleLine, Session, Tone};

const USAGE: &str = "Usage: node-emulator [--profile <nominal|faulty>] [--channel <addr>=<name>]... [--cycles <n>]";

/// Command-line options.
#[derive(Debug, Eq, PartialEq)]
struct Options {
    profile: Profile,
    /// Custom channel list; the stock EC/TEMP pair when empty.
    channels: Vec<(u8, String)>,
    /// Run this many cycles and exit instead of starting the console.
    cycles: Option<u32>,
}

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let pairs: Vec<(u8, &str)> = options
        .channels
        .iter()
        .map(|(address, name)| (*address, name.as_str()))
        .collect();
    let channels = if pairs.is_empty() {
        ChannelList::stock()
    } else {
        ChannelList::from_pairs(&pairs).unwrap_or_else(|err| {
            eprintln!("invalid channel list: {err}");
            process::exit(2);
        })
    };

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(channels, options.profile);

    if let Some(cycles) = options.cycles {
        write_lines(&mut writer, &session.run(cycles))?;
        let totals = session.totals();
        writeln!(
            writer,
            "{} cycles in {:.1}s of node time: {} readings, {} errors",
            totals.cycles,
            session.elapsed().as_secs_f64(),
            totals.success,
            totals.errors()
        )?;
        return Ok(());
    }

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut line = String::new();

    writeln!(
        writer,
        "Sensor Node Emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        write_lines(&mut writer, &session.handle_command(trimmed))?;
    }

    Ok(())
}

fn write_lines(writer: &mut impl Write, lines: &[ConsoleLine]) -> io::Result<()> {
    for line in lines {
        let text = line.text.as_str();
        match line.tone {
            Tone::Plain => writeln!(writer, "{text}")?,
            Tone::Reading => writeln!(writer, "{}", text.green())?,
            Tone::Warning => writeln!(writer, "{}", text.yellow())?,
            Tone::Error => writeln!(writer, "{}", text.red())?,
        }
    }
    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options(args: impl IntoIterator<Item = String>) -> Result<Options, String> {
    let mut options = Options {
        profile: Profile::Nominal,
        channels: Vec::new(),
        cycles: None,
    };

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg, None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {flag}"))
        };

        match flag.as_str() {
            "--profile" => options.profile = Profile::from_tag(&value()?)?,
            "--cycles" => {
                let raw = value()?;
                options.cycles = Some(
                    raw.parse()
                        .map_err(|_| format!("Invalid cycle count `{raw}`"))?,
                );
            }
            "--channel" => options.channels.push(parse_channel(&value()?)?),
            other => return Err(format!("Unknown argument `{other}`")),
        }
    }

    Ok(options)
}

/// Parses `addr=name`, with `addr` in decimal or `0x` hex.
fn parse_channel(spec: &str) -> Result<(u8, String), String> {
    let (address, name) = spec
        .split_once('=')
        .ok_or_else(|| format!("Expected <addr>=<name>, got `{spec}`"))?;
    let address = address.trim();
    let parsed = match address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => address.parse(),
    };
    let address = parsed.map_err(|_| format!("Invalid bus address `{address}`"))?;
    Ok((address, name.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn defaults_to_nominal_console() {
        let options = parse_options(Vec::new()).unwrap();
        assert_eq!(options.profile, Profile::Nominal);
        assert!(options.channels.is_empty());
        assert_eq!(options.cycles, None);
    }

    #[test]
    fn accepts_separate_and_inline_values() {
        let options = parse_options(args(&[
            "--profile=faulty",
            "--cycles",
            "4",
            "--channel",
            "0x63=PH",
            "--channel=97=DO",
        ]))
        .unwrap();

        assert_eq!(options.profile, Profile::Faulty);
        assert_eq!(options.cycles, Some(4));
        assert_eq!(
            options.channels,
            vec![(0x63, "PH".to_string()), (97, "DO".to_string())]
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_options(args(&["--cycles"])).is_err());
        assert!(parse_options(args(&["--cycles", "many"])).is_err());
        assert!(parse_options(args(&["--channel", "PH"])).is_err());
        assert!(parse_options(args(&["--channel", "0x1FF=PH"])).is_err());
        assert!(parse_options(args(&["--verbose"])).is_err());
    }

    #[test]
    fn exit_words_are_case_insensitive() {
        assert!(should_terminate("EXIT"));
        assert!(should_terminate("quit"));
        assert!(!should_terminate("run"));
    }
}
