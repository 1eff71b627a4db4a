//! Operator console on stdin.
//!
//! Each line is one command. Profile and player names may contain spaces;
//! numeric arguments are taken from the end of the line.
//!
//! ```text
//! profile Alice Smith
//! add Bob 400 400 400 400
//! threshold Bob 2 512
//! unsubscribe sensor_stream
//! reconnect
//! ```

use padlink_session::{Command, EventType, SessionHandle, message::SENSOR_MAX};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::readiness::Readiness;

const HELP: &str = "\
profile <name>                  switch the active profile
add <name> <t0> <t1> <t2> <t3>  create a profile
remove <name>                   delete a profile
threshold <profile> <i> <v>     set threshold i (0-3) to v (0-1023)
player <name>                   switch the active player
default <name>                  set the default profile
thresholds                      request current thresholds
values                          request one sensor reading
start | stop                    control the sensor stream
subscribe <a,b>                 subscribe to event types
unsubscribe <a,b>               unsubscribe from event types
connect | reconnect | close     manage the connection
status                          show connection state
help | quit";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("unknown command '{0}', type 'help'")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("'{0}' is not a number")]
    InvalidNumber(String),

    #[error("{what} {value} is out of range {min}..={max}")]
    OutOfRange {
        what: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("{0}")]
    InvalidEventType(String),
}

/// What a console line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    Submit(Command),
    Connect,
    Reconnect,
    Close,
    Status,
    Help,
    Quit,
    /// Blank line.
    Nothing,
}

/// Parses one console line.
pub fn parse_line(line: &str) -> Result<ConsoleAction, ConsoleError> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let action = match verb.to_lowercase().as_str() {
        "" => ConsoleAction::Nothing,
        "profile" => ConsoleAction::Submit(Command::ChangeProfile {
            name: required(rest, "profile <name>")?,
        }),
        "remove" => ConsoleAction::Submit(Command::RemoveProfile {
            name: required(rest, "remove <name>")?,
        }),
        "player" => ConsoleAction::Submit(Command::ChangePlayer {
            name: required(rest, "player <name>")?,
        }),
        "default" => ConsoleAction::Submit(Command::SetDefaultProfile {
            name: required(rest, "default <name>")?,
        }),
        "add" => parse_add(rest)?,
        "threshold" => parse_threshold(rest)?,
        "thresholds" => ConsoleAction::Submit(Command::GetCurrentThresholds),
        "values" => ConsoleAction::Submit(Command::GetSensorValues),
        "start" => ConsoleAction::Submit(Command::StartSensorStream),
        "stop" => ConsoleAction::Submit(Command::StopSensorStream),
        "subscribe" => ConsoleAction::Submit(Command::Subscribe {
            event_types: parse_event_types(rest, "subscribe <type,type>")?,
        }),
        "unsubscribe" => ConsoleAction::Submit(Command::Unsubscribe {
            event_types: parse_event_types(rest, "unsubscribe <type,type>")?,
        }),
        "connect" => ConsoleAction::Connect,
        "reconnect" => ConsoleAction::Reconnect,
        "close" => ConsoleAction::Close,
        "status" => ConsoleAction::Status,
        "help" | "?" => ConsoleAction::Help,
        "quit" | "exit" => ConsoleAction::Quit,
        other => return Err(ConsoleError::UnknownCommand(other.to_string())),
    };
    Ok(action)
}

fn required(rest: &str, usage: &'static str) -> Result<String, ConsoleError> {
    if rest.is_empty() {
        Err(ConsoleError::Usage(usage))
    } else {
        Ok(rest.to_string())
    }
}

/// Splits `rest` into a leading name and exactly `N` trailing numbers.
fn name_and_numbers<const N: usize>(
    rest: &str,
    usage: &'static str,
) -> Result<(String, [i64; N]), ConsoleError> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    if tokens.len() <= N {
        return Err(ConsoleError::Usage(usage));
    }
    let (name, numbers) = tokens.split_at(tokens.len() - N);

    let mut parsed = [0i64; N];
    for (slot, token) in parsed.iter_mut().zip(numbers) {
        *slot = token
            .parse()
            .map_err(|_| ConsoleError::InvalidNumber(token.to_string()))?;
    }
    Ok((name.join(" "), parsed))
}

fn in_range(what: &'static str, value: i64, min: i64, max: i64) -> Result<i64, ConsoleError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ConsoleError::OutOfRange {
            what,
            value,
            min,
            max,
        })
    }
}

fn parse_add(rest: &str) -> Result<ConsoleAction, ConsoleError> {
    let (name, values) = name_and_numbers::<4>(rest, "add <name> <t0> <t1> <t2> <t3>")?;
    let mut thresholds = [0i32; 4];
    for (slot, value) in thresholds.iter_mut().zip(values) {
        *slot = in_range("threshold", value, 0, i64::from(SENSOR_MAX))? as i32;
    }
    Ok(ConsoleAction::Submit(Command::AddProfile { name, thresholds }))
}

fn parse_threshold(rest: &str) -> Result<ConsoleAction, ConsoleError> {
    let (profile_name, [index, value]) =
        name_and_numbers::<2>(rest, "threshold <profile> <index> <value>")?;
    Ok(ConsoleAction::Submit(Command::UpdateThreshold {
        profile_name,
        threshold_index: in_range("index", index, 0, 3)? as usize,
        value: in_range("value", value, 0, i64::from(SENSOR_MAX))? as i32,
    }))
}

fn parse_event_types(rest: &str, usage: &'static str) -> Result<Vec<EventType>, ConsoleError> {
    let event_types = rest
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| name.parse().map_err(ConsoleError::InvalidEventType))
        .collect::<Result<Vec<EventType>, _>>()?;

    if event_types.is_empty() {
        return Err(ConsoleError::Usage(usage));
    }
    Ok(event_types)
}

/// Reads operator commands from stdin until `quit`, end of input, or
/// cancellation. `quit` cancels `shutdown`.
pub async fn run(handle: SessionHandle, readiness: Readiness, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Console ready, type 'help' for commands");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !execute(&handle, &readiness, &line) {
                        shutdown.cancel();
                        break;
                    }
                }
                Ok(None) => {
                    debug!("stdin closed, console stopped");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read console input: {}", e);
                    break;
                }
            }
        }
    }
}

/// Runs one line. Returns false when the operator asked to quit.
fn execute(handle: &SessionHandle, readiness: &Readiness, line: &str) -> bool {
    let action = match parse_line(line) {
        Ok(action) => action,
        Err(e) => {
            warn!("{}", e);
            return true;
        }
    };

    let sent = match action {
        ConsoleAction::Submit(command) => {
            let tag = command.tag();
            let result = handle.submit(command);
            if result.is_ok() && !readiness.current_state().is_ready() {
                info!("{} queued until the server is reachable", tag);
            }
            result
        }
        ConsoleAction::Connect => handle.connect(),
        ConsoleAction::Reconnect => handle.manual_reconnect(),
        ConsoleAction::Close => handle.close(),
        ConsoleAction::Status => {
            info!(
                "Session {} ({})",
                handle.connection_state(),
                readiness.current_state()
            );
            Ok(())
        }
        ConsoleAction::Help => {
            println!("{}", console::style(HELP).cyan());
            Ok(())
        }
        ConsoleAction::Quit => return false,
        ConsoleAction::Nothing => Ok(()),
    };

    if let Err(e) = sent {
        warn!("{}", e);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_names_keep_spaces() {
        assert_eq!(
            parse_line("profile  Alice Smith ").unwrap(),
            ConsoleAction::Submit(Command::ChangeProfile {
                name: "Alice Smith".into()
            })
        );
    }

    #[test]
    fn test_add_profile() {
        assert_eq!(
            parse_line("add Big Pads 400 410 420 1023").unwrap(),
            ConsoleAction::Submit(Command::AddProfile {
                name: "Big Pads".into(),
                thresholds: [400, 410, 420, 1023],
            })
        );
        assert_eq!(
            parse_line("add Bob 1 2 3"),
            Err(ConsoleError::Usage("add <name> <t0> <t1> <t2> <t3>"))
        );
        assert!(matches!(
            parse_line("add Bob 1 2 3 2000"),
            Err(ConsoleError::OutOfRange { value: 2000, .. })
        ));
    }

    #[test]
    fn test_threshold() {
        assert_eq!(
            parse_line("threshold Alice 2 512").unwrap(),
            ConsoleAction::Submit(Command::UpdateThreshold {
                profile_name: "Alice".into(),
                threshold_index: 2,
                value: 512,
            })
        );
        assert!(matches!(
            parse_line("threshold Alice 4 512"),
            Err(ConsoleError::OutOfRange { what: "index", .. })
        ));
        assert_eq!(
            parse_line("threshold Alice two 512"),
            Err(ConsoleError::InvalidNumber("two".into()))
        );
    }

    #[test]
    fn test_subscription_lists() {
        assert_eq!(
            parse_line("subscribe sensor_stream, active_player_broadcast").unwrap(),
            ConsoleAction::Submit(Command::subscribe([
                EventType::SensorStream,
                EventType::ActivePlayerBroadcast
            ]))
        );
        assert!(matches!(
            parse_line("unsubscribe sensors"),
            Err(ConsoleError::InvalidEventType(_))
        ));
        assert_eq!(
            parse_line("unsubscribe ,"),
            Err(ConsoleError::Usage("unsubscribe <type,type>"))
        );
    }

    #[test]
    fn test_simple_verbs() {
        assert_eq!(
            parse_line("start").unwrap(),
            ConsoleAction::Submit(Command::StartSensorStream)
        );
        assert_eq!(
            parse_line("THRESHOLDS").unwrap(),
            ConsoleAction::Submit(Command::GetCurrentThresholds)
        );
        assert_eq!(parse_line("reconnect").unwrap(), ConsoleAction::Reconnect);
        assert_eq!(parse_line("quit").unwrap(), ConsoleAction::Quit);
        assert_eq!(parse_line("   ").unwrap(), ConsoleAction::Nothing);
    }

    #[test]
    fn test_missing_and_unknown() {
        assert_eq!(
            parse_line("player"),
            Err(ConsoleError::Usage("player <name>"))
        );
        assert_eq!(
            parse_line("dance"),
            Err(ConsoleError::UnknownCommand("dance".into()))
        );
    }
}
