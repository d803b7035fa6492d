//! Single-line command interpretation.
//!
//! A line is tokenized on whitespace, with double quotes grouping a payload
//! that contains spaces, then matched against a closed verb set. Parsing is
//! pure and completes before any effect is applied, so a command either
//! fully executes or only reports an error.
//!
//! QoS and payload format travel as numeric codes (`topic:1`, format `0`);
//! periodic rates are written `500ms`, with an optional leading `@`.

use thiserror::Error;

use subscope_broker::{PayloadFormat, QoS};

/// Connection properties assignable with `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Ip,
    Port,
    CaCert,
    ClientCert,
    PrivateKey,
}

impl Property {
    fn from_name(name: &str) -> Option<Property> {
        match name {
            "ip" => Some(Property::Ip),
            "port" => Some(Property::Port),
            "cacert" => Some(Property::CaCert),
            "clientcert" => Some(Property::ClientCert),
            "privatekey" => Some(Property::PrivateKey),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Set { property: Property, value: String },
    EnableTls,
    DisableTls,
    Connect { ip: String, port: String },
    Disconnect,
    Subscribe { topic: String, qos: QoS },
    Unsubscribe { topic: String },
    Publish {
        topic: String,
        qos: QoS,
        payload: String,
        format: PayloadFormat,
    },
    Start {
        topic: String,
        qos: QoS,
        payload: String,
        format: PayloadFormat,
        period_ms: u64,
    },
    Stop { topic: String },
    Pause { topic: String },
    Resume { topic: String },
    PauseAll,
    ResumeAll,
    KillAll,
    Silence,
    Help,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("nothing to interpret")]
    Empty,
    #[error("unrecognized command '{0}'")]
    UnknownVerb(String),
    #[error("unknown property '{0}' (expected ip, port, cacert, clientcert or privatekey)")]
    UnknownProperty(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("expected <topic:qos>, got '{0}'")]
    InvalidTopicQos(String),
    #[error("invalid QoS code '{0}' (expected 0, 1 or 2)")]
    InvalidQos(String),
    #[error("invalid payload format code '{0}' (expected 0, 1 or 2)")]
    InvalidFormat(String),
    #[error("invalid rate '{0}' (expected a millisecond count like 500ms)")]
    InvalidRate(String),
    #[error("expected <ip:port>, got '{0}'")]
    InvalidEndpoint(String),
    #[error("unterminated quoted payload")]
    UnterminatedQuote,
}

pub fn parse(line: &str) -> Result<Command, CommandError> {
    let tokens = tokenize(line)?;
    let Some((verb, args)) = tokens.split_first() else {
        return Err(CommandError::Empty);
    };

    match verb.to_ascii_lowercase().as_str() {
        "set" => match args {
            [property, value] => Property::from_name(property)
                .map(|property| Command::Set {
                    property,
                    value: value.clone(),
                })
                .ok_or_else(|| CommandError::UnknownProperty(property.clone())),
            _ => Err(CommandError::Usage("set <property> <value>")),
        },
        "enabletls" => no_args(args, "enabletls", Command::EnableTls),
        "disabletls" => no_args(args, "disabletls", Command::DisableTls),
        "connect" => match args {
            [endpoint] => {
                let (ip, port) = endpoint
                    .rsplit_once(':')
                    .ok_or_else(|| CommandError::InvalidEndpoint(endpoint.clone()))?;
                if ip.is_empty() || port.is_empty() {
                    return Err(CommandError::InvalidEndpoint(endpoint.clone()));
                }
                Ok(Command::Connect {
                    ip: ip.to_string(),
                    port: port.to_string(),
                })
            }
            _ => Err(CommandError::Usage("connect <ip:port>")),
        },
        "disconnect" => no_args(args, "disconnect", Command::Disconnect),
        "subscribe" => match args {
            [pair] => {
                let (topic, qos) = parse_topic_qos(pair)?;
                Ok(Command::Subscribe { topic, qos })
            }
            _ => Err(CommandError::Usage("subscribe <topic:qos>")),
        },
        "unsubscribe" => match args {
            [topic] => Ok(Command::Unsubscribe {
                topic: topic.clone(),
            }),
            _ => Err(CommandError::Usage("unsubscribe <topic>")),
        },
        "publish" => match args {
            [pair, payload, format] => {
                let (topic, qos) = parse_topic_qos(pair)?;
                Ok(Command::Publish {
                    topic,
                    qos,
                    payload: payload.clone(),
                    format: parse_format(format)?,
                })
            }
            _ => Err(CommandError::Usage(
                "publish <topic:qos> <\"payload\"> <format>",
            )),
        },
        "start" => match args {
            [pair, payload, format, rate] => {
                let (topic, qos) = parse_topic_qos(pair)?;
                Ok(Command::Start {
                    topic,
                    qos,
                    payload: payload.clone(),
                    format: parse_format(format)?,
                    period_ms: parse_rate(rate)?,
                })
            }
            _ => Err(CommandError::Usage(
                "start <topic:qos> <\"payload\"> <format> <rate>ms",
            )),
        },
        "stop" => one_topic(args, "stop <topic>", |topic| Command::Stop { topic }),
        "pause" => one_topic(args, "pause <topic>", |topic| Command::Pause { topic }),
        "resume" => one_topic(args, "resume <topic>", |topic| Command::Resume { topic }),
        "pauseall" => no_args(args, "pauseall", Command::PauseAll),
        "resumeall" => no_args(args, "resumeall", Command::ResumeAll),
        "killall" => no_args(args, "killall", Command::KillAll),
        "silence" => no_args(args, "silence", Command::Silence),
        "help" => no_args(args, "help", Command::Help),
        _ => Err(CommandError::UnknownVerb(verb.clone())),
    }
}

/// One-line verb summary for the `help` command.
pub fn help_text() -> &'static str {
    "Commands: set <property> <value> | enabletls | disabletls | connect <ip:port> | \
     disconnect | subscribe <topic:qos> | unsubscribe <topic> | \
     publish <topic:qos> <\"payload\"> <format> | \
     start <topic:qos> <\"payload\"> <format> <rate>ms | stop <topic> | \
     pause <topic> | resume <topic> | pauseall | resumeall | killall | silence | help"
}

fn no_args(args: &[String], usage: &'static str, command: Command) -> Result<Command, CommandError> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(CommandError::Usage(usage))
    }
}

fn one_topic(
    args: &[String],
    usage: &'static str,
    build: impl FnOnce(String) -> Command,
) -> Result<Command, CommandError> {
    match args {
        [topic] => Ok(build(topic.clone())),
        _ => Err(CommandError::Usage(usage)),
    }
}

fn parse_topic_qos(pair: &str) -> Result<(String, QoS), CommandError> {
    let (topic, code) = pair
        .rsplit_once(':')
        .ok_or_else(|| CommandError::InvalidTopicQos(pair.to_string()))?;
    if topic.is_empty() {
        return Err(CommandError::InvalidTopicQos(pair.to_string()));
    }
    let qos = code
        .parse::<u8>()
        .ok()
        .and_then(QoS::from_code)
        .ok_or_else(|| CommandError::InvalidQos(code.to_string()))?;
    Ok((topic.to_string(), qos))
}

fn parse_format(token: &str) -> Result<PayloadFormat, CommandError> {
    token
        .parse::<u8>()
        .ok()
        .and_then(PayloadFormat::from_code)
        .ok_or_else(|| CommandError::InvalidFormat(token.to_string()))
}

fn parse_rate(token: &str) -> Result<u64, CommandError> {
    let trimmed = token.strip_prefix('@').unwrap_or(token);
    let digits = trimmed
        .strip_suffix("ms")
        .ok_or_else(|| CommandError::InvalidRate(token.to_string()))?;
    digits
        .parse::<u64>()
        .map_err(|_| CommandError::InvalidRate(token.to_string()))
}

/// Split on whitespace, keeping double-quoted runs together. Quotes delimit a
/// token but are not part of it, so `""` yields an empty payload token.
fn tokenize(line: &str) -> Result<Vec<String>, CommandError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut building = false;
    let mut in_quotes = false;

    for c in line.chars() {
        if in_quotes {
            if c == '"' {
                in_quotes = false;
            } else {
                current.push(c);
            }
        } else if c == '"' {
            in_quotes = true;
            building = true;
        } else if c.is_whitespace() {
            if building {
                tokens.push(std::mem::take(&mut current));
                building = false;
            }
        } else {
            current.push(c);
            building = true;
        }
    }

    if in_quotes {
        return Err(CommandError::UnterminatedQuote);
    }
    if building {
        tokens.push(current);
    }
    Ok(tokens)
}
