//! Shell input: tokenizer and typed commands for both shell modes.

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use crate::{
    audio::{
        deck::{DeckId, SampleSlot},
        MAX_SAMPLE_SLOTS,
    },
    config::ConfigVar,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unterminated quote")]
    UnterminatedQuote,

    #[error("unknown command: {0} (try \"help\")")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unknown configuration variable: {0}")]
    UnknownVariable(String),

    #[error("sample slot must be between 1 and {max}", max = MAX_SAMPLE_SLOTS)]
    SlotOutOfRange,

    #[error("{0} must be a positive number")]
    NotPositive(&'static str),

    #[error("{0} out of range")]
    OutOfRange(&'static str),
}

/// Split a line on whitespace. Double quotes group words; a backslash
/// escapes `"` and `\`.
pub fn tokenize(line: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                in_token = true;
                match chars.peek() {
                    Some(&next @ ('"' | '\\')) => {
                        current.push(next);
                        chars.next();
                    }
                    _ => current.push('\\'),
                }
            }
            '"' => {
                in_token = true;
                quoted = !quoted;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }
    if quoted {
        return Err(ParseError::UnterminatedQuote);
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

// ── Config mode ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigCommand {
    ListDevices,
    Set { var: ConfigVar, value: String },
    Show,
    LoadConfigFile(PathBuf),
    Run,
    Quit,
    Help,
}

impl ConfigCommand {
    pub fn parse(tokens: &[String]) -> Result<Self, ParseError> {
        let words: Vec<&str> = tokens.iter().map(String::as_str).collect();
        match words.as_slice() {
            ["list", "devices"] => Ok(ConfigCommand::ListDevices),
            ["list", ..] => Err(ParseError::Usage("list devices")),
            ["set", var, value] => {
                let var = var
                    .parse::<ConfigVar>()
                    .map_err(|_| ParseError::UnknownVariable(var.to_string()))?;
                Ok(ConfigCommand::Set {
                    var,
                    value: value.to_string(),
                })
            }
            ["set", ..] => Err(ParseError::Usage("set <headphones|speakers|mp3dir> <value>")),
            ["show"] => Ok(ConfigCommand::Show),
            ["load-config-file", file] => Ok(ConfigCommand::LoadConfigFile(PathBuf::from(file))),
            ["load-config-file", ..] => Err(ParseError::Usage("load-config-file <file>")),
            ["run"] => Ok(ConfigCommand::Run),
            ["quit" | "exit" | "bye"] => Ok(ConfigCommand::Quit),
            ["help" | "?"] => Ok(ConfigCommand::Help),
            [other, ..] => Err(ParseError::UnknownCommand(other.to_string())),
            [] => Err(ParseError::UnknownCommand(String::new())),
        }
    }
}

// ── Run mode ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum RunCommand {
    LoadDeck { path: PathBuf, deck: DeckId },
    LoadSample { path: PathBuf, slot: SampleSlot },
    PlayDeck(DeckId),
    PlaySample(SampleSlot),
    PauseDeck(DeckId),
    UnloadDeck(DeckId),
    UnloadSample(SampleSlot),
    Volume { deck: DeckId, volume: f32 },
    Status,
    Sleep(Duration),
    Quit,
    Help,
}

const LOAD_USAGE: &str = "load <file> on deck <a|b> | load <file> as sample <n>";
const UNLOAD_USAGE: &str = "unload deck <a|b> | unload sample <n>";

fn deck(word: &str, usage: &'static str) -> Result<DeckId, ParseError> {
    word.parse().map_err(|_| ParseError::Usage(usage))
}

fn sample(word: &str) -> Result<SampleSlot, ParseError> {
    let n: usize = word.parse().map_err(|_| ParseError::SlotOutOfRange)?;
    SampleSlot::from_number(n).ok_or(ParseError::SlotOutOfRange)
}

impl RunCommand {
    pub fn parse(tokens: &[String]) -> Result<Self, ParseError> {
        let words: Vec<&str> = tokens.iter().map(String::as_str).collect();
        match words.as_slice() {
            ["load", file, "on", "deck", d] => Ok(RunCommand::LoadDeck {
                path: PathBuf::from(file),
                deck: deck(d, LOAD_USAGE)?,
            }),
            ["load", file, "as", "sample", n] => Ok(RunCommand::LoadSample {
                path: PathBuf::from(file),
                slot: sample(n)?,
            }),
            ["load", ..] => Err(ParseError::Usage(LOAD_USAGE)),
            ["play", "deck", d] => Ok(RunCommand::PlayDeck(deck(d, "play deck <a|b>")?)),
            ["play", "sample", n] => Ok(RunCommand::PlaySample(sample(n)?)),
            ["play", ..] => Err(ParseError::Usage("play deck <a|b> | play sample <n>")),
            ["pause", "deck", d] => Ok(RunCommand::PauseDeck(deck(d, "pause deck <a|b>")?)),
            ["pause", ..] => Err(ParseError::Usage("pause deck <a|b>")),
            ["unload", "deck", d] => Ok(RunCommand::UnloadDeck(deck(d, UNLOAD_USAGE)?)),
            ["unload", "sample", n] => Ok(RunCommand::UnloadSample(sample(n)?)),
            ["unload", ..] => Err(ParseError::Usage(UNLOAD_USAGE)),
            ["volume", "deck", d, v] => {
                const USAGE: &str = "volume deck <a|b> <0.0-1.0>";
                let volume: f32 = v.parse().map_err(|_| ParseError::Usage(USAGE))?;
                Ok(RunCommand::Volume {
                    deck: deck(d, USAGE)?,
                    volume,
                })
            }
            ["volume", ..] => Err(ParseError::Usage("volume deck <a|b> <0.0-1.0>")),
            ["status"] => Ok(RunCommand::Status),
            ["sleep", secs] => {
                let secs: f64 = secs.parse().map_err(|_| ParseError::NotPositive("seconds"))?;
                if !(secs > 0.0) {
                    return Err(ParseError::NotPositive("seconds"));
                }
                Duration::try_from_secs_f64(secs)
                    .map(RunCommand::Sleep)
                    .map_err(|_| ParseError::OutOfRange("seconds"))
            }
            ["sleep", ..] => Err(ParseError::Usage("sleep <seconds>")),
            ["quit" | "exit" | "bye"] => Ok(RunCommand::Quit),
            ["help" | "?"] => Ok(RunCommand::Help),
            [other, ..] => Err(ParseError::UnknownCommand(other.to_string())),
            [] => Err(ParseError::UnknownCommand(String::new())),
        }
    }
}
