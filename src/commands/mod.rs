pub mod parse;
pub mod shell;

pub use parse::{tokenize, ConfigCommand, ParseError, RunCommand};
pub use shell::{Flow, Shell};
