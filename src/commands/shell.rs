//! Interactive shell. Starts in config mode; `run` opens the outputs and
//! switches to run mode. End of input quits.

use std::{
    io::{self, BufRead, Write},
    thread,
};

use crate::{config::ConfigVar, state::AppState};

use super::parse::{tokenize, ConfigCommand, ParseError, RunCommand};

const PROMPT: &str = "> ";

const CONFIG_HELP: &str = "\
list devices                              list audio outputs
set <headphones|speakers|mp3dir> <value>  set a configuration variable
show                                      show the configuration
load-config-file <file>                   read settings from a file
run                                       open the outputs and start playing
quit | exit | bye                         leave
help | ?                                  this text";

const RUN_HELP: &str = "\
load <file> on deck <a|b>     load a file onto a deck
load <file> as sample <n>     load a file into sample slot 1-16
play deck <a|b>               start a deck
play sample <n>               fire a sample
pause deck <a|b>              pause a deck
unload deck <a|b>             empty a deck
unload sample <n>             empty a sample slot
volume deck <a|b> <0.0-1.0>   set a deck fader
status                        show decks, samples and outputs
sleep <seconds>               wait before reading the next command
quit | exit | bye             stop playback and leave
help | ?                      this text";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Shell<W: Write> {
    state: AppState,
    out: W,
    quiet: bool,
}

impl<W: Write> Shell<W> {
    pub fn new(state: AppState, out: W, quiet: bool) -> Self {
        Self { state, out, quiet }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Read commands until `quit` or end of input, then stop playback.
    pub fn run<R: BufRead>(&mut self, input: R) -> io::Result<()> {
        let mut lines = input.lines();
        loop {
            self.prompt()?;
            let Some(line) = lines.next() else {
                break;
            };
            if self.execute_line(&line?)? == Flow::Quit {
                break;
            }
        }
        self.state.stop();
        Ok(())
    }

    fn prompt(&mut self) -> io::Result<()> {
        if !self.quiet {
            write!(self.out, "{PROMPT}")?;
            self.out.flush()?;
        }
        Ok(())
    }

    /// Execute one input line in the current mode.
    pub fn execute_line(&mut self, line: &str) -> io::Result<Flow> {
        let tokens = match tokenize(line) {
            Ok(t) if t.is_empty() => return Ok(Flow::Continue),
            Ok(t) => t,
            Err(e) => return self.report(e),
        };
        if self.state.is_running() {
            match RunCommand::parse(&tokens) {
                Ok(cmd) => self.run_command(cmd),
                Err(e) => self.report(e),
            }
        } else {
            match ConfigCommand::parse(&tokens) {
                Ok(cmd) => self.config_command(cmd),
                Err(e) => self.report(e),
            }
        }
    }

    fn report(&mut self, e: ParseError) -> io::Result<Flow> {
        writeln!(self.out, "error: {e}")?;
        Ok(Flow::Continue)
    }

    fn error(&mut self, e: impl std::fmt::Display) -> io::Result<()> {
        writeln!(self.out, "error: {e}")
    }

    // ── Config mode ──────────────────────────────────────────────────────

    fn config_command(&mut self, cmd: ConfigCommand) -> io::Result<Flow> {
        match cmd {
            ConfigCommand::ListDevices => match self.state.backend.output_devices() {
                Ok(devices) => {
                    for d in devices {
                        writeln!(self.out, "{d}")?;
                    }
                }
                Err(e) => self.error(e)?,
            },
            ConfigCommand::Set { var, value } => {
                self.state.config.set(var, &value);
                if let Err(e) = self.state.config.check(var, self.state.backend.as_ref()) {
                    writeln!(self.out, "warning: {e}")?;
                }
            }
            ConfigCommand::Show => {
                for var in ConfigVar::ALL {
                    let value = self.state.config.get(var);
                    writeln!(self.out, "{var}: {}", value.as_deref().unwrap_or("not set"))?;
                }
            }
            ConfigCommand::LoadConfigFile(path) => {
                if let Err(e) = self.state.config.load_file(&path) {
                    self.error(e)?;
                }
            }
            ConfigCommand::Run => self.start()?,
            ConfigCommand::Quit => return Ok(Flow::Quit),
            ConfigCommand::Help => writeln!(self.out, "{CONFIG_HELP}")?,
        }
        Ok(Flow::Continue)
    }

    fn start(&mut self) -> io::Result<()> {
        let mut ok = true;
        for var in [ConfigVar::Speakers, ConfigVar::Headphones] {
            if let Err(e) = self.state.config.check(var, self.state.backend.as_ref()) {
                self.error(e)?;
                ok = false;
            }
        }
        if self.state.config.mp3_dir.is_some() {
            let backend = self.state.backend.as_ref();
            if let Err(e) = self.state.config.check(ConfigVar::Mp3Dir, backend) {
                self.error(e)?;
                ok = false;
            }
        }
        if !ok {
            return Ok(());
        }
        match self.state.start() {
            Ok(()) => {
                if !self.quiet {
                    writeln!(self.out, "running")?;
                }
            }
            Err(e) => self.error(e)?,
        }
        Ok(())
    }

    // ── Run mode ─────────────────────────────────────────────────────────

    fn run_command(&mut self, cmd: RunCommand) -> io::Result<Flow> {
        let Some(controller) = self.state.controller.as_mut() else {
            return Ok(Flow::Continue);
        };
        let result = match cmd {
            RunCommand::LoadDeck { path, deck } => controller.load_deck(deck, &path),
            RunCommand::LoadSample { path, slot } => controller.load_sample(slot, &path),
            RunCommand::PlayDeck(deck) => {
                controller.play_deck(deck);
                Ok(())
            }
            RunCommand::PlaySample(slot) => {
                controller.play_sample(slot);
                Ok(())
            }
            RunCommand::PauseDeck(deck) => {
                controller.pause_deck(deck);
                Ok(())
            }
            RunCommand::UnloadDeck(deck) => controller.unload_deck(deck).map(drop),
            RunCommand::UnloadSample(slot) => controller.unload_sample(slot).map(drop),
            RunCommand::Volume { deck, volume } => {
                controller.set_deck_volume(deck, volume);
                Ok(())
            }
            RunCommand::Status => {
                let status = controller.status();
                write!(self.out, "{status}")?;
                Ok(())
            }
            RunCommand::Sleep(d) => {
                thread::sleep(d);
                Ok(())
            }
            RunCommand::Quit => {
                self.state.stop();
                return Ok(Flow::Quit);
            }
            RunCommand::Help => {
                writeln!(self.out, "{RUN_HELP}")?;
                Ok(())
            }
        };
        if let Err(e) = result {
            self.error(e)?;
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        backend::NullBackend,
        decoder::{Decoder, SymphoniaDecoder},
        deck::DeckId,
        track::TrackState,
        SAMPLE_RATE,
    };
    use std::{path::Path, sync::Arc};

    fn shell(backend: NullBackend) -> Shell<Vec<u8>> {
        let decoder: Arc<dyn Decoder> = Arc::new(SymphoniaDecoder);
        Shell::new(AppState::new(Box::new(backend), decoder), Vec::new(), true)
    }

    fn output(shell: &Shell<Vec<u8>>) -> String {
        String::from_utf8_lossy(&shell.out).into_owned()
    }

    fn write_wav(path: &Path, frames: usize) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames {
            w.write_sample(100i16).unwrap();
            w.write_sample(-100i16).unwrap();
        }
        w.finalize().unwrap();
    }

    #[test]
    fn show_reports_unset_variables() {
        let mut sh = shell(NullBackend::new(["front"]));
        sh.execute_line("set speakers front").unwrap();
        sh.execute_line("show").unwrap();
        let out = output(&sh);
        assert!(out.contains("speakers: front"), "{out}");
        assert!(out.contains("headphones: not set"), "{out}");
        assert!(out.contains("mp3dir: not set"), "{out}");
    }

    #[test]
    fn set_warns_about_unknown_devices() {
        let mut sh = shell(NullBackend::new(["front"]));
        sh.execute_line("set headphones nowhere").unwrap();
        assert!(output(&sh).contains("warning: invalid device name for audio output: nowhere"));
    }

    #[test]
    fn list_devices_prints_sinks() {
        let mut sh = shell(NullBackend::new(["front", "cue"]));
        sh.execute_line("list devices").unwrap();
        assert_eq!(output(&sh), "front\ncue\n");
    }

    #[test]
    fn run_refuses_incomplete_config() {
        let mut sh = shell(NullBackend::new(["front", "cue"]));
        sh.execute_line("set speakers front").unwrap();
        sh.execute_line("run").unwrap();
        assert!(!sh.state().is_running());
        assert!(output(&sh).contains("headphones is not set"));
    }

    #[test]
    fn full_session_loads_and_plays() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("intro.wav"), 4410);

        let mut sh = shell(NullBackend::new(["front", "cue"]).with_period(256));
        let script = format!(
            "set speakers front\n\
             set headphones cue\n\
             set mp3dir \"{}\"\n\
             run\n\
             load intro.wav on deck a\n\
             play deck a\n\
             load missing.wav as sample 2\n",
            dir.path().display()
        );
        for line in script.lines() {
            assert_eq!(sh.execute_line(line).unwrap(), Flow::Continue);
        }
        assert!(sh.state().is_running());
        let deck = sh.state().controller.as_ref().unwrap().deck(DeckId::A);
        let track = deck.track.clone().expect("deck a loaded");
        assert_ne!(track.state(), TrackState::Ready, "deck a started");
        assert!(output(&sh).contains("error: failed to load"), "{}", output(&sh));

        sh.execute_line("unload deck a").unwrap();
        let controller = sh.state().controller.as_ref().unwrap();
        assert!(controller.deck(DeckId::A).track.is_none(), "deck a emptied");

        assert_eq!(sh.execute_line("quit").unwrap(), Flow::Quit);
        assert!(!sh.state().is_running());
    }

    #[test]
    fn end_of_input_stops_playback() {
        let mut sh = shell(NullBackend::new(["front", "cue"]));
        let input = "set speakers front\nset headphones cue\nrun\nstatus\n";
        sh.run(input.as_bytes()).unwrap();
        assert!(!sh.state().is_running());
        assert!(output(&sh).contains("speakers (front): ready"), "{}", output(&sh));
    }

    #[test]
    fn parse_errors_do_not_stop_the_shell() {
        let mut sh = shell(NullBackend::new(["front"]));
        assert_eq!(sh.execute_line("frobnicate").unwrap(), Flow::Continue);
        assert_eq!(sh.execute_line("set \"open").unwrap(), Flow::Continue);
        let out = output(&sh);
        assert!(out.contains("unknown command: frobnicate"));
        assert!(out.contains("unterminated quote"));
    }
}
