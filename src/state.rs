use std::sync::Arc;

use crate::{
    audio::{backend::AudioBackend, decoder::Decoder},
    config::Config,
    controller::Controller,
};

/// Global application state, owned by the shell.
pub struct AppState {
    pub config: Config,
    pub backend: Box<dyn AudioBackend>,
    pub decoder: Arc<dyn Decoder>,
    /// Present once the shell switched to run mode.
    pub controller: Option<Controller>,
}

impl AppState {
    pub fn new(backend: Box<dyn AudioBackend>, decoder: Arc<dyn Decoder>) -> Self {
        Self {
            config: Config::default(),
            backend,
            decoder,
            controller: None,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_some()
    }

    /// Start the controller from the current configuration.
    pub fn start(&mut self) -> crate::audio::AudioResult<()> {
        if self.controller.is_none() {
            let controller =
                Controller::new(&self.config, self.backend.as_ref(), Arc::clone(&self.decoder))?;
            self.controller = Some(controller);
        }
        Ok(())
    }

    /// Shut the controller down if it is running.
    pub fn stop(&mut self) {
        if let Some(controller) = self.controller.take() {
            controller.shutdown();
        }
    }
}
