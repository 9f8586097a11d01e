use pvarch_types::{ArchiverError, PostProcessorCaps};

use super::PostProcessor;
use crate::event::Event;

/// Identity pass-through; the default when a request names no processor.
#[derive(Debug, Default)]
pub struct Raw;

impl PostProcessor for Raw {
    fn identity(&self) -> &str {
        "raw"
    }

    fn caps(&self) -> PostProcessorCaps {
        PostProcessorCaps::PASS_THROUGH
    }

    fn initialize(&mut self, _user_arg: &str, _pv: &str) -> Result<(), ArchiverError> {
        Ok(())
    }

    fn process(&mut self, event: Event) -> Option<Event> {
        Some(event)
    }
}
