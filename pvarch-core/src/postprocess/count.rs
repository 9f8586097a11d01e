use std::collections::BTreeMap;

use pvarch_types::{ArchiverError, PostProcessorCaps, TimeSpan};

use super::PostProcessor;
use crate::descriptor::{PvTypeDescriptor, Trailer};
use crate::event::Event;

/// Counts merged events and reports the total as a trailing record.
#[derive(Debug, Default)]
pub struct Count {
    pv: String,
    seen: u64,
}

impl PostProcessor for Count {
    fn identity(&self) -> &str {
        "count"
    }

    fn caps(&self) -> PostProcessorCaps {
        PostProcessorCaps::CONSOLIDATING | PostProcessorCaps::HAS_TRAILER
    }

    fn initialize(&mut self, user_arg: &str, pv: &str) -> Result<(), ArchiverError> {
        if user_arg != "count" {
            return Err(ArchiverError::post_processor(
                user_arg,
                pv,
                "count takes no arguments",
            ));
        }
        self.pv = pv.to_string();
        Ok(())
    }

    fn estimate_cost(&self, _descriptor: &PvTypeDescriptor, _span: TimeSpan) -> u64 {
        0
    }

    fn process(&mut self, _event: Event) -> Option<Event> {
        self.seen += 1;
        None
    }

    fn trailer(&mut self) -> Option<Trailer> {
        let mut fields = BTreeMap::new();
        fields.insert("pv".to_string(), self.pv.clone());
        fields.insert("count".to_string(), self.seen.to_string());
        Some(Trailer {
            processor: "count".to_string(),
            fields,
        })
    }
}
