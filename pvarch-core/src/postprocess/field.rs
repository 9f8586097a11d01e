use pvarch_types::{ArchiverError, PostProcessorCaps};

use super::PostProcessor;
use crate::event::{Event, SampleValue};

/// Projects one archived extra field (`pv.HIHI`) as the event value.
///
/// Events that do not carry the field are dropped. Numeric field values become
/// doubles, anything else is kept as text.
#[derive(Debug, Default)]
pub struct FieldProjection {
    field: String,
}

impl PostProcessor for FieldProjection {
    fn identity(&self) -> &str {
        "field"
    }

    fn caps(&self) -> PostProcessorCaps {
        PostProcessorCaps::PASS_THROUGH
    }

    fn initialize(&mut self, user_arg: &str, pv: &str) -> Result<(), ArchiverError> {
        if user_arg.is_empty() {
            return Err(ArchiverError::post_processor("field", pv, "empty field name"));
        }
        self.field = user_arg.to_string();
        Ok(())
    }

    fn process(&mut self, mut event: Event) -> Option<Event> {
        let raw = event.fields.as_mut()?.remove(&self.field)?;
        event.value = raw
            .parse::<f64>()
            .map_or(SampleValue::Text(raw), SampleValue::Double);
        event.fields = None;
        Some(event)
    }
}
