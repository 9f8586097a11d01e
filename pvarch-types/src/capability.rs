use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Capabilities a post-processor declares; the merge consumer branches on these.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PostProcessorCaps: u8 {
        /// Each merged event is offered and survivors go straight to the sink.
        const PASS_THROUGH = 0b0000_0001;
        /// Events are accumulated; a consolidated result is produced at PV end.
        const CONSOLIDATING = 0b0000_0010;
        /// A trailing record is produced after the PV's output.
        const HAS_TRAILER = 0b0000_0100;
    }
}

impl Default for PostProcessorCaps {
    fn default() -> Self {
        Self::PASS_THROUGH
    }
}
