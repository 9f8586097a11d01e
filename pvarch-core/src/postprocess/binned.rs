//! Time-binned processors: first sample, last sample and mean per bin.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use pvarch_types::{ArchiverError, PostProcessorCaps};

use super::{DEFAULT_BIN_SECS, PostProcessor, bin_of, parse_identity};
use crate::event::{Event, SampleValue};

fn bin_secs(user_arg: &str, pv: &str) -> Result<i64, ArchiverError> {
    let (_, n) = parse_identity(user_arg, pv)?;
    Ok(n.unwrap_or(DEFAULT_BIN_SECS))
}

/// First event of each bin, emitted as it arrives.
#[derive(Debug)]
pub struct FirstSample {
    identity: String,
    bin_secs: i64,
    last_bin: Option<i64>,
}

impl Default for FirstSample {
    fn default() -> Self {
        Self {
            identity: "firstSample".to_string(),
            bin_secs: DEFAULT_BIN_SECS,
            last_bin: None,
        }
    }
}

impl PostProcessor for FirstSample {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn caps(&self) -> PostProcessorCaps {
        PostProcessorCaps::PASS_THROUGH
    }

    fn initialize(&mut self, user_arg: &str, pv: &str) -> Result<(), ArchiverError> {
        self.bin_secs = bin_secs(user_arg, pv)?;
        self.identity = user_arg.to_string();
        Ok(())
    }

    fn process(&mut self, event: Event) -> Option<Event> {
        let bin = bin_of(&event, self.bin_secs);
        if self.last_bin == Some(bin) {
            return None;
        }
        self.last_bin = Some(bin);
        Some(event)
    }
}

/// Last event of each bin, released after the final unit.
#[derive(Debug)]
pub struct LastSample {
    identity: String,
    bin_secs: i64,
    bins: BTreeMap<i64, Event>,
}

impl Default for LastSample {
    fn default() -> Self {
        Self {
            identity: "lastSample".to_string(),
            bin_secs: DEFAULT_BIN_SECS,
            bins: BTreeMap::new(),
        }
    }
}

impl PostProcessor for LastSample {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn caps(&self) -> PostProcessorCaps {
        PostProcessorCaps::CONSOLIDATING
    }

    fn initialize(&mut self, user_arg: &str, pv: &str) -> Result<(), ArchiverError> {
        self.bin_secs = bin_secs(user_arg, pv)?;
        self.identity = user_arg.to_string();
        Ok(())
    }

    fn process(&mut self, event: Event) -> Option<Event> {
        self.bins.insert(bin_of(&event, self.bin_secs), event);
        None
    }

    fn consolidated(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.bins).into_values().collect()
    }
}

#[derive(Debug)]
struct MeanBin {
    sum: f64,
    n: u32,
    template: Event,
}

/// Mean of scalar values per bin, stamped at the bin start.
///
/// Strings and waveforms are ignored.
#[derive(Debug)]
pub struct Mean {
    identity: String,
    bin_secs: i64,
    bins: BTreeMap<i64, MeanBin>,
}

impl Default for Mean {
    fn default() -> Self {
        Self {
            identity: "mean".to_string(),
            bin_secs: DEFAULT_BIN_SECS,
            bins: BTreeMap::new(),
        }
    }
}

impl PostProcessor for Mean {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn caps(&self) -> PostProcessorCaps {
        PostProcessorCaps::CONSOLIDATING
    }

    fn initialize(&mut self, user_arg: &str, pv: &str) -> Result<(), ArchiverError> {
        self.bin_secs = bin_secs(user_arg, pv)?;
        self.identity = user_arg.to_string();
        Ok(())
    }

    fn process(&mut self, event: Event) -> Option<Event> {
        let v = event.value.as_f64()?;
        let bin = bin_of(&event, self.bin_secs);
        let slot = self.bins.entry(bin).or_insert_with(|| MeanBin {
            sum: 0.0,
            n: 0,
            template: event,
        });
        slot.sum += v;
        slot.n += 1;
        None
    }

    fn consolidated(&mut self) -> Vec<Event> {
        let secs = self.bin_secs;
        std::mem::take(&mut self.bins)
            .into_iter()
            .filter_map(|(bin, slot)| {
                let ts = DateTime::<Utc>::from_timestamp(bin * secs, 0)?;
                let mut event = slot.template;
                event.ts = ts;
                event.value = SampleValue::Double(slot.sum / f64::from(slot.n));
                event.fields = None;
                Some(event)
            })
            .collect()
    }
}
