//! Sample device: a speaker with a software volume control.
//!
//! Stands in for real peripheral drivers so the binary has something to
//! expose. Out-of-range input is answered with an explanatory text result,
//! the same way hardware-backed tools report failures.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::mcp::registry::{Argument, Property, PropertyValue, Resource, Tool};

/// URI of the resource exposing the current volume.
pub const VOLUME_URI: &str = "device://volume";

const DEFAULT_VOLUME: u8 = 50;

/// Shared volume state.
#[derive(Debug)]
pub struct Speaker {
    volume: AtomicU8,
}

impl Default for Speaker {
    fn default() -> Self {
        Self {
            volume: AtomicU8::new(DEFAULT_VOLUME),
        }
    }
}

impl Speaker {
    /// Current volume in percent.
    #[must_use]
    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed)
    }

    fn set_volume(&self, args: &[Argument]) -> String {
        let Some(arg) = args.first() else {
            return "At least one argument is required".to_string();
        };

        let Some(volume) = arg.value.as_integer() else {
            return "Volume argument must be an integer".to_string();
        };

        let Ok(volume) = u8::try_from(volume) else {
            return "Volume must be between 0 and 100".to_string();
        };
        if volume > 100 {
            return "Volume must be between 0 and 100".to_string();
        }

        self.volume.store(volume, Ordering::Relaxed);
        info!(volume, "Setting volume");
        "Volume set successfully".to_string()
    }
}

/// Tools offered by the sample device.
#[must_use]
pub fn tools(speaker: &Arc<Speaker>) -> Vec<Tool> {
    let speaker = Arc::clone(speaker);
    vec![Tool::new("set_volume", move |args: &[Argument]| {
        speaker.set_volume(args)
    })
    .with_description("Set the volume of the device, range 0 to 100")
    .with_property(
        Property::integer("volume")
            .with_description("Volume level (0-100)")
            .with_default(PropertyValue::Integer(i64::from(DEFAULT_VOLUME))),
    )]
}

/// Resources offered by the sample device.
#[must_use]
pub fn resources() -> Vec<Resource> {
    vec![Resource::new(VOLUME_URI, "volume")
        .with_title("Speaker volume")
        .with_description("Current output volume in percent")
        .with_mime_type("text/plain")]
}

/// Reader producing the content of [`resources`].
pub fn reader(speaker: &Arc<Speaker>) -> impl Fn(&str) -> String + Send + Sync + 'static {
    let speaker = Arc::clone(speaker);
    move |uri: &str| match uri {
        VOLUME_URI => speaker.volume().to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(speaker: &Arc<Speaker>, value: PropertyValue) -> String {
        tools(speaker)[0].invoke(&[Argument::new("volume", value)])
    }

    #[test]
    fn set_volume_in_range() {
        let speaker = Arc::new(Speaker::default());
        assert_eq!(call(&speaker, PropertyValue::Integer(75)), "Volume set successfully");
        assert_eq!(speaker.volume(), 75);
        assert_eq!(reader(&speaker)(VOLUME_URI), "75");
    }

    #[test]
    fn set_volume_out_of_range_is_reported_as_text() {
        let speaker = Arc::new(Speaker::default());
        assert_eq!(
            call(&speaker, PropertyValue::Integer(101)),
            "Volume must be between 0 and 100"
        );
        assert_eq!(
            call(&speaker, PropertyValue::Integer(-1)),
            "Volume must be between 0 and 100"
        );
        assert_eq!(speaker.volume(), DEFAULT_VOLUME);
    }

    #[test]
    fn set_volume_rejects_strings() {
        let speaker = Arc::new(Speaker::default());
        assert_eq!(
            call(&speaker, PropertyValue::String("loud".to_string())),
            "Volume argument must be an integer"
        );
    }

    #[test]
    fn resources_match_reader() {
        let speaker = Arc::new(Speaker::default());
        let resources = resources();
        assert_eq!(resources[0].uri, VOLUME_URI);
        assert_eq!(reader(&speaker)(VOLUME_URI), "50");
        assert_eq!(reader(&speaker)("device://other"), "");
    }
}
