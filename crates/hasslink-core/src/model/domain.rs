use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Entity domains the dashboard generator has a component for.
///
/// Anything outside this set is mirrored but never catalogued.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SupportedDomain {
    Light,
    Switch,
    Sensor,
    Climate,
    MediaPlayer,
    Cover,
    Scene,
    Camera,
    BinarySensor,
    Weather,
}

impl SupportedDomain {
    /// Dashboard component that renders entities of this domain.
    pub fn component(self) -> &'static str {
        match self {
            Self::Light => "LightCard",
            Self::Switch => "SwitchCard",
            Self::Sensor => "SensorCard",
            Self::Climate => "ClimateCard",
            Self::MediaPlayer => "MediaCard",
            Self::Cover => "CoverCard",
            Self::Scene => "SceneCard",
            Self::Camera => "CameraCard",
            Self::BinarySensor => "BinarySensorCard",
            Self::Weather => "WeatherCard",
        }
    }

    pub fn all() -> Vec<Self> {
        Self::iter().collect()
    }
}
