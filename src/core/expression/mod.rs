use std::{collections::HashMap, f32::consts::PI, sync::Arc};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use strum::{EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

pub mod estimator;
pub mod smoothing;

/// Channels produced by the estimator. 0 is resting, 1 is maximal.
#[repr(usize)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "camelCase")]
pub enum ExpressionChannel {
    EyeBlinkLeft,
    EyeBlinkRight,
    MouthOpen,
    JawOpen,
    Smile,
    MouthSmileLeft,
    MouthSmileRight,
    MouthFrownLeft,
    MouthFrownRight,
    BrowRaise,
    BrowInnerUp,
    BrowOuterUpLeft,
    BrowOuterUpRight,
    TongueOut,
    MouthPucker,
    MouthPress,
    CheekPuff,
    CheekSquint,
    NoseSneer,
    EyeLookLeft,
    EyeLookRight,
    EyeLookUp,
    EyeLookDown,
    MouthLeft,
    MouthRight,
    MouthShrugLower,
    MouthShrugUpper,
    TongueUp,
    TongueDown,
    TongueLeft,
    TongueRight,
}

static CHANNEL_NAMES: Lazy<[Arc<str>; ExpressionChannel::COUNT]> = Lazy::new(|| {
    let mut names = ExpressionChannel::iter().map(|c| Arc::<str>::from(<&str>::from(c)));
    std::array::from_fn(|_| names.next().unwrap_or_else(|| Arc::from("")))
});

impl ExpressionChannel {
    pub fn name(self) -> &'static Arc<str> {
        &CHANNEL_NAMES[self as usize]
    }
}

/// Clamps into [0,1], mapping NaN to 0.
#[inline(always)]
pub fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.
    } else {
        value.clamp(0., 1.)
    }
}

/// One frame of named expression values. Detectors may add channels
/// beyond [`ExpressionChannel`]; unknown names read as 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionFrame {
    values: HashMap<Arc<str>, f32>,
}

impl ExpressionFrame {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn get(&self, name: &str) -> f32 {
        self.values.get(name).copied().unwrap_or(0.)
    }

    #[inline(always)]
    pub fn set(&mut self, name: Arc<str>, value: f32) {
        self.values.insert(name, value);
    }

    #[inline(always)]
    pub fn getx(&self, channel: ExpressionChannel) -> f32 {
        self.get(channel.name())
    }

    #[inline(always)]
    pub fn setx(&mut self, channel: ExpressionChannel, value: f32) {
        self.set(channel.name().clone(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, f32)> {
        self.values.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeadPose {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl HeadPose {
    pub const ZERO: HeadPose = HeadPose {
        yaw: 0.,
        pitch: 0.,
        roll: 0.,
    };

    pub fn clamped(self, limits: &PoseLimits) -> Self {
        let axis = |v: f32, max: f32| if v.is_nan() { 0. } else { v.clamp(-max, max) };
        Self {
            yaw: axis(self.yaw, limits.max_yaw),
            pitch: axis(self.pitch, limits.max_pitch),
            roll: axis(self.roll, limits.max_roll),
        }
    }

    pub fn lerp(self, to: HeadPose, t: f32) -> Self {
        Self {
            yaw: self.yaw + (to.yaw - self.yaw) * t,
            pitch: self.pitch + (to.pitch - self.pitch) * t,
            roll: self.roll + (to.roll - self.roll) * t,
        }
    }
}

/// Maximum head rotation per axis, in radians.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoseLimits {
    pub max_yaw: f32,
    pub max_pitch: f32,
    pub max_roll: f32,
}

impl Default for PoseLimits {
    fn default() -> Self {
        Self {
            max_yaw: PI * 0.4,
            max_pitch: PI * 0.25,
            max_roll: PI * 0.2,
        }
    }
}
