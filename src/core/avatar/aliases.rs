use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::expression::ExpressionChannel;

static CAMEL_HUMP_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid regex"));
static SIDE_SUFFIX_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)(Left|Right)$").expect("valid regex"));

/// How several expression contributions to one target are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combine {
    /// The strongest contribution wins.
    Max,
    /// Weighted contributions are averaged.
    Mean,
}

struct Rule {
    target: &'static str,
    sources: &'static [(ExpressionChannel, f32)],
    combine: Combine,
    extra: &'static [&'static str],
}

const fn rule(
    target: &'static str,
    sources: &'static [(ExpressionChannel, f32)],
    extra: &'static [&'static str],
) -> Rule {
    Rule {
        target,
        sources,
        combine: Combine::Max,
        extra,
    }
}

use ExpressionChannel as E;

#[rustfmt::skip]
static RULES: &[Rule] = &[
    rule("eyeBlinkLeft", &[(E::EyeBlinkLeft, 1.)], &["eyelidsclosed_l", "eyeclose_l", "eyesclosed_l", "blink_l", "Fcl_EYE_Close_L"]),
    rule("eyeBlinkRight", &[(E::EyeBlinkRight, 1.)], &["eyelidsclosed_r", "eyeclose_r", "eyesclosed_r", "blink_r", "Fcl_EYE_Close_R"]),
    Rule {
        target: "eyesClosed",
        sources: &[(E::EyeBlinkLeft, 1.), (E::EyeBlinkRight, 1.)],
        combine: Combine::Mean,
        extra: &["blink", "eyeclose", "Fcl_EYE_Close"],
    },
    rule("jawOpen", &[(E::JawOpen, 1.), (E::MouthOpen, 1.)], &["jaw_drop"]),
    rule("mouthOpen", &[(E::MouthOpen, 1.)], &["mouth_a", "Fcl_MTH_A", "vrc.v_aa"]),
    rule("mouthSmile", &[(E::Smile, 1.)], &["smile", "Fcl_MTH_Joy", "Fcl_ALL_Joy"]),
    rule("mouthSmileLeft", &[(E::MouthSmileLeft, 1.)], &["smile_l"]),
    rule("mouthSmileRight", &[(E::MouthSmileRight, 1.)], &["smile_r"]),
    rule("mouthFrownLeft", &[(E::MouthFrownLeft, 1.)], &["frown_l"]),
    rule("mouthFrownRight", &[(E::MouthFrownRight, 1.)], &["frown_r"]),
    rule("browInnerUp", &[(E::BrowInnerUp, 1.)], &["browsinnerup", "brows_inner_up"]),
    rule("browOuterUpLeft", &[(E::BrowOuterUpLeft, 1.)], &["browsup_l", "brow_up_l"]),
    rule("browOuterUpRight", &[(E::BrowOuterUpRight, 1.)], &["browsup_r", "brow_up_r"]),
    rule("browsUp", &[(E::BrowRaise, 1.)], &["browraise", "brow_raise", "Fcl_BRW_Surprised"]),
    rule("tongueOut", &[(E::TongueOut, 1.)], &["tongue", "tongue_out_full"]),
    rule("mouthRollLower", &[(E::TongueOut, 0.3)], &[]),
    rule("mouthRollUpper", &[(E::TongueOut, 0.2)], &[]),
    rule("mouthPucker", &[(E::MouthPucker, 1.)], &["pucker", "Fcl_MTH_U"]),
    rule("mouthPressLeft", &[(E::MouthPress, 1.)], &[]),
    rule("mouthPressRight", &[(E::MouthPress, 1.)], &[]),
    rule("cheekPuff", &[(E::CheekPuff, 1.)], &["puff", "cheeks_puff"]),
    rule("cheekSquintLeft", &[(E::CheekSquint, 1.)], &[]),
    rule("cheekSquintRight", &[(E::CheekSquint, 1.)], &[]),
    rule("noseSneerLeft", &[(E::NoseSneer, 1.)], &[]),
    rule("noseSneerRight", &[(E::NoseSneer, 1.)], &[]),
    rule("eyeLookLeft", &[(E::EyeLookLeft, 1.)], &[]),
    rule("eyeLookRight", &[(E::EyeLookRight, 1.)], &[]),
    rule("eyeLookUp", &[(E::EyeLookUp, 1.)], &[]),
    rule("eyeLookDown", &[(E::EyeLookDown, 1.)], &[]),
    rule("eyeLookUpLeft", &[(E::EyeLookUp, 1.)], &[]),
    rule("eyeLookUpRight", &[(E::EyeLookUp, 1.)], &[]),
    rule("eyeLookDownLeft", &[(E::EyeLookDown, 1.)], &[]),
    rule("eyeLookDownRight", &[(E::EyeLookDown, 1.)], &[]),
    rule("mouthLeft", &[(E::MouthLeft, 1.)], &[]),
    rule("mouthRight", &[(E::MouthRight, 1.)], &[]),
    rule("mouthShrugLower", &[(E::MouthShrugLower, 1.)], &[]),
    rule("mouthShrugUpper", &[(E::MouthShrugUpper, 1.)], &[]),
    rule("tongueUp", &[(E::TongueUp, 1.)], &[]),
    rule("tongueDown", &[(E::TongueDown, 1.)], &[]),
    rule("tongueLeft", &[(E::TongueLeft, 1.)], &[]),
    rule("tongueRight", &[(E::TongueRight, 1.)], &[]),
];

/// One morph target family and every spelling it may appear under.
pub struct AliasEntry {
    pub target: &'static str,
    pub sources: &'static [(ExpressionChannel, f32)],
    pub combine: Combine,
    /// Lowercased, unique, in lookup order.
    pub aliases: Vec<Arc<str>>,
}

impl AliasEntry {
    /// Merges this target's contributions from a frame of values.
    pub fn value(&self, get: impl Fn(ExpressionChannel) -> f32) -> f32 {
        let contributions = self.sources.iter().map(|&(channel, w)| get(channel) * w);
        match self.combine {
            Combine::Max => contributions.fold(0f32, f32::max),
            Combine::Mean => {
                let sum: f32 = contributions.sum();
                sum / self.sources.len().max(1) as f32
            }
        }
    }
}

/// Spellings commonly exported for an ARKit style name such as `eyeBlinkLeft`:
/// `eye_blink_left`, `eyeBlink_L`, `eyeBlinkL`, `eye_blink_l`, `eyeBlink.L`.
/// Case is ignored at lookup, so PascalCase needs no entry of its own.
pub fn name_variants(base: &str) -> Vec<String> {
    let snake = |s: &str| CAMEL_HUMP_REGEX.replace_all(s, "${1}_${2}").into_owned();

    let mut variants = vec![base.to_string(), snake(base)];
    if let Some(caps) = SIDE_SUFFIX_REGEX.captures(base) {
        let prefix = &caps[1];
        let side = &caps[2];
        let short = &side[..1];
        variants.push(format!("{}_{}", prefix, short));
        variants.push(format!("{}{}", prefix, short));
        variants.push(format!("{}.{}", prefix, short));
        variants.push(format!("{}_{}", prefix, side));
        variants.push(format!("{}_{}", snake(prefix), short));
    }
    variants
}

pub static ALIAS_TABLE: Lazy<Vec<AliasEntry>> = Lazy::new(|| {
    RULES
        .iter()
        .map(|rule| {
            let mut aliases: Vec<Arc<str>> = Vec::new();
            let spellings = name_variants(rule.target)
                .into_iter()
                .chain(rule.extra.iter().map(|s| s.to_string()));
            for spelling in spellings {
                let lower: Arc<str> = spelling.to_lowercase().into();
                if !aliases.contains(&lower) {
                    aliases.push(lower);
                }
            }
            AliasEntry {
                target: rule.target,
                sources: rule.sources,
                combine: rule.combine,
                aliases,
            }
        })
        .collect()
});

pub fn print_aliases() {
    for entry in ALIAS_TABLE.iter() {
        log::debug!("{} <= {}", entry.target, entry.aliases.join(", "));
    }
}
