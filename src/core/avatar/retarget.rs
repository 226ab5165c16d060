use glam::Vec3;

use super::{
    aliases::ALIAS_TABLE,
    capability::{AvatarCapability, FallbackRig},
    manifest::FALLBACK_PARTS,
    AvatarEngine, MeshHandle,
};
use crate::core::expression::{
    unit, ExpressionChannel, ExpressionFrame, HeadPose, PoseLimits,
};

const EYE_CLOSE_SCALE: f32 = 0.8;
const MOUTH_REST_WIDTH: f32 = 1.5;
const MOUTH_SMILE_WIDTH: f32 = 0.5;
const MOUTH_REST_HEIGHT: f32 = 0.5;
const MOUTH_OPEN_HEIGHT: f32 = 0.8;
const MOUTH_DEPTH: f32 = 0.5;

/// Writes one displayed frame onto the avatar. Returns the number of
/// morph target writes.
pub fn apply(
    frame: &ExpressionFrame,
    pose: HeadPose,
    capability: &AvatarCapability,
    limits: &PoseLimits,
    engine: &mut impl AvatarEngine,
) -> usize {
    let written = if capability.blendshape_capable {
        apply_blendshapes(frame, capability, engine)
    } else {
        apply_procedural(frame, &capability.fallback, engine);
        0
    };

    engine.set_head_rotation(pose.clamped(limits));
    written
}

fn apply_blendshapes(
    frame: &ExpressionFrame,
    capability: &AvatarCapability,
    engine: &mut impl AvatarEngine,
) -> usize {
    let mut written = 0;

    for entry in ALIAS_TABLE.iter() {
        let value = unit(entry.value(|channel| frame.getx(channel)));
        for alias in &entry.aliases {
            for &handle in capability.lookup(alias) {
                log::trace!("{} -> {} = {:.3}", entry.target, alias, value);
                engine.set_morph_influence(handle, value);
                written += 1;
            }
        }
    }

    // Channels outside the estimator's set go straight to a same-named target.
    for (name, value) in frame.iter() {
        if name.parse::<ExpressionChannel>().is_ok() {
            continue;
        }
        let value = unit(value);
        for &handle in capability.lookup(&name.to_lowercase()) {
            engine.set_morph_influence(handle, value);
            written += 1;
        }
    }

    written
}

fn set_scale(engine: &mut impl AvatarEngine, mesh: Option<MeshHandle>, scale: Vec3) {
    if let Some(mesh) = mesh {
        engine.set_mesh_scale(mesh, scale.into());
    }
}

fn apply_procedural(frame: &ExpressionFrame, rig: &FallbackRig, engine: &mut impl AvatarEngine) {
    let eye = |channel| Vec3::new(1., 1. - unit(frame.getx(channel)) * EYE_CLOSE_SCALE, 1.);
    set_scale(engine, rig.left_eye, eye(ExpressionChannel::EyeBlinkLeft));
    set_scale(engine, rig.right_eye, eye(ExpressionChannel::EyeBlinkRight));

    let smile = unit(frame.getx(ExpressionChannel::Smile));
    let open = unit(frame.getx(ExpressionChannel::MouthOpen));
    set_scale(
        engine,
        rig.mouth,
        Vec3::new(
            MOUTH_REST_WIDTH + smile * MOUTH_SMILE_WIDTH,
            MOUTH_REST_HEIGHT + open * MOUTH_OPEN_HEIGHT,
            MOUTH_DEPTH,
        ),
    );
}

/// Puts the avatar back to neutral: morphs at 0, head straight,
/// fallback parts at their rest transforms.
pub fn reset(capability: &AvatarCapability, engine: &mut impl AvatarEngine) {
    for handle in capability.all_channels() {
        engine.set_morph_influence(handle, 0.);
    }

    let rig = &capability.fallback;
    for (part, mesh) in FALLBACK_PARTS
        .iter()
        .zip([rig.head, rig.left_eye, rig.right_eye, rig.mouth])
    {
        if let Some(mesh) = mesh {
            engine.set_mesh_scale(mesh, part.scale.into());
            engine.set_mesh_position(mesh, part.position.into());
        }
    }

    engine.set_head_rotation(HeadPose::ZERO);
}
