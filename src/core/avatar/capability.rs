use std::{collections::HashMap, sync::Arc};

use super::{AvatarEngine, ChannelHandle, MeshHandle, MeshInfo};

const ROOT_NODE: &str = "__root__";

static HEAD_KEYWORDS: &[&str] = &[
    "head", "hair", "eye", "brow", "lash", "lid", "teeth", "tooth", "tongue", "mouth", "lip",
    "nose", "nostril", "ear", "beard", "mustache", "face", "facial", "skull", "jaw", "forehead",
    "cheek", "chin", "pupil", "iris", "cornea", "sclera",
];

static BODY_KEYWORDS: &[&str] = &[
    "body", "shirt", "top", "torso", "chest", "shoulder", "arm", "hand", "finger", "neck",
    "throat", "collar", "sleeve", "jacket", "hoodie", "clothing", "outfit", "pants", "leg",
    "feet", "foot", "shoe", "sock",
];

static MAIN_HEAD_KEYWORDS: &[&str] = &["head", "skull", "face"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshRole {
    Head,
    Body,
}

fn keyword_hits(name: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| name.contains(*k)).count()
}

/// Head wins ties, and names matching neither list stay visible.
pub fn classify_mesh(name: &str) -> MeshRole {
    let name = name.to_lowercase();
    let head = keyword_hits(&name, HEAD_KEYWORDS);
    let body = keyword_hits(&name, BODY_KEYWORDS);
    if body > head {
        MeshRole::Body
    } else {
        MeshRole::Head
    }
}

/// Parts the procedural path animates when there are no morph targets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FallbackRig {
    pub head: Option<MeshHandle>,
    pub left_eye: Option<MeshHandle>,
    pub right_eye: Option<MeshHandle>,
    pub mouth: Option<MeshHandle>,
}

impl FallbackRig {
    pub fn locate(meshes: &[MeshInfo]) -> Self {
        let mut rig = Self::default();
        for mesh in meshes {
            let key: String = mesh
                .name
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_ascii_lowercase();
            let slot = match key.as_str() {
                "head" => &mut rig.head,
                "lefteye" | "eyeleft" | "eyel" => &mut rig.left_eye,
                "righteye" | "eyeright" | "eyer" => &mut rig.right_eye,
                "mouth" => &mut rig.mouth,
                _ => continue,
            };
            slot.get_or_insert(mesh.handle);
        }
        rig
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// What a loaded avatar can be driven with.
#[derive(Debug, Clone, Default)]
pub struct AvatarCapability {
    pub blendshape_capable: bool,
    /// Lowercased morph target name to every channel carrying that name.
    pub channels: HashMap<Arc<str>, Vec<ChannelHandle>>,
    pub head_parts: Vec<MeshHandle>,
    pub hidden_parts: Vec<MeshHandle>,
    pub main_head: Option<MeshHandle>,
    pub fallback: FallbackRig,
}

impl AvatarCapability {
    /// Looks up an already lowercased channel name.
    pub fn lookup(&self, lowercase_name: &str) -> &[ChannelHandle] {
        self.channels
            .get(lowercase_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all_channels(&self) -> impl Iterator<Item = ChannelHandle> + '_ {
        self.channels.values().flatten().copied()
    }

    /// Hides body parts and groups head parts under one node.
    pub fn apply_layout(&self, engine: &mut impl AvatarEngine) {
        for &mesh in &self.hidden_parts {
            engine.set_mesh_visible(mesh, false);
        }
        for &mesh in &self.head_parts {
            engine.set_mesh_visible(mesh, true);
        }
        engine.group_head_parts(&self.head_parts);
    }
}

/// Inspects a freshly loaded avatar once.
pub fn resolve(meshes: &[MeshInfo]) -> AvatarCapability {
    let mut cap = AvatarCapability::default();

    for mesh in meshes {
        if mesh.name.as_ref() == ROOT_NODE {
            continue;
        }

        for target in &mesh.morph_targets {
            let key: Arc<str> = target.name.to_lowercase().into();
            cap.channels.entry(key).or_default().push(target.handle);
        }

        match classify_mesh(&mesh.name) {
            MeshRole::Head => {
                log::debug!("Keeping head part {} (parent {:?})", mesh.name, mesh.parent);
                cap.head_parts.push(mesh.handle);
                let lower = mesh.name.to_lowercase();
                if cap.main_head.is_none() && keyword_hits(&lower, MAIN_HEAD_KEYWORDS) > 0 {
                    cap.main_head = Some(mesh.handle);
                }
            }
            MeshRole::Body => {
                log::debug!("Hiding body part {} (parent {:?})", mesh.name, mesh.parent);
                cap.hidden_parts.push(mesh.handle);
            }
        }
    }

    cap.blendshape_capable = !cap.channels.is_empty();
    if !cap.blendshape_capable {
        cap.fallback = FallbackRig::locate(meshes);
    }

    log::info!(
        "Avatar: {} morph channels, {} head parts, {} hidden parts{}",
        cap.channels.len(),
        cap.head_parts.len(),
        cap.hidden_parts.len(),
        if cap.blendshape_capable {
            ""
        } else {
            " (procedural fallback)"
        }
    );
    if let Some(head) = cap.main_head.and_then(|h| meshes.iter().find(|m| m.handle == h)) {
        log::info!("Main head mesh: {}", head.name);
    }

    cap
}
