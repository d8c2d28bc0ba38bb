//! Minimal scene nodes carried by sources for each view.
//!
//! Drawing is done elsewhere; these nodes only hold what views need to
//! place, show and pick a source: transforms, visibility, colors and the
//! kind of decoration.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Vec3, Vec4};

use super::transform::Transform;

pub const COLOR_DEFAULT_SOURCE: Vec3 = Vec3::new(0.7, 0.7, 0.7);
pub const COLOR_HIGHLIGHT_SOURCE: Vec3 = Vec3::new(1.0, 1.0, 1.0);
pub const COLOR_APPEARANCE_SOURCE: Vec3 = Vec3::new(0.9, 0.9, 0.1);

/// Process-unique node identifier, used to map a picked node back to its
/// source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameShape {
    Round,
    Sharp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSize {
    Thin,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameShadow {
    None,
    Glow,
    Drop,
    Perspective,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Resize,
    ResizeH,
    ResizeV,
    Rotate,
    Scale,
    Crop,
    Menu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    CirclePoint,
    Lock,
    Clone,
    Render,
    Pattern,
    Camera,
    Share,
    Video,
    Image,
    Session,
    Group,
    Stream,
}

/// What a drawable surface shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// The source render target through the blending shader.
    Render,
    /// The render target through the mixing preview shader.
    Mixing,
    /// Invisible surface catching pointer picks.
    Grab,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Frame {
        shape: FrameShape,
        size: FrameSize,
        shadow: FrameShadow,
    },
    Handles(HandleKind),
    Symbol(SymbolKind),
    Surface(SurfaceKind),
}

/// Leaf node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub primitive: Primitive,
    pub transform: Transform,
    pub color: Vec4,
    pub visible: bool,
}

impl Node {
    pub fn new(primitive: Primitive) -> Self {
        Self {
            id: NodeId::next(),
            primitive,
            transform: Transform::IDENTITY,
            color: Vec4::ONE,
            visible: true,
        }
    }

    pub fn frame(shape: FrameShape, size: FrameSize, shadow: FrameShadow) -> Self {
        Self::new(Primitive::Frame { shape, size, shadow })
    }

    pub fn handles(kind: HandleKind) -> Self {
        Self::new(Primitive::Handles(kind))
    }

    pub fn symbol(kind: SymbolKind, position: Vec3) -> Self {
        Self::new(Primitive::Symbol(kind)).at(position)
    }

    pub fn surface(kind: SurfaceKind) -> Self {
        Self::new(Primitive::Surface(kind))
    }

    pub fn at(mut self, translation: Vec3) -> Self {
        self.transform.translation = translation;
        self
    }

    pub fn with_z(mut self, z: f32) -> Self {
        self.transform.translation.z = z;
        self
    }

    pub fn with_color(mut self, color: Vec4) -> Self {
        self.color = color;
        self
    }
}

/// Transform node owning leaves.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub id: NodeId,
    pub transform: Transform,
    pub visible: bool,
    pub children: Vec<Node>,
}

impl Default for Group {
    fn default() -> Self {
        Self {
            id: NodeId::next(),
            transform: Transform::IDENTITY,
            visible: true,
            children: Vec::new(),
        }
    }
}

impl Group {
    pub fn hidden() -> Self {
        Self { visible: false, ..Self::default() }
    }

    pub fn attach(&mut self, node: Node) {
        self.children.push(node);
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.id == id || self.children.iter().any(|n| n.id == id)
    }

    pub fn find(&self, primitive: Primitive) -> Option<&Node> {
        self.children.iter().find(|n| n.primitive == primitive)
    }
}

/// Shows exactly one of its variants.
#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    pub id: NodeId,
    pub transform: Transform,
    pub active: usize,
    pub variants: Vec<Node>,
}

impl Switch {
    pub fn new(variants: Vec<Node>) -> Self {
        Self {
            id: NodeId::next(),
            transform: Transform::IDENTITY,
            active: 0,
            variants,
        }
    }

    pub fn set_active(&mut self, index: usize) {
        if !self.variants.is_empty() {
            self.active = index.min(self.variants.len() - 1);
        }
    }

    pub fn active_node(&self) -> Option<&Node> {
        self.variants.get(self.active)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.id == id || self.variants.iter().any(|n| n.id == id)
    }
}
