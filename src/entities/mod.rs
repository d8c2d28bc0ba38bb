//! Entities module - sources, sessions and the data they are built from
//!
//! A `Session` owns `Source`s. Each source is shown through every view at
//! once, with one node group per view; `Source::update` keeps the render
//! state consistent with those groups.

pub mod framebuffer;
pub mod mixing_group;
pub mod node;
pub mod session;
pub mod session_io;
pub mod shaders;
pub mod source;
pub mod source_kind;
pub mod stream;
pub mod transfer;
pub mod transform;

pub use framebuffer::{FrameBuffer, FrameBufferImage, MaskBuffer, TextureId};
pub use mixing_group::{GroupAction, MixingGroup};
pub use node::{Group, Node, NodeId, Switch};
pub use session::Session;
pub use session_io::{SessionDocument, SourceRecord};
pub use shaders::{BlendMode, ImageProcessingShader, ImageShader, MaskShader};
pub use source::{Source, SourceMode};
pub use source_kind::SourceKind;
pub use stream::{DefaultStreams, Stream, StreamFactory, SyntheticStreams};
pub use transform::Transform;
