//! Source: one logical input shown through every view.
//!
//! A source owns one node group per view. The views edit those groups;
//! [`Source::update`] reconciles them every frame the source is touched:
//! mixing position drives alpha and activity, geometry drives the render
//! transform and crop, layer position drives depth and locking, and the
//! appearance frame drives the texture transform.

use std::collections::{HashMap, HashSet};

use glam::{UVec2, Vec2, Vec3, Vec4};
use log::{debug, info};
use uuid::Uuid;

use super::framebuffer::{FrameBuffer, FrameBufferImage, MaskBuffer, TextureId};
use super::node::{
    COLOR_APPEARANCE_SOURCE, COLOR_DEFAULT_SOURCE, COLOR_HIGHLIGHT_SOURCE, FrameShadow, FrameShape,
    FrameSize, Group, HandleKind, Node, NodeId, Primitive, SurfaceKind, Switch, SymbolKind,
};
use super::shaders::{ImageProcessingShader, ImageShader, MaskShader, RenderingShader};
use super::source_kind::SourceKind;
use super::transfer::{position_for_alpha, sin_quad};
use super::transform::texture_transform;
use crate::config::StageConfig;
use crate::utils::text::transliterate;
use crate::views::ViewMode;

/// Display state, ordered: a source is first made visible when attached,
/// then moves freely between the other modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SourceMode {
    #[default]
    Uninitialized,
    Visible,
    Selected,
    Current,
}

/// Nodes of one view: the group itself, a plain/highlighted frame pair and
/// an overlay shown while the source is current.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewNodes {
    pub group: Group,
    pub frame: Option<Switch>,
    pub overlay: Option<Group>,
}

impl ViewNodes {
    fn new(group: Group) -> Self {
        Self { group, frame: None, overlay: None }
    }

    fn contains(&self, id: NodeId) -> bool {
        self.group.contains(id)
            || self.frame.as_ref().is_some_and(|f| f.contains(id))
            || self.overlay.as_ref().is_some_and(|o| o.contains(id))
    }
}

/// Readiness of a source, as seen by its clones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OriginState {
    pub resolution: UVec2,
    pub texture: TextureId,
}

/// What a source needs from its session during a frame.
#[derive(Debug, Clone, Default)]
pub struct SourceContext {
    pub dt: f32,
    /// Initialized sources of the session, for clones.
    pub origins: HashMap<Uuid, OriginState>,
    /// Sources having at least one active clone.
    pub clone_active: HashSet<Uuid>,
    /// Session output, for render loopbacks.
    pub output_texture: TextureId,
    pub output_resolution: UVec2,
}

#[derive(Debug)]
pub struct Source {
    id: Uuid,
    name: String,
    initials: [char; 2],
    kind: SourceKind,
    mode: SourceMode,
    stage: StageConfig,

    active: bool,
    locked: bool,
    need_update: bool,
    initialized: bool,
    clones_active: bool,
    /// Set on sources built to replace a failed one.
    recreated: bool,
    /// Clone asked its origin to refresh.
    touch_origin: bool,
    /// Output resolution seen by a render loopback on its last frame.
    output_resolution: Option<UVec2>,
    dt: f32,

    views: HashMap<ViewMode, ViewNodes>,
    locker: Node,
    symbol: Node,

    blending_shader: ImageShader,
    mixing_shader: ImageShader,
    mask_shader: MaskShader,
    rendering_shader: RenderingShader,
    /// Processing parameters kept while the pass-through shader is bound.
    stashed_processing: ImageProcessingShader,
    texture: TextureId,

    render_buffer: Option<FrameBuffer>,
    mask_buffer: Option<MaskBuffer>,
    mask_image: Option<FrameBufferImage>,
    mask_need_update: bool,

    mixing_group: Option<Uuid>,
    clones: Vec<Uuid>,
}

fn frame_pair(shape: FrameShape, shadow: [FrameShadow; 2], colors: [Vec4; 2]) -> Switch {
    Switch::new(vec![
        Node::frame(shape, FrameSize::Thin, shadow[0]).with_z(0.1).with_color(colors[0]),
        Node::frame(shape, FrameSize::Large, shadow[1]).with_z(0.1).with_color(colors[1]),
    ])
}

fn handle_overlay(color: Vec3, z: f32) -> Group {
    let mut overlay = Group::hidden();
    overlay.transform.translation.z = z;
    for kind in [
        HandleKind::Resize,
        HandleKind::ResizeH,
        HandleKind::ResizeV,
        HandleKind::Rotate,
        HandleKind::Scale,
        HandleKind::Menu,
    ] {
        overlay.attach(Node::handles(kind).with_z(0.1).with_color(color.extend(1.0)));
    }
    overlay
}

impl Source {
    pub fn new(kind: SourceKind, stage: StageConfig) -> Self {
        Self::with_id(Uuid::new_v4(), kind, stage)
    }

    /// Build a source with a known id (session loading).
    pub fn with_id(id: Uuid, kind: SourceKind, stage: StageConfig) -> Self {
        let mut views = HashMap::new();

        views.insert(ViewMode::Rendering, ViewNodes::new(Group::hidden()));

        // mixing: small round icon with a center point
        let mut mixing = ViewNodes::new(Group::hidden());
        mixing.group.transform.scale = Vec3::new(stage.mixing_icon_scale, stage.mixing_icon_scale, 1.0);
        mixing.group.transform.translation = stage.default_mixing_translation.extend(0.0);
        mixing.frame = Some(frame_pair(
            FrameShape::Round,
            [FrameShadow::Drop, FrameShadow::Drop],
            [COLOR_DEFAULT_SOURCE.extend(0.9), COLOR_HIGHLIGHT_SOURCE.extend(1.0)],
        ));
        let mut overlay = Group::hidden();
        overlay.transform.translation.z = 0.1;
        overlay.attach(Node::symbol(SymbolKind::CirclePoint, Vec3::new(0.0, 0.0, 0.1)));
        mixing.overlay = Some(overlay);
        views.insert(ViewMode::Mixing, mixing);

        // geometry: sharp frame with edit handles
        let mut geometry = ViewNodes::new(Group::hidden());
        geometry.frame = Some(frame_pair(
            FrameShape::Sharp,
            [FrameShadow::None, FrameShadow::Glow],
            [COLOR_DEFAULT_SOURCE.extend(0.7), COLOR_HIGHLIGHT_SOURCE.extend(1.0)],
        ));
        let mut overlay = handle_overlay(COLOR_HIGHLIGHT_SOURCE, 0.15);
        overlay.attach(Node::handles(HandleKind::Crop).with_z(0.1).with_color(COLOR_HIGHLIGHT_SOURCE.extend(1.0)));
        overlay.attach(
            Node::frame(FrameShape::Sharp, FrameSize::Thin, FrameShadow::None)
                .with_z(0.1)
                .with_color(COLOR_HIGHLIGHT_SOURCE.extend(0.7)),
        );
        geometry.overlay = Some(overlay);
        views.insert(ViewMode::Geometry, geometry);

        // layer: perspective frame, behind everything until given a depth
        let mut layer = ViewNodes::new(Group::hidden());
        layer.group.transform.translation.z = -1.0;
        layer.frame = Some(frame_pair(
            FrameShape::Round,
            [FrameShadow::Perspective, FrameShadow::Perspective],
            [COLOR_DEFAULT_SOURCE.extend(0.8), COLOR_HIGHLIGHT_SOURCE.extend(1.0)],
        ));
        let mut overlay = Group::hidden();
        overlay.transform.translation.z = 0.15;
        layer.overlay = Some(overlay);
        views.insert(ViewMode::Layer, layer);

        let mut appearance = ViewNodes::new(Group::hidden());
        appearance.frame = Some(frame_pair(
            FrameShape::Sharp,
            [FrameShadow::None, FrameShadow::None],
            [COLOR_APPEARANCE_SOURCE.extend(0.7), COLOR_APPEARANCE_SOURCE.extend(1.0)],
        ));
        appearance.overlay = Some(handle_overlay(COLOR_APPEARANCE_SOURCE, 0.1));
        views.insert(ViewMode::Appearance, appearance);

        views.insert(ViewMode::Transition, ViewNodes::new(Group::default()));

        let mut locker = Node::symbol(SymbolKind::Lock, Vec3::new(0.8, -0.8, 0.01))
            .with_color(Vec4::new(1.0, 1.0, 1.0, 0.6));
        locker.visible = false;
        let symbol = Node::symbol(kind.symbol(), Vec3::new(0.8, 0.8, 0.01));

        let mixing_shader = ImageShader { stipple: 1.0, ..ImageShader::default() };

        Self {
            id,
            name: "Source".to_string(),
            initials: ['_', '_'],
            kind,
            mode: SourceMode::Uninitialized,
            stage,
            active: true,
            locked: false,
            need_update: true,
            initialized: false,
            clones_active: false,
            recreated: false,
            touch_origin: false,
            output_resolution: None,
            dt: 0.0,
            views,
            locker,
            symbol,
            blending_shader: ImageShader::default(),
            mixing_shader,
            mask_shader: MaskShader::default(),
            rendering_shader: RenderingShader::Processing(ImageProcessingShader::default()),
            stashed_processing: ImageProcessingShader::default(),
            texture: TextureId::BLACK,
            render_buffer: None,
            mask_buffer: None,
            mask_image: None,
            mask_need_update: false,
            mixing_group: None,
            clones: Vec::new(),
        }
    }

    // ===== identity =====

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initials(&self) -> String {
        self.initials.iter().collect()
    }

    /// Set the display name in printable ASCII; initials are its first and
    /// last characters, uppercased.
    pub fn set_name(&mut self, name: &str) {
        let name = transliterate(name);
        self.name = if name.is_empty() { "Source".to_string() } else { name };
        let first = self.name.chars().next().unwrap_or('_');
        let last = self.name.chars().next_back().unwrap_or('_');
        self.initials = [first.to_ascii_uppercase(), last.to_ascii_uppercase()];
    }

    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut SourceKind {
        &mut self.kind
    }

    pub fn stage(&self) -> &StageConfig {
        &self.stage
    }

    // ===== view nodes =====

    pub fn nodes(&self, view: ViewMode) -> &ViewNodes {
        // every view is populated in the constructor
        &self.views[&view]
    }

    pub fn group(&self, view: ViewMode) -> &Group {
        &self.nodes(view).group
    }

    /// Mutable access to a view group; marks the source for update.
    pub fn group_mut(&mut self, view: ViewMode) -> &mut Group {
        self.need_update = true;
        &mut self.views_mut(view).group
    }

    fn views_mut(&mut self, view: ViewMode) -> &mut ViewNodes {
        self.views.entry(view).or_insert_with(|| ViewNodes::new(Group::hidden()))
    }

    pub fn locker(&self) -> &Node {
        &self.locker
    }

    pub fn symbol(&self) -> &Node {
        &self.symbol
    }

    /// True when `id` is one of this source's nodes.
    pub fn contains(&self, id: NodeId) -> bool {
        self.locker.id == id || self.symbol.id == id || self.views.values().any(|v| v.contains(id))
    }

    // ===== mode and flags =====

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SourceMode) {
        if self.mode == SourceMode::Uninitialized {
            for nodes in self.views.values_mut() {
                nodes.group.visible = true;
            }
        }

        let variant = usize::from(mode >= SourceMode::Selected);
        let current = mode >= SourceMode::Current;
        for nodes in self.views.values_mut() {
            if let Some(frame) = &mut nodes.frame {
                frame.set_active(variant);
            }
            if let Some(overlay) = &mut nodes.overlay {
                overlay.visible = current;
            }
        }
        self.views_mut(ViewMode::Appearance).group.visible = mode > SourceMode::Visible;
        self.mode = mode;
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// Activate or deactivate; a source with an active clone stays active.
    pub fn set_active(&mut self, on: bool) {
        self.active = on || (!self.kind.is_clone() && self.clones_active);
        if self.kind.is_clone() {
            self.touch_origin = true;
        }
        for view in [ViewMode::Rendering, ViewMode::Layer] {
            self.views_mut(view).group.visible = self.active;
        }
        self.show_in_geometry();
    }

    pub fn locked(&self) -> bool {
        self.locked
    }

    pub fn set_locked(&mut self, on: bool) {
        self.locked = on;
        self.locker.visible = on;
        self.show_in_geometry();
    }

    /// Only active, unlocked sources can be edited in geometry.
    fn show_in_geometry(&mut self) {
        let visible = self.active && !self.locked;
        self.views_mut(ViewMode::Geometry).group.visible = visible;
    }

    pub fn touch(&mut self) {
        self.need_update = true;
    }

    pub fn need_update(&self) -> bool {
        self.need_update
    }

    pub fn ready(&self) -> bool {
        self.initialized
    }

    pub fn recreated(&self) -> bool {
        self.recreated
    }

    pub(crate) fn mark_recreated(&mut self) {
        self.recreated = true;
    }

    pub(crate) fn take_origin_touch(&mut self) -> bool {
        std::mem::take(&mut self.touch_origin)
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    // ===== mixing and layer helpers =====

    pub fn alpha(&self) -> f32 {
        self.blending_shader.color.w
    }

    /// Move the mixing icon along its direction to the distance giving
    /// `alpha`.
    pub fn set_alpha(&mut self, alpha: f32) {
        let fallback = self.stage.default_mixing_translation;
        let group = self.group_mut(ViewMode::Mixing);
        let pos = group.transform.translation.truncate();
        let target = position_for_alpha(alpha, pos, fallback);
        group.transform.translation.x = target.x;
        group.transform.translation.y = target.y;
        let a = sin_quad(target.x, target.y);
        self.blending_shader.color.w = a;
        self.mixing_shader.color.w = a;
    }

    pub fn depth(&self) -> f32 {
        self.group(ViewMode::Layer).transform.translation.z
    }

    /// Place the source at `depth` on the layer axis.
    pub fn set_depth(&mut self, depth: f32) {
        let d = depth.clamp(self.stage.min_depth, self.stage.max_depth);
        let layer = &mut self.group_mut(ViewMode::Layer).transform;
        layer.translation.z = d;
        layer.translation.x = -d;
    }

    // ===== relations =====

    pub fn is_clone(&self) -> bool {
        self.kind.is_clone()
    }

    pub fn origin(&self) -> Option<Uuid> {
        self.kind.origin()
    }

    /// Forget the origin; the clone keeps existing but shows black.
    pub fn detach_origin(&mut self) {
        if let SourceKind::Clone { origin } = &mut self.kind {
            *origin = None;
            self.texture = TextureId::BLACK;
        }
    }

    pub fn clones(&self) -> &[Uuid] {
        &self.clones
    }

    pub(crate) fn register_clone(&mut self, clone: Uuid) {
        if !self.clones.contains(&clone) {
            self.clones.push(clone);
        }
    }

    /// Take a fresh id, for a source joining a session that already uses
    /// its own. Clone registrations are rebuilt by the session.
    pub(crate) fn renew_id(&mut self) -> Uuid {
        self.id = Uuid::new_v4();
        self.clones.clear();
        self.id
    }

    pub(crate) fn unregister_clone(&mut self, clone: Uuid) {
        self.clones.retain(|c| *c != clone);
    }

    pub fn mixing_group(&self) -> Option<Uuid> {
        self.mixing_group
    }

    pub(crate) fn set_mixing_group(&mut self, group: Option<Uuid>) {
        self.mixing_group = group;
    }

    // ===== shaders =====

    pub fn blending_shader(&self) -> &ImageShader {
        &self.blending_shader
    }

    pub fn blending_shader_mut(&mut self) -> &mut ImageShader {
        &mut self.blending_shader
    }

    pub fn mixing_shader(&self) -> &ImageShader {
        &self.mixing_shader
    }

    pub fn mask_shader(&self) -> &MaskShader {
        &self.mask_shader
    }

    pub fn mask_shader_mut(&mut self) -> &mut MaskShader {
        self.need_update = true;
        &mut self.mask_shader
    }

    /// Shader bound to the texture surface.
    pub fn rendering_shader(&self) -> &RenderingShader {
        &self.rendering_shader
    }

    pub fn image_processing_enabled(&self) -> bool {
        matches!(self.rendering_shader, RenderingShader::Processing(_))
    }

    /// Processing parameters, whether bound or stashed.
    pub fn processing_shader(&self) -> &ImageProcessingShader {
        match &self.rendering_shader {
            RenderingShader::Processing(s) => s,
            RenderingShader::Passthrough(_) => &self.stashed_processing,
        }
    }

    pub fn processing_shader_mut(&mut self) -> &mut ImageProcessingShader {
        match &mut self.rendering_shader {
            RenderingShader::Processing(s) => s,
            RenderingShader::Passthrough(_) => &mut self.stashed_processing,
        }
    }

    /// Swap between the processing shader and a pass-through one, keeping
    /// the processing parameters for when it comes back.
    pub fn set_image_processing_enabled(&mut self, on: bool) {
        if on == self.image_processing_enabled() {
            return;
        }
        let i_transform = self.rendering_shader.i_transform();
        let replaced = if on {
            let mut processing = self.stashed_processing.clone();
            processing.i_transform = i_transform;
            RenderingShader::Processing(processing)
        } else {
            RenderingShader::Passthrough(ImageShader { i_transform, ..ImageShader::default() })
        };
        if let RenderingShader::Processing(previous) = std::mem::replace(&mut self.rendering_shader, replaced) {
            self.stashed_processing = previous;
        }
        self.touch();
    }

    // ===== mask =====

    /// Use `image` as mask content at next update.
    pub fn set_mask(&mut self, image: FrameBufferImage) {
        if image.is_empty() {
            self.mask_need_update = false;
            return;
        }
        self.mask_image = Some(image);
        self.mask_need_update = true;
        self.touch();
    }

    /// Keep `image` as stored mask, or capture the mask buffer when `None`.
    pub fn store_mask(&mut self, image: Option<FrameBufferImage>) {
        self.mask_image = image.or_else(|| self.mask_buffer.as_ref().map(MaskBuffer::image));
    }

    pub fn stored_mask(&self) -> Option<&FrameBufferImage> {
        self.mask_image.as_ref()
    }

    pub fn mask_buffer(&self) -> Option<&MaskBuffer> {
        self.mask_buffer.as_ref()
    }

    // ===== rendering =====

    /// Render target, or a black placeholder before initialization.
    pub fn frame(&self) -> &FrameBuffer {
        match &self.render_buffer {
            Some(buffer) if self.initialized => buffer,
            _ => FrameBuffer::placeholder(),
        }
    }

    /// Texture drawn into the render target.
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    /// Whether the content behind this source stopped working.
    pub fn failed(&self) -> bool {
        match &self.kind {
            SourceKind::SessionFile { failed, .. } => *failed,
            SourceKind::Render => match (&self.render_buffer, self.output_resolution) {
                (Some(buffer), Some(output)) => self.initialized && buffer.resolution() != output,
                _ => false,
            },
            kind => kind.stream().is_some_and(|s| s.failed()),
        }
    }

    /// Advance content, initialize on first readiness, then draw the
    /// content into the render target.
    pub fn render(&mut self, ctx: &SourceContext) {
        if let Some(stream) = self.kind.stream_mut() {
            stream.update(ctx.dt);
        }
        if let Some(session) = self.kind.session_mut() {
            session.update(ctx.dt, None);
        }
        if matches!(self.kind, SourceKind::Render) {
            self.output_resolution = Some(ctx.output_resolution);
        }

        if !self.initialized {
            self.init(ctx);
            return;
        }

        match &self.kind {
            SourceKind::Clone { origin: Some(origin) } => {
                if let Some(state) = ctx.origins.get(origin) {
                    self.texture = state.texture;
                }
            }
            SourceKind::Clone { origin: None } => self.texture = TextureId::BLACK,
            SourceKind::Render => self.texture = ctx.output_texture,
            kind => {
                if let Some((_, texture)) = kind.content() {
                    self.texture = texture;
                }
            }
        }
        if let Some(buffer) = &mut self.render_buffer {
            buffer.draw(self.texture);
        }
    }

    fn init(&mut self, ctx: &SourceContext) {
        let content = match &self.kind {
            SourceKind::Render => Some((ctx.output_resolution, ctx.output_texture)),
            SourceKind::Clone { origin } => origin
                .and_then(|o| ctx.origins.get(&o))
                .map(|state| (state.resolution, state.texture)),
            kind => kind.content(),
        };
        if let Some((resolution, texture)) = content {
            self.texture = texture;
            self.attach(FrameBuffer::new(resolution));
            self.initialized = true;
            info!(
                "Source '{}' ({}) ready at {}x{}",
                self.name,
                self.kind.type_name(),
                resolution.x,
                resolution.y
            );
        }
    }

    /// Wire the render target into the view nodes.
    fn attach(&mut self, buffer: FrameBuffer) {
        let aspect = buffer.aspect_ratio();

        let symbol = self.symbol.clone();
        for view in [ViewMode::Mixing, ViewMode::Layer] {
            if let Some(overlay) = &mut self.views_mut(view).overlay {
                overlay.attach(symbol.clone());
            }
        }

        for view in [ViewMode::Rendering, ViewMode::Geometry] {
            self.views_mut(view).group.attach(Node::surface(SurfaceKind::Render));
        }
        for view in [ViewMode::Mixing, ViewMode::Layer] {
            self.views_mut(view).group.attach(Node::surface(SurfaceKind::Mixing));
        }
        for view in [ViewMode::Appearance, ViewMode::Mixing, ViewMode::Layer] {
            self.views_mut(view).group.attach(Node::surface(SurfaceKind::Grab));
        }

        // icon-bearing nodes follow the content aspect ratio
        for (view, nodes) in self.views.iter_mut() {
            if *view == ViewMode::Rendering {
                continue;
            }
            for child in nodes.group.children.iter_mut() {
                child.transform.scale.x = aspect;
            }
            if let Some(frame) = &mut nodes.frame {
                frame.transform.scale.x = aspect;
            }
            if let Some(overlay) = &mut nodes.overlay {
                overlay.transform.scale.x = aspect;
            }
        }

        // keep corner icons anchored whatever the aspect ratio
        let offset = self.stage.icon_aspect_offset * (aspect - 1.0);
        self.symbol.transform.translation.x += offset;
        self.locker.transform.translation.x += offset;

        let ratio = self.stage.mask_buffer_ratio;
        let mask_resolution = (buffer.resolution().as_vec2() * ratio).as_uvec2();
        self.mask_buffer = Some(MaskBuffer::new(mask_resolution));
        self.render_buffer = Some(buffer);

        if self.mode == SourceMode::Uninitialized {
            self.set_mode(SourceMode::Visible);
        }
        self.need_update = true;
    }

    /// Per-frame reconciliation of view transforms into render state.
    /// Runs only while the source is marked for update.
    pub fn update(&mut self, dt: f32, ctx: &SourceContext) {
        self.dt = dt;
        self.clones_active = ctx.clone_active.contains(&self.id);

        let Some(aspect) = self.render_buffer.as_ref().map(FrameBuffer::aspect_ratio) else {
            return;
        };
        if !self.need_update || self.mask_buffer.is_none() {
            return;
        }
        let stage = self.stage;

        // alpha from the mixing position
        let dist: Vec2 = self.group(ViewMode::Mixing).transform.translation.truncate();
        let alpha = sin_quad(dist.x, dist.y);
        self.blending_shader.color = Vec4::new(1.0, 1.0, 1.0, alpha);
        self.mixing_shader.color = self.blending_shader.color;

        // leaving the limbo circle deactivates
        let active = dist.length() < stage.mixing_limbo_radius;
        self.set_active(active);
        let icon = stage.mixing_icon_scale - if active { 0.0 } else { stage.inactive_icon_shrink };
        self.views_mut(ViewMode::Mixing).group.transform.scale = Vec3::new(icon, icon, 1.0);

        // geometry drives rendering
        let geometry = self.group(ViewMode::Geometry).transform;
        let scale = Vec3::new(stage.clamp_scale(geometry.scale.x), stage.clamp_scale(geometry.scale.y), 1.0);
        self.views_mut(ViewMode::Geometry).group.transform.scale = scale;
        {
            let rendering = &mut self.views_mut(ViewMode::Rendering).group.transform;
            rendering.translation = geometry.translation;
            rendering.rotation = geometry.rotation;
            rendering.scale = scale;
        }

        // crop drives the projection area and the mixing icon shape
        if let Some(buffer) = &mut self.render_buffer {
            buffer.set_projection_area(geometry.crop.truncate());
        }
        let surface_scale = Vec3::new(geometry.crop.x * aspect, geometry.crop.y, geometry.crop.z);
        for view in [ViewMode::Mixing, ViewMode::Layer] {
            for child in self.views_mut(view).group.children.iter_mut() {
                if child.primitive == Primitive::Surface(SurfaceKind::Mixing) {
                    child.transform.scale = surface_scale;
                }
            }
        }

        // layer position: perspective stagger, lock outside the stage
        let x = self.group(ViewMode::Layer).transform.translation.x;
        let mut y = x / stage.layer_perspective;
        let locked = x < -stage.foreground_depth || x > -stage.background_depth;
        self.set_locked(locked);
        if x < -stage.foreground_depth {
            y -= stage.layer_step_foreground;
        } else if x < -stage.background_depth {
            y -= stage.layer_step_stage;
        }
        let z = {
            let layer = &mut self.views_mut(ViewMode::Layer).group.transform;
            layer.translation.y = y;
            layer.translation.z
        };
        for view in [ViewMode::Mixing, ViewMode::Geometry, ViewMode::Rendering] {
            self.views_mut(view).group.transform.translation.z = z;
        }

        // appearance frame drives texture coordinates
        let appearance = self.group(ViewMode::Appearance).transform;
        let i_transform = texture_transform(&appearance, aspect, stage.min_scale);
        self.rendering_shader.set_i_transform(i_transform);

        if let Some(mask) = &mut self.mask_buffer {
            if self.mask_need_update {
                if let Some(image) = &self.mask_image
                    && mask.fill(image)
                {
                    self.mask_need_update = false;
                }
            } else {
                mask.feedback(&self.mask_shader);
            }
            self.blending_shader.mask_texture = mask.texture();
        }

        debug!("Updated source '{}' alpha={:.3} depth={:.2}", self.name, alpha, z);
        self.need_update = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::shaders::{MaskMode, MaskShape};
    use crate::entities::stream::{MediaPlayerState, StaticStream};
    use std::path::PathBuf;

    fn media(res: UVec2) -> Source {
        let kind = SourceKind::Media {
            path: PathBuf::from("clip.mp4"),
            player: MediaPlayerState::default(),
            stream: Box::new(StaticStream::ready("clip.mp4", res)),
        };
        let mut s = Source::new(kind, StageConfig::default());
        s.set_name("clip");
        s
    }

    fn ctx() -> SourceContext {
        SourceContext {
            dt: 16.0,
            output_texture: TextureId(99),
            output_resolution: UVec2::new(1280, 720),
            ..Default::default()
        }
    }

    fn ready(res: UVec2) -> Source {
        let mut s = media(res);
        let c = ctx();
        s.render(&c);
        s.update(16.0, &c);
        s
    }

    #[test]
    fn test_set_name_initials() {
        let mut s = media(UVec2::new(4, 4));
        s.set_name("vidéo one");
        assert_eq!(s.name(), "video one");
        assert_eq!(s.initials(), "VE");
        s.set_name("");
        assert_eq!(s.name(), "Source");
    }

    #[test]
    fn test_first_render_initializes_and_attaches() {
        let mut s = media(UVec2::new(1920, 1080));
        assert_eq!(s.mode(), SourceMode::Uninitialized);
        assert!(!s.ready());
        assert_eq!(s.frame().resolution(), UVec2::new(640, 480));

        s.render(&ctx());
        assert!(s.ready());
        assert_eq!(s.mode(), SourceMode::Visible);
        assert_eq!(s.frame().resolution(), UVec2::new(1920, 1080));
        assert_eq!(s.mask_buffer().unwrap().resolution(), UVec2::new(960, 540));

        // icons follow the aspect ratio and corner icons shift right
        let aspect = 1920.0 / 1080.0;
        let mixing = s.nodes(ViewMode::Mixing);
        assert!((mixing.frame.as_ref().unwrap().transform.scale.x - aspect).abs() < 1e-5);
        let expected_x = 0.8 + 0.1 * (aspect - 1.0);
        assert!((s.symbol().transform.translation.x - expected_x).abs() < 1e-5);
        assert!((s.locker().transform.translation.x - expected_x).abs() < 1e-5);

        // surfaces exist in every view that shows the render target
        assert!(s.group(ViewMode::Rendering).find(Primitive::Surface(SurfaceKind::Render)).is_some());
        assert!(s.group(ViewMode::Layer).find(Primitive::Surface(SurfaceKind::Mixing)).is_some());
        assert!(s.group(ViewMode::Appearance).find(Primitive::Surface(SurfaceKind::Grab)).is_some());
    }

    #[test]
    fn test_update_alpha_and_activity() {
        let mut s = ready(UVec2::new(640, 480));
        s.group_mut(ViewMode::Mixing).transform.translation = Vec3::new(0.0, 0.0, 0.0);
        s.update(16.0, &ctx());
        assert_eq!(s.alpha(), 1.0);
        assert!(s.active());
        assert!(!s.need_update());

        s.group_mut(ViewMode::Mixing).transform.translation = Vec3::new(1.5, 0.0, 0.0);
        s.update(16.0, &ctx());
        assert!(s.alpha().abs() < 1e-6);
        assert!(!s.active());
        assert!(!s.group(ViewMode::Rendering).visible);
        let scale = s.group(ViewMode::Mixing).transform.scale;
        assert!((scale.x - 0.12).abs() < 1e-6);
    }

    #[test]
    fn test_inactive_hidden_outside_mixing() {
        let mut s = ready(UVec2::new(640, 480));
        s.set_depth(5.0);
        s.group_mut(ViewMode::Mixing).transform.translation = Vec3::new(1.5, 0.0, 0.0);
        s.update(16.0, &ctx());
        assert!(!s.active());
        assert!(!s.locked());
        assert!(!s.group(ViewMode::Rendering).visible);
        assert!(!s.group(ViewMode::Geometry).visible);
        assert!(!s.group(ViewMode::Layer).visible);
        assert!(s.group(ViewMode::Mixing).visible);

        // back in the circle on stage: editable again
        s.group_mut(ViewMode::Mixing).transform.translation = Vec3::new(0.2, 0.0, 0.0);
        s.update(16.0, &ctx());
        assert!(s.active());
        assert!(s.group(ViewMode::Geometry).visible);
        assert!(s.group(ViewMode::Layer).visible);
    }

    #[test]
    fn test_context_defaults_to_black_output() {
        let c = SourceContext::default();
        assert_eq!(c.output_texture, TextureId::BLACK);
        assert!(c.origins.is_empty());
    }

    #[test]
    fn test_update_clamps_geometry_scale() {
        let mut s = ready(UVec2::new(640, 480));
        s.set_depth(5.0);
        s.group_mut(ViewMode::Geometry).transform.scale = Vec3::new(0.0, -0.001, 3.0);
        s.group_mut(ViewMode::Geometry).transform.translation = Vec3::new(0.2, 0.3, 0.0);
        s.update(16.0, &ctx());
        let r = s.group(ViewMode::Rendering).transform;
        assert_eq!(r.scale, Vec3::new(0.01, -0.01, 1.0));
        assert_eq!(r.translation.x, 0.2);
        assert_eq!(r.translation.y, 0.3);
        assert_eq!(r.translation.z, 5.0);
        assert_eq!(s.group(ViewMode::Geometry).transform.scale, r.scale);
    }

    #[test]
    fn test_layer_stage_and_lock() {
        let mut s = ready(UVec2::new(640, 480));

        s.set_depth(5.0);
        s.update(16.0, &ctx());
        assert!(!s.locked());
        let y = s.group(ViewMode::Layer).transform.translation.y;
        assert!((y - (-5.0 / 2.0 - 0.15)).abs() < 1e-6);
        assert_eq!(s.group(ViewMode::Mixing).transform.translation.z, 5.0);

        s.set_depth(11.0);
        s.update(16.0, &ctx());
        assert!(s.locked());
        assert!(s.locker().visible);
        assert!(!s.group(ViewMode::Geometry).visible);
        let y = s.group(ViewMode::Layer).transform.translation.y;
        assert!((y - (-11.0 / 2.0 - 0.3)).abs() < 1e-6);

        s.set_depth(1.0);
        s.update(16.0, &ctx());
        assert!(s.locked());
        let y = s.group(ViewMode::Layer).transform.translation.y;
        assert!((y - (-0.5)).abs() < 1e-6);
    }

    #[test]
    fn test_crop_drives_projection_and_icon() {
        let mut s = ready(UVec2::new(800, 400));
        s.group_mut(ViewMode::Geometry).transform.crop = Vec3::new(0.5, 0.8, 1.0);
        s.update(16.0, &ctx());
        assert_eq!(s.frame().projection_area(), Vec2::new(0.5, 0.8));
        let surface = s
            .group(ViewMode::Mixing)
            .find(Primitive::Surface(SurfaceKind::Mixing))
            .unwrap();
        assert!((surface.transform.scale.x - 1.0).abs() < 1e-6);
        assert!((surface.transform.scale.y - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_mode_visibility() {
        let mut s = ready(UVec2::new(640, 480));
        assert!(s.group(ViewMode::Mixing).visible);
        assert!(!s.group(ViewMode::Appearance).visible);

        s.set_mode(SourceMode::Selected);
        assert_eq!(s.nodes(ViewMode::Mixing).frame.as_ref().unwrap().active, 1);
        assert!(!s.nodes(ViewMode::Geometry).overlay.as_ref().unwrap().visible);
        assert!(s.group(ViewMode::Appearance).visible);

        s.set_mode(SourceMode::Current);
        assert!(s.nodes(ViewMode::Geometry).overlay.as_ref().unwrap().visible);

        s.set_mode(SourceMode::Visible);
        assert_eq!(s.nodes(ViewMode::Layer).frame.as_ref().unwrap().active, 0);
        assert!(!s.group(ViewMode::Appearance).visible);
    }

    #[test]
    fn test_processing_toggle_preserves_parameters() {
        let mut s = media(UVec2::new(4, 4));
        assert!(s.image_processing_enabled());
        s.processing_shader_mut().brightness = 0.3;
        s.processing_shader_mut().nb_colors = 4;

        s.set_image_processing_enabled(false);
        assert!(!s.image_processing_enabled());
        assert!(matches!(s.rendering_shader(), RenderingShader::Passthrough(_)));
        assert_eq!(s.processing_shader().brightness, 0.3);

        s.set_image_processing_enabled(true);
        assert_eq!(s.processing_shader().brightness, 0.3);
        assert_eq!(s.processing_shader().nb_colors, 4);
    }

    #[test]
    fn test_mask_fill_once_then_feedback() {
        let mut s = ready(UVec2::new(64, 32));
        let mut img = FrameBufferImage::new(8, 8);
        img.rgb.pixels_mut().for_each(|p| *p = image::Rgb([0, 0, 0]));
        s.set_mask(img);
        assert!(s.need_update());
        s.update(16.0, &ctx());
        let mask = s.mask_buffer().unwrap();
        assert!(mask.pixels().pixels().all(|p| p.0[0] == 0));
        assert_eq!(s.blending_shader().mask_texture, mask.texture());

        *s.mask_shader_mut() = MaskShader {
            mode: MaskMode::Shape,
            shape: MaskShape::Rectangle,
            blur: 0.0,
            size: Vec2::splat(0.5),
            option: 0,
        };
        s.update(16.0, &ctx());
        assert_eq!(s.mask_buffer().unwrap().pixels().get_pixel(16, 8).0[0], 255);

        s.store_mask(None);
        assert_eq!(s.stored_mask().unwrap().rgb.width(), 32);
    }

    #[test]
    fn test_set_alpha_places_on_ray() {
        let mut s = media(UVec2::new(4, 4));
        s.set_alpha(0.5);
        let p = s.group(ViewMode::Mixing).transform.translation.truncate();
        assert!((sin_quad(p.x, p.y) - 0.5).abs() < 1e-4);
        assert!(p.x < 0.0 && p.y > 0.0);
        assert!((s.alpha() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_origin_stays_active_with_active_clone() {
        let mut s = ready(UVec2::new(640, 480));
        let mut c = ctx();
        c.clone_active.insert(s.id());
        s.group_mut(ViewMode::Mixing).transform.translation = Vec3::new(3.0, 0.0, 0.0);
        s.update(16.0, &c);
        assert!(s.active());
        s.touch();
        s.update(16.0, &ctx());
        assert!(!s.active());
    }

    #[test]
    fn test_render_loopback_fails_on_resolution_change() {
        let mut s = Source::new(SourceKind::Render, StageConfig::default());
        let mut c = ctx();
        s.render(&c);
        assert!(s.ready());
        assert_eq!(s.texture(), TextureId(99));
        assert!(!s.failed());

        c.output_resolution = UVec2::new(1920, 1080);
        s.render(&c);
        assert!(s.failed());
    }

    #[test]
    fn test_contains_own_nodes() {
        let s = ready(UVec2::new(640, 480));
        let other = ready(UVec2::new(640, 480));
        let id = s.group(ViewMode::Geometry).children[0].id;
        assert!(s.contains(id));
        assert!(s.contains(s.locker().id));
        assert!(!other.contains(id));
    }
}
