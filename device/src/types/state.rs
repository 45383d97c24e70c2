//! Immutable pipeline state descriptors.
//!
//! A [`StateBlockDesc`] bundles blend, depth/stencil, rasterizer and sampler
//! settings into one plain-old-data value. Every field is a fixed-size scalar
//! or a `#[repr(u8)]` enum and the layout has no padding, so the descriptor
//! can be viewed as raw bytes. Equality and hashing are defined over those
//! bytes: two descriptors are equal exactly when they are bit-identical.
//!
//! # Example
//!
//! ```
//! use redlilium_device::{BlendState, CullMode, RasterizerState, StateBlockDesc};
//!
//! let desc = StateBlockDesc::new()
//!     .with_blend(BlendState::alpha_blending())
//!     .with_rasterizer(RasterizerState {
//!         cull_mode: CullMode::None,
//!         ..Default::default()
//!     });
//! assert_eq!(desc, desc.clone());
//! assert_ne!(desc, StateBlockDesc::new());
//! ```

use std::hash::{Hash, Hasher};

use bitflags::bitflags;
use bytemuck::NoUninit;

/// Number of sampler slots carried by a state block.
pub const MAX_SAMPLER_STATES: usize = 4;

/// Comparison function for depth, stencil and shadow sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, NoUninit)]
#[repr(u8)]
pub enum CompareFunction {
    /// Never pass.
    Never,
    /// Pass if less than.
    Less,
    /// Pass if equal.
    Equal,
    /// Pass if less than or equal.
    #[default]
    LessEqual,
    /// Pass if greater than.
    Greater,
    /// Pass if not equal.
    NotEqual,
    /// Pass if greater than or equal.
    GreaterEqual,
    /// Always pass.
    Always,
}

/// Source/destination factor of a blend equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, NoUninit)]
#[repr(u8)]
pub enum BlendFactor {
    /// 0.
    Zero,
    /// 1.
    #[default]
    One,
    /// Source alpha.
    SrcAlpha,
    /// 1 - source alpha.
    OneMinusSrcAlpha,
    /// Destination alpha.
    DstAlpha,
    /// 1 - destination alpha.
    OneMinusDstAlpha,
    /// Source color.
    SrcColor,
    /// Destination color.
    DstColor,
}

/// Blend equation operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, NoUninit)]
#[repr(u8)]
pub enum BlendOp {
    /// src + dst.
    #[default]
    Add,
    /// src - dst.
    Subtract,
    /// dst - src.
    ReverseSubtract,
    /// min(src, dst).
    Min,
    /// max(src, dst).
    Max,
}

/// Stencil buffer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, NoUninit)]
#[repr(u8)]
pub enum StencilOp {
    /// Keep the current value.
    #[default]
    Keep,
    /// Set to zero.
    Zero,
    /// Replace with the reference value.
    Replace,
    /// Increment and clamp.
    IncrementClamp,
    /// Decrement and clamp.
    DecrementClamp,
    /// Bitwise invert.
    Invert,
}

/// Face culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, NoUninit)]
#[repr(u8)]
pub enum CullMode {
    /// Draw both faces.
    None,
    /// Cull front faces.
    Front,
    /// Cull back faces.
    #[default]
    Back,
}

/// Polygon fill mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, NoUninit)]
#[repr(u8)]
pub enum FillMode {
    /// Filled triangles.
    #[default]
    Solid,
    /// Edges only.
    Wireframe,
    /// Vertices only.
    Point,
}

/// Winding order of front-facing triangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, NoUninit)]
#[repr(u8)]
pub enum FrontFace {
    /// Counter-clockwise.
    #[default]
    Ccw,
    /// Clockwise.
    Cw,
}

/// Texture filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, NoUninit)]
#[repr(u8)]
pub enum FilterMode {
    /// Nearest neighbor filtering.
    Nearest,
    /// Linear filtering.
    #[default]
    Linear,
}

/// Texture address mode (wrapping behavior).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, NoUninit)]
#[repr(u8)]
pub enum AddressMode {
    /// Clamp to edge.
    ClampToEdge,
    /// Repeat.
    #[default]
    Repeat,
    /// Mirrored repeat.
    MirrorRepeat,
}

bitflags! {
    /// Color channels written by the blend stage.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWrites: u8 {
        /// Red channel.
        const RED = 1 << 0;
        /// Green channel.
        const GREEN = 1 << 1;
        /// Blue channel.
        const BLUE = 1 << 2;
        /// Alpha channel.
        const ALPHA = 1 << 3;
        /// All channels.
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

/// Rasterizer settings.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, NoUninit)]
pub struct RasterizerState {
    /// Constant depth bias.
    pub depth_bias: i32,
    /// Slope-scaled depth bias.
    pub slope_scaled_depth_bias: f32,
    /// Face culling.
    pub cull_mode: CullMode,
    /// Fill mode.
    pub fill_mode: FillMode,
    /// Front face winding.
    pub front_face: FrontFace,
    /// Scissor test enabled.
    pub scissor_enable: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            depth_bias: 0,
            slope_scaled_depth_bias: 0.0,
            cull_mode: CullMode::Back,
            fill_mode: FillMode::Solid,
            front_face: FrontFace::Ccw,
            scissor_enable: false,
        }
    }
}

/// Blend settings for the single color target.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, NoUninit)]
pub struct BlendState {
    /// Blending enabled.
    pub blend_enable: bool,
    /// Color source factor.
    pub src_color: BlendFactor,
    /// Color destination factor.
    pub dst_color: BlendFactor,
    /// Color operator.
    pub color_op: BlendOp,
    /// Alpha source factor.
    pub src_alpha: BlendFactor,
    /// Alpha destination factor.
    pub dst_alpha: BlendFactor,
    /// Alpha operator.
    pub alpha_op: BlendOp,
    /// Raw [`ColorWrites`] bits.
    pub color_write_mask: u8,
}

impl BlendState {
    /// Standard premultiplied-free alpha blending.
    pub fn alpha_blending() -> Self {
        Self {
            blend_enable: true,
            src_color: BlendFactor::SrcAlpha,
            dst_color: BlendFactor::OneMinusSrcAlpha,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::OneMinusSrcAlpha,
            ..Default::default()
        }
    }

    /// Additive blending.
    pub fn additive() -> Self {
        Self {
            blend_enable: true,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::One,
            ..Default::default()
        }
    }

    /// Set the written color channels.
    pub fn with_color_writes(mut self, writes: ColorWrites) -> Self {
        self.color_write_mask = writes.bits();
        self
    }

    /// The written color channels.
    pub fn color_writes(&self) -> ColorWrites {
        ColorWrites::from_bits_truncate(self.color_write_mask)
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
            color_write_mask: ColorWrites::ALL.bits(),
        }
    }
}

/// Depth and stencil settings.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, NoUninit)]
pub struct DepthStencilState {
    /// Depth test enabled.
    pub depth_test_enable: bool,
    /// Depth writes enabled.
    pub depth_write_enable: bool,
    /// Depth comparison.
    pub depth_compare: CompareFunction,
    /// Stencil test enabled.
    pub stencil_enable: bool,
    /// Stencil read mask.
    pub stencil_read_mask: u8,
    /// Stencil write mask.
    pub stencil_write_mask: u8,
    /// Stencil reference value.
    pub stencil_reference: u8,
    /// Operation when the stencil test fails.
    pub stencil_fail_op: StencilOp,
    /// Operation when the stencil test passes and the depth test fails.
    pub stencil_depth_fail_op: StencilOp,
    /// Operation when both tests pass.
    pub stencil_pass_op: StencilOp,
    /// Stencil comparison.
    pub stencil_compare: CompareFunction,
    /// Apply the stencil settings to back faces too.
    pub two_sided_stencil: bool,
}

impl DepthStencilState {
    /// Depth test without depth writes.
    pub fn depth_read_only() -> Self {
        Self {
            depth_write_enable: false,
            ..Default::default()
        }
    }

    /// Depth disabled entirely.
    pub fn disabled() -> Self {
        Self {
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare: CompareFunction::Always,
            ..Default::default()
        }
    }
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare: CompareFunction::LessEqual,
            stencil_enable: false,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            stencil_reference: 0,
            stencil_fail_op: StencilOp::Keep,
            stencil_depth_fail_op: StencilOp::Keep,
            stencil_pass_op: StencilOp::Keep,
            stencil_compare: CompareFunction::Always,
            two_sided_stencil: false,
        }
    }
}

/// Settings for one sampler slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, NoUninit)]
pub struct SamplerState {
    /// Mip LOD bias.
    pub lod_bias: f32,
    /// Minimum LOD clamp.
    pub min_lod: f32,
    /// Maximum LOD clamp.
    pub max_lod: f32,
    /// Maximum anisotropy (1.0 disables anisotropic filtering).
    pub max_anisotropy: f32,
    /// Magnification filter.
    pub mag_filter: FilterMode,
    /// Minification filter.
    pub min_filter: FilterMode,
    /// Mipmap filter.
    pub mip_filter: FilterMode,
    /// Address mode for U coordinate.
    pub address_u: AddressMode,
    /// Address mode for V coordinate.
    pub address_v: AddressMode,
    /// Address mode for W coordinate.
    pub address_w: AddressMode,
    /// Depth comparison sampling enabled.
    pub compare_enable: bool,
    /// Comparison used when `compare_enable` is set.
    pub compare: CompareFunction,
}

impl SamplerState {
    /// Linear filtering, repeat addressing.
    pub fn linear() -> Self {
        Self::default()
    }

    /// Nearest neighbor filtering, clamped addressing.
    pub fn nearest_clamp() -> Self {
        Self {
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mip_filter: FilterMode::Nearest,
            address_u: AddressMode::ClampToEdge,
            address_v: AddressMode::ClampToEdge,
            address_w: AddressMode::ClampToEdge,
            ..Default::default()
        }
    }
}

impl Default for SamplerState {
    fn default() -> Self {
        Self {
            lod_bias: 0.0,
            min_lod: 0.0,
            max_lod: 32.0,
            max_anisotropy: 1.0,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mip_filter: FilterMode::Linear,
            address_u: AddressMode::Repeat,
            address_v: AddressMode::Repeat,
            address_w: AddressMode::Repeat,
            compare_enable: false,
            compare: CompareFunction::LessEqual,
        }
    }
}

/// Complete immutable pipeline state.
///
/// Create one with [`StateBlockDesc::new`] and the `with_*` builders, then
/// hand it to [`GraphicsDevice::get_or_create_state_object`]. Equality is
/// bitwise: `0.0` and `-0.0` depth biases are different states.
///
/// [`GraphicsDevice::get_or_create_state_object`]: crate::GraphicsDevice::get_or_create_state_object
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, NoUninit)]
pub struct StateBlockDesc {
    /// Rasterizer settings.
    pub rasterizer: RasterizerState,
    /// Blend settings.
    pub blend: BlendState,
    /// Depth/stencil settings.
    pub depth_stencil: DepthStencilState,
    /// Sampler slot 0.
    pub sampler0: SamplerState,
    /// Sampler slot 1.
    pub sampler1: SamplerState,
    /// Sampler slot 2.
    pub sampler2: SamplerState,
    /// Sampler slot 3.
    pub sampler3: SamplerState,
}

static_assertions::const_assert_eq!(std::mem::size_of::<RasterizerState>(), 12);
static_assertions::const_assert_eq!(std::mem::size_of::<BlendState>(), 8);
static_assertions::const_assert_eq!(std::mem::size_of::<DepthStencilState>(), 12);
static_assertions::const_assert_eq!(std::mem::size_of::<SamplerState>(), 24);
static_assertions::const_assert_eq!(std::mem::size_of::<StateBlockDesc>(), 128);
static_assertions::assert_impl_all!(StateBlockDesc: NoUninit, Send, Sync);

impl StateBlockDesc {
    /// Create a descriptor with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rasterizer settings.
    pub fn with_rasterizer(mut self, rasterizer: RasterizerState) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    /// Set the blend settings.
    pub fn with_blend(mut self, blend: BlendState) -> Self {
        self.blend = blend;
        self
    }

    /// Set the depth/stencil settings.
    pub fn with_depth_stencil(mut self, depth_stencil: DepthStencilState) -> Self {
        self.depth_stencil = depth_stencil;
        self
    }

    /// Set one sampler slot.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= MAX_SAMPLER_STATES`.
    pub fn with_sampler(mut self, slot: usize, sampler: SamplerState) -> Self {
        *self.sampler_mut(slot) = sampler;
        self
    }

    /// Settings of one sampler slot.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= MAX_SAMPLER_STATES`.
    pub fn sampler(&self, slot: usize) -> &SamplerState {
        match slot {
            0 => &self.sampler0,
            1 => &self.sampler1,
            2 => &self.sampler2,
            3 => &self.sampler3,
            _ => panic!("sampler slot {slot} out of range (max {MAX_SAMPLER_STATES})"),
        }
    }

    fn sampler_mut(&mut self, slot: usize) -> &mut SamplerState {
        match slot {
            0 => &mut self.sampler0,
            1 => &mut self.sampler1,
            2 => &mut self.sampler2,
            3 => &mut self.sampler3,
            _ => panic!("sampler slot {slot} out of range (max {MAX_SAMPLER_STATES})"),
        }
    }

    /// The raw bytes the descriptor's identity is defined over.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl PartialEq for StateBlockDesc {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for StateBlockDesc {}

impl Hash for StateBlockDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}
