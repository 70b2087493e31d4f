//! Pixel format negotiation.
//!
//! The device reports the primary framebuffer format plus a list of
//! texture formats it can sample from. [`FormatTable::negotiate`] scores
//! that list once per device (re)acquisition and fills a table of
//! four texture usages × two quality tiers, plus the Z-buffer depth.
//!
//! ## Scoring
//!
//! ```text
//! for depth ceiling d in primary.bits ..= 32 step 8:
//!     for each format f:
//!         skip if f.bits > d, the scored channel is missing, or it scores lower
//!         on a tie, keep the format with fewer total bits
//!     Low tier: stop at the first ceiling that produced a pick
//! High tier: keep the best pick up to 32 bits
//! nothing found → primary framebuffer format
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Highest depth ceiling considered during negotiation.
pub const MAX_DEPTH: u32 = 32;

/// Depth ceiling increment between negotiation passes.
pub const DEPTH_STEP: u32 = 8;

// ── Pixel format ────────────────────────────────────────────────────

/// A packed RGB(A) pixel layout described by its channel masks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelFormat {
    /// Total bits per pixel.
    pub bits: u32,
    pub r_mask: u32,
    pub g_mask: u32,
    pub b_mask: u32,
    pub a_mask: u32,
}

impl PixelFormat {
    pub const RGB565: Self = Self::new(16, 0xF800, 0x07E0, 0x001F, 0);
    pub const XRGB1555: Self = Self::new(16, 0x7C00, 0x03E0, 0x001F, 0);
    pub const ARGB1555: Self = Self::new(16, 0x7C00, 0x03E0, 0x001F, 0x8000);
    pub const ARGB4444: Self = Self::new(16, 0x0F00, 0x00F0, 0x000F, 0xF000);
    /// 16-bit format with 8 alpha bits and 8 colour bits.
    pub const ARGB8332: Self = Self::new(16, 0x00E0, 0x001C, 0x0003, 0xFF00);
    pub const RGB888: Self = Self::new(24, 0x00FF_0000, 0x0000_FF00, 0x0000_00FF, 0);
    pub const XRGB8888: Self = Self::new(32, 0x00FF_0000, 0x0000_FF00, 0x0000_00FF, 0);
    pub const ARGB8888: Self = Self::new(32, 0x00FF_0000, 0x0000_FF00, 0x0000_00FF, 0xFF00_0000);
    pub const ARGB2101010: Self = Self::new(32, 0x3FF0_0000, 0x000F_FC00, 0x0000_03FF, 0xC000_0000);
    pub const A8: Self = Self::new(8, 0, 0, 0, 0xFF);
    pub const L8: Self = Self::new(8, 0xFF, 0, 0, 0);

    pub const fn new(bits: u32, r_mask: u32, g_mask: u32, b_mask: u32, a_mask: u32) -> Self {
        Self {
            bits,
            r_mask,
            g_mask,
            b_mask,
            a_mask,
        }
    }

    /// Number of alpha bits.
    pub fn alpha_bits(&self) -> u32 {
        self.a_mask.count_ones()
    }

    /// Number of colour bits across R, G and B.
    pub fn rgb_bits(&self) -> u32 {
        (self.r_mask | self.g_mask | self.b_mask).count_ones()
    }

    /// The exact 16-bit 8-alpha format held back as the RGB+alpha fallback.
    fn is_alpha8_16bit(&self) -> bool {
        self.bits == 16 && self.alpha_bits() == 8
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}bpp (a{} rgb{}: r{:#x} g{:#x} b{:#x} a{:#x})",
            self.bits,
            self.alpha_bits(),
            self.rgb_bits(),
            self.r_mask,
            self.g_mask,
            self.b_mask,
            self.a_mask,
        )
    }
}

// ── Usage categories ────────────────────────────────────────────────

/// What a texture is going to be used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureUsage {
    /// Opaque colour.
    Rgb,
    /// Alpha only.
    Alpha,
    /// Colour with a full alpha channel.
    RgbAlpha,
    /// Colour with a colour-key (1-bit-style) mask.
    RgbMask,
}

impl TextureUsage {
    pub const ALL: [TextureUsage; 4] = [
        TextureUsage::Rgb,
        TextureUsage::Alpha,
        TextureUsage::RgbAlpha,
        TextureUsage::RgbMask,
    ];

    fn index(self) -> usize {
        match self {
            TextureUsage::Rgb => 0,
            TextureUsage::Alpha => 1,
            TextureUsage::RgbAlpha => 2,
            TextureUsage::RgbMask => 3,
        }
    }

    fn accepts(self, format: &PixelFormat, ceiling: u32) -> bool {
        let a = format.alpha_bits();
        let rgb = format.rgb_bits();
        match self {
            TextureUsage::Rgb => format.bits <= ceiling && rgb > 0,
            TextureUsage::Alpha => format.bits <= ceiling && a > 0,
            TextureUsage::RgbAlpha => format.bits <= ceiling && a > 0 && rgb > 0,
            // Mask formats are not bounded by the depth ceiling.
            TextureUsage::RgbMask => a > 0 && rgb > 0,
        }
    }

    fn score(self, format: &PixelFormat) -> u32 {
        match self {
            TextureUsage::Rgb | TextureUsage::RgbMask => format.rgb_bits(),
            TextureUsage::Alpha | TextureUsage::RgbAlpha => format.alpha_bits(),
        }
    }
}

/// Quality tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// First acceptable depth at or above the framebuffer depth.
    Low,
    /// Best format up to 32 bits.
    High,
}

impl Tier {
    fn index(self) -> usize {
        match self {
            Tier::Low => 0,
            Tier::High => 1,
        }
    }
}

// ── Negotiation ─────────────────────────────────────────────────────

/// Pick the best texture format for `usage` at `tier`.
///
/// Returns an index into `formats`, or `None` when nothing qualifies.
pub fn pick_texture_format(
    primary: &PixelFormat,
    formats: &[PixelFormat],
    usage: TextureUsage,
    tier: Tier,
) -> Option<usize> {
    let mut pick: Option<usize> = None;
    let mut best_score = 0;
    let mut best_bits = 0;
    let mut alpha8_fallback: Option<usize> = None;

    let mut ceiling = primary.bits;
    while ceiling <= MAX_DEPTH {
        for (index, format) in formats.iter().enumerate() {
            if usage == TextureUsage::RgbAlpha && format.is_alpha8_16bit() {
                alpha8_fallback = Some(index);
                continue;
            }
            if !usage.accepts(format, ceiling) {
                continue;
            }
            let score = usage.score(format);
            if score < best_score {
                continue;
            }
            if pick.is_some() && score == best_score && format.bits >= best_bits {
                continue;
            }
            pick = Some(index);
            best_score = score;
            best_bits = format.bits;
        }
        if tier == Tier::Low && pick.is_some() {
            break;
        }
        ceiling += DEPTH_STEP;
    }

    pick.or(alpha8_fallback)
}

/// Pick the Z-buffer depth.
///
/// A depth equal to the framebuffer depth wins outright; otherwise the
/// deepest format strictly shallower than the framebuffer is used.
pub fn pick_depth_bits(primary_bits: u32, depths: &[u32]) -> Option<u32> {
    let mut best: Option<u32> = None;
    for &depth in depths {
        if depth == primary_bits {
            return Some(depth);
        }
        if depth > 0 && depth < primary_bits && best.map_or(true, |b| depth > b) {
            best = Some(depth);
        }
    }
    best
}

/// Negotiated formats for one device instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatTable {
    primary: PixelFormat,
    depth_bits: Option<u32>,
    textures: [[PixelFormat; 2]; 4],
}

impl FormatTable {
    /// A table where every usage falls back to the framebuffer format.
    pub fn fallback(primary: PixelFormat) -> Self {
        Self {
            primary,
            depth_bits: None,
            textures: [[primary; 2]; 4],
        }
    }

    /// Score `formats` and `depths` against the framebuffer format.
    pub fn negotiate(primary: PixelFormat, formats: &[PixelFormat], depths: &[u32]) -> Self {
        let mut table = Self::fallback(primary);
        for usage in TextureUsage::ALL {
            for tier in [Tier::Low, Tier::High] {
                if let Some(index) = pick_texture_format(&primary, formats, usage, tier) {
                    table.textures[usage.index()][tier.index()] = formats[index];
                }
            }
        }
        table.depth_bits = pick_depth_bits(primary.bits, depths);
        table
    }

    /// Framebuffer format.
    pub fn primary(&self) -> PixelFormat {
        self.primary
    }

    /// Z-buffer depth, if the device offers a usable one.
    pub fn depth_bits(&self) -> Option<u32> {
        self.depth_bits
    }

    /// Texture format for a usage/tier pair.
    pub fn texture(&self, usage: TextureUsage, tier: Tier) -> PixelFormat {
        self.textures[usage.index()][tier.index()]
    }
}

impl fmt::Display for FormatTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "primary: {}", self.primary)?;
        for usage in TextureUsage::ALL {
            writeln!(
                f,
                "{usage:?}: low {} / high {}",
                self.texture(usage, Tier::Low),
                self.texture(usage, Tier::High),
            )?;
        }
        match self.depth_bits {
            Some(bits) => write!(f, "zbuffer: {bits} bits"),
            None => write!(f, "zbuffer: none"),
        }
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn hardware_list() -> Vec<PixelFormat> {
        vec![
            PixelFormat::RGB565,
            PixelFormat::XRGB8888,
            PixelFormat::ARGB1555,
            PixelFormat::ARGB8888,
        ]
    }

    #[test]
    fn test_channel_counts() {
        assert_eq!(PixelFormat::RGB565.rgb_bits(), 16);
        assert_eq!(PixelFormat::RGB565.alpha_bits(), 0);
        assert_eq!(PixelFormat::ARGB1555.rgb_bits(), 15);
        assert_eq!(PixelFormat::ARGB1555.alpha_bits(), 1);
        assert_eq!(PixelFormat::ARGB8888.rgb_bits(), 24);
        assert_eq!(PixelFormat::ARGB8888.alpha_bits(), 8);
        assert_eq!(PixelFormat::ARGB8332.alpha_bits(), 8);
        assert_eq!(PixelFormat::ARGB8332.rgb_bits(), 8);
    }

    #[test]
    fn test_negotiate_16bit_framebuffer() {
        let table = FormatTable::negotiate(PixelFormat::RGB565, &hardware_list(), &[]);
        assert_eq!(table.texture(TextureUsage::Rgb, Tier::Low), PixelFormat::RGB565);
        assert_eq!(table.texture(TextureUsage::Rgb, Tier::High), PixelFormat::XRGB8888);
        assert_eq!(table.texture(TextureUsage::Alpha, Tier::Low), PixelFormat::ARGB1555);
        assert_eq!(table.texture(TextureUsage::Alpha, Tier::High), PixelFormat::ARGB8888);
        assert_eq!(table.texture(TextureUsage::RgbAlpha, Tier::Low), PixelFormat::ARGB1555);
        assert_eq!(table.texture(TextureUsage::RgbAlpha, Tier::High), PixelFormat::ARGB8888);
    }

    #[test]
    fn test_empty_list_falls_back_to_primary() {
        let table = FormatTable::negotiate(PixelFormat::RGB565, &[], &[]);
        for usage in TextureUsage::ALL {
            assert_eq!(table.texture(usage, Tier::Low), PixelFormat::RGB565);
            assert_eq!(table.texture(usage, Tier::High), PixelFormat::RGB565);
        }
        assert_eq!(table.depth_bits(), None);
    }

    #[test]
    fn test_tie_prefers_fewer_bits() {
        let formats = [PixelFormat::ARGB8888, PixelFormat::A8];
        let pick = pick_texture_format(&PixelFormat::XRGB8888, &formats, TextureUsage::Alpha, Tier::High);
        assert_eq!(pick, Some(1));
    }

    #[test]
    fn test_first_found_wins_exact_tie() {
        let formats = [PixelFormat::RGB565, PixelFormat::RGB565];
        let pick = pick_texture_format(&PixelFormat::RGB565, &formats, TextureUsage::Rgb, Tier::High);
        assert_eq!(pick, Some(0));
    }

    #[test]
    fn test_alpha8_16bit_is_rgb_alpha_fallback() {
        let formats = [PixelFormat::RGB565, PixelFormat::ARGB8332];
        let table = FormatTable::negotiate(PixelFormat::RGB565, &formats, &[]);
        assert_eq!(table.texture(TextureUsage::RgbAlpha, Tier::Low), PixelFormat::ARGB8332);
        assert_eq!(table.texture(TextureUsage::RgbAlpha, Tier::High), PixelFormat::ARGB8332);
    }

    #[test]
    fn test_alpha8_16bit_loses_to_regular_pick() {
        let formats = [PixelFormat::ARGB8332, PixelFormat::ARGB4444];
        let table = FormatTable::negotiate(PixelFormat::RGB565, &formats, &[]);
        assert_eq!(table.texture(TextureUsage::RgbAlpha, Tier::Low), PixelFormat::ARGB4444);
    }

    #[test]
    fn test_mask_ignores_depth_ceiling() {
        let formats = [PixelFormat::ARGB1555, PixelFormat::ARGB8888];
        let table = FormatTable::negotiate(PixelFormat::RGB565, &formats, &[]);
        assert_eq!(table.texture(TextureUsage::RgbMask, Tier::Low), PixelFormat::ARGB8888);
        assert_eq!(table.texture(TextureUsage::RgbMask, Tier::High), PixelFormat::ARGB8888);
    }

    #[test]
    fn test_low_tier_steps_up_until_found() {
        // Nothing at 16 bits, so the low tier climbs to 24 and stops there.
        let formats = [PixelFormat::RGB888, PixelFormat::XRGB8888, PixelFormat::ARGB2101010];
        let low = pick_texture_format(&PixelFormat::RGB565, &formats, TextureUsage::Rgb, Tier::Low);
        let high = pick_texture_format(&PixelFormat::RGB565, &formats, TextureUsage::Rgb, Tier::High);
        assert_eq!(low, Some(0));
        assert_eq!(high, Some(2));
    }

    #[test]
    fn test_framebuffer_deeper_than_ceiling() {
        let deep = PixelFormat::new(64, 0xFFFF, 0xFFFF_0000, 0, 0);
        let table = FormatTable::negotiate(deep, &hardware_list(), &[]);
        assert_eq!(table.texture(TextureUsage::Rgb, Tier::High), deep);
    }

    #[test]
    fn test_depth_exact_match() {
        assert_eq!(pick_depth_bits(16, &[24, 16, 8]), Some(16));
    }

    #[test]
    fn test_depth_deepest_below_primary() {
        assert_eq!(pick_depth_bits(32, &[16, 24]), Some(24));
        assert_eq!(pick_depth_bits(16, &[24, 32]), None);
        assert_eq!(pick_depth_bits(16, &[0]), None);
    }

    #[test]
    fn test_display_lists_every_usage() {
        let table = FormatTable::negotiate(PixelFormat::RGB565, &hardware_list(), &[16]);
        let text = format!("{table}");
        assert!(text.contains("primary: 16bpp"));
        assert!(text.contains("RgbMask"));
        assert!(text.contains("zbuffer: 16 bits"));
    }
}
