//! Configuration for the drawlist builder, frame transport, and text core.
//!
//! Two layers, following the file/effective split used across the workspace:
//! * `ConfigFile` — the raw TOML shape (`rezi.toml` or a caller-supplied
//!   path). Every field is optional; unknown fields are ignored so configs
//!   can carry keys for newer builds without warnings.
//! * `DrawlistConfig` / `TransportConfig` / `TextConfig` — the resolved,
//!   clamped values components actually consume. Callers can also construct
//!   these directly and skip the file layer entirely.
//!
//! Environment toggles are separate from the file because they gate
//! diagnostics, not behavior: `REZI_PERF=1` enables phase timing and
//! `REZI_FRAME_AUDIT=1` emits one NDJSON record per frame. The emoji width
//! environment overrides (`ZRUI_*`) are resolved in `core-text`; this crate
//! only carries the configured baseline policy.

use anyhow::{Context, Result};
use core_text::EmojiWidthPolicy;
use serde::Deserialize;
use std::{fs, path::PathBuf, str::FromStr};
use tracing::info;

pub const ENV_PERF: &str = "REZI_PERF";
pub const ENV_FRAME_AUDIT: &str = "REZI_FRAME_AUDIT";

// -------------------------------------------------------------------------
// Resolved configuration
// -------------------------------------------------------------------------

/// Limits and switches consumed by the drawlist builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawlistConfig {
    /// Hard cap on a built frame's total bytes.
    pub max_drawlist_bytes: usize,
    /// Hard cap on commands per frame (prelude + body).
    pub max_cmd_count: usize,
    pub max_strings: usize,
    pub max_string_bytes: usize,
    pub max_blobs: usize,
    pub max_blob_bytes: usize,
    /// Range validation at the operation boundary; leave on unless the
    /// caller is itself a validated compiler stage.
    pub validate_params: bool,
    /// Reuse one growing output buffer across frames instead of allocating
    /// per build.
    pub reuse_output_buffer: bool,
}

impl Default for DrawlistConfig {
    fn default() -> Self {
        Self {
            max_drawlist_bytes: 8 << 20,
            max_cmd_count: 65_536,
            max_strings: 4096,
            max_string_bytes: 1 << 20,
            max_blobs: 512,
            max_blob_bytes: 8 << 20,
            validate_params: true,
            reuse_output_buffer: false,
        }
    }
}

/// Mailbox preference for frame handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameTransportMode {
    /// Mailbox when available, transfer otherwise.
    #[default]
    Auto,
    /// Always copy into a fresh transferred buffer.
    Transfer,
    /// Shared-memory mailbox only.
    Sab,
}

impl FromStr for FrameTransportMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(FrameTransportMode::Auto),
            "transfer" => Ok(FrameTransportMode::Transfer),
            "sab" => Ok(FrameTransportMode::Sab),
            _ => Err(()),
        }
    }
}

/// Settings consumed by the frame transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Frame pacing hint forwarded to the consumer.
    pub fps_cap: u32,
    /// Per-batch ceiling for event bytes; a larger batch is a fatal
    /// transport error.
    pub max_event_bytes: usize,
    pub frame_transport: FrameTransportMode,
    pub frame_sab_slot_count: usize,
    pub frame_sab_slot_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            fps_cap: 60,
            max_event_bytes: 64 << 10,
            frame_transport: FrameTransportMode::Auto,
            frame_sab_slot_count: 3,
            frame_sab_slot_bytes: 1 << 20,
        }
    }
}

impl TransportConfig {
    /// Clamp mailbox geometry to workable bounds: latest-wins needs a slot
    /// to steal, so at least two slots; a slot smaller than a header-only
    /// frame is useless.
    pub fn clamped(mut self) -> Self {
        self.frame_sab_slot_count = self.frame_sab_slot_count.clamp(2, 64);
        self.frame_sab_slot_bytes = self.frame_sab_slot_bytes.max(1024);
        self.fps_cap = self.fps_cap.max(1);
        self
    }
}

/// Text measurement settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextConfig {
    pub emoji_width_policy: EmojiWidthPolicy,
}

impl TextConfig {
    /// Effective policy after environment overrides. `probed` carries a
    /// terminal probe result when the caller ran one.
    pub fn effective_policy(&self, probed: Option<EmojiWidthPolicy>) -> EmojiWidthPolicy {
        core_text::resolve_policy(self.emoji_width_policy, probed)
    }
}

/// Diagnostic toggles read from the environment at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeToggles {
    /// `REZI_PERF=1`: emit phase timing events.
    pub perf_timing: bool,
    /// `REZI_FRAME_AUDIT=1`: emit one NDJSON record per frame.
    pub frame_audit: bool,
}

impl RuntimeToggles {
    pub fn from_env() -> Self {
        let flag = |name: &str| std::env::var(name).is_ok_and(|v| v == "1");
        Self {
            perf_timing: flag(ENV_PERF),
            frame_audit: flag(ENV_FRAME_AUDIT),
        }
    }
}

// -------------------------------------------------------------------------
// File layer
// -------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default, Clone)]
pub struct DrawlistSection {
    pub max_drawlist_bytes: Option<usize>,
    pub max_cmd_count: Option<usize>,
    pub max_strings: Option<usize>,
    pub max_string_bytes: Option<usize>,
    pub max_blobs: Option<usize>,
    pub max_blob_bytes: Option<usize>,
    pub validate_params: Option<bool>,
    pub reuse_output_buffer: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct TransportSection {
    pub fps_cap: Option<u32>,
    pub max_event_bytes: Option<usize>,
    pub frame_transport: Option<String>,
    pub frame_sab_slot_count: Option<usize>,
    pub frame_sab_slot_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct TextSection {
    pub emoji_width_policy: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub drawlist: DrawlistSection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub text: TextSection,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub drawlist: DrawlistConfig,
    pub transport: TransportConfig,
    pub text: TextConfig,
    pub toggles: RuntimeToggles,
}

impl Config {
    /// Load from a TOML file; a missing file yields defaults. Positive-value
    /// requirements are enforced here so components can trust their limits.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.unwrap_or_else(|| PathBuf::from("rezi.toml"));
        let file = match fs::read_to_string(&path) {
            Ok(raw) => {
                info!(target: "config.load", path = %path.display(), "loaded config file");
                toml::from_str::<ConfigFile>(&raw)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            Err(_) => ConfigFile::default(),
        };
        Self::from_file(file)
    }

    pub fn from_file(file: ConfigFile) -> Result<Self> {
        let defaults = DrawlistConfig::default();
        let drawlist = DrawlistConfig {
            max_drawlist_bytes: positive(
                "drawlist.max_drawlist_bytes",
                file.drawlist.max_drawlist_bytes,
                defaults.max_drawlist_bytes,
            )?,
            max_cmd_count: positive(
                "drawlist.max_cmd_count",
                file.drawlist.max_cmd_count,
                defaults.max_cmd_count,
            )?,
            max_strings: positive(
                "drawlist.max_strings",
                file.drawlist.max_strings,
                defaults.max_strings,
            )?,
            max_string_bytes: positive(
                "drawlist.max_string_bytes",
                file.drawlist.max_string_bytes,
                defaults.max_string_bytes,
            )?,
            max_blobs: positive(
                "drawlist.max_blobs",
                file.drawlist.max_blobs,
                defaults.max_blobs,
            )?,
            max_blob_bytes: positive(
                "drawlist.max_blob_bytes",
                file.drawlist.max_blob_bytes,
                defaults.max_blob_bytes,
            )?,
            validate_params: file.drawlist.validate_params.unwrap_or(true),
            reuse_output_buffer: file.drawlist.reuse_output_buffer.unwrap_or(false),
        };
        let t_defaults = TransportConfig::default();
        let transport = TransportConfig {
            fps_cap: positive_u32("transport.fps_cap", file.transport.fps_cap, t_defaults.fps_cap)?,
            max_event_bytes: positive(
                "transport.max_event_bytes",
                file.transport.max_event_bytes,
                t_defaults.max_event_bytes,
            )?,
            frame_transport: match &file.transport.frame_transport {
                None => FrameTransportMode::Auto,
                Some(s) => s.parse().map_err(|()| {
                    anyhow::anyhow!("transport.frame_transport: unknown mode {s:?}")
                })?,
            },
            frame_sab_slot_count: positive(
                "transport.frame_sab_slot_count",
                file.transport.frame_sab_slot_count,
                t_defaults.frame_sab_slot_count,
            )?,
            frame_sab_slot_bytes: positive(
                "transport.frame_sab_slot_bytes",
                file.transport.frame_sab_slot_bytes,
                t_defaults.frame_sab_slot_bytes,
            )?,
        }
        .clamped();
        let text = TextConfig {
            emoji_width_policy: match &file.text.emoji_width_policy {
                None => EmojiWidthPolicy::Auto,
                Some(s) => s.parse().map_err(|()| {
                    anyhow::anyhow!("text.emoji_width_policy: unknown policy {s:?}")
                })?,
            },
        };
        Ok(Self {
            drawlist,
            transport,
            text,
            toggles: RuntimeToggles::from_env(),
        })
    }
}

fn positive(name: &str, value: Option<usize>, default: usize) -> Result<usize> {
    match value {
        None => Ok(default),
        Some(0) => anyhow::bail!("{name} must be positive"),
        Some(v) => Ok(v),
    }
}

fn positive_u32(name: &str, value: Option<u32>, default: u32) -> Result<u32> {
    match value {
        None => Ok(default),
        Some(0) => anyhow::bail!("{name} must be positive"),
        Some(v) => Ok(v),
    }
}
